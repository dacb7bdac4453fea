//! SQLite storage for feed watermarks and subscriptions.

mod model;
mod repository;

pub(crate) use repository::upsert_watermark;
pub use repository::SyncStateRepository;
