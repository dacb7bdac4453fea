//! Sync domain models, feed URLs and configuration.

mod feeds;
mod outcome;
mod sync_config;
mod sync_model;
mod sync_traits;

pub use feeds::*;
pub use outcome::*;
pub use sync_config::*;
pub use sync_model::*;
pub use sync_traits::*;
