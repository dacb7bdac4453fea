mod model;
mod repository;

pub(crate) use repository::apply_photo_state;
pub use repository::PhotoRepository;
