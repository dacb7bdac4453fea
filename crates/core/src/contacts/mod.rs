//! Contacts, groups and photos: local models, feed entries and translation.

mod contacts_traits;
mod entry;
mod kinds;
mod model;
mod translator;

pub use contacts_traits::*;
pub use entry::*;
pub use kinds::*;
pub use model::*;
pub use translator::*;
