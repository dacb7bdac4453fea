//! Domain model, field mapping and sync rules for the contacts feed sync engine.

pub mod contacts;
pub mod errors;
pub mod settings;
pub mod sync;

pub use errors::{DatabaseError, Error, Result};
