//! Feed transport and two-way sync engine for contacts, groups and photos.

pub mod client;
pub mod engine;
pub mod error;
pub mod types;

pub use client::FeedClient;
pub use engine::{ContactsSyncEngine, CredentialStore, EnginePorts, FeedTransport, SyncRequester};
pub use error::{FeedSyncError, Result};
pub use types::{FeedItem, FeedPage, FeedQuery};
