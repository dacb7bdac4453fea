//! Collaborators the sync engine talks to.

use std::sync::Arc;

use async_trait::async_trait;
use contactsync_core::contacts::{ContactRepositoryTrait, Entry, PhotoRepositoryTrait};
use contactsync_core::settings::SettingsRepositoryTrait;
use contactsync_core::sync::SyncStateRepositoryTrait;

use crate::error::Result;
use crate::types::{FeedPage, FeedQuery};

/// Remote feed operations. Implemented over HTTP by [`crate::FeedClient`].
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn fetch_feed(&self, token: &str, feed_url: &str, query: &FeedQuery) -> Result<FeedPage>;

    /// Creates an entry and returns it as stored by the server.
    async fn create_entry(&self, token: &str, create_url: &str, entry: &Entry) -> Result<Entry>;

    /// Replaces the entry at `edit_url`. The URL carries the expected version.
    async fn update_entry(&self, token: &str, edit_url: &str, entry: &Entry) -> Result<Entry>;

    async fn delete_entry(&self, token: &str, edit_url: &str) -> Result<()>;

    async fn get_media(&self, token: &str, url: &str) -> Result<Vec<u8>>;

    async fn update_media(&self, token: &str, edit_url: &str, data: Vec<u8>) -> Result<()>;
}

/// Source of auth tokens. Acquisition and refresh happen outside the engine.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_auth_token(&self, account: &str) -> Result<String>;

    /// Marks a token the server rejected so the next fetch refreshes it.
    async fn invalidate_auth_token(&self, token: &str);
}

/// Outer scheduler hook. Requests a later sync of one feed.
pub trait SyncRequester: Send + Sync {
    fn request_sync(&self, account: &str, feed: &str);
}

/// Everything the engine needs from the outside world.
#[derive(Clone)]
pub struct EnginePorts {
    pub transport: Arc<dyn FeedTransport>,
    pub credentials: Arc<dyn CredentialStore>,
    pub requester: Arc<dyn SyncRequester>,
    pub contacts: Arc<dyn ContactRepositoryTrait>,
    pub photos: Arc<dyn PhotoRepositoryTrait>,
    pub sync_state: Arc<dyn SyncStateRepositoryTrait>,
    pub settings: Arc<dyn SettingsRepositoryTrait>,
}
