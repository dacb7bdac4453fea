//! Feed URL construction and classification.

use serde::{Deserialize, Serialize};

use super::sync_config::SyncConfig;
use crate::contacts::RecordKind;

/// Fixed root of canonical group references. Independent of the configured
/// host so memberships stay stable across projection and host rewrites.
pub const CANONICAL_FEED_ROOT: &str = "http://www.google.com/m8/feeds";

/// The kind of records a feed serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Groups,
    Contacts,
    Photos,
}

impl FeedKind {
    pub fn record_kind(&self) -> Option<RecordKind> {
        match self {
            FeedKind::Groups => Some(RecordKind::Group),
            FeedKind::Contacts => Some(RecordKind::Contact),
            FeedKind::Photos => None,
        }
    }
}

/// Builds feed and edit URLs for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUrls {
    root: String,
    projection: String,
}

impl FeedUrls {
    pub fn new(root: &str, projection: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
            projection: projection.to_string(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.feed_base_url, &config.projection)
    }

    pub fn contacts_feed(&self, account: &str) -> String {
        format!("{}/contacts/{}/{}", self.root, account, self.projection)
    }

    pub fn groups_feed(&self, account: &str) -> String {
        format!("{}/groups/{}/{}", self.root, account, self.projection)
    }

    pub fn photos_feed(&self, account: &str) -> String {
        format!("{}/photos/media/{}", self.root, account)
    }

    pub fn canonical_groups_feed(account: &str) -> String {
        format!("{}/groups/{}/base", CANONICAL_FEED_ROOT, account)
    }

    /// Canonical reference to one group, as carried by memberships.
    pub fn canonical_group_ref(account: &str, group_sync_id: &str) -> String {
        format!("{}/{}", Self::canonical_groups_feed(account), group_sync_id)
    }

    /// Contacts feed restricted to the members of one group.
    pub fn contacts_feed_for_group(&self, account: &str, group_sync_id: &str) -> String {
        format!(
            "{}?group={}/{}",
            self.contacts_feed(account),
            urlencoding::encode(&Self::canonical_groups_feed(account)),
            group_sync_id
        )
    }

    pub fn feed_for_kind(&self, kind: RecordKind, account: &str) -> String {
        match kind {
            RecordKind::Contact => self.contacts_feed(account),
            RecordKind::Group => self.groups_feed(account),
        }
    }

    /// Classifies a feed URL for this account. Unknown URLs yield `None`.
    pub fn kind_of(&self, account: &str, feed: &str) -> Option<FeedKind> {
        let (path, query) = match feed.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (feed, None),
        };
        match query {
            None if path == self.groups_feed(account) => Some(FeedKind::Groups),
            None if path == self.photos_feed(account) => Some(FeedKind::Photos),
            None if path == self.contacts_feed(account) => Some(FeedKind::Contacts),
            Some(query) if query.starts_with("group=") && path == self.contacts_feed(account) => {
                Some(FeedKind::Contacts)
            }
            _ => None,
        }
    }

    /// Edit reference `{feed}/{sync_id}/{sync_version}` of a synced record.
    pub fn edit_url(
        &self,
        kind: RecordKind,
        account: &str,
        sync_id: &str,
        sync_version: Option<&str>,
    ) -> String {
        let base = format!("{}/{}", self.feed_for_kind(kind, account), sync_id);
        match sync_version {
            Some(version) if !version.is_empty() => format!("{}/{}", base, version),
            _ => base,
        }
    }

    /// Download URL of a contact's photo.
    pub fn photo_url(&self, account: &str, contact_sync_id: &str) -> String {
        format!("{}/{}", self.photos_feed(account), contact_sync_id)
    }

    /// Edit reference of a contact's photo.
    pub fn photo_edit_url(
        &self,
        account: &str,
        contact_sync_id: &str,
        photo_version: Option<&str>,
    ) -> String {
        let base = self.photo_url(account, contact_sync_id);
        match photo_version {
            Some(version) if !version.is_empty() => format!("{}/{}", base, version),
            _ => base,
        }
    }
}

impl Default for FeedUrls {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
