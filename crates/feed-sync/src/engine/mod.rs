//! Two-way contacts sync engine.
//!
//! A pass runs sequentially: pull server diffs (groups, contacts, photos),
//! push local changes (groups before contacts), then push dirty photos.
//! Each step stops the pass on an auth or transport failure and keeps the
//! progress already committed locally.

mod photos;
mod ports;
mod puller;
mod pusher;
mod subscriptions;

#[cfg(test)]
mod test_support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contactsync_core::contacts::RecordTranslator;
use contactsync_core::sync::{FeedUrls, SyncConfig, SyncFailureKind, SyncResult};
use contactsync_core::Result;
use log::{debug, info, warn};

use crate::error::FeedSyncError;

pub use ports::{CredentialStore, EnginePorts, FeedTransport, SyncRequester};

/// What to do with a pending local change after the server refused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureAction {
    /// Leave it pending for the next pass.
    Keep,
    /// Abandon it and continue.
    Drop,
    /// Stop the remaining work of the pass.
    Abort,
}

pub struct ContactsSyncEngine {
    ports: EnginePorts,
    config: SyncConfig,
    feeds: FeedUrls,
    translator: RecordTranslator,
    cancel_flag: Arc<AtomicBool>,
}

impl ContactsSyncEngine {
    pub fn new(ports: EnginePorts, config: SyncConfig) -> Self {
        let feeds = FeedUrls::from_config(&config);
        Self {
            translator: RecordTranslator::new(feeds.clone()),
            feeds,
            ports,
            config,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn feeds(&self) -> &FeedUrls {
        &self.feeds
    }

    /// Shared flag checked between feeds, entries and rows.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    /// Asks the running pass to stop at the next checkpoint.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    fn begin(&self) {
        self.cancel_flag.store(false, Ordering::SeqCst);
    }

    /// Marks the result canceled when the flag is set.
    fn check_canceled(&self, result: &mut SyncResult) -> bool {
        if self.cancel_flag.load(Ordering::SeqCst) {
            result.canceled = true;
            return true;
        }
        false
    }

    async fn auth_token(&self, account: &str, result: &mut SyncResult) -> Option<String> {
        match self.ports.credentials.get_auth_token(account).await {
            Ok(token) => Some(token),
            Err(err) => {
                warn!("[ContactsSync] No auth token for {}: {}", account, err);
                result.num_auth_exceptions += 1;
                None
            }
        }
    }

    /// Counts a refused request and decides how the pass continues.
    async fn react_to_failure(
        &self,
        err: &FeedSyncError,
        token: &str,
        result: &mut SyncResult,
    ) -> FailureAction {
        let kind = err.failure_kind();
        kind.record(result);
        if kind == SyncFailureKind::Unauthorized {
            warn!("[ContactsSync] Auth token rejected, stopping: {}", err);
            self.ports.credentials.invalidate_auth_token(token).await;
        }
        if kind.stops_pass() {
            warn!("[ContactsSync] Stopping pass after {:?}: {}", kind, err);
            FailureAction::Abort
        } else if kind.drops_change() {
            FailureAction::Drop
        } else {
            FailureAction::Keep
        }
    }

    /// Best-effort delete of an entry carrying the legacy cleanup title. The
    /// outcome never affects the caller.
    async fn delete_legacy_entry(&self, token: &str, title: Option<&str>, edit_url: Option<&str>) {
        let (Some(legacy), Some(title), Some(edit_url)) =
            (self.config.legacy_cleanup_title.as_deref(), title, edit_url)
        else {
            return;
        };
        if title != legacy {
            return;
        }
        match self.ports.transport.delete_entry(token, edit_url).await {
            Ok(()) => info!("[ContactsSync] Deleted legacy entry {}", edit_url),
            Err(err) => debug!(
                "[ContactsSync] Legacy entry delete failed for {}: {}",
                edit_url, err
            ),
        }
    }

    /// Full pass: pull, push records, push photos.
    pub async fn run_sync_pass(&self, account: &str) -> Result<SyncResult> {
        self.begin();
        let mut result = SyncResult::default();

        if let Some(token) = self.auth_token(account, &mut result).await {
            self.pull_all(account, &token, &mut result).await?;
            if !result.has_hard_error() && !result.canceled {
                self.push_records(account, &token, &mut result).await?;
            }
            if !result.has_hard_error() && !result.canceled {
                self.push_photos(account, &token, &mut result).await?;
            }
        }

        info!(
            "[ContactsSync] Sync pass for {} finished: {}",
            account,
            result.stats_string()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use contactsync_core::contacts::{Contact, ContactRecord};

    use super::test_support::*;

    #[tokio::test]
    async fn pass_pulls_before_pushing() {
        let h = harness();
        h.sync_everything(true).await;
        h.transport.serve(
            &h.contacts_feed(),
            vec![h.contact_entry("c1", "v1", "2026-03-01T10:00:01Z", "Ann")],
        );
        h.contacts
            .insert_local_contact(ContactRecord {
                contact: Contact {
                    account: ACCOUNT.to_string(),
                    name: Some("Bob".to_string()),
                    ..Default::default()
                },
                children: Default::default(),
            })
            .await
            .unwrap();

        let result = h.engine.run_sync_pass(ACCOUNT).await.unwrap();

        assert_eq!(result.num_updates, 2);
        let calls = h.transport.calls();
        assert!(matches!(&calls[0], Call::Fetch { feed, .. } if *feed == h.groups_feed()));
        assert!(matches!(&calls[1], Call::Fetch { feed, .. } if *feed == h.contacts_feed()));
        assert!(matches!(calls.last(), Some(Call::Create { .. })));
        assert!(h.contacts.find_contact_by_sync_id(ACCOUNT, "c1").unwrap().is_some());
    }

    #[tokio::test]
    async fn hard_pull_failure_skips_the_push() {
        let h = harness();
        h.sync_everything(true).await;
        h.transport.script(&h.contacts_feed(), vec![Some(503)]);
        h.contacts
            .insert_local_contact(ContactRecord {
                contact: Contact {
                    account: ACCOUNT.to_string(),
                    name: Some("Bob".to_string()),
                    ..Default::default()
                },
                children: Default::default(),
            })
            .await
            .unwrap();

        let result = h.engine.run_sync_pass(ACCOUNT).await.unwrap();

        assert_eq!(result.num_io_exceptions, 1);
        assert!(!h
            .transport
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Create { .. })));
    }
}
