//! Which feeds an account follows.

use std::collections::HashSet;

use contactsync_core::settings::{should_sync_everything, SYNC_EVERYTHING};
use contactsync_core::sync::Subscription;
use contactsync_core::Result;
use log::{debug, info};

use super::ContactsSyncEngine;

impl ContactsSyncEngine {
    /// Groups feed, then the contacts feed or one scoped feed per synced
    /// group, then the photo feed.
    pub(super) fn desired_feeds(&self, account: &str) -> Result<Vec<String>> {
        let mut feeds = vec![self.feeds.groups_feed(account)];
        if should_sync_everything(self.ports.settings.as_ref(), account)? {
            feeds.push(self.feeds.contacts_feed(account));
        } else {
            for group in self.ports.contacts.list_groups(account)? {
                if !group.should_sync {
                    continue;
                }
                if let Some(sync_id) = group.sync_id.as_deref().filter(|id| !id.is_empty()) {
                    feeds.push(self.feeds.contacts_feed_for_group(account, sync_id));
                }
            }
        }
        feeds.push(self.feeds.photos_feed(account));
        Ok(feeds)
    }

    /// Brings persisted subscriptions and watermarks in line with the
    /// desired feed set. A newly followed feed gets a sync request.
    pub async fn reconcile_subscriptions(&self, account: &str) -> Result<()> {
        let desired = self.desired_feeds(account)?;
        let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();
        let current = self.ports.sync_state.list_subscriptions(account)?;
        let current_set: HashSet<&str> = current.iter().map(|sub| sub.feed.as_str()).collect();

        for stale in current.iter().filter(|sub| !desired_set.contains(sub.feed.as_str())) {
            info!("[ContactsSync] Unsubscribing {} from {}", account, stale.feed);
            self.ports
                .sync_state
                .remove_subscription(account, &stale.feed)
                .await?;
        }

        for feed in desired.iter().filter(|feed| !current_set.contains(feed.as_str())) {
            info!("[ContactsSync] Subscribing {} to {}", account, feed);
            self.ports
                .sync_state
                .add_subscription(Subscription {
                    account: account.to_string(),
                    feed: feed.clone(),
                })
                .await?;
            self.ports.requester.request_sync(account, feed);
        }

        for watermark in self.ports.sync_state.list_watermarks(account)? {
            if !desired_set.contains(watermark.feed.as_str()) {
                debug!("[ContactsSync] Dropping watermark of {}", watermark.feed);
                self.ports
                    .sync_state
                    .delete_watermark(account, &watermark.feed)
                    .await?;
            }
        }
        Ok(())
    }

    /// Defaults new accounts to syncing everything, then reconciles each.
    pub async fn on_accounts_changed(&self, accounts: &[String]) -> Result<()> {
        for account in accounts {
            if self
                .ports
                .settings
                .get_setting(account, SYNC_EVERYTHING)?
                .is_none()
            {
                self.ports
                    .settings
                    .set_setting(account, SYNC_EVERYTHING, "1")
                    .await?;
            }
            self.reconcile_subscriptions(account).await?;
        }
        Ok(())
    }

    /// Removes clean contacts that no synced group covers. A no-op while the
    /// account syncs everything.
    pub async fn purge_unsynced_contacts(&self, account: &str) -> Result<usize> {
        if should_sync_everything(self.ports.settings.as_ref(), account)? {
            return Ok(0);
        }
        let purged = self.ports.contacts.purge_unsynced_contacts(account).await?;
        if purged > 0 {
            info!("[ContactsSync] Purged {} unsynced contacts of {}", purged, account);
        }
        Ok(purged)
    }
}
