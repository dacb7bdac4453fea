//! Local-to-server push of dirty and deleted records.

use contactsync_core::contacts::{DeletedRecord, LocalRecord, RecordKind};
use contactsync_core::sync::SyncResult;
use contactsync_core::{Error, Result};
use log::{debug, info, warn};

use super::{ContactsSyncEngine, FailureAction};

impl ContactsSyncEngine {
    /// Pushes every pending local change of the account.
    pub async fn push_client_diffs(&self, account: &str) -> Result<SyncResult> {
        self.begin();
        let mut result = SyncResult::default();
        if let Some(token) = self.auth_token(account, &mut result).await {
            self.push_records(account, &token, &mut result).await?;
        }
        Ok(result)
    }

    /// Groups go first so contact memberships can reference their sync ids.
    pub(super) async fn push_records(
        &self,
        account: &str,
        token: &str,
        result: &mut SyncResult,
    ) -> Result<()> {
        for kind in [RecordKind::Group, RecordKind::Contact] {
            if !self.push_kind(kind, account, token, result).await? {
                warn!(
                    "[ContactsSync] Push for {} stopped at {} records",
                    account,
                    kind.as_str()
                );
                break;
            }
        }
        Ok(())
    }

    /// Returns `false` when the rest of the pass must not run.
    async fn push_kind(
        &self,
        kind: RecordKind,
        account: &str,
        token: &str,
        result: &mut SyncResult,
    ) -> Result<bool> {
        let dirty = self.ports.contacts.list_dirty(kind, account)?;
        let deleted = self.ports.contacts.list_deleted(kind, account)?;
        debug!(
            "[ContactsSync] Pushing {} dirty and {} deleted {} records",
            dirty.len(),
            deleted.len(),
            kind.as_str()
        );

        for record in &dirty {
            if self.check_canceled(result) {
                return Ok(false);
            }
            if !self.push_record(account, record, token, result).await? {
                return Ok(false);
            }
        }
        for record in &deleted {
            if self.check_canceled(result) {
                return Ok(false);
            }
            if !self.push_deletion(account, record, token, result).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn push_record(
        &self,
        account: &str,
        record: &LocalRecord,
        token: &str,
        result: &mut SyncResult,
    ) -> Result<bool> {
        let kind = record.kind();
        let Some(local_id) = record.local_id() else {
            warn!("[ContactsSync] Dirty {} without a row id", kind.as_str());
            return Ok(true);
        };
        let revision = record.local_revision();

        if kind == RecordKind::Contact {
            if let Some(sync_id) = record.sync_id() {
                let edit_url = self
                    .feeds
                    .edit_url(kind, account, sync_id, record.sync_version());
                self.delete_legacy_entry(token, record.title(), Some(&edit_url))
                    .await;
            }
        }

        let contacts = &self.ports.contacts;
        let group_lookup = |group_id: i64| contacts.get_group_sync_id(group_id);
        let outbound = match self
            .translator
            .record_to_entry(record, account, &group_lookup)
        {
            Ok(outbound) => outbound,
            Err(err) if err.is_retryable_translate() => {
                info!(
                    "[ContactsSync] Deferring {} {}: {}",
                    kind.as_str(),
                    local_id,
                    err
                );
                result.num_parse_exceptions += 1;
                return Ok(true);
            }
            Err(Error::Translate(err)) => {
                warn!(
                    "[ContactsSync] Dropping {} {} that cannot be sent: {}",
                    kind.as_str(),
                    local_id,
                    err
                );
                result.num_parse_exceptions += 1;
                self.ports
                    .contacts
                    .mark_dropped(kind, local_id, revision, err.to_string())
                    .await?;
                return Ok(true);
            }
            Err(err) => return Err(err),
        };

        let transport = &self.ports.transport;
        let sent = match (&outbound.edit_url, &outbound.create_url) {
            (Some(edit_url), _) => transport.update_entry(token, edit_url, &outbound.entry).await,
            (None, Some(create_url)) => {
                transport
                    .create_entry(token, create_url, &outbound.entry)
                    .await
            }
            (None, None) => {
                return Err(Error::sync(format!(
                    "{} {} has neither an edit nor a create url",
                    kind.as_str(),
                    local_id
                )))
            }
        };

        match sent {
            Ok(stored) => {
                let meta = stored.meta();
                let Some(sync_id) = meta
                    .sync_id()
                    .or_else(|| record.sync_id().map(str::to_string))
                else {
                    warn!(
                        "[ContactsSync] Server returned {} {} without an id",
                        kind.as_str(),
                        local_id
                    );
                    result.num_parse_exceptions += 1;
                    return Ok(true);
                };
                self.ports
                    .contacts
                    .mark_pushed(kind, local_id, revision, sync_id, meta.sync_version())
                    .await?;
                result.num_updates += 1;
                Ok(true)
            }
            Err(err) => {
                warn!(
                    "[ContactsSync] Pushing {} {} failed: {}",
                    kind.as_str(),
                    local_id,
                    err
                );
                match self.react_to_failure(&err, token, result).await {
                    FailureAction::Keep => Ok(true),
                    FailureAction::Drop => {
                        self.ports
                            .contacts
                            .mark_dropped(kind, local_id, revision, err.to_string())
                            .await?;
                        Ok(true)
                    }
                    FailureAction::Abort => Ok(false),
                }
            }
        }
    }

    async fn push_deletion(
        &self,
        account: &str,
        deleted: &DeletedRecord,
        token: &str,
        result: &mut SyncResult,
    ) -> Result<bool> {
        let kind = deleted.marker.kind;
        let Some(edit_url) = self
            .translator
            .deleted_record_edit_url(&deleted.marker, account)
        else {
            // Never reached the server.
            self.ports.contacts.purge_deleted(kind, deleted.id).await?;
            return Ok(true);
        };

        match self.ports.transport.delete_entry(token, &edit_url).await {
            Ok(()) => {
                self.ports.contacts.purge_deleted(kind, deleted.id).await?;
                result.num_updates += 1;
                Ok(true)
            }
            Err(err) => {
                warn!("[ContactsSync] Deleting {} failed: {}", edit_url, err);
                match self.react_to_failure(&err, token, result).await {
                    FailureAction::Keep => Ok(true),
                    FailureAction::Drop => {
                        self.ports.contacts.purge_deleted(kind, deleted.id).await?;
                        Ok(true)
                    }
                    FailureAction::Abort => Ok(false),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use contactsync_core::contacts::{
        Contact, ContactChildren, ContactRecord, ContactRepositoryTrait, Entry, Group,
        GroupMembership, RecordKind,
    };

    use crate::engine::test_support::*;

    fn local_contact(name: &str) -> ContactRecord {
        ContactRecord {
            contact: Contact {
                account: ACCOUNT.to_string(),
                name: Some(name.to_string()),
                ..Default::default()
            },
            children: ContactChildren::default(),
        }
    }

    /// Pulls one server contact and returns its local row.
    async fn synced_contact(h: &Harness, sync_id: &str, name: &str) -> ContactRecord {
        let feed = h.contacts_feed();
        h.transport.serve(
            &feed,
            vec![h.contact_entry(sync_id, "v1", "2026-03-01T10:00:00Z", name)],
        );
        h.engine.pull_server_diffs(ACCOUNT, Some(&feed)).await.unwrap();
        h.contacts
            .find_contact_by_sync_id(ACCOUNT, sync_id)
            .unwrap()
            .unwrap()
    }

    async fn edit_locally(h: &Harness, mut record: ContactRecord, name: &str) {
        record.contact.name = Some(name.to_string());
        h.contacts.update_local_contact(record).await.unwrap();
    }

    #[tokio::test]
    async fn new_contact_is_created_and_marked_clean() {
        let h = harness();
        h.contacts
            .insert_local_contact(local_contact("Ann"))
            .await
            .unwrap();

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        assert_eq!(result.num_updates, 1);
        match &h.transport.calls()[0] {
            Call::Create { url, entry } => {
                assert_eq!(url, &h.contacts_feed());
                assert_eq!(entry.title(), Some("Ann"));
            }
            other => panic!("expected a create, got {:?}", other),
        }
        let stored = h
            .contacts
            .find_contact_by_sync_id(ACCOUNT, "s1")
            .unwrap()
            .unwrap();
        assert!(!stored.contact.dirty);
        assert_eq!(stored.contact.sync_version.as_deref(), Some("v1"));
        assert!(h
            .contacts
            .list_dirty(RecordKind::Contact, ACCOUNT)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn edited_contact_is_updated_at_its_versioned_url() {
        let h = harness();
        let record = synced_contact(&h, "c1", "Ann").await;
        edit_locally(&h, record, "Ann B").await;

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        assert_eq!(result.num_updates, 1);
        let edit_url = format!("{}/c1/v1", h.contacts_feed());
        assert_eq!(h.transport.calls_to(&edit_url).len(), 1);
        let stored = h
            .contacts
            .find_contact_by_sync_id(ACCOUNT, "c1")
            .unwrap()
            .unwrap();
        assert!(!stored.contact.dirty);
        assert_ne!(stored.contact.sync_version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn conflict_leaves_record_dirty_with_its_version() {
        let h = harness();
        let record = synced_contact(&h, "c1", "Ann").await;
        edit_locally(&h, record, "Ann B").await;
        h.transport
            .script(&format!("{}/c1/v1", h.contacts_feed()), vec![Some(409)]);

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        assert_eq!(result.num_conflicts, 1);
        assert_eq!(result.num_updates, 0);
        let stored = h
            .contacts
            .find_contact_by_sync_id(ACCOUNT, "c1")
            .unwrap()
            .unwrap();
        assert!(stored.contact.dirty);
        assert_eq!(stored.contact.sync_version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn forbidden_change_is_dropped_and_annotated() {
        let h = harness();
        let record = synced_contact(&h, "c1", "Ann").await;
        let person_id = record.contact.id.unwrap();
        edit_locally(&h, record, "Ann B").await;
        h.transport
            .script(&format!("{}/c1/v1", h.contacts_feed()), vec![Some(403)]);

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        assert_eq!(result.num_skipped, 1);
        assert!(!result.has_hard_error());
        let stored = h.contacts.get_contact(person_id).unwrap().unwrap();
        assert!(!stored.contact.dirty);
        assert!(h.contacts.contact_sync_error(person_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn rejected_token_aborts_remaining_pushes() {
        let h = harness();
        h.contacts
            .insert_local_contact(local_contact("Ann"))
            .await
            .unwrap();
        h.contacts
            .insert_local_contact(local_contact("Bob"))
            .await
            .unwrap();
        h.transport.script(&h.contacts_feed(), vec![Some(401)]);

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        assert_eq!(result.num_auth_exceptions, 1);
        assert_eq!(h.transport.calls_to(&h.contacts_feed()).len(), 1);
        assert_eq!(h.credentials.invalidated(), vec!["token-1".to_string()]);
        assert_eq!(
            h.contacts
                .list_dirty(RecordKind::Contact, ACCOUNT)
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn server_error_stops_the_push() {
        let h = harness();
        h.contacts
            .insert_local_contact(local_contact("Ann"))
            .await
            .unwrap();
        h.contacts
            .insert_local_contact(local_contact("Bob"))
            .await
            .unwrap();
        h.transport.script(&h.contacts_feed(), vec![Some(500)]);

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        assert_eq!(result.num_io_exceptions, 1);
        assert_eq!(h.transport.calls().len(), 1);
        assert!(h.credentials.invalidated().is_empty());
    }

    #[tokio::test]
    async fn membership_waits_for_its_group_to_sync() {
        let h = harness();
        let group_id = h
            .contacts
            .insert_local_group(Group {
                account: ACCOUNT.to_string(),
                name: Some("Climbing".to_string()),
                should_sync: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let mut record = local_contact("Ann");
        record.children.memberships.push(GroupMembership {
            group_id: Some(group_id),
            group_sync_id: None,
        });
        h.contacts.insert_local_contact(record).await.unwrap();
        h.transport.script(&h.groups_feed(), vec![Some(409)]);

        let first = h.engine.push_client_diffs(ACCOUNT).await.unwrap();
        assert_eq!(first.num_conflicts, 1);
        assert_eq!(first.num_parse_exceptions, 1);
        assert_eq!(first.num_updates, 0);

        let second = h.engine.push_client_diffs(ACCOUNT).await.unwrap();
        assert_eq!(second.num_updates, 2);
        assert_eq!(second.num_parse_exceptions, 0);

        let contact_create = h
            .transport
            .calls_to(&h.contacts_feed())
            .into_iter()
            .find_map(|call| match call {
                Call::Create {
                    entry: Entry::Contact(entry),
                    ..
                } => Some(entry),
                _ => None,
            })
            .unwrap();
        assert_eq!(contact_create.group_memberships.len(), 1);
        assert!(contact_create.group_memberships[0].href.ends_with("/s1"));
    }

    #[tokio::test]
    async fn local_delete_is_pushed_and_tombstone_purged() {
        let h = harness();
        let record = synced_contact(&h, "c1", "Ann").await;
        h.contacts
            .delete_local_contact(record.contact.id.unwrap())
            .await
            .unwrap();

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        assert_eq!(result.num_updates, 1);
        let edit_url = format!("{}/c1/v1", h.contacts_feed());
        assert_eq!(
            h.transport.calls_to(&edit_url),
            vec![Call::Delete { url: edit_url.clone() }]
        );
        assert!(h
            .contacts
            .list_deleted(RecordKind::Contact, ACCOUNT)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_of_missing_server_entry_is_purged() {
        let h = harness();
        let record = synced_contact(&h, "c1", "Ann").await;
        h.contacts
            .delete_local_contact(record.contact.id.unwrap())
            .await
            .unwrap();
        h.transport
            .script(&format!("{}/c1/v1", h.contacts_feed()), vec![Some(404)]);

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        assert_eq!(result.num_skipped, 1);
        assert!(h
            .contacts
            .list_deleted(RecordKind::Contact, ACCOUNT)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn never_synced_delete_is_purged_without_a_request() {
        let h = harness();
        let person_id = h
            .contacts
            .insert_local_contact(local_contact("Ann"))
            .await
            .unwrap();
        h.contacts.delete_local_contact(person_id).await.unwrap();

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        assert_eq!(result.num_updates, 0);
        assert!(h.transport.calls().is_empty());
        assert!(h
            .contacts
            .list_deleted(RecordKind::Contact, ACCOUNT)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn legacy_titled_contact_is_deleted_before_the_update() {
        let h = harness();
        let record = synced_contact(&h, "c1", "Ann").await;
        edit_locally(&h, record, LEGACY_TITLE).await;
        let edit_url = format!("{}/c1/v1", h.contacts_feed());
        h.transport.script(&edit_url, vec![Some(404), None]);

        let result = h.engine.push_client_diffs(ACCOUNT).await.unwrap();

        let calls = h.transport.calls_to(&edit_url);
        assert!(matches!(calls[0], Call::Delete { .. }));
        assert!(matches!(calls[1], Call::Update { .. }));
        assert_eq!(result.num_updates, 1);
    }
}
