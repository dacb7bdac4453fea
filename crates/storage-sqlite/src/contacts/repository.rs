use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use log::{debug, warn};

use contactsync_core::contacts::{
    Contact, ContactChildren, ContactRecord, ContactRepositoryTrait, DeletedRecord,
    DeletionMarker, Group, InboundRecord, LocalRecord, Phone, PhotoState, RecordKind,
};
use contactsync_core::errors::{DatabaseError, Error, Result};
use contactsync_core::sync::FeedWatermark;

use super::model::{
    ContactMethodDB, DecodedContactMethod, DeletedRowDB, ExtensionDB, GroupDB,
    GroupMembershipDB, NewContactMethodDB, NewExtensionDB, NewGroupDB, NewGroupMembershipDB,
    NewOrganizationDB, NewPersonDB, NewPhoneDB, OrganizationDB, PersonDB, PhoneDB, METHOD_EMAIL,
    METHOD_IM, METHOD_POSTAL,
};
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::photos::apply_photo_state;
use crate::schema::{
    contact_groups, contact_methods, deleted_groups, deleted_people, extensions,
    group_memberships, organizations, people, phones, photos,
};
use crate::sync::upsert_watermark;

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn load_children(conn: &mut SqliteConnection, person_id: i64) -> Result<ContactChildren> {
    let mut children = ContactChildren::default();

    let phone_rows = phones::table
        .filter(phones::person_id.eq(person_id))
        .order(phones::id.asc())
        .select(PhoneDB::as_select())
        .load::<PhoneDB>(conn)
        .map_err(StorageError::from)?;
    for row in phone_rows {
        children.phones.push(Phone::try_from(row)?);
    }

    let method_rows = contact_methods::table
        .filter(contact_methods::person_id.eq(person_id))
        .order(contact_methods::id.asc())
        .select(ContactMethodDB::as_select())
        .load::<ContactMethodDB>(conn)
        .map_err(StorageError::from)?;
    for row in method_rows {
        match DecodedContactMethod::try_from(row)? {
            DecodedContactMethod::Email(email) => children.emails.push(email),
            DecodedContactMethod::Postal(postal) => children.postal_addresses.push(postal),
            DecodedContactMethod::Im(im) => children.im_addresses.push(im),
        }
    }

    let org_rows = organizations::table
        .filter(organizations::person_id.eq(person_id))
        .order(organizations::id.asc())
        .select(OrganizationDB::as_select())
        .load::<OrganizationDB>(conn)
        .map_err(StorageError::from)?;
    for row in org_rows {
        children.organizations.push(row.try_into()?);
    }

    children.extensions = extensions::table
        .filter(extensions::person_id.eq(person_id))
        .order(extensions::id.asc())
        .select(ExtensionDB::as_select())
        .load::<ExtensionDB>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .map(Into::into)
        .collect();

    children.memberships = group_memberships::table
        .filter(group_memberships::person_id.eq(person_id))
        .order(group_memberships::id.asc())
        .select(GroupMembershipDB::as_select())
        .load::<GroupMembershipDB>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(children)
}

fn delete_children(conn: &mut SqliteConnection, person_ids: &[i64]) -> Result<()> {
    diesel::delete(phones::table.filter(phones::person_id.eq_any(person_ids)))
        .execute(conn)
        .map_err(StorageError::from)?;
    diesel::delete(contact_methods::table.filter(contact_methods::person_id.eq_any(person_ids)))
        .execute(conn)
        .map_err(StorageError::from)?;
    diesel::delete(organizations::table.filter(organizations::person_id.eq_any(person_ids)))
        .execute(conn)
        .map_err(StorageError::from)?;
    diesel::delete(extensions::table.filter(extensions::person_id.eq_any(person_ids)))
        .execute(conn)
        .map_err(StorageError::from)?;
    diesel::delete(
        group_memberships::table.filter(group_memberships::person_id.eq_any(person_ids)),
    )
    .execute(conn)
    .map_err(StorageError::from)?;
    Ok(())
}

fn delete_people(conn: &mut SqliteConnection, person_ids: &[i64]) -> Result<usize> {
    if person_ids.is_empty() {
        return Ok(0);
    }
    delete_children(conn, person_ids)?;
    diesel::delete(photos::table.filter(photos::person_id.eq_any(person_ids)))
        .execute(conn)
        .map_err(StorageError::from)?;
    let deleted = diesel::delete(people::table.filter(people::id.eq_any(person_ids)))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(deleted)
}

fn resolve_group_id(
    conn: &mut SqliteConnection,
    account: &str,
    group_sync_id: &str,
) -> Result<Option<i64>> {
    Ok(contact_groups::table
        .filter(contact_groups::account.eq(account))
        .filter(contact_groups::sync_id.eq(group_sync_id))
        .select(contact_groups::id)
        .first::<i64>(conn)
        .optional()
        .map_err(StorageError::from)?)
}

fn insert_children(
    conn: &mut SqliteConnection,
    account: &str,
    person_id: i64,
    children: &ContactChildren,
) -> Result<()> {
    let phone_rows: Vec<NewPhoneDB> = children
        .phones
        .iter()
        .map(|phone| NewPhoneDB {
            person_id,
            number: phone.number.clone(),
            kind: phone.kind.code(),
            label: phone.label.clone(),
            is_primary: phone.is_primary,
        })
        .collect();

    let mut method_rows: Vec<NewContactMethodDB> = Vec::new();
    for email in &children.emails {
        method_rows.push(NewContactMethodDB {
            person_id,
            method: METHOD_EMAIL,
            kind: email.kind.code(),
            data: email.address.clone(),
            aux_data: None,
            label: email.label.clone(),
            is_primary: email.is_primary,
        });
    }
    for postal in &children.postal_addresses {
        method_rows.push(NewContactMethodDB {
            person_id,
            method: METHOD_POSTAL,
            kind: postal.kind.code(),
            data: postal.formatted.clone(),
            aux_data: None,
            label: postal.label.clone(),
            is_primary: postal.is_primary,
        });
    }
    for im in &children.im_addresses {
        method_rows.push(NewContactMethodDB {
            person_id,
            method: METHOD_IM,
            kind: im.kind.code(),
            data: im.address.clone(),
            aux_data: im.protocol.encode(),
            label: im.label.clone(),
            is_primary: im.is_primary,
        });
    }

    let org_rows: Vec<NewOrganizationDB> = children
        .organizations
        .iter()
        .map(|org| NewOrganizationDB {
            person_id,
            company: org.company.clone(),
            title: org.title.clone(),
            kind: org.kind.code(),
            label: org.label.clone(),
            is_primary: org.is_primary,
        })
        .collect();

    let extension_rows: Vec<NewExtensionDB> = children
        .extensions
        .iter()
        .map(|ext| NewExtensionDB {
            person_id,
            name: ext.name.clone(),
            value: ext.value.clone(),
        })
        .collect();

    let mut membership_rows = Vec::with_capacity(children.memberships.len());
    for membership in &children.memberships {
        let group_id = match (membership.group_id, membership.group_sync_id.as_deref()) {
            (Some(group_id), _) => Some(group_id),
            (None, Some(sync_id)) => resolve_group_id(conn, account, sync_id)?,
            (None, None) => None,
        };
        membership_rows.push(NewGroupMembershipDB {
            person_id,
            group_id,
            group_sync_id: membership.group_sync_id.clone(),
        });
    }

    diesel::insert_into(phones::table)
        .values(&phone_rows)
        .execute(conn)
        .map_err(StorageError::from)?;
    diesel::insert_into(contact_methods::table)
        .values(&method_rows)
        .execute(conn)
        .map_err(StorageError::from)?;
    diesel::insert_into(organizations::table)
        .values(&org_rows)
        .execute(conn)
        .map_err(StorageError::from)?;
    diesel::insert_into(extensions::table)
        .values(&extension_rows)
        .execute(conn)
        .map_err(StorageError::from)?;
    diesel::insert_into(group_memberships::table)
        .values(&membership_rows)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

fn find_person(
    conn: &mut SqliteConnection,
    account: &str,
    sync_id: &str,
) -> Result<Option<PersonDB>> {
    Ok(people::table
        .filter(people::account.eq(account))
        .filter(people::sync_id.eq(sync_id))
        .select(PersonDB::as_select())
        .first::<PersonDB>(conn)
        .optional()
        .map_err(StorageError::from)?)
}

fn find_group(conn: &mut SqliteConnection, account: &str, sync_id: &str) -> Result<Option<GroupDB>> {
    Ok(contact_groups::table
        .filter(contact_groups::account.eq(account))
        .filter(contact_groups::sync_id.eq(sync_id))
        .select(GroupDB::as_select())
        .first::<GroupDB>(conn)
        .optional()
        .map_err(StorageError::from)?)
}

fn require_sync_id(sync_id: Option<&str>, kind: RecordKind) -> Result<&str> {
    sync_id.filter(|id| !id.is_empty()).ok_or_else(|| {
        Error::Database(DatabaseError::Internal(format!(
            "server {} record has no sync id",
            kind.as_str()
        )))
    })
}

fn apply_contact(
    conn: &mut SqliteConnection,
    account: &str,
    record: ContactRecord,
    photo: PhotoState,
) -> Result<()> {
    let contact = record.contact;
    let sync_id = require_sync_id(contact.sync_id.as_deref(), RecordKind::Contact)?;

    let person_id = match find_person(conn, account, sync_id)? {
        Some(existing) if existing.dirty => {
            // Local edits win; adopt the server version so the next push is not a conflict.
            debug!(
                "[ContactsSync] Contact {} is dirty locally, keeping local content",
                sync_id
            );
            diesel::update(people::table.find(existing.id))
                .set(people::sync_version.eq(contact.sync_version.clone()))
                .execute(conn)
                .map_err(StorageError::from)?;
            existing.id
        }
        Some(existing) => {
            diesel::update(people::table.find(existing.id))
                .set((
                    people::name.eq(contact.name.clone()),
                    people::notes.eq(contact.notes.clone()),
                    people::sync_version.eq(contact.sync_version.clone()),
                    people::dirty.eq(false),
                    people::sync_error.eq(None::<String>),
                    people::updated_at.eq(now()),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
            delete_children(conn, &[existing.id])?;
            insert_children(conn, account, existing.id, &record.children)?;
            existing.id
        }
        None => {
            let row = NewPersonDB {
                account: account.to_string(),
                name: contact.name.clone(),
                notes: contact.notes.clone(),
                sync_id: Some(sync_id.to_string()),
                sync_version: contact.sync_version.clone(),
                dirty: false,
                updated_at: now(),
            };
            let person_id = diesel::insert_into(people::table)
                .values(&row)
                .returning(people::id)
                .get_result::<i64>(conn)
                .map_err(StorageError::from)?;
            insert_children(conn, account, person_id, &record.children)?;
            person_id
        }
    };

    apply_photo_state(conn, account, person_id, &photo)
}

fn apply_group(conn: &mut SqliteConnection, account: &str, group: Group) -> Result<()> {
    let sync_id = require_sync_id(group.sync_id.as_deref(), RecordKind::Group)?;

    match find_group(conn, account, sync_id)? {
        Some(existing) if existing.dirty => {
            debug!(
                "[ContactsSync] Group {} is dirty locally, keeping local content",
                sync_id
            );
            diesel::update(contact_groups::table.find(existing.id))
                .set(contact_groups::sync_version.eq(group.sync_version.clone()))
                .execute(conn)
                .map_err(StorageError::from)?;
        }
        Some(existing) => {
            diesel::update(contact_groups::table.find(existing.id))
                .set((
                    contact_groups::name.eq(group.name.clone()),
                    contact_groups::notes.eq(group.notes.clone()),
                    contact_groups::system_id.eq(group.system_id.clone()),
                    contact_groups::sync_version.eq(group.sync_version.clone()),
                    contact_groups::dirty.eq(false),
                    contact_groups::sync_error.eq(None::<String>),
                    contact_groups::updated_at.eq(now()),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
        }
        None => {
            let row = NewGroupDB {
                account: account.to_string(),
                name: group.name.clone(),
                notes: group.notes.clone(),
                system_id: group.system_id.clone(),
                should_sync: group.should_sync,
                sync_id: Some(sync_id.to_string()),
                sync_version: group.sync_version.clone(),
                dirty: false,
                updated_at: now(),
            };
            let group_id = diesel::insert_into(contact_groups::table)
                .values(&row)
                .returning(contact_groups::id)
                .get_result::<i64>(conn)
                .map_err(StorageError::from)?;

            // Memberships pulled before their group can now point at it.
            let account_people = people::table
                .filter(people::account.eq(account))
                .select(people::id);
            diesel::update(
                group_memberships::table
                    .filter(group_memberships::group_id.is_null())
                    .filter(group_memberships::group_sync_id.eq(sync_id))
                    .filter(group_memberships::person_id.eq_any(account_people)),
            )
            .set(group_memberships::group_id.eq(Some(group_id)))
            .execute(conn)
            .map_err(StorageError::from)?;
        }
    }
    Ok(())
}

fn apply_deletion(conn: &mut SqliteConnection, account: &str, marker: DeletionMarker) -> Result<()> {
    let Some(sync_id) = marker.sync_id.as_deref().filter(|id| !id.is_empty()) else {
        warn!("[ContactsSync] Ignoring tombstone without a sync id");
        return Ok(());
    };

    match marker.kind {
        RecordKind::Contact => {
            if let Some(existing) = find_person(conn, account, sync_id)? {
                if existing.dirty {
                    debug!(
                        "[ContactsSync] Server deleted contact {} with local edits",
                        sync_id
                    );
                }
                delete_people(conn, &[existing.id])?;
            }
            diesel::delete(
                deleted_people::table
                    .filter(deleted_people::account.eq(account))
                    .filter(deleted_people::sync_id.eq(sync_id)),
            )
            .execute(conn)
            .map_err(StorageError::from)?;
        }
        RecordKind::Group => {
            if let Some(existing) = find_group(conn, account, sync_id)? {
                diesel::delete(
                    group_memberships::table.filter(group_memberships::group_id.eq(existing.id)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                diesel::delete(contact_groups::table.find(existing.id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
            }
            let account_people = people::table
                .filter(people::account.eq(account))
                .select(people::id);
            diesel::delete(
                group_memberships::table
                    .filter(group_memberships::group_sync_id.eq(sync_id))
                    .filter(group_memberships::person_id.eq_any(account_people)),
            )
            .execute(conn)
            .map_err(StorageError::from)?;
            diesel::delete(
                deleted_groups::table
                    .filter(deleted_groups::account.eq(account))
                    .filter(deleted_groups::sync_id.eq(sync_id)),
            )
            .execute(conn)
            .map_err(StorageError::from)?;
        }
    }
    Ok(())
}

pub struct ContactRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl ContactRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    pub fn get_contact(&self, person_id: i64) -> Result<Option<ContactRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = people::table
            .find(person_id)
            .select(PersonDB::as_select())
            .first::<PersonDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        match row {
            Some(row) => {
                let children = load_children(&mut conn, row.id)?;
                Ok(Some(ContactRecord {
                    contact: row.into(),
                    children,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn find_contact_by_sync_id(
        &self,
        account: &str,
        sync_id: &str,
    ) -> Result<Option<ContactRecord>> {
        let mut conn = get_connection(&self.pool)?;
        match find_person(&mut conn, account, sync_id)? {
            Some(row) => {
                let children = load_children(&mut conn, row.id)?;
                Ok(Some(ContactRecord {
                    contact: row.into(),
                    children,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn find_group_by_sync_id(&self, account: &str, sync_id: &str) -> Result<Option<Group>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(find_group(&mut conn, account, sync_id)?.map(Group::from))
    }

    /// Sync error recorded on a contact, if any.
    pub fn contact_sync_error(&self, person_id: i64) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(people::table
            .find(person_id)
            .select(people::sync_error)
            .first::<Option<String>>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .flatten())
    }

    pub fn count_contacts(&self, account: &str) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        Ok(people::table
            .filter(people::account.eq(account))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?)
    }

    /// Inserts a locally created contact, flagged dirty.
    pub async fn insert_local_contact(&self, record: ContactRecord) -> Result<i64> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<i64> {
                let contact = record.contact;
                let row = NewPersonDB {
                    account: contact.account.clone(),
                    name: contact.name,
                    notes: contact.notes,
                    sync_id: contact.sync_id,
                    sync_version: contact.sync_version,
                    dirty: true,
                    updated_at: now(),
                };
                let person_id = diesel::insert_into(people::table)
                    .values(&row)
                    .returning(people::id)
                    .get_result::<i64>(conn)
                    .map_err(StorageError::from)?;
                insert_children(conn, &contact.account, person_id, &record.children)?;
                Ok(person_id)
            })
            .await
    }

    /// Replaces a contact's fields and child rows with a local edit.
    pub async fn update_local_contact(&self, record: ContactRecord) -> Result<()> {
        let person_id = record.contact.id.ok_or_else(|| {
            Error::Database(DatabaseError::Internal(
                "local contact update without an id".to_string(),
            ))
        })?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let updated = diesel::update(people::table.find(person_id))
                    .set((
                        people::name.eq(record.contact.name),
                        people::notes.eq(record.contact.notes),
                        people::dirty.eq(true),
                        people::local_revision.eq(people::local_revision + 1),
                        people::updated_at.eq(now()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if updated == 0 {
                    return Err(StorageError::Query(diesel::result::Error::NotFound).into());
                }
                delete_children(conn, &[person_id])?;
                insert_children(conn, &record.contact.account, person_id, &record.children)?;
                Ok(())
            })
            .await
    }

    /// Deletes a contact locally and records a tombstone for the next push.
    pub async fn delete_local_contact(&self, person_id: i64) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let row = people::table
                    .find(person_id)
                    .select(PersonDB::as_select())
                    .first::<PersonDB>(conn)
                    .map_err(StorageError::from)?;
                diesel::insert_into(deleted_people::table)
                    .values((
                        deleted_people::account.eq(&row.account),
                        deleted_people::sync_id.eq(&row.sync_id),
                        deleted_people::sync_version.eq(&row.sync_version),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                delete_people(conn, &[person_id])?;
                Ok(())
            })
            .await
    }

    /// Inserts a locally created group, flagged dirty.
    pub async fn insert_local_group(&self, group: Group) -> Result<i64> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<i64> {
                let row = NewGroupDB {
                    account: group.account,
                    name: group.name,
                    notes: group.notes,
                    system_id: group.system_id,
                    should_sync: group.should_sync,
                    sync_id: group.sync_id,
                    sync_version: group.sync_version,
                    dirty: true,
                    updated_at: now(),
                };
                Ok(diesel::insert_into(contact_groups::table)
                    .values(&row)
                    .returning(contact_groups::id)
                    .get_result::<i64>(conn)
                    .map_err(StorageError::from)?)
            })
            .await
    }

    /// Changes whether a group's members are synced. Local preference only.
    pub async fn set_group_should_sync(&self, group_id: i64, should_sync: bool) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::update(contact_groups::table.find(group_id))
                    .set(contact_groups::should_sync.eq(should_sync))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Deletes a group locally and records a tombstone for the next push.
    pub async fn delete_local_group(&self, group_id: i64) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let row = contact_groups::table
                    .find(group_id)
                    .select(GroupDB::as_select())
                    .first::<GroupDB>(conn)
                    .map_err(StorageError::from)?;
                diesel::insert_into(deleted_groups::table)
                    .values((
                        deleted_groups::account.eq(&row.account),
                        deleted_groups::sync_id.eq(&row.sync_id),
                        deleted_groups::sync_version.eq(&row.sync_version),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::delete(
                    group_memberships::table.filter(group_memberships::group_id.eq(group_id)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                diesel::delete(contact_groups::table.find(group_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl ContactRepositoryTrait for ContactRepository {
    fn list_dirty(&self, kind: RecordKind, account: &str) -> Result<Vec<LocalRecord>> {
        let mut conn = get_connection(&self.pool)?;
        match kind {
            RecordKind::Contact => {
                let rows = people::table
                    .filter(people::account.eq(account))
                    .filter(people::dirty.eq(true))
                    .order((people::updated_at.asc(), people::id.asc()))
                    .select(PersonDB::as_select())
                    .load::<PersonDB>(&mut conn)
                    .map_err(StorageError::from)?;
                let mut records = Vec::with_capacity(rows.len());
                for row in rows {
                    let children = load_children(&mut conn, row.id)?;
                    records.push(LocalRecord::Contact(ContactRecord {
                        contact: Contact::from(row),
                        children,
                    }));
                }
                Ok(records)
            }
            RecordKind::Group => {
                let rows = contact_groups::table
                    .filter(contact_groups::account.eq(account))
                    .filter(contact_groups::dirty.eq(true))
                    .order((contact_groups::updated_at.asc(), contact_groups::id.asc()))
                    .select(GroupDB::as_select())
                    .load::<GroupDB>(&mut conn)
                    .map_err(StorageError::from)?;
                Ok(rows
                    .into_iter()
                    .map(|row| LocalRecord::Group(row.into()))
                    .collect())
            }
        }
    }

    fn list_deleted(&self, kind: RecordKind, account: &str) -> Result<Vec<DeletedRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = match kind {
            RecordKind::Contact => deleted_people::table
                .filter(deleted_people::account.eq(account))
                .order(deleted_people::id.asc())
                .load::<DeletedRowDB>(&mut conn),
            RecordKind::Group => deleted_groups::table
                .filter(deleted_groups::account.eq(account))
                .order(deleted_groups::id.asc())
                .load::<DeletedRowDB>(&mut conn),
        }
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|row| row.into_record(kind)).collect())
    }

    fn get_group_sync_id(&self, group_id: i64) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(contact_groups::table
            .find(group_id)
            .select(contact_groups::sync_id)
            .first::<Option<String>>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .flatten())
    }

    fn list_groups(&self, account: &str) -> Result<Vec<Group>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(contact_groups::table
            .filter(contact_groups::account.eq(account))
            .order(contact_groups::id.asc())
            .select(GroupDB::as_select())
            .load::<GroupDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(Group::from)
            .collect())
    }

    async fn apply_server_record(
        &self,
        account: &str,
        record: InboundRecord,
        watermark: FeedWatermark,
    ) -> Result<()> {
        let account = account.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                match record {
                    InboundRecord::Contact { record, photo } => {
                        apply_contact(conn, &account, record, photo)?
                    }
                    InboundRecord::Group(group) => apply_group(conn, &account, group)?,
                    InboundRecord::Deleted(marker) => apply_deletion(conn, &account, marker)?,
                }
                upsert_watermark(conn, &watermark)
            })
            .await
    }

    async fn mark_pushed(
        &self,
        kind: RecordKind,
        local_id: i64,
        revision: i64,
        sync_id: String,
        sync_version: Option<String>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let cleaned = match kind {
                    RecordKind::Contact => {
                        diesel::update(people::table.find(local_id))
                            .set((
                                people::sync_id.eq(Some(sync_id)),
                                people::sync_version.eq(sync_version),
                                people::sync_error.eq(None::<String>),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        diesel::update(
                            people::table
                                .find(local_id)
                                .filter(people::local_revision.eq(revision)),
                        )
                        .set(people::dirty.eq(false))
                        .execute(conn)
                        .map_err(StorageError::from)?
                    }
                    RecordKind::Group => {
                        diesel::update(contact_groups::table.find(local_id))
                            .set((
                                contact_groups::sync_id.eq(Some(sync_id.clone())),
                                contact_groups::sync_version.eq(sync_version),
                                contact_groups::sync_error.eq(None::<String>),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        diesel::update(
                            group_memberships::table
                                .filter(group_memberships::group_id.eq(local_id)),
                        )
                        .set(group_memberships::group_sync_id.eq(Some(sync_id)))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                        diesel::update(
                            contact_groups::table
                                .find(local_id)
                                .filter(contact_groups::local_revision.eq(revision)),
                        )
                        .set(contact_groups::dirty.eq(false))
                        .execute(conn)
                        .map_err(StorageError::from)?
                    }
                };
                if cleaned == 0 {
                    debug!(
                        "[ContactsSync] {} {} changed during its push, left dirty",
                        kind.as_str(),
                        local_id
                    );
                }
                Ok(())
            })
            .await
    }

    async fn mark_dropped(
        &self,
        kind: RecordKind,
        local_id: i64,
        revision: i64,
        reason: String,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                match kind {
                    RecordKind::Contact => diesel::update(
                        people::table
                            .find(local_id)
                            .filter(people::local_revision.eq(revision)),
                    )
                    .set((
                        people::dirty.eq(false),
                        people::sync_error.eq(Some(reason)),
                    ))
                    .execute(conn),
                    RecordKind::Group => diesel::update(
                        contact_groups::table
                            .find(local_id)
                            .filter(contact_groups::local_revision.eq(revision)),
                    )
                    .set((
                        contact_groups::dirty.eq(false),
                        contact_groups::sync_error.eq(Some(reason)),
                    ))
                    .execute(conn),
                }
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn purge_deleted(&self, kind: RecordKind, deleted_id: i64) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                match kind {
                    RecordKind::Contact => {
                        diesel::delete(deleted_people::table.find(deleted_id)).execute(conn)
                    }
                    RecordKind::Group => {
                        diesel::delete(deleted_groups::table.find(deleted_id)).execute(conn)
                    }
                }
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn purge_unsynced_contacts(&self, account: &str) -> Result<usize> {
        let account = account.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let synced_groups = contact_groups::table
                    .filter(contact_groups::account.eq(&account))
                    .filter(contact_groups::should_sync.eq(true))
                    .select((contact_groups::id, contact_groups::sync_id))
                    .load::<(i64, Option<String>)>(conn)
                    .map_err(StorageError::from)?;
                let group_ids: Vec<i64> = synced_groups.iter().map(|(id, _)| *id).collect();
                let group_sync_ids: Vec<String> = synced_groups
                    .into_iter()
                    .filter_map(|(_, sync_id)| sync_id)
                    .collect();

                let mut keep: HashSet<i64> = group_memberships::table
                    .filter(group_memberships::group_id.eq_any(&group_ids))
                    .select(group_memberships::person_id)
                    .load::<i64>(conn)
                    .map_err(StorageError::from)?
                    .into_iter()
                    .collect();
                keep.extend(
                    group_memberships::table
                        .filter(group_memberships::group_sync_id.eq_any(&group_sync_ids))
                        .select(group_memberships::person_id)
                        .load::<i64>(conn)
                        .map_err(StorageError::from)?,
                );

                let doomed: Vec<i64> = people::table
                    .filter(people::account.eq(&account))
                    .filter(people::dirty.eq(false))
                    .select(people::id)
                    .load::<i64>(conn)
                    .map_err(StorageError::from)?
                    .into_iter()
                    .filter(|id| !keep.contains(id))
                    .collect();

                let purged = delete_people(conn, &doomed)?;
                if purged > 0 {
                    debug!(
                        "[ContactsSync] Purged {} contacts outside synced groups for {}",
                        purged, account
                    );
                }
                Ok(purged)
            })
            .await
    }
}
