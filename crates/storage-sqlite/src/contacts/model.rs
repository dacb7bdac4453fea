//! Database models for people, groups and their child rows.

use diesel::prelude::*;

use contactsync_core::contacts::{
    Contact, ContactMethodKind, DeletedRecord, DeletionMarker, Email, Extension, Group,
    GroupMembership, ImAddress, ImProtocolData, Organization, OrganizationKind, Phone, PhoneKind,
    PostalAddress, RecordKind,
};

use crate::errors::StorageError;

pub const METHOD_EMAIL: i32 = 1;
pub const METHOD_POSTAL: i32 = 2;
pub const METHOD_IM: i32 = 3;

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::people)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PersonDB {
    pub id: i64,
    pub account: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub sync_id: Option<String>,
    pub sync_version: Option<String>,
    pub dirty: bool,
    pub local_revision: i64,
    pub sync_error: Option<String>,
    pub updated_at: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::people)]
pub struct NewPersonDB {
    pub account: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub sync_id: Option<String>,
    pub sync_version: Option<String>,
    pub dirty: bool,
    pub updated_at: String,
}

impl From<PersonDB> for Contact {
    fn from(db: PersonDB) -> Self {
        Self {
            id: Some(db.id),
            account: db.account,
            name: db.name,
            notes: db.notes,
            sync_id: db.sync_id,
            sync_version: db.sync_version,
            dirty: db.dirty,
            local_revision: db.local_revision,
        }
    }
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::contact_groups)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GroupDB {
    pub id: i64,
    pub account: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub system_id: Option<String>,
    pub should_sync: bool,
    pub sync_id: Option<String>,
    pub sync_version: Option<String>,
    pub dirty: bool,
    pub local_revision: i64,
    pub sync_error: Option<String>,
    pub updated_at: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::contact_groups)]
pub struct NewGroupDB {
    pub account: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub system_id: Option<String>,
    pub should_sync: bool,
    pub sync_id: Option<String>,
    pub sync_version: Option<String>,
    pub dirty: bool,
    pub updated_at: String,
}

impl From<GroupDB> for Group {
    fn from(db: GroupDB) -> Self {
        Self {
            id: Some(db.id),
            account: db.account,
            name: db.name,
            notes: db.notes,
            system_id: db.system_id,
            should_sync: db.should_sync,
            sync_id: db.sync_id,
            sync_version: db.sync_version,
            dirty: db.dirty,
            local_revision: db.local_revision,
        }
    }
}

/// Row shared by `deleted_people` and `deleted_groups`.
#[derive(Queryable, Debug, Clone)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeletedRowDB {
    pub id: i64,
    pub account: String,
    pub sync_id: Option<String>,
    pub sync_version: Option<String>,
}

impl DeletedRowDB {
    pub fn into_record(self, kind: RecordKind) -> DeletedRecord {
        DeletedRecord {
            id: self.id,
            marker: DeletionMarker {
                kind,
                account: self.account,
                sync_id: self.sync_id,
                sync_version: self.sync_version,
            },
        }
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::phones)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PhoneDB {
    pub id: i64,
    pub person_id: i64,
    pub number: String,
    pub kind: i32,
    pub label: Option<String>,
    pub is_primary: bool,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::phones)]
pub struct NewPhoneDB {
    pub person_id: i64,
    pub number: String,
    pub kind: i32,
    pub label: Option<String>,
    pub is_primary: bool,
}

impl TryFrom<PhoneDB> for Phone {
    type Error = StorageError;

    fn try_from(db: PhoneDB) -> Result<Self, Self::Error> {
        let kind = PhoneKind::from_code(db.kind)
            .ok_or_else(|| StorageError::InvalidValue(format!("phone kind {}", db.kind)))?;
        Ok(Self {
            number: db.number,
            kind,
            label: db.label,
            is_primary: db.is_primary,
        })
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::contact_methods)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ContactMethodDB {
    pub id: i64,
    pub person_id: i64,
    pub method: i32,
    pub kind: i32,
    pub data: String,
    pub aux_data: Option<String>,
    pub label: Option<String>,
    pub is_primary: bool,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::contact_methods)]
pub struct NewContactMethodDB {
    pub person_id: i64,
    pub method: i32,
    pub kind: i32,
    pub data: String,
    pub aux_data: Option<String>,
    pub label: Option<String>,
    pub is_primary: bool,
}

impl ContactMethodDB {
    fn method_kind(&self) -> Result<ContactMethodKind, StorageError> {
        ContactMethodKind::from_code(self.kind)
            .ok_or_else(|| StorageError::InvalidValue(format!("contact method kind {}", self.kind)))
    }
}

/// A contact method row decoded by its method column.
pub enum DecodedContactMethod {
    Email(Email),
    Postal(PostalAddress),
    Im(ImAddress),
}

impl TryFrom<ContactMethodDB> for DecodedContactMethod {
    type Error = StorageError;

    fn try_from(db: ContactMethodDB) -> Result<Self, Self::Error> {
        let kind = db.method_kind()?;
        match db.method {
            METHOD_EMAIL => Ok(Self::Email(Email {
                address: db.data,
                kind,
                label: db.label,
                is_primary: db.is_primary,
            })),
            METHOD_POSTAL => Ok(Self::Postal(PostalAddress {
                formatted: db.data,
                kind,
                label: db.label,
                is_primary: db.is_primary,
            })),
            METHOD_IM => Ok(Self::Im(ImAddress {
                protocol: ImProtocolData::decode(db.aux_data.as_deref()),
                address: db.data,
                kind,
                label: db.label,
                is_primary: db.is_primary,
            })),
            other => Err(StorageError::InvalidValue(format!(
                "contact method {}",
                other
            ))),
        }
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::organizations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OrganizationDB {
    pub id: i64,
    pub person_id: i64,
    pub company: Option<String>,
    pub title: Option<String>,
    pub kind: i32,
    pub label: Option<String>,
    pub is_primary: bool,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::organizations)]
pub struct NewOrganizationDB {
    pub person_id: i64,
    pub company: Option<String>,
    pub title: Option<String>,
    pub kind: i32,
    pub label: Option<String>,
    pub is_primary: bool,
}

impl TryFrom<OrganizationDB> for Organization {
    type Error = StorageError;

    fn try_from(db: OrganizationDB) -> Result<Self, Self::Error> {
        let kind = OrganizationKind::from_code(db.kind)
            .ok_or_else(|| StorageError::InvalidValue(format!("organization kind {}", db.kind)))?;
        Ok(Self {
            company: db.company,
            title: db.title,
            kind,
            label: db.label,
            is_primary: db.is_primary,
        })
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::extensions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ExtensionDB {
    pub id: i64,
    pub person_id: i64,
    pub name: String,
    pub value: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::extensions)]
pub struct NewExtensionDB {
    pub person_id: i64,
    pub name: String,
    pub value: String,
}

impl From<ExtensionDB> for Extension {
    fn from(db: ExtensionDB) -> Self {
        Self {
            name: db.name,
            value: db.value,
        }
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::group_memberships)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GroupMembershipDB {
    pub id: i64,
    pub person_id: i64,
    pub group_id: Option<i64>,
    pub group_sync_id: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::group_memberships)]
pub struct NewGroupMembershipDB {
    pub person_id: i64,
    pub group_id: Option<i64>,
    pub group_sync_id: Option<String>,
}

impl From<GroupMembershipDB> for GroupMembership {
    fn from(db: GroupMembershipDB) -> Self {
        Self {
            group_id: db.group_id,
            group_sync_id: db.group_sync_id,
        }
    }
}
