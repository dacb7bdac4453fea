//! Local record models for contacts, groups and photos.

use serde::{Deserialize, Serialize};

use super::kinds::{ContactMethodKind, ImProtocol, OrganizationKind, PhoneKind};

/// Which record collection a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Contact,
    Group,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Contact => "contact",
            RecordKind::Group => "group",
        }
    }
}

/// A person row in the local store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    pub id: Option<i64>,
    pub account: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub sync_id: Option<String>,
    pub sync_version: Option<String>,
    pub dirty: bool,
    /// Bumped by every local edit.
    pub local_revision: i64,
}

/// A contact group row in the local store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub id: Option<i64>,
    pub account: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    /// Non-empty for server-defined groups, which can never be mutated.
    pub system_id: Option<String>,
    pub should_sync: bool,
    pub sync_id: Option<String>,
    pub sync_version: Option<String>,
    pub dirty: bool,
    pub local_revision: i64,
}

impl Group {
    pub fn is_system_group(&self) -> bool {
        self.system_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phone {
    pub number: String,
    pub kind: PhoneKind,
    pub label: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub address: String,
    pub kind: ContactMethodKind,
    pub label: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalAddress {
    pub formatted: String,
    pub kind: ContactMethodKind,
    pub label: Option<String>,
    pub is_primary: bool,
}

/// IM service attached to an IM address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImProtocolData {
    #[default]
    None,
    Predefined(ImProtocol),
    Custom(String),
    /// Stored value with no known protocol. Kept verbatim; it cannot be sent.
    Unrecognized(String),
}

impl ImProtocolData {
    /// Encodes into the auxiliary data column. `None` stores nothing.
    pub fn encode(&self) -> Option<String> {
        match self {
            ImProtocolData::None => None,
            ImProtocolData::Predefined(protocol) => Some(format!("pre:{}", protocol.code())),
            ImProtocolData::Custom(name) => Some(format!("custom:{}", name)),
            ImProtocolData::Unrecognized(raw) => Some(raw.clone()),
        }
    }

    /// Decodes the auxiliary data column. Values naming no known protocol
    /// decode to `Unrecognized`.
    pub fn decode(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return ImProtocolData::None;
        };
        if let Some(code) = value.strip_prefix("pre:") {
            return match code.parse::<i32>().ok().and_then(ImProtocol::from_code) {
                Some(protocol) => ImProtocolData::Predefined(protocol),
                None => ImProtocolData::Unrecognized(value.to_string()),
            };
        }
        if let Some(name) = value.strip_prefix("custom:") {
            return ImProtocolData::Custom(name.to_string());
        }
        ImProtocolData::Unrecognized(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImAddress {
    pub address: String,
    pub kind: ContactMethodKind,
    pub label: Option<String>,
    pub is_primary: bool,
    pub protocol: ImProtocolData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub company: Option<String>,
    pub title: Option<String>,
    pub kind: OrganizationKind,
    pub label: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    pub value: String,
}

/// Membership of a contact in a group.
///
/// Locally created memberships may only know the local group id until the
/// group has synced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMembership {
    pub group_id: Option<i64>,
    pub group_sync_id: Option<String>,
}

/// Child rows of a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactChildren {
    pub phones: Vec<Phone>,
    pub emails: Vec<Email>,
    pub postal_addresses: Vec<PostalAddress>,
    pub im_addresses: Vec<ImAddress>,
    pub organizations: Vec<Organization>,
    pub extensions: Vec<Extension>,
    pub memberships: Vec<GroupMembership>,
}

/// A contact together with all of its child rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactRecord {
    pub contact: Contact,
    pub children: ContactChildren,
}

/// A dirty local record ready to be pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalRecord {
    Contact(ContactRecord),
    Group(Group),
}

impl LocalRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            LocalRecord::Contact(_) => RecordKind::Contact,
            LocalRecord::Group(_) => RecordKind::Group,
        }
    }

    pub fn local_id(&self) -> Option<i64> {
        match self {
            LocalRecord::Contact(record) => record.contact.id,
            LocalRecord::Group(group) => group.id,
        }
    }

    pub fn sync_id(&self) -> Option<&str> {
        match self {
            LocalRecord::Contact(record) => record.contact.sync_id.as_deref(),
            LocalRecord::Group(group) => group.sync_id.as_deref(),
        }
    }

    pub fn sync_version(&self) -> Option<&str> {
        match self {
            LocalRecord::Contact(record) => record.contact.sync_version.as_deref(),
            LocalRecord::Group(group) => group.sync_version.as_deref(),
        }
    }

    pub fn local_revision(&self) -> i64 {
        match self {
            LocalRecord::Contact(record) => record.contact.local_revision,
            LocalRecord::Group(group) => group.local_revision,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            LocalRecord::Contact(record) => record.contact.name.as_deref(),
            LocalRecord::Group(group) => group.name.as_deref(),
        }
    }
}

/// Identifies a record deleted on one side that the other side must forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionMarker {
    pub kind: RecordKind,
    pub account: String,
    pub sync_id: Option<String>,
    pub sync_version: Option<String>,
}

/// A locally deleted record waiting for its delete to be pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRecord {
    /// Row id in the deleted-records table.
    pub id: i64,
    pub marker: DeletionMarker,
}

/// Photo attachment state for one contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Photo {
    pub id: i64,
    pub person_id: i64,
    pub account: String,
    /// Sync id of the owning contact. Photos are addressed by it.
    pub contact_sync_id: Option<String>,
    pub data: Option<Vec<u8>>,
    pub local_version: Option<String>,
    pub sync_version: Option<String>,
    pub download_required: bool,
    pub dirty: bool,
    pub exists_on_server: bool,
    pub sync_error: Option<String>,
}

/// Server-side photo state carried on a contact entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoState {
    pub sync_version: Option<String>,
    pub exists_on_server: bool,
}

/// A server entry translated into local terms, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRecord {
    Contact {
        record: ContactRecord,
        photo: PhotoState,
    },
    Group(Group),
    Deleted(DeletionMarker),
}

impl InboundRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            InboundRecord::Contact { .. } => RecordKind::Contact,
            InboundRecord::Group(_) => RecordKind::Group,
            InboundRecord::Deleted(marker) => marker.kind,
        }
    }
}

/// Result of translating a server entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedEntry {
    pub record: InboundRecord,
    /// Collection URL when the entry carries no edit reference.
    pub create_url: Option<String>,
}
