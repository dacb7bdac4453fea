//! Feed entry types as exchanged with the server.

use serde::{Deserialize, Serialize};

use super::kinds::{EmailRel, ImProtocolRel, ImRel, OrgRel, PhoneRel, PostalRel};

/// Name of the extended property that carries the extensions blob.
pub const EXTENSIONS_PROPERTY: &str = "extensions";

/// Fields common to every entry kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    /// Server id URI. The sync id is its last path segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Edit reference. The version token is its last path segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl EntryMeta {
    pub fn sync_id(&self) -> Option<String> {
        self.id.as_deref().and_then(last_item_from_uri)
    }

    pub fn sync_version(&self) -> Option<String> {
        self.edit_uri.as_deref().and_then(last_item_from_uri)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneElement {
    pub number: String,
    pub rel: PhoneRel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailElement {
    pub address: String,
    pub rel: EmailRel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalElement {
    pub value: String,
    pub rel: PostalRel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

/// IM service reference on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ImProtocolElement {
    #[default]
    None,
    Custom(String),
    Predefined(ImProtocolRel),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImElement {
    pub address: String,
    pub rel: ImRel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub protocol: ImProtocolElement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub rel: OrgRel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembershipElement {
    /// Canonical group feed URL followed by the group sync id.
    pub href: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedProperty {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phone_numbers: Vec<PhoneElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<EmailElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postal_addresses: Vec<PostalElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub im_addresses: Vec<ImElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<OrganizationElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_memberships: Vec<GroupMembershipElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extended_properties: Vec<ExtendedProperty>,
    /// Present when the server holds a photo for this contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_href: Option<String>,
    /// Photo edit reference. Its last segment is the photo version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_edit_href: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_group: Option<String>,
}

/// Binary asset entry in the photo feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// A feed entry of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    Contact(ContactEntry),
    Group(GroupEntry),
    Media(MediaEntry),
}

impl Entry {
    pub fn meta(&self) -> &EntryMeta {
        match self {
            Entry::Contact(entry) => &entry.meta,
            Entry::Group(entry) => &entry.meta,
            Entry::Media(entry) => &entry.meta,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Entry::Contact(_) => "contact",
            Entry::Group(_) => "group",
            Entry::Media(_) => "media",
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Entry::Contact(entry) => entry.title.as_deref(),
            Entry::Group(entry) => entry.title.as_deref(),
            Entry::Media(_) => None,
        }
    }
}

/// Returns the last non-empty path segment of a URI.
pub fn last_item_from_uri(uri: &str) -> Option<String> {
    let trimmed = uri.trim_end_matches('/');
    trimmed
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}
