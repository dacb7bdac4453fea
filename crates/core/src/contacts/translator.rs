//! Conversion between local records and feed entries.

use std::collections::HashSet;
use std::fmt;

use log::debug;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use super::entry::{
    last_item_from_uri, ContactEntry, EmailElement, Entry, EntryMeta, ExtendedProperty,
    GroupEntry, GroupMembershipElement, ImElement, ImProtocolElement, OrganizationElement,
    PhoneElement, PostalElement, EXTENSIONS_PROPERTY,
};
use super::kinds::{field_maps, FieldMaps, MappingError};
use super::model::{
    Contact, ContactChildren, ContactRecord, DeletionMarker, Email, Extension, Group,
    GroupMembership, ImAddress, ImProtocolData, InboundRecord, LocalRecord, Organization, Phone,
    PhotoState, PostalAddress, RecordKind, TranslatedEntry,
};
use crate::errors::{Error, Result};
use crate::sync::FeedUrls;

/// Failures while translating a single record or entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("membership references group {group_id:?} which has not synced yet")]
    UnsyncedGroup { group_id: Option<i64> },

    #[error("malformed extensions blob: {0}")]
    MalformedExtensions(String),

    #[error("entry is missing {0}")]
    MissingField(&'static str),

    #[error("extension {0} appears more than once")]
    DuplicateExtension(String),

    #[error("stored IM protocol {0} names no known service")]
    UnknownImProtocol(String),

    #[error("system group {system_id} cannot be modified")]
    SystemGroupImmutable { system_id: String },

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

impl TranslateError {
    /// Retryable failures affect one record only and may succeed on a later run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TranslateError::UnsyncedGroup { .. }
                | TranslateError::MalformedExtensions(_)
                | TranslateError::MissingField(_)
        )
    }
}

/// A local record rendered as a feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEntry {
    pub entry: Entry,
    /// Collection URL to POST to when the record has never synced.
    pub create_url: Option<String>,
    /// Edit reference to PUT to when the record has synced.
    pub edit_url: Option<String>,
}

impl OutboundEntry {
    pub fn is_create(&self) -> bool {
        self.edit_url.is_none()
    }
}

/// Translates records for one feed host and projection.
#[derive(Debug, Clone)]
pub struct RecordTranslator {
    feeds: FeedUrls,
}

impl RecordTranslator {
    pub fn new(feeds: FeedUrls) -> Self {
        Self { feeds }
    }

    pub fn feeds(&self) -> &FeedUrls {
        &self.feeds
    }

    fn maps(&self) -> &'static FieldMaps {
        field_maps()
    }

    /// Renders a dirty local record as an outbound entry.
    ///
    /// `group_lookup` resolves a local group id to its sync id for
    /// memberships that only know the local id.
    pub fn record_to_entry(
        &self,
        record: &LocalRecord,
        account: &str,
        group_lookup: &dyn Fn(i64) -> Result<Option<String>>,
    ) -> Result<OutboundEntry> {
        let kind = record.kind();
        let meta = self.outbound_meta(kind, account, record.sync_id(), record.sync_version());
        let entry = match record {
            LocalRecord::Contact(contact) => {
                Entry::Contact(self.contact_to_entry(contact, account, meta, group_lookup)?)
            }
            LocalRecord::Group(group) => Entry::Group(self.group_to_entry(group, meta)?),
        };

        let edit_url = entry.meta().edit_uri.clone();
        let create_url = if edit_url.is_none() {
            Some(self.feeds.feed_for_kind(kind, account))
        } else {
            None
        };

        Ok(OutboundEntry {
            entry,
            create_url,
            edit_url,
        })
    }

    fn outbound_meta(
        &self,
        kind: RecordKind,
        account: &str,
        sync_id: Option<&str>,
        sync_version: Option<&str>,
    ) -> EntryMeta {
        match sync_id {
            Some(sync_id) if !sync_id.is_empty() => EntryMeta {
                id: Some(format!("{}/{}", self.feeds.feed_for_kind(kind, account), sync_id)),
                edit_uri: Some(self.feeds.edit_url(kind, account, sync_id, sync_version)),
                updated: None,
                deleted: false,
            },
            _ => EntryMeta::default(),
        }
    }

    fn group_to_entry(&self, group: &Group, meta: EntryMeta) -> Result<GroupEntry> {
        if group.is_system_group() {
            return Err(TranslateError::SystemGroupImmutable {
                system_id: group.system_id.clone().unwrap_or_default(),
            }
            .into());
        }
        Ok(GroupEntry {
            meta,
            title: group.name.clone(),
            content: group.notes.clone(),
            system_group: None,
        })
    }

    fn contact_to_entry(
        &self,
        record: &ContactRecord,
        account: &str,
        meta: EntryMeta,
        group_lookup: &dyn Fn(i64) -> Result<Option<String>>,
    ) -> Result<ContactEntry> {
        let maps = self.maps();
        let children = &record.children;

        let phone_numbers = children
            .phones
            .iter()
            .map(|phone| {
                Ok(PhoneElement {
                    number: phone.number.clone(),
                    rel: maps.phone.to_protocol(phone.kind)?,
                    label: phone.label.clone(),
                    primary: phone.is_primary,
                })
            })
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let emails = children
            .emails
            .iter()
            .map(|email| {
                Ok(EmailElement {
                    address: email.address.clone(),
                    rel: maps.email.to_protocol(email.kind)?,
                    label: email.label.clone(),
                    primary: email.is_primary,
                })
            })
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let postal_addresses = children
            .postal_addresses
            .iter()
            .map(|postal| {
                Ok(PostalElement {
                    value: postal.formatted.clone(),
                    rel: maps.postal.to_protocol(postal.kind)?,
                    label: postal.label.clone(),
                    primary: postal.is_primary,
                })
            })
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let im_addresses = children
            .im_addresses
            .iter()
            .map(|im| {
                let protocol = match &im.protocol {
                    ImProtocolData::None => ImProtocolElement::None,
                    ImProtocolData::Custom(name) => ImProtocolElement::Custom(name.clone()),
                    ImProtocolData::Predefined(protocol) => {
                        ImProtocolElement::Predefined(maps.im_protocol.to_protocol(*protocol)?)
                    }
                    ImProtocolData::Unrecognized(raw) => {
                        return Err(TranslateError::UnknownImProtocol(raw.clone()));
                    }
                };
                Ok(ImElement {
                    address: im.address.clone(),
                    rel: maps.im.to_protocol(im.kind)?,
                    label: im.label.clone(),
                    primary: im.is_primary,
                    protocol,
                })
            })
            .collect::<std::result::Result<Vec<_>, TranslateError>>()?;

        let organizations = children
            .organizations
            .iter()
            .map(|org| {
                Ok(OrganizationElement {
                    name: org.company.clone(),
                    title: org.title.clone(),
                    rel: maps.organization.to_protocol(org.kind)?,
                    label: org.label.clone(),
                    primary: org.is_primary,
                })
            })
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let mut group_memberships = Vec::with_capacity(children.memberships.len());
        for membership in &children.memberships {
            let sync_id = match membership.group_sync_id.as_deref() {
                Some(sync_id) if !sync_id.is_empty() => Some(sync_id.to_string()),
                _ => match membership.group_id {
                    Some(group_id) => group_lookup(group_id)?,
                    None => None,
                },
            };
            let Some(sync_id) = sync_id.filter(|id| !id.is_empty()) else {
                return Err(TranslateError::UnsyncedGroup {
                    group_id: membership.group_id,
                }
                .into());
            };
            group_memberships.push(GroupMembershipElement {
                href: FeedUrls::canonical_group_ref(account, &sync_id),
                deleted: false,
            });
        }

        let extended_properties = encode_extensions(&children.extensions)?
            .map(|value| {
                vec![ExtendedProperty {
                    name: EXTENSIONS_PROPERTY.to_string(),
                    value,
                }]
            })
            .unwrap_or_default();

        Ok(ContactEntry {
            meta,
            title: record.contact.name.clone(),
            content: record.contact.notes.clone(),
            phone_numbers,
            emails,
            postal_addresses,
            im_addresses,
            organizations,
            group_memberships,
            extended_properties,
            photo_href: None,
            photo_edit_href: None,
        })
    }

    /// Translates a server entry into a record to apply locally.
    pub fn entry_to_record(&self, entry: &Entry, account: &str) -> Result<TranslatedEntry> {
        let meta = entry.meta();
        let kind = match entry {
            Entry::Contact(_) => RecordKind::Contact,
            Entry::Group(_) => RecordKind::Group,
            Entry::Media(_) => {
                return Err(Error::sync("media entries do not translate to records"));
            }
        };
        let create_url = if meta.edit_uri.is_none() {
            Some(self.feeds.feed_for_kind(kind, account))
        } else {
            None
        };

        if meta.deleted {
            return Ok(TranslatedEntry {
                record: InboundRecord::Deleted(DeletionMarker {
                    kind,
                    account: account.to_string(),
                    sync_id: meta.sync_id(),
                    sync_version: meta.sync_version(),
                }),
                create_url,
            });
        }

        let sync_id = meta.sync_id().ok_or(TranslateError::MissingField("id"))?;

        let record = match entry {
            Entry::Contact(contact) => self.contact_from_entry(contact, account, sync_id)?,
            Entry::Group(group) => InboundRecord::Group(Group {
                id: None,
                account: account.to_string(),
                name: group.title.clone(),
                notes: group.content.clone(),
                system_id: group.system_group.clone(),
                should_sync: false,
                sync_id: Some(sync_id),
                sync_version: meta.sync_version(),
                dirty: false,
                local_revision: 0,
            }),
            Entry::Media(_) => {
                return Err(Error::sync("media entries do not translate to records"));
            }
        };

        Ok(TranslatedEntry { record, create_url })
    }

    fn contact_from_entry(
        &self,
        entry: &ContactEntry,
        account: &str,
        sync_id: String,
    ) -> Result<InboundRecord> {
        let maps = self.maps();

        let phones = entry
            .phone_numbers
            .iter()
            .map(|phone| {
                Ok(Phone {
                    number: phone.number.clone(),
                    kind: maps.phone.to_local(phone.rel)?,
                    label: phone.label.clone(),
                    is_primary: phone.primary,
                })
            })
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let emails = entry
            .emails
            .iter()
            .map(|email| {
                Ok(Email {
                    address: email.address.clone(),
                    kind: maps.email.to_local(email.rel)?,
                    label: email.label.clone(),
                    is_primary: email.primary,
                })
            })
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let postal_addresses = entry
            .postal_addresses
            .iter()
            .map(|postal| {
                Ok(PostalAddress {
                    formatted: postal.value.clone(),
                    kind: maps.postal.to_local(postal.rel)?,
                    label: postal.label.clone(),
                    is_primary: postal.primary,
                })
            })
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let im_addresses = entry
            .im_addresses
            .iter()
            .map(|im| {
                let protocol = match &im.protocol {
                    ImProtocolElement::None => ImProtocolData::None,
                    ImProtocolElement::Custom(name) => ImProtocolData::Custom(name.clone()),
                    ImProtocolElement::Predefined(protocol) => {
                        ImProtocolData::Predefined(maps.im_protocol.to_local(*protocol)?)
                    }
                };
                Ok(ImAddress {
                    address: im.address.clone(),
                    kind: maps.im.to_local(im.rel)?,
                    label: im.label.clone(),
                    is_primary: im.primary,
                    protocol,
                })
            })
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let organizations = entry
            .organizations
            .iter()
            .map(|org| {
                Ok(Organization {
                    company: org.name.clone(),
                    title: org.title.clone(),
                    kind: maps.organization.to_local(org.rel)?,
                    label: org.label.clone(),
                    is_primary: org.primary,
                })
            })
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let memberships = entry
            .group_memberships
            .iter()
            .filter(|membership| !membership.deleted)
            .filter_map(|membership| last_item_from_uri(&membership.href))
            .map(|group_sync_id| GroupMembership {
                group_id: None,
                group_sync_id: Some(group_sync_id),
            })
            .collect();

        let mut extensions = Vec::new();
        for property in &entry.extended_properties {
            if property.name == EXTENSIONS_PROPERTY {
                extensions.extend(decode_extensions(&property.value)?);
            } else {
                debug!(
                    "[ContactsSync] Ignoring extended property {} on {}",
                    property.name, sync_id
                );
            }
        }

        let photo = PhotoState {
            sync_version: entry.photo_edit_href.as_deref().and_then(last_item_from_uri),
            exists_on_server: entry
                .photo_href
                .as_deref()
                .is_some_and(|href| !href.is_empty()),
        };

        Ok(InboundRecord::Contact {
            record: ContactRecord {
                contact: Contact {
                    id: None,
                    account: account.to_string(),
                    name: entry.title.clone(),
                    notes: entry.content.clone(),
                    sync_id: Some(sync_id),
                    sync_version: entry.meta.sync_version(),
                    dirty: false,
                    local_revision: 0,
                },
                children: ContactChildren {
                    phones,
                    emails,
                    postal_addresses,
                    im_addresses,
                    organizations,
                    extensions,
                    memberships,
                },
            },
            photo,
        })
    }

    /// Edit reference to delete for a locally deleted record.
    ///
    /// `None` when the record never synced: there is nothing to delete remotely.
    pub fn deleted_record_edit_url(&self, marker: &DeletionMarker, account: &str) -> Option<String> {
        let sync_id = marker.sync_id.as_deref().filter(|id| !id.is_empty())?;
        Some(self.feeds.edit_url(
            marker.kind,
            account,
            sync_id,
            marker.sync_version.as_deref(),
        ))
    }
}

/// Extensions as one JSON object, keys in row order.
struct ExtensionsBlob(Vec<Extension>);

impl Serialize for ExtensionsBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|ext| (&ext.name, &ext.value)))
    }
}

impl<'de> Deserialize<'de> for ExtensionsBlob {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BlobVisitor;

        impl<'de> Visitor<'de> for BlobVisitor {
            type Value = ExtensionsBlob;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object of string values")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen = HashSet::new();
                let mut extensions = Vec::new();
                while let Some((name, value)) = map.next_entry::<String, String>()? {
                    if !seen.insert(name.clone()) {
                        return Err(de::Error::custom(format!("duplicate extension {}", name)));
                    }
                    extensions.push(Extension { name, value });
                }
                Ok(ExtensionsBlob(extensions))
            }
        }

        deserializer.deserialize_map(BlobVisitor)
    }
}

/// Encodes extensions as one JSON object. `None` when there are no rows.
fn encode_extensions(extensions: &[Extension]) -> Result<Option<String>> {
    if extensions.is_empty() {
        return Ok(None);
    }
    let mut seen = HashSet::new();
    if let Some(dup) = extensions.iter().find(|ext| !seen.insert(ext.name.as_str())) {
        return Err(TranslateError::DuplicateExtension(dup.name.clone()).into());
    }
    Ok(Some(serde_json::to_string(&ExtensionsBlob(extensions.to_vec()))?))
}

fn decode_extensions(blob: &str) -> std::result::Result<Vec<Extension>, TranslateError> {
    serde_json::from_str::<ExtensionsBlob>(blob)
        .map(|blob| blob.0)
        .map_err(|e| TranslateError::MalformedExtensions(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::kinds::{ContactMethodKind, ImProtocol, OrganizationKind, PhoneKind};

    const ACCOUNT: &str = "a@x.com";

    fn translator() -> RecordTranslator {
        RecordTranslator::new(FeedUrls::new("https://feeds.test/m8/feeds", "full-sync"))
    }

    fn no_groups(_: i64) -> Result<Option<String>> {
        Ok(None)
    }

    fn sample_contact() -> ContactRecord {
        ContactRecord {
            contact: Contact {
                id: Some(7),
                account: ACCOUNT.to_string(),
                name: Some("Ada Lovelace".to_string()),
                notes: Some("met at the engine demo".to_string()),
                sync_id: Some("c1".to_string()),
                sync_version: Some("v4".to_string()),
                dirty: true,
                local_revision: 0,
            },
            children: ContactChildren {
                phones: vec![
                    Phone {
                        number: "555-0100".to_string(),
                        kind: PhoneKind::Mobile,
                        label: None,
                        is_primary: true,
                    },
                    Phone {
                        number: "555-0199".to_string(),
                        kind: PhoneKind::Custom,
                        label: Some("boat".to_string()),
                        is_primary: false,
                    },
                ],
                emails: vec![Email {
                    address: "ada@x.com".to_string(),
                    kind: ContactMethodKind::Work,
                    label: None,
                    is_primary: true,
                }],
                postal_addresses: vec![PostalAddress {
                    formatted: "12 St James's Square".to_string(),
                    kind: ContactMethodKind::Home,
                    label: None,
                    is_primary: false,
                }],
                im_addresses: vec![
                    ImAddress {
                        address: "ada".to_string(),
                        kind: ContactMethodKind::Other,
                        label: None,
                        is_primary: false,
                        protocol: ImProtocolData::Predefined(ImProtocol::Jabber),
                    },
                    ImAddress {
                        address: "ada-foo".to_string(),
                        kind: ContactMethodKind::Home,
                        label: None,
                        is_primary: false,
                        protocol: ImProtocolData::Custom("Foo".to_string()),
                    },
                ],
                organizations: vec![Organization {
                    company: Some("Analytical Engines".to_string()),
                    title: Some("Programmer".to_string()),
                    kind: OrganizationKind::Work,
                    label: None,
                    is_primary: true,
                }],
                extensions: vec![Extension {
                    name: "nickname".to_string(),
                    value: "Countess".to_string(),
                }],
                memberships: vec![GroupMembership {
                    group_id: None,
                    group_sync_id: Some("g1".to_string()),
                }],
            },
        }
    }

    fn with_server_meta(entry: Entry) -> Entry {
        match entry {
            Entry::Contact(mut contact) => {
                contact.meta.updated = Some("2026-01-01T00:00:00Z".to_string());
                Entry::Contact(contact)
            }
            other => other,
        }
    }

    #[test]
    fn contact_round_trips_through_entry() {
        let translator = translator();
        let record = sample_contact();
        let outbound = translator
            .record_to_entry(&LocalRecord::Contact(record.clone()), ACCOUNT, &no_groups)
            .unwrap();
        assert!(!outbound.is_create());

        let inbound = translator
            .entry_to_record(&with_server_meta(outbound.entry), ACCOUNT)
            .unwrap();
        let InboundRecord::Contact { record: back, .. } = inbound.record else {
            panic!("expected contact");
        };

        let mut expected = record;
        expected.contact.id = None;
        expected.contact.dirty = false;
        assert_eq!(back, expected);
    }

    #[test]
    fn unsynced_record_is_a_create() {
        let mut record = sample_contact();
        record.contact.sync_id = None;
        record.contact.sync_version = None;
        let outbound = translator()
            .record_to_entry(&LocalRecord::Contact(record), ACCOUNT, &no_groups)
            .unwrap();
        assert!(outbound.is_create());
        assert_eq!(
            outbound.create_url.as_deref(),
            Some("https://feeds.test/m8/feeds/contacts/a@x.com/full-sync")
        );
        assert!(outbound.entry.meta().id.is_none());
    }

    #[test]
    fn membership_resolves_group_through_local_id() {
        let mut record = sample_contact();
        record.children.memberships = vec![GroupMembership {
            group_id: Some(3),
            group_sync_id: None,
        }];
        let lookup = |id: i64| -> Result<Option<String>> {
            Ok((id == 3).then(|| "g3".to_string()))
        };
        let outbound = translator()
            .record_to_entry(&LocalRecord::Contact(record), ACCOUNT, &lookup)
            .unwrap();
        let Entry::Contact(entry) = outbound.entry else {
            panic!("expected contact entry");
        };
        assert_eq!(
            entry.group_memberships[0].href,
            "http://www.google.com/m8/feeds/groups/a@x.com/base/g3"
        );
    }

    #[test]
    fn membership_on_unsynced_group_fails_retryably() {
        let mut record = sample_contact();
        record.children.memberships = vec![GroupMembership {
            group_id: Some(9),
            group_sync_id: None,
        }];
        let err = translator()
            .record_to_entry(&LocalRecord::Contact(record), ACCOUNT, &no_groups)
            .unwrap_err();
        assert!(err.is_retryable_translate());
    }

    #[test]
    fn system_group_cannot_be_pushed() {
        let group = Group {
            id: Some(1),
            account: ACCOUNT.to_string(),
            name: Some("My Contacts".to_string()),
            system_id: Some("Contacts".to_string()),
            sync_id: Some("6".to_string()),
            dirty: true,
            ..Default::default()
        };
        let err = translator()
            .record_to_entry(&LocalRecord::Group(group), ACCOUNT, &no_groups)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Translate(TranslateError::SystemGroupImmutable { .. })
        ));
        assert!(!err.is_retryable_translate());
    }

    #[test]
    fn unknown_im_protocol_fails_without_retry() {
        let mut record = sample_contact();
        record.children.im_addresses = vec![ImAddress {
            address: "x".to_string(),
            kind: ContactMethodKind::Home,
            label: None,
            is_primary: false,
            protocol: ImProtocolData::decode(Some("pre:99")),
        }];

        let err = translator()
            .record_to_entry(&LocalRecord::Contact(record), ACCOUNT, &no_groups)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Translate(TranslateError::UnknownImProtocol(ref raw)) if raw == "pre:99"
        ));
        assert!(!err.is_retryable_translate());
    }

    #[test]
    fn custom_im_protocol_round_trips_and_none_emits_nothing() {
        let mut record = sample_contact();
        record.children.im_addresses = vec![
            ImAddress {
                address: "x".to_string(),
                kind: ContactMethodKind::Home,
                label: None,
                is_primary: false,
                protocol: ImProtocolData::Custom("Foo".to_string()),
            },
            ImAddress {
                address: "y".to_string(),
                kind: ContactMethodKind::Home,
                label: None,
                is_primary: false,
                protocol: ImProtocolData::None,
            },
        ];
        let translator = translator();
        let outbound = translator
            .record_to_entry(&LocalRecord::Contact(record), ACCOUNT, &no_groups)
            .unwrap();
        let Entry::Contact(entry) = &outbound.entry else {
            panic!("expected contact entry");
        };
        assert_eq!(
            entry.im_addresses[0].protocol,
            ImProtocolElement::Custom("Foo".to_string())
        );
        assert_eq!(entry.im_addresses[1].protocol, ImProtocolElement::None);
        let json = serde_json::to_value(&entry.im_addresses[1]).unwrap();
        assert!(json["protocol"].get("value").is_none());

        let inbound = translator.entry_to_record(&outbound.entry, ACCOUNT).unwrap();
        let InboundRecord::Contact { record, .. } = inbound.record else {
            panic!("expected contact");
        };
        assert_eq!(
            record.children.im_addresses[0].protocol,
            ImProtocolData::Custom("Foo".to_string())
        );
        assert_eq!(record.children.im_addresses[1].protocol.encode(), None);
    }

    #[test]
    fn tombstone_becomes_deletion_marker() {
        let entry = Entry::Group(GroupEntry {
            meta: EntryMeta {
                id: Some("https://feeds.test/m8/feeds/groups/a@x.com/base/g2".to_string()),
                edit_uri: Some(
                    "https://feeds.test/m8/feeds/groups/a@x.com/full-sync/g2/v9".to_string(),
                ),
                updated: Some("2026-01-02T00:00:00Z".to_string()),
                deleted: true,
            },
            title: Some("ignored".to_string()),
            ..Default::default()
        });
        let translated = translator().entry_to_record(&entry, ACCOUNT).unwrap();
        assert_eq!(
            translated.record,
            InboundRecord::Deleted(DeletionMarker {
                kind: RecordKind::Group,
                account: ACCOUNT.to_string(),
                sync_id: Some("g2".to_string()),
                sync_version: Some("v9".to_string()),
            })
        );
        assert!(translated.create_url.is_none());
    }

    #[test]
    fn extensions_keep_their_order_through_an_entry() {
        let translator = translator();
        let mut record = sample_contact();
        record.children.extensions = ["zeta", "alpha", "mid"]
            .iter()
            .enumerate()
            .map(|(n, name)| Extension {
                name: name.to_string(),
                value: format!("value-{}", n),
            })
            .collect();
        let outbound = translator
            .record_to_entry(&LocalRecord::Contact(record.clone()), ACCOUNT, &no_groups)
            .unwrap();

        let inbound = translator
            .entry_to_record(&with_server_meta(outbound.entry), ACCOUNT)
            .unwrap();
        let InboundRecord::Contact { record: back, .. } = inbound.record else {
            panic!("expected contact");
        };

        assert_eq!(back.children.extensions, record.children.extensions);
    }

    #[test]
    fn duplicate_extension_names_cannot_be_sent() {
        let mut record = sample_contact();
        record.children.extensions = vec![
            Extension {
                name: "color".to_string(),
                value: "red".to_string(),
            },
            Extension {
                name: "color".to_string(),
                value: "blue".to_string(),
            },
        ];

        let err = translator()
            .record_to_entry(&LocalRecord::Contact(record), ACCOUNT, &no_groups)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Translate(TranslateError::DuplicateExtension(ref name)) if name == "color"
        ));
        assert!(!err.is_retryable_translate());
    }

    #[test]
    fn extension_blob_with_a_repeated_key_is_malformed() {
        let entry = Entry::Contact(ContactEntry {
            meta: EntryMeta {
                id: Some("https://feeds.test/c9".to_string()),
                ..Default::default()
            },
            extended_properties: vec![ExtendedProperty {
                name: EXTENSIONS_PROPERTY.to_string(),
                value: r#"{"a":"1","a":"2"}"#.to_string(),
            }],
            ..Default::default()
        });
        let err = translator().entry_to_record(&entry, ACCOUNT).unwrap_err();
        assert!(err.is_retryable_translate());
    }

    #[test]
    fn malformed_extension_blob_is_retryable() {
        let entry = Entry::Contact(ContactEntry {
            meta: EntryMeta {
                id: Some("https://feeds.test/c9".to_string()),
                ..Default::default()
            },
            extended_properties: vec![ExtendedProperty {
                name: EXTENSIONS_PROPERTY.to_string(),
                value: "[1, 2".to_string(),
            }],
            ..Default::default()
        });
        let err = translator().entry_to_record(&entry, ACCOUNT).unwrap_err();
        assert!(err.is_retryable_translate());
    }

    #[test]
    fn deleted_memberships_are_ignored_and_photo_state_derived() {
        let entry = Entry::Contact(ContactEntry {
            meta: EntryMeta {
                id: Some("https://feeds.test/c9".to_string()),
                edit_uri: Some("https://feeds.test/c9/v1".to_string()),
                ..Default::default()
            },
            group_memberships: vec![
                GroupMembershipElement {
                    href: "http://www.google.com/m8/feeds/groups/a@x.com/base/g1".to_string(),
                    deleted: true,
                },
                GroupMembershipElement {
                    href: "http://www.google.com/m8/feeds/groups/a@x.com/base/g2".to_string(),
                    deleted: false,
                },
            ],
            photo_href: Some("https://feeds.test/photos/media/a@x.com/c9".to_string()),
            photo_edit_href: Some("https://feeds.test/photos/media/a@x.com/c9/pv3".to_string()),
            ..Default::default()
        });
        let translated = translator().entry_to_record(&entry, ACCOUNT).unwrap();
        let InboundRecord::Contact { record, photo } = translated.record else {
            panic!("expected contact");
        };
        assert_eq!(
            record.children.memberships,
            vec![GroupMembership {
                group_id: None,
                group_sync_id: Some("g2".to_string()),
            }]
        );
        assert_eq!(
            photo,
            PhotoState {
                sync_version: Some("pv3".to_string()),
                exists_on_server: true,
            }
        );
    }

    #[test]
    fn never_synced_deletion_has_no_edit_url() {
        let translator = translator();
        let marker = DeletionMarker {
            kind: RecordKind::Contact,
            account: ACCOUNT.to_string(),
            sync_id: None,
            sync_version: None,
        };
        assert_eq!(translator.deleted_record_edit_url(&marker, ACCOUNT), None);

        let synced = DeletionMarker {
            sync_id: Some("c1".to_string()),
            sync_version: Some("v2".to_string()),
            ..marker
        };
        assert_eq!(
            translator.deleted_record_edit_url(&synced, ACCOUNT).as_deref(),
            Some("https://feeds.test/m8/feeds/contacts/a@x.com/full-sync/c1/v2")
        );
    }

    #[test]
    fn entry_without_extensions_has_no_property() {
        let mut record = sample_contact();
        record.children.extensions.clear();
        let outbound = translator()
            .record_to_entry(&LocalRecord::Contact(record), ACCOUNT, &no_groups)
            .unwrap();
        let Entry::Contact(entry) = outbound.entry else {
            panic!("expected contact entry");
        };
        assert!(entry.extended_properties.is_empty());
    }
}
