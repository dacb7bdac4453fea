//! Type codes for contact child rows and the bidirectional tables that map
//! them between the feed protocol and the local schema.

use std::fmt::Debug;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or consulting a mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("{table}: value {value} appears in more than one pair")]
    Ambiguous { table: &'static str, value: String },

    #[error("{table}: value {value} has no mapping")]
    Incomplete { table: &'static str, value: String },

    #[error("{table}: no mapping for {value}")]
    Unmapped { table: &'static str, value: String },
}

macro_rules! local_kind {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Integer code stored in the local schema.
            pub fn code(self) -> i32 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

macro_rules! protocol_kind {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];
        }
    };
}

local_kind!(
    /// Local phone type.
    PhoneKind {
        Custom = 0,
        Home = 1,
        Mobile = 2,
        Work = 3,
        WorkFax = 4,
        HomeFax = 5,
        Pager = 6,
        Other = 7,
    }
);

local_kind!(
    /// Local type shared by email, postal and IM contact methods.
    ContactMethodKind {
        Custom = 0,
        Home = 1,
        Work = 2,
        Other = 3,
    }
);

local_kind!(
    OrganizationKind {
        Custom = 0,
        Work = 1,
        Other = 2,
    }
);

local_kind!(
    /// Predefined IM service understood by the local schema.
    ImProtocol {
        Aim = 0,
        Msn = 1,
        Yahoo = 2,
        Skype = 3,
        Qq = 4,
        GoogleTalk = 5,
        Icq = 6,
        Jabber = 7,
    }
);

protocol_kind!(
    /// `rel` of a phone number element. `None` travels with a free-text label.
    PhoneRel {
        Home,
        Mobile,
        Pager,
        Work,
        HomeFax,
        WorkFax,
        Other,
        None,
    }
);

protocol_kind!(EmailRel { Home, Work, Other, None });

protocol_kind!(PostalRel { Home, Work, Other, None });

protocol_kind!(ImRel { Home, Work, Other, None });

protocol_kind!(OrgRel { Work, Other, None });

protocol_kind!(
    /// Predefined IM service on the wire.
    ImProtocolRel {
        Aim,
        Msn,
        Yahoo,
        Skype,
        Qq,
        GoogleTalk,
        Icq,
        Jabber,
    }
);

/// A validated bijection between a protocol enumeration and a local one.
#[derive(Debug, Clone)]
pub struct KindTable<P, L> {
    name: &'static str,
    pairs: Vec<(P, L)>,
}

impl<P, L> KindTable<P, L>
where
    P: Copy + Eq + Debug,
    L: Copy + Eq + Debug,
{
    /// Builds a table and checks it covers both domains exactly once.
    pub fn build(
        name: &'static str,
        pairs: &[(P, L)],
        protocol_domain: &[P],
        local_domain: &[L],
    ) -> Result<Self, MappingError> {
        for (idx, (protocol, local)) in pairs.iter().enumerate() {
            let rest = &pairs[idx + 1..];
            if rest.iter().any(|(p, _)| p == protocol) {
                return Err(MappingError::Ambiguous {
                    table: name,
                    value: format!("{:?}", protocol),
                });
            }
            if rest.iter().any(|(_, l)| l == local) {
                return Err(MappingError::Ambiguous {
                    table: name,
                    value: format!("{:?}", local),
                });
            }
        }

        if let Some(missing) = protocol_domain
            .iter()
            .find(|p| !pairs.iter().any(|(candidate, _)| candidate == *p))
        {
            return Err(MappingError::Incomplete {
                table: name,
                value: format!("{:?}", missing),
            });
        }
        if let Some(missing) = local_domain
            .iter()
            .find(|l| !pairs.iter().any(|(_, candidate)| candidate == *l))
        {
            return Err(MappingError::Incomplete {
                table: name,
                value: format!("{:?}", missing),
            });
        }

        Ok(Self {
            name,
            pairs: pairs.to_vec(),
        })
    }

    pub fn to_local(&self, protocol: P) -> Result<L, MappingError> {
        self.pairs
            .iter()
            .find(|(p, _)| *p == protocol)
            .map(|(_, l)| *l)
            .ok_or_else(|| MappingError::Unmapped {
                table: self.name,
                value: format!("{:?}", protocol),
            })
    }

    pub fn to_protocol(&self, local: L) -> Result<P, MappingError> {
        self.pairs
            .iter()
            .find(|(_, l)| *l == local)
            .map(|(p, _)| *p)
            .ok_or_else(|| MappingError::Unmapped {
                table: self.name,
                value: format!("{:?}", local),
            })
    }
}

/// All field mapping tables used by the translator.
#[derive(Debug, Clone)]
pub struct FieldMaps {
    pub phone: KindTable<PhoneRel, PhoneKind>,
    pub email: KindTable<EmailRel, ContactMethodKind>,
    pub postal: KindTable<PostalRel, ContactMethodKind>,
    pub im: KindTable<ImRel, ContactMethodKind>,
    pub organization: KindTable<OrgRel, OrganizationKind>,
    pub im_protocol: KindTable<ImProtocolRel, ImProtocol>,
}

impl FieldMaps {
    pub fn build() -> Result<Self, MappingError> {
        let phone = KindTable::build(
            "phone",
            &[
                (PhoneRel::Home, PhoneKind::Home),
                (PhoneRel::Mobile, PhoneKind::Mobile),
                (PhoneRel::Pager, PhoneKind::Pager),
                (PhoneRel::Work, PhoneKind::Work),
                (PhoneRel::HomeFax, PhoneKind::HomeFax),
                (PhoneRel::WorkFax, PhoneKind::WorkFax),
                (PhoneRel::Other, PhoneKind::Other),
                (PhoneRel::None, PhoneKind::Custom),
            ],
            PhoneRel::ALL,
            PhoneKind::ALL,
        )?;

        let email = KindTable::build(
            "email",
            &[
                (EmailRel::Home, ContactMethodKind::Home),
                (EmailRel::Work, ContactMethodKind::Work),
                (EmailRel::Other, ContactMethodKind::Other),
                (EmailRel::None, ContactMethodKind::Custom),
            ],
            EmailRel::ALL,
            ContactMethodKind::ALL,
        )?;

        let postal = KindTable::build(
            "postal",
            &[
                (PostalRel::Home, ContactMethodKind::Home),
                (PostalRel::Work, ContactMethodKind::Work),
                (PostalRel::Other, ContactMethodKind::Other),
                (PostalRel::None, ContactMethodKind::Custom),
            ],
            PostalRel::ALL,
            ContactMethodKind::ALL,
        )?;

        let im = KindTable::build(
            "im",
            &[
                (ImRel::Home, ContactMethodKind::Home),
                (ImRel::Work, ContactMethodKind::Work),
                (ImRel::Other, ContactMethodKind::Other),
                (ImRel::None, ContactMethodKind::Custom),
            ],
            ImRel::ALL,
            ContactMethodKind::ALL,
        )?;

        let organization = KindTable::build(
            "organization",
            &[
                (OrgRel::Work, OrganizationKind::Work),
                (OrgRel::Other, OrganizationKind::Other),
                (OrgRel::None, OrganizationKind::Custom),
            ],
            OrgRel::ALL,
            OrganizationKind::ALL,
        )?;

        let im_protocol = KindTable::build(
            "im_protocol",
            &[
                (ImProtocolRel::Aim, ImProtocol::Aim),
                (ImProtocolRel::Msn, ImProtocol::Msn),
                (ImProtocolRel::Yahoo, ImProtocol::Yahoo),
                (ImProtocolRel::Skype, ImProtocol::Skype),
                (ImProtocolRel::Qq, ImProtocol::Qq),
                (ImProtocolRel::GoogleTalk, ImProtocol::GoogleTalk),
                (ImProtocolRel::Icq, ImProtocol::Icq),
                (ImProtocolRel::Jabber, ImProtocol::Jabber),
            ],
            ImProtocolRel::ALL,
            ImProtocol::ALL,
        )?;

        Ok(Self {
            phone,
            email,
            postal,
            im,
            organization,
            im_protocol,
        })
    }
}

static FIELD_MAPS: OnceLock<FieldMaps> = OnceLock::new();

/// Process-wide mapping tables, validated on first use.
///
/// A table that fails validation is a configuration defect, so this panics
/// instead of returning an error.
pub fn field_maps() -> &'static FieldMaps {
    FIELD_MAPS.get_or_init(|| match FieldMaps::build() {
        Ok(maps) => maps,
        Err(err) => panic!("contact field mapping tables are misconfigured: {}", err),
    })
}
