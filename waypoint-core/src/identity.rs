//! Type-safe identifiers for Waypoint entities
//!
//! Tenants, documents, and tasks are keyed by UUIDs. Wrapping each in its
//! own newtype keeps them from being swapped at call sites; all three
//! serialize transparently as UUID strings on the wire.
//!
//! User and agent identifiers are deliberately *not* newtyped: they are
//! external names issued by the identity provider and the agent card,
//! not row keys this system mints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when an entity ID fails to parse from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    /// Which kind of ID was being parsed (e.g. "tenant").
    pub kind: &'static str,
    /// The offending input.
    pub input: String,
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} id: '{}' is not a UUID", self.kind, self.input)
    }
}

impl std::error::Error for IdParseError {}

/// Define a UUID-backed identifier newtype.
macro_rules! entity_id {
    ($name:ident, $kind:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, utoipa::ToSchema)]
        pub struct $name(Uuid);

        impl $name {
            /// The entity kind, used in parse errors and logs.
            pub const KIND: &'static str = $kind;

            /// Wrap an existing UUID.
            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Mint a fresh random (v4) identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// The all-zero identifier.
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self).map_err(|_| IdParseError {
                    kind: Self::KIND,
                    input: s.to_string(),
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                Uuid::deserialize(deserializer).map(Self)
            }
        }
    };
}

entity_id!(TenantId, "tenant", "Identifier of an isolation tenant.");
entity_id!(DocumentId, "document", "Identifier of a stored document.");
entity_id!(TaskId, "task", "Identifier of an agent task.");
