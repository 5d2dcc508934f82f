//! Unique identifiers for Cascade entities.
//!
//! Strongly-typed UUID wrappers. Each identifier is its own type, so an
//! [`ExecutionId`] cannot be passed where a [`FlowId`] is expected. All ID
//! types are `Copy` (16 bytes, stack-allocated) and support:
//!
//! - `v4()` for random generation
//! - `nil()` for the zero value
//! - `parse(&str)` for string parsing
//! - Full serde support (serializes as the hyphenated UUID string)
//! - `Display`, `FromStr`, `Eq`, `Ord`, `Hash`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a random (v4) identifier.
            #[must_use]
            pub fn v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// The zero-valued identifier.
            #[must_use]
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Wrap a raw UUID.
            #[must_use]
            pub const fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a hyphenated UUID string.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn get(&self) -> Uuid {
                self.0
            }

            /// Returns `true` if this is the zero-valued identifier.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifies one run of a plan.
    ExecutionId
}

define_id! {
    /// Identifies a published flow document (all versions share the id).
    FlowId
}

define_id! {
    /// Identifies the principal (owning user) of flows and executions.
    PrincipalId
}

define_id! {
    /// Identifies a stored credential referenced from node config.
    CredentialId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_creates_non_nil() {
        assert!(!ExecutionId::v4().is_nil());
        assert!(!FlowId::v4().is_nil());
        assert!(!PrincipalId::v4().is_nil());
        assert!(!CredentialId::v4().is_nil());
    }

    #[test]
    fn nil_is_zero_valued() {
        let id = ExecutionId::nil();
        assert!(id.is_nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn parse_valid_uuid_string() {
        let id = FlowId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(!id.is_nil());
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn parse_invalid_string_fails() {
        assert!(FlowId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn copy_semantics() {
        let a = ExecutionId::v4();
        let b = a;
        assert_eq!(a, b);
    }

    #[test]
    fn from_uuid_roundtrips() {
        let raw = Uuid::new_v4();
        let typed = PrincipalId::new(raw);
        assert_eq!(typed.get(), raw);
        assert_eq!(Uuid::from(typed), raw);
    }

    #[test]
    fn serde_json_roundtrip() {
        let id = CredentialId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: CredentialId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ExecutionId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }

    #[test]
    fn ordering_is_consistent() {
        let a = FlowId::nil();
        let b = FlowId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(a < b);
    }

    #[test]
    fn from_str_via_parse() {
        let id: ExecutionId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert!(!id.is_nil());
    }
}
