//! Validated string keys.
//!
//! Flow documents name their nodes with user-authored string ids, and
//! handlers register under string type keys (e.g. `"core.set"`). Both are
//! validated at the boundary so the rest of the engine can treat them as
//! well-formed: non-empty, at most 128 characters, drawn from
//! `[A-Za-z0-9._-]`.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Maximum length of a key in characters.
pub const MAX_KEY_LEN: usize = 128;

/// Error produced when a key fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The key was empty.
    #[error("key must not be empty")]
    Empty,
    /// The key exceeded [`MAX_KEY_LEN`] characters.
    #[error("key exceeds {MAX_KEY_LEN} characters: {0} chars")]
    TooLong(usize),
    /// The key contained a character outside `[A-Za-z0-9._-]`.
    #[error("key contains invalid character {ch:?} at offset {offset}")]
    InvalidChar {
        /// The offending character.
        ch: char,
        /// Byte offset of the character within the key.
        offset: usize,
    },
}

fn validate(s: &str) -> Result<(), KeyError> {
    if s.is_empty() {
        return Err(KeyError::Empty);
    }
    let len = s.chars().count();
    if len > MAX_KEY_LEN {
        return Err(KeyError::TooLong(len));
    }
    for (offset, ch) in s.char_indices() {
        if !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')) {
            return Err(KeyError::InvalidChar { ch, offset });
        }
    }
    Ok(())
}

macro_rules! define_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a key, validating its shape.
            pub fn new(s: impl Into<String>) -> Result<Self, KeyError> {
                let s = s.into();
                validate(&s)?;
                Ok(Self(s))
            }

            /// The key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = KeyError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = KeyError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        // Manual Deserialize so invalid keys are rejected at the wire.
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                Self::new(s).map_err(serde::de::Error::custom)
            }
        }
    };
}

define_key! {
    /// Graph-unique id of a node within one flow document.
    NodeKey
}

define_key! {
    /// Registry key of a handler type (matches `node.type` in flows).
    HandlerKey
}
