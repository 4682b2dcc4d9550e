//! Core type definitions for Gridstore
//!
//! This module defines the fundamental identifier types used throughout
//! the system.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length of an object id in bytes.
///
/// Object ids are encoded on disk as a 64-byte zero-padded buffer whose
/// last byte is always zero, leaving 63 significant bytes.
pub const OBJECT_ID_MAX_LEN: usize = 63;

/// Identifier for a store.
///
/// HA group ids reuse this type: a group is identified by the store id of
/// its first member.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[display("{_0}")]
pub struct StoreId(u32);

impl StoreId {
    /// Create a store id from its raw value
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.0)
    }
}

/// Identifier for an object within a store.
///
/// Generated ids have the form `<milliseconds-since-epoch>_<random 4-digit>`.
/// Uniqueness is only required within one store; a collision inside a
/// 1024-block store is astronomically unlikely by construction.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ObjectId(String);

impl ObjectId {
    /// Generate a new object id
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let mut rng = rand::thread_rng();
        Self(format!("{}_{}", millis, rng.gen_range(1000..=9999)))
    }

    /// Parse and validate an externally supplied object id
    pub fn parse(id: impl Into<String>) -> Result<Self, ObjectIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ObjectIdError::Empty);
        }
        if id.len() > OBJECT_ID_MAX_LEN {
            return Err(ObjectIdError::TooLong);
        }
        if let Some(c) = id.chars().find(|c| !c.is_ascii() || *c == '\0') {
            return Err(ObjectIdError::InvalidChar(c));
        }
        Ok(Self(id))
    }

    /// Get the object id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({:?})", self.0)
    }
}

/// Errors that can occur when parsing an object id
#[derive(Debug, Clone, thiserror::Error)]
pub enum ObjectIdError {
    #[error("object id cannot be empty")]
    Empty,
    #[error("object id must be at most {OBJECT_ID_MAX_LEN} bytes")]
    TooLong,
    #[error("object id contains invalid character: {0:?}")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_id_display() {
        let id = StoreId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.get(), 42);
    }

    #[test]
    fn test_object_id_format() {
        let id = ObjectId::new();
        let (millis, suffix) = id.as_str().split_once('_').unwrap();
        assert!(millis.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_object_id_parse() {
        assert!(ObjectId::parse("1732780800000_1234").is_ok());
        assert!(ObjectId::parse("a".repeat(63)).is_ok());
        assert!(matches!(
            ObjectId::parse("a".repeat(64)),
            Err(ObjectIdError::TooLong)
        ));
        assert!(matches!(ObjectId::parse(""), Err(ObjectIdError::Empty)));
        assert!(matches!(
            ObjectId::parse("caf\u{e9}"),
            Err(ObjectIdError::InvalidChar(_))
        ));
    }
}
