//! Error types for Gridstore
//!
//! This module defines the common error type used throughout the system.

use crate::types::{ObjectIdError, StoreId};
use thiserror::Error;

/// Common result type for Gridstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Gridstore
#[derive(Debug, Error)]
pub enum Error {
    #[error("store {0} does not exist")]
    StoreNotFound(StoreId),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("store {0} already exists")]
    StoreExists(StoreId),

    #[error("HA group {0} already exists")]
    GroupExists(StoreId),

    #[error("store {0} is already part of a replica pair")]
    AlreadyPaired(StoreId),

    #[error("store {0} is already part of HA group {1}")]
    AlreadyInGroup(StoreId, StoreId),

    #[error("store {0} is destroyed")]
    Destroyed(StoreId),

    #[error("object size {size} exceeds block size {max}")]
    TooLarge { size: u64, max: u64 },

    #[error("no free blocks available in store {0}")]
    NoSpace(StoreId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt metadata: {0}")]
    Corrupt(String),

    #[error("cannot reconstruct: {0}")]
    Unreconstructable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(#[from] ObjectIdError),
}

impl Error {
    /// Create a corrupt-metadata error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StoreNotFound(_) | Self::ObjectNotFound(_))
    }
}
