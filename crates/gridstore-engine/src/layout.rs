//! On-disk layout
//!
//! File tree rooted at a configured base directory:
//! ```text
//! <base>/store_<id>/data.bin        # NUM_BLOCKS x BLOCK_SIZE, block k at offset k*BLOCK_SIZE
//! <base>/store_<id>/metadata.bin    # one store record, then NUM_BLOCKS block records
//! <base>/store_<id>/LOCK            # advisory lock file
//! <base>/ha_group_<gid>/parity.bin  # NUM_BLOCKS x BLOCK_SIZE
//! <base>/ha_group_<gid>/status.data # packed group status record
//! ```
//!
//! A store or group "exists" when its directory exists.

use gridstore_common::StoreId;
use std::path::{Path, PathBuf};

/// Size of one block slot (1 MiB)
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// Number of block slots per store
pub const NUM_BLOCKS: usize = 1024;

/// Exact size of a store's data file and of a group's parity file (1 GiB)
pub const DATA_FILE_SIZE: u64 = (NUM_BLOCKS * BLOCK_SIZE) as u64;

pub const DATA_FILENAME: &str = "data.bin";
pub const META_FILENAME: &str = "metadata.bin";
pub const LOCK_FILENAME: &str = "LOCK";
pub const PARITY_FILENAME: &str = "parity.bin";
pub const STATUS_FILENAME: &str = "status.data";

/// Prefix of store directory names under the base directory
pub const STORE_DIR_PREFIX: &str = "store_";

/// Prefix of HA group directory names under the base directory
pub const GROUP_DIR_PREFIX: &str = "ha_group_";

/// Deterministic mapping from store and group ids to filesystem paths
#[derive(Clone, Debug)]
pub struct PathLayout {
    base: PathBuf,
}

impl PathLayout {
    /// Create a layout rooted at the given base directory
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The base directory
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory of a store
    #[must_use]
    pub fn store_dir(&self, id: StoreId) -> PathBuf {
        self.base.join(format!("{STORE_DIR_PREFIX}{id}"))
    }

    /// Data file of a store
    #[must_use]
    pub fn data_path(&self, id: StoreId) -> PathBuf {
        self.store_dir(id).join(DATA_FILENAME)
    }

    /// Metadata file of a store
    #[must_use]
    pub fn metadata_path(&self, id: StoreId) -> PathBuf {
        self.store_dir(id).join(META_FILENAME)
    }

    /// Advisory lock file of a store
    #[must_use]
    pub fn lock_path(&self, id: StoreId) -> PathBuf {
        self.store_dir(id).join(LOCK_FILENAME)
    }

    /// Directory of an HA group
    #[must_use]
    pub fn group_dir(&self, group_id: StoreId) -> PathBuf {
        self.base.join(format!("{GROUP_DIR_PREFIX}{group_id}"))
    }

    /// Parity file of an HA group
    #[must_use]
    pub fn parity_path(&self, group_id: StoreId) -> PathBuf {
        self.group_dir(group_id).join(PARITY_FILENAME)
    }

    /// Status file of an HA group
    #[must_use]
    pub fn status_path(&self, group_id: StoreId) -> PathBuf {
        self.group_dir(group_id).join(STATUS_FILENAME)
    }

    /// Check whether a store exists
    #[must_use]
    pub fn store_exists(&self, id: StoreId) -> bool {
        self.store_dir(id).is_dir()
    }

    /// Check whether an HA group exists
    #[must_use]
    pub fn group_exists(&self, group_id: StoreId) -> bool {
        self.group_dir(group_id).is_dir()
    }
}
