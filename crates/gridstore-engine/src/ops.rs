//! Public operations
//!
//! Thin orchestrations over the container, placement, replica, and HA
//! modules. Within one operation the ordering is fixed: data write, then
//! metadata save, then parity update, then replica sync. A crash between
//! steps leaves the store consistent at the primary level and at worst
//! stale at the redundancy level.
//!
//! Parity and replica failures after the primary write has committed are
//! logged as warnings; the put still succeeds.

use crate::codec::StoreDescriptor;
use crate::container::Container;
use crate::ha;
use crate::layout::{PathLayout, BLOCK_SIZE, STORE_DIR_PREFIX};
use crate::lock::StoreLock;
use crate::placement;
use crate::replica;
use gridstore_common::{Config, Error, ObjectId, Result, StoreId};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The storage engine: all public operations against one base directory
pub struct Engine {
    layout: PathLayout,
}

impl Engine {
    /// Create an engine from configuration
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_base(config.base_dir.clone())
    }

    /// Create an engine rooted at the given base directory
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            layout: PathLayout::new(base),
        }
    }

    /// The path layout in use
    #[must_use]
    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    /// Create an empty store under the given id
    pub fn init(&self, id: StoreId) -> Result<()> {
        Container::new(&self.layout, id).create()?;
        info!(store = %id, "initialized store");
        Ok(())
    }

    /// Store the file at `payload_path` as a new object; returns its id
    pub fn put(&self, id: StoreId, payload_path: &Path) -> Result<ObjectId> {
        let container = Container::new(&self.layout, id);
        if !container.exists() {
            return Err(Error::StoreNotFound(id));
        }
        let _lock = StoreLock::exclusive(&self.layout, id)?;

        let (mut store, mut blocks) = container.load()?;
        if store.is_destroyed {
            return Err(Error::Destroyed(id));
        }

        let size = fs::metadata(payload_path)?.len();
        if size > BLOCK_SIZE as u64 {
            return Err(Error::TooLarge {
                size,
                max: BLOCK_SIZE as u64,
            });
        }
        let payload = fs::read(payload_path)?;

        let k = placement::find_free_block(id, &blocks)?;
        let object_id = ObjectId::new();

        // Capture the slot's old contents first so the parity stripe can
        // be updated by delta once the write lands.
        let parity_delta = match store.ha_group_id {
            Some(_) if !payload.is_empty() => {
                let mut delta = container.read_block(k, payload.len())?;
                ha::xor_into(&mut delta, &payload);
                Some(delta)
            }
            _ => None,
        };

        container.write_block(k, &payload)?;

        blocks[k].is_used = true;
        blocks[k].object_id = object_id.as_str().to_string();
        blocks[k].data_size = payload.len() as u32;
        blocks[k].timestamp = now_secs();
        store.used_blocks += 1;
        container.save(&store, &blocks)?;

        if let Some(group_id) = store.ha_group_id {
            if let Some(delta) = parity_delta {
                if let Err(e) = ha::apply_parity_delta(&self.layout, group_id, k, &delta) {
                    warn!(store = %id, group = %group_id, error = %e,
                        "parity update failed after committed write");
                }
            }
        }

        if store.replica_of.is_some() {
            if let Err(e) = replica::sync_to_pair(&self.layout, &store, &blocks) {
                warn!(store = %id, error = %e, "replica sync failed after committed write");
            }
        }

        info!(store = %id, object = %object_id, block = k, size = payload.len(), "stored object");
        Ok(object_id)
    }

    /// Fetch an object's bytes by id.
    ///
    /// A destroyed HA member is served by parity reconstruction; a
    /// destroyed replica-pair member is served from its pair.
    pub fn get(&self, id: StoreId, object_id: &str) -> Result<Vec<u8>> {
        let container = Container::new(&self.layout, id);
        if !container.exists() {
            return Err(Error::StoreNotFound(id));
        }
        let _lock = StoreLock::shared(&self.layout, id)?;

        let (store, blocks) = container.load()?;
        let found = blocks
            .iter()
            .position(|b| b.is_used && b.object_id == object_id);

        if !store.is_destroyed {
            let k = found.ok_or_else(|| Error::ObjectNotFound(object_id.to_string()))?;
            return container.read_block(k, blocks[k].data_size as usize);
        }

        if store.ha_group_id.is_some() {
            let k = found.ok_or_else(|| Error::ObjectNotFound(object_id.to_string()))?;
            return ha::reconstruct_block(&self.layout, &store, k, blocks[k].data_size as usize);
        }

        if let Some(pair_id) = store.replica_of {
            let pair = Container::new(&self.layout, pair_id);
            if pair.exists() {
                let _pair_lock = StoreLock::shared(&self.layout, pair_id)?;
                let (_, pair_blocks) = pair.load()?;
                let k = pair_blocks
                    .iter()
                    .position(|b| b.is_used && b.object_id == object_id)
                    .ok_or_else(|| Error::ObjectNotFound(object_id.to_string()))?;
                return pair.read_block(k, pair_blocks[k].data_size as usize);
            }
        }

        Err(Error::Destroyed(id))
    }

    /// Descriptors of every store under the base directory, ordered by id
    pub fn list(&self) -> Result<Vec<StoreDescriptor>> {
        if !self.layout.base().is_dir() {
            return Ok(Vec::new());
        }

        let mut stores = Vec::new();
        for entry in fs::read_dir(self.layout.base())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(raw) = name
                .to_str()
                .and_then(|n| n.strip_prefix(STORE_DIR_PREFIX))
            else {
                continue;
            };
            let Ok(raw_id) = raw.parse::<u32>() else {
                continue;
            };

            match Container::new(&self.layout, StoreId::new(raw_id)).load_descriptor() {
                Ok(descriptor) => stores.push(descriptor),
                Err(e) => warn!(store = raw_id, error = %e, "skipping unreadable store"),
            }
        }

        stores.sort_by_key(|d| d.store_id);
        Ok(stores)
    }

    /// Destroy a store.
    ///
    /// An HA member is marked destroyed and its files are retained while
    /// the group can still serve degraded reads; losing a second member
    /// tears the whole group down. Destroying either side of a replica
    /// pair removes both stores. A standalone store is simply removed.
    pub fn destroy(&self, id: StoreId) -> Result<()> {
        let container = Container::new(&self.layout, id);
        if !container.exists() {
            return Err(Error::StoreNotFound(id));
        }
        let _lock = StoreLock::exclusive(&self.layout, id)?;

        let (mut store, blocks) = container.load()?;

        if let Some(group_id) = store.ha_group_id {
            if store.is_destroyed {
                return Err(Error::Destroyed(id));
            }
            store.is_destroyed = true;
            container.save(&store, &blocks)?;

            let mut status = ha::load_status(&self.layout, group_id)?;
            status.destroyed_count += 1;
            ha::save_status(&self.layout, &status)?;

            if status.destroyed_count >= 2 {
                ha::teardown_group(&self.layout, &status)?;
                info!(store = %id, group = %group_id, "destroyed store; group torn down");
            } else {
                info!(store = %id, group = %group_id, "destroyed store; group degraded");
            }
            return Ok(());
        }

        if let Some(pair_id) = store.replica_of {
            let pair = Container::new(&self.layout, pair_id);
            if pair.exists() {
                let _pair_lock = StoreLock::exclusive(&self.layout, pair_id)?;
                pair.remove()?;
            }
            container.remove()?;
            info!(store = %id, pair = %pair_id, "destroyed replica pair");
            return Ok(());
        }

        container.remove()?;
        info!(store = %id, "destroyed store");
        Ok(())
    }

    /// Create a replica of the given store; returns the replica's id
    pub fn replicate(&self, id: StoreId) -> Result<StoreId> {
        replica::create_replica(&self.layout, id)
    }

    /// Create an HA group from the given stores; returns the group id
    pub fn ha_create(&self, member_ids: &[StoreId]) -> Result<StoreId> {
        ha::create_group(&self.layout, member_ids)
    }
}
