//! Replica pair protocol
//!
//! A replica pair is two stores whose data files are kept bytewise
//! identical. The pair is symmetric by content and asymmetric by role:
//! the clone carries `is_replica = true`, both sides cross-reference each
//! other through `replica_of`. Either side may take writes; every put
//! pushes a full resync to the other side.
//!
//! A store can be in at most one redundancy arrangement: replication is
//! refused for stores that are already paired or belong to an HA group.

use crate::codec::{BlockDescriptor, StoreDescriptor};
use crate::container::Container;
use crate::layout::PathLayout;
use crate::lock::StoreLock;
use gridstore_common::{Error, Result, StoreId};
use std::fs;
use tracing::{debug, info};

/// Smallest id handed out to replicas; ids below this are reserved for
/// caller-chosen stores.
const REPLICA_ID_MIN: u32 = 1000;

/// Draw a store id that is not in use.
///
/// Ids are sampled uniformly from `[REPLICA_ID_MIN, u32::MAX]` and
/// rejected while a store with that id exists.
fn pick_replica_id(layout: &PathLayout) -> StoreId {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    loop {
        let id = StoreId::new(rng.gen_range(REPLICA_ID_MIN..=u32::MAX));
        if !layout.store_exists(id) {
            return id;
        }
    }
}

/// Create a replica of `source_id`: clone the data and block records into
/// a fresh store under a random id and cross-link the two descriptors.
///
/// Returns the replica's store id. On any failure after the replica
/// directory is created, the directory is removed before the error
/// returns.
pub fn create_replica(layout: &PathLayout, source_id: StoreId) -> Result<StoreId> {
    let source = Container::new(layout, source_id);
    if !source.exists() {
        return Err(Error::StoreNotFound(source_id));
    }

    let _lock = StoreLock::exclusive(layout, source_id)?;
    let (mut source_desc, source_blocks) = source.load()?;

    if source_desc.is_destroyed {
        return Err(Error::Destroyed(source_id));
    }
    if source_desc.is_replica || source_desc.replica_of.is_some() {
        return Err(Error::AlreadyPaired(source_id));
    }
    if let Some(group) = source_desc.ha_group_id {
        return Err(Error::AlreadyInGroup(source_id, group));
    }

    let replica_id = pick_replica_id(layout);
    let replica = Container::new(layout, replica_id);
    fs::create_dir_all(layout.store_dir(replica_id))?;

    let result = (|| -> Result<()> {
        fs::copy(layout.data_path(source_id), layout.data_path(replica_id))?;

        let mut replica_desc = source_desc.clone();
        replica_desc.store_id = replica_id;
        replica_desc.is_replica = true;
        replica_desc.replica_of = Some(source_id);
        replica.save(&replica_desc, &source_blocks)?;

        source_desc.replica_of = Some(replica_id);
        source.save(&source_desc, &source_blocks)
    })();

    if let Err(e) = result {
        let _ = fs::remove_dir_all(layout.store_dir(replica_id));
        return Err(e);
    }

    info!(source = %source_id, replica = %replica_id, "created replica pair");
    Ok(replica_id)
}

/// Push the writing side's state to its pair after a put: full data
/// resync plus the source's block records.
///
/// The target's store record is re-derived from its own on-disk role
/// fields; only `used_blocks` mirrors the source.
pub fn sync_to_pair(
    layout: &PathLayout,
    source_desc: &StoreDescriptor,
    blocks: &[BlockDescriptor],
) -> Result<()> {
    let pair_id = source_desc
        .replica_of
        .ok_or_else(|| Error::invalid_argument("store is not part of a replica pair"))?;

    let pair = Container::new(layout, pair_id);
    if !pair.exists() {
        return Err(Error::StoreNotFound(pair_id));
    }
    let _lock = StoreLock::exclusive(layout, pair_id)?;

    fs::copy(
        layout.data_path(source_desc.store_id),
        layout.data_path(pair_id),
    )?;

    let mut pair_desc = pair.load_descriptor()?;
    pair_desc.used_blocks = source_desc.used_blocks;
    pair.save(&pair_desc, blocks)?;

    debug!(source = %source_desc.store_id, pair = %pair_id, "synced replica pair");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_replica_cross_links() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let source_id = StoreId::new(1);
        Container::new(&layout, source_id).create().unwrap();

        let replica_id = create_replica(&layout, source_id).unwrap();
        assert!(replica_id.get() >= REPLICA_ID_MIN);

        let source_desc = Container::new(&layout, source_id)
            .load_descriptor()
            .unwrap();
        let replica_desc = Container::new(&layout, replica_id)
            .load_descriptor()
            .unwrap();

        assert_eq!(source_desc.replica_of, Some(replica_id));
        assert!(!source_desc.is_replica);
        assert_eq!(replica_desc.replica_of, Some(source_id));
        assert!(replica_desc.is_replica);
        assert_eq!(replica_desc.store_id, replica_id);
    }

    #[test]
    fn test_create_replica_copies_content() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let source_id = StoreId::new(1);
        let source = Container::new(&layout, source_id);
        source.create().unwrap();
        source.write_block(0, b"abc").unwrap();

        let replica_id = create_replica(&layout, source_id).unwrap();
        let replica = Container::new(&layout, replica_id);
        assert_eq!(replica.read_block(0, 3).unwrap(), b"abc");
    }

    #[test]
    fn test_replicate_missing_source() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        assert!(matches!(
            create_replica(&layout, StoreId::new(9)),
            Err(Error::StoreNotFound(_))
        ));
    }

    #[test]
    fn test_replicate_twice_fails() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let source_id = StoreId::new(1);
        Container::new(&layout, source_id).create().unwrap();

        create_replica(&layout, source_id).unwrap();
        assert!(matches!(
            create_replica(&layout, source_id),
            Err(Error::AlreadyPaired(_))
        ));
    }

    #[test]
    fn test_replicating_the_replica_fails() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let source_id = StoreId::new(1);
        Container::new(&layout, source_id).create().unwrap();

        let replica_id = create_replica(&layout, source_id).unwrap();
        assert!(matches!(
            create_replica(&layout, replica_id),
            Err(Error::AlreadyPaired(_))
        ));
    }
}
