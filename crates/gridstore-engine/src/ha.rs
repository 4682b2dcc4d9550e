//! HA parity protocol
//!
//! An HA group is an ordered set of N >= 2 stores plus a parity file with
//! the same block grid. For every block index `k` and byte offset `j`,
//! `parity[k][j]` is the XOR of byte `j` of block `k` across all members,
//! destroyed members included: their data files are retained until the
//! group is torn down, so the parity equation keeps holding over on-disk
//! state.
//!
//! The group tolerates exactly one destroyed member. A destroyed member's
//! block is reconstructed by XOR-folding the parity stripe with the same
//! block of every surviving member. Losing a second member exhausts the
//! redundancy and tears the group down.

use crate::codec::{GroupStatus, StoreDescriptor};
use crate::container::Container;
use crate::layout::{PathLayout, BLOCK_SIZE, DATA_FILE_SIZE, NUM_BLOCKS, STATUS_FILENAME};
use crate::lock::StoreLock;
use gridstore_common::{Error, Result, StoreId};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use tracing::{debug, info, warn};

pub(crate) fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

fn is_all_zero(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == 0)
}

/// Create an HA group from the given members.
///
/// Validates the member set, allocates the group directory, builds the
/// initial parity file, stamps each member's descriptor with the group
/// id, and persists the status record. The group id is the first
/// member's store id.
///
/// On failure, stamped members are un-stamped and the group directory is
/// removed before the error returns.
pub fn create_group(layout: &PathLayout, member_ids: &[StoreId]) -> Result<StoreId> {
    if member_ids.len() < 2 {
        return Err(Error::invalid_argument(
            "an HA group needs at least two stores",
        ));
    }
    let unique: HashSet<StoreId> = member_ids.iter().copied().collect();
    if unique.len() != member_ids.len() {
        return Err(Error::invalid_argument(
            "duplicate store ids are not allowed",
        ));
    }

    for &id in member_ids {
        if !layout.store_exists(id) {
            return Err(Error::StoreNotFound(id));
        }
    }

    // Lock every member for the duration, in ascending id order.
    let mut lock_order: Vec<StoreId> = member_ids.to_vec();
    lock_order.sort();
    let _locks: Vec<StoreLock> = lock_order
        .iter()
        .map(|&id| StoreLock::exclusive(layout, id))
        .collect::<Result<_>>()?;

    for &id in member_ids {
        let descriptor = Container::new(layout, id).load_descriptor()?;
        if descriptor.is_destroyed {
            return Err(Error::Destroyed(id));
        }
        if let Some(group) = descriptor.ha_group_id {
            return Err(Error::AlreadyInGroup(id, group));
        }
        if descriptor.is_replica || descriptor.replica_of.is_some() {
            return Err(Error::AlreadyPaired(id));
        }
    }

    let group_id = member_ids[0];
    if layout.group_exists(group_id) {
        return Err(Error::GroupExists(group_id));
    }
    fs::create_dir_all(layout.group_dir(group_id))?;

    let mut stamped: Vec<StoreId> = Vec::new();
    let result = (|| -> Result<()> {
        build_initial_parity(layout, group_id, member_ids)?;

        for &id in member_ids {
            let member = Container::new(layout, id);
            let (mut descriptor, blocks) = member.load()?;
            descriptor.ha_group_id = Some(group_id);
            member.save(&descriptor, &blocks)?;
            stamped.push(id);
        }

        let status = GroupStatus {
            group_id,
            destroyed_count: 0,
            members: member_ids.to_vec(),
        };
        save_status(layout, &status)
    })();

    if let Err(e) = result {
        for &id in &stamped {
            let member = Container::new(layout, id);
            if let Ok((mut descriptor, blocks)) = member.load() {
                descriptor.ha_group_id = None;
                let _ = member.save(&descriptor, &blocks);
            }
        }
        let _ = fs::remove_dir_all(layout.group_dir(group_id));
        return Err(e);
    }

    info!(group = %group_id, members = member_ids.len(), "created HA group");
    Ok(group_id)
}

/// Build the parity file: for each block index, XOR the block across all
/// members over the full block size, padding zeros included.
fn build_initial_parity(layout: &PathLayout, group_id: StoreId, members: &[StoreId]) -> Result<()> {
    let parity = File::create(layout.parity_path(group_id))?;
    parity.set_len(DATA_FILE_SIZE)?;

    let data_files: Vec<File> = members
        .iter()
        .map(|&id| File::open(layout.data_path(id)))
        .collect::<std::io::Result<_>>()?;

    let mut stripe = vec![0u8; BLOCK_SIZE];
    let mut block = vec![0u8; BLOCK_SIZE];
    for k in 0..NUM_BLOCKS {
        stripe.fill(0);
        for file in &data_files {
            file.read_exact_at(&mut block, (k * BLOCK_SIZE) as u64)?;
            xor_into(&mut stripe, &block);
        }
        // The freshly sized parity file is already zero.
        if !is_all_zero(&stripe) {
            parity.write_all_at(&stripe, (k * BLOCK_SIZE) as u64)?;
        }
    }

    parity.sync_all()?;
    Ok(())
}

/// Fold a put's change into the parity stripe of block `k`.
///
/// `delta` is the XOR of the block's old and new contents over the bytes
/// the put wrote; bytes beyond the payload are unchanged in both the
/// block slot and the stripe.
pub fn apply_parity_delta(
    layout: &PathLayout,
    group_id: StoreId,
    k: usize,
    delta: &[u8],
) -> Result<()> {
    if delta.is_empty() {
        return Ok(());
    }
    if !layout.group_exists(group_id) {
        return Err(Error::corrupt(format!(
            "HA group {group_id} directory is missing"
        )));
    }

    let parity = OpenOptions::new()
        .read(true)
        .write(true)
        .open(layout.parity_path(group_id))?;

    let offset = (k * BLOCK_SIZE) as u64;
    let mut stripe = vec![0u8; delta.len()];
    parity.read_exact_at(&mut stripe, offset)?;
    xor_into(&mut stripe, delta);
    parity.write_all_at(&stripe, offset)?;
    parity.sync_data()?;

    debug!(group = %group_id, block = k, bytes = delta.len(), "updated parity stripe");
    Ok(())
}

/// Reconstruct the first `len` bytes of block `k` of a destroyed member
/// by XOR-folding the parity stripe with every surviving member's block.
///
/// Fails with `Unreconstructable` when any other member is destroyed or
/// unreadable: single-failure tolerance is all the parity provides.
pub fn reconstruct_block(
    layout: &PathLayout,
    store: &StoreDescriptor,
    k: usize,
    len: usize,
) -> Result<Vec<u8>> {
    let group_id = store
        .ha_group_id
        .ok_or_else(|| Error::invalid_argument("store is not part of an HA group"))?;
    let status = load_status(layout, group_id)?;

    let parity = File::open(layout.parity_path(group_id))?;
    let mut recon = vec![0u8; len];
    parity.read_exact_at(&mut recon, (k * BLOCK_SIZE) as u64)?;

    // XOR is order-independent; visit peers in ascending id order to
    // match the lock acquisition policy.
    let mut peers: Vec<StoreId> = status
        .members
        .iter()
        .copied()
        .filter(|&m| m != store.store_id)
        .collect();
    peers.sort();

    let mut failed_peers = 0usize;
    for member_id in peers {
        eprintln!("DEBUG: peer loop member_id={}", member_id);
        let member = Container::new(layout, member_id);
        if !member.exists() {
            failed_peers += 1;
            continue;
        }
        eprintln!("DEBUG: before lock {}", member_id);
        let _lock = StoreLock::shared(layout, member_id)?;
        eprintln!("DEBUG: after lock {}", member_id);
        let descriptor = match member.load_descriptor() {
            Ok(d) => d,
            Err(_) => {
                failed_peers += 1;
                continue;
            }
        };
        if descriptor.is_destroyed {
            failed_peers += 1;
            continue;
        }

        let block = member.read_block(k, len)?;
        xor_into(&mut recon, &block);
        eprintln!("DEBUG: end of iter {}", member_id);
    }
    eprintln!("DEBUG: loop done, failed_peers={}", failed_peers);

    if failed_peers > 0 {
        return Err(Error::Unreconstructable(format!(
            "{} members of group {} are gone besides store {}",
            failed_peers, group_id, store.store_id
        )));
    }

    Ok(recon)
}

/// Load the status record of a group
pub fn load_status(layout: &PathLayout, group_id: StoreId) -> Result<GroupStatus> {
    let data = fs::read(layout.status_path(group_id))?;
    GroupStatus::from_bytes(&data)
}

/// Atomically overwrite the status record of a group
pub fn save_status(layout: &PathLayout, status: &GroupStatus) -> Result<()> {
    let path = layout.status_path(status.group_id);
    let tmp_path = layout
        .group_dir(status.group_id)
        .join(format!("{STATUS_FILENAME}.tmp"));

    let mut tmp = File::create(&tmp_path)?;
    tmp.write_all(&status.to_bytes())?;
    tmp.sync_all()?;
    drop(tmp);

    fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Dismantle a group that lost its redundancy.
///
/// Staged so that a crash leaves the group directory as the
/// authoritative "group still exists" signal: first the member sets are
/// computed, then surviving members' descriptors are rewritten with no
/// group id, then destroyed members' store directories are removed, and
/// the group directory goes last.
pub fn teardown_group(layout: &PathLayout, status: &GroupStatus) -> Result<()> {
    let mut destroyed: Vec<StoreId> = Vec::new();
    let mut survivors: Vec<StoreId> = Vec::new();
    for &member_id in &status.members {
        let member = Container::new(layout, member_id);
        if !member.exists() {
            continue;
        }
        match member.load_descriptor() {
            Ok(d) if d.is_destroyed => destroyed.push(member_id),
            Ok(_) => survivors.push(member_id),
            Err(e) => {
                warn!(store = %member_id, error = %e, "unreadable member left in place during teardown");
            }
        }
    }

    survivors.sort();
    for &member_id in &survivors {
        let member = Container::new(layout, member_id);
        let _lock = StoreLock::exclusive(layout, member_id)?;
        let (mut descriptor, blocks) = member.load()?;
        descriptor.ha_group_id = None;
        member.save(&descriptor, &blocks)?;
    }

    for &member_id in &destroyed {
        fs::remove_dir_all(layout.store_dir(member_id))?;
    }

    fs::remove_dir_all(layout.group_dir(status.group_id))?;

    info!(
        group = %status.group_id,
        survivors = survivors.len(),
        removed = destroyed.len(),
        "tore down HA group"
    );
    Ok(())
}
