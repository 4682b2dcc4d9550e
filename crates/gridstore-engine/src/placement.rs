//! Object placement
//!
//! Objects occupy the first free block slot, found by a linear scan over
//! the block records. Blocks are never reclaimed short of destroying the
//! store, so a free slot always holds zeros.

use crate::codec::BlockDescriptor;
use gridstore_common::{Error, Result, StoreId};

/// Index of the first free block, or `NoSpace` when all slots are used
pub fn find_free_block(store_id: StoreId, blocks: &[BlockDescriptor]) -> Result<usize> {
    blocks
        .iter()
        .position(|b| !b.is_used)
        .ok_or(Error::NoSpace(store_id))
}
