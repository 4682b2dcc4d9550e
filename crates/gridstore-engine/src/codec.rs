//! Fixed-width record codec
//!
//! Three on-disk records, all little-endian, packed with explicit padding
//! and read/written as whole records. Short reads are corruption.
//!
//! - Store record (64 bytes): identity and redundancy role of a store.
//! - Block record (80 bytes): occupancy of one block slot. The object id
//!   is a 64-byte zero-padded buffer; the last byte is always zero.
//! - Group status record (variable): membership and failure count of an
//!   HA group.
//!
//! The store and group status records carry a CRC32C over the bytes that
//! precede the checksum field.

use crate::layout::{BLOCK_SIZE, NUM_BLOCKS};
use bytes::{Buf, BufMut, BytesMut};
use gridstore_common::{Error, Result, StoreId};

/// Store record magic ("GSTR")
pub const STORE_RECORD_MAGIC: u32 = 0x4753_5452;

/// Store record size in bytes
pub const STORE_RECORD_SIZE: usize = 64;

/// Offset of the checksum within the store record: magic(4) + store_id(4) +
/// total_blocks(4) + block_size(4) + used_blocks(4) + replica_of(8) +
/// ha_group_id(8) + is_replica(1) + is_destroyed(1) + padding(2) = 40
const STORE_CHECKSUM_OFFSET: usize = 40;

/// Block record size in bytes
pub const BLOCK_RECORD_SIZE: usize = 80;

/// Width of the encoded object id buffer
pub const OBJECT_ID_WIDTH: usize = 64;

/// Group status record magic ("GHAS")
pub const GROUP_STATUS_MAGIC: u32 = 0x4748_4153;

/// Exact size of a store's metadata file
pub const META_FILE_SIZE: usize = STORE_RECORD_SIZE + NUM_BLOCKS * BLOCK_RECORD_SIZE;

// The optional ids are encoded as i64 with -1 meaning "none" so the full
// u32 store-id space round-trips.
fn encode_opt_id(id: Option<StoreId>) -> i64 {
    id.map_or(-1, |s| i64::from(s.get()))
}

fn decode_opt_id(raw: i64) -> Option<StoreId> {
    u32::try_from(raw).ok().map(StoreId::new)
}

/// Identity and redundancy role of a store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreDescriptor {
    pub store_id: StoreId,
    pub total_blocks: u32,
    pub block_size: u32,
    pub used_blocks: u32,
    /// True on the clone side of a replica pair
    pub is_replica: bool,
    /// Paired store, if any
    pub replica_of: Option<StoreId>,
    /// HA group membership, if any
    pub ha_group_id: Option<StoreId>,
    pub is_destroyed: bool,
}

impl StoreDescriptor {
    /// Create a fresh descriptor for a newly initialized store
    #[must_use]
    pub fn new(store_id: StoreId) -> Self {
        Self {
            store_id,
            total_blocks: NUM_BLOCKS as u32,
            block_size: BLOCK_SIZE as u32,
            used_blocks: 0,
            is_replica: false,
            replica_of: None,
            ha_group_id: None,
            is_destroyed: false,
        }
    }

    /// Serialize to a fixed-size record
    #[must_use]
    pub fn to_bytes(&self) -> [u8; STORE_RECORD_SIZE] {
        let mut buf = [0u8; STORE_RECORD_SIZE];
        {
            let mut cursor = &mut buf[..];
            cursor.put_u32_le(STORE_RECORD_MAGIC);
            cursor.put_u32_le(self.store_id.get());
            cursor.put_u32_le(self.total_blocks);
            cursor.put_u32_le(self.block_size);
            cursor.put_u32_le(self.used_blocks);
            cursor.put_i64_le(encode_opt_id(self.replica_of));
            cursor.put_i64_le(encode_opt_id(self.ha_group_id));
            cursor.put_u8(self.is_replica as u8);
            cursor.put_u8(self.is_destroyed as u8);
        }
        let checksum = crc32c::crc32c(&buf[..STORE_CHECKSUM_OFFSET]);
        buf[STORE_CHECKSUM_OFFSET..STORE_CHECKSUM_OFFSET + 4]
            .copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Parse from a fixed-size record
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < STORE_RECORD_SIZE {
            return Err(Error::corrupt("store record too small"));
        }

        let mut buf = &data[..STORE_RECORD_SIZE];
        let magic = buf.get_u32_le();
        if magic != STORE_RECORD_MAGIC {
            return Err(Error::corrupt("invalid store record magic"));
        }

        let store_id = StoreId::new(buf.get_u32_le());
        let total_blocks = buf.get_u32_le();
        let block_size = buf.get_u32_le();
        let used_blocks = buf.get_u32_le();
        let replica_of = decode_opt_id(buf.get_i64_le());
        let ha_group_id = decode_opt_id(buf.get_i64_le());
        let is_replica = buf.get_u8() != 0;
        let is_destroyed = buf.get_u8() != 0;

        let stored = u32::from_le_bytes(
            data[STORE_CHECKSUM_OFFSET..STORE_CHECKSUM_OFFSET + 4]
                .try_into()
                .unwrap(),
        );
        if crc32c::crc32c(&data[..STORE_CHECKSUM_OFFSET]) != stored {
            return Err(Error::corrupt("store record checksum mismatch"));
        }

        Ok(Self {
            store_id,
            total_blocks,
            block_size,
            used_blocks,
            is_replica,
            replica_of,
            ha_group_id,
            is_destroyed,
        })
    }

    /// Human-readable reliability status, as shown by `list`
    #[must_use]
    pub fn status_text(&self) -> String {
        let mut parts = Vec::new();
        if self.is_destroyed {
            parts.push("destroyed".to_string());
        }
        if self.is_replica {
            if let Some(pair) = self.replica_of {
                parts.push(format!("replica of {pair}"));
            }
        }
        if let Some(group) = self.ha_group_id {
            parts.push(format!("ha-group={group}"));
        }
        if parts.is_empty() {
            "active".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Occupancy of one block slot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub is_used: bool,
    /// Object held by this block; empty when the block is free
    pub object_id: String,
    /// Significant bytes within the block slot
    pub data_size: u32,
    /// Seconds since epoch of the last write
    pub timestamp: u64,
}

impl BlockDescriptor {
    /// Serialize to a fixed-size record
    pub fn to_bytes(&self) -> Result<[u8; BLOCK_RECORD_SIZE]> {
        if self.object_id.len() >= OBJECT_ID_WIDTH {
            return Err(Error::invalid_argument(format!(
                "object id exceeds {} bytes: {}",
                OBJECT_ID_WIDTH - 1,
                self.object_id
            )));
        }
        let mut buf = [0u8; BLOCK_RECORD_SIZE];
        {
            let mut cursor = &mut buf[..];
            cursor.put_u8(self.is_used as u8);
            cursor.put_bytes(0, 3);
            cursor.put_u32_le(self.data_size);
            cursor.put_u64_le(self.timestamp);
        }
        buf[16..16 + self.object_id.len()].copy_from_slice(self.object_id.as_bytes());
        Ok(buf)
    }

    /// Parse from a fixed-size record
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < BLOCK_RECORD_SIZE {
            return Err(Error::corrupt("block record too small"));
        }

        let mut buf = &data[..BLOCK_RECORD_SIZE];
        let is_used = buf.get_u8() != 0;
        buf.advance(3);
        let data_size = buf.get_u32_le();
        let timestamp = buf.get_u64_le();

        let id_bytes = &data[16..16 + OBJECT_ID_WIDTH];
        let id_len = id_bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::corrupt("unterminated object id in block record"))?;
        let object_id = std::str::from_utf8(&id_bytes[..id_len])
            .map_err(|_| Error::corrupt("non-UTF-8 object id in block record"))?
            .to_string();

        if data_size as usize > BLOCK_SIZE {
            return Err(Error::corrupt("block record data size exceeds block size"));
        }

        Ok(Self {
            is_used,
            object_id,
            data_size,
            timestamp,
        })
    }
}

/// Membership and failure count of an HA group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupStatus {
    /// Equals the first member's store id
    pub group_id: StoreId,
    /// Members marked destroyed so far
    pub destroyed_count: u32,
    /// Member store ids, in creation order
    pub members: Vec<StoreId>,
}

impl GroupStatus {
    /// Serialize: magic, group_id, store_count, destroyed_count,
    /// member_ids, trailing CRC32C
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(20 + self.members.len() * 4);
        buf.put_u32_le(GROUP_STATUS_MAGIC);
        buf.put_u32_le(self.group_id.get());
        buf.put_u32_le(self.members.len() as u32);
        buf.put_u32_le(self.destroyed_count);
        for member in &self.members {
            buf.put_u32_le(member.get());
        }
        let checksum = crc32c::crc32c(&buf);
        buf.put_u32_le(checksum);
        buf.to_vec()
    }

    /// Parse a status record
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 20 {
            return Err(Error::corrupt("group status record too small"));
        }

        let mut buf = data;
        let magic = buf.get_u32_le();
        if magic != GROUP_STATUS_MAGIC {
            return Err(Error::corrupt("invalid group status magic"));
        }
        let group_id = StoreId::new(buf.get_u32_le());
        let store_count = buf.get_u32_le() as usize;
        let destroyed_count = buf.get_u32_le();

        let expected = 16 + store_count * 4 + 4;
        if data.len() < expected {
            return Err(Error::corrupt("group status record truncated"));
        }

        let mut members = Vec::with_capacity(store_count);
        for _ in 0..store_count {
            members.push(StoreId::new(buf.get_u32_le()));
        }

        let stored = buf.get_u32_le();
        if crc32c::crc32c(&data[..expected - 4]) != stored {
            return Err(Error::corrupt("group status checksum mismatch"));
        }

        Ok(Self {
            group_id,
            destroyed_count,
            members,
        })
    }
}
