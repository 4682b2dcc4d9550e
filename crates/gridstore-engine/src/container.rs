//! Store container
//!
//! A store is a directory holding one pre-sized data file and one metadata
//! file. The data file is a fixed grid of `NUM_BLOCKS` slots of
//! `BLOCK_SIZE` bytes; block `k` lives at offset `k * BLOCK_SIZE`. The
//! metadata file is one store record followed by `NUM_BLOCKS` block
//! records.
//!
//! Metadata saves are atomic: the new contents are written to a temp file
//! in the store directory and renamed over the old file.

use crate::codec::{
    BlockDescriptor, StoreDescriptor, BLOCK_RECORD_SIZE, META_FILE_SIZE, STORE_RECORD_SIZE,
};
use crate::layout::{PathLayout, BLOCK_SIZE, DATA_FILE_SIZE, NUM_BLOCKS};
use bytes::BytesMut;
use gridstore_common::{Error, Result, StoreId};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::FileExt;
use tracing::debug;

/// Handle to one store's on-disk files
pub struct Container<'a> {
    layout: &'a PathLayout,
    id: StoreId,
}

impl<'a> Container<'a> {
    pub fn new(layout: &'a PathLayout, id: StoreId) -> Self {
        Self { layout, id }
    }

    /// The store id this container addresses
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Check whether the store directory exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.layout.store_exists(self.id)
    }

    /// Create the store: directory, zeroed data file of exact size, and a
    /// metadata file with a fresh store record and blank block records.
    ///
    /// Fails with `StoreExists` if the directory already exists. Any files
    /// created before a failure are removed before the error returns.
    pub fn create(&self) -> Result<()> {
        if self.exists() {
            return Err(Error::StoreExists(self.id));
        }

        let dir = self.layout.store_dir(self.id);
        fs::create_dir_all(&dir)?;

        let result = (|| -> Result<()> {
            let data = File::create(self.layout.data_path(self.id))?;
            data.set_len(DATA_FILE_SIZE)?;
            data.sync_all()?;

            let descriptor = StoreDescriptor::new(self.id);
            let blocks = vec![BlockDescriptor::default(); NUM_BLOCKS];
            self.save(&descriptor, &blocks)
        })();

        if let Err(e) = result {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }

        debug!(store = %self.id, "created store container");
        Ok(())
    }

    /// Load the store record and all block records
    pub fn load(&self) -> Result<(StoreDescriptor, Vec<BlockDescriptor>)> {
        let data = fs::read(self.layout.metadata_path(self.id))?;
        if data.len() < META_FILE_SIZE {
            return Err(Error::corrupt(format!(
                "metadata file of store {} truncated: {} of {} bytes",
                self.id,
                data.len(),
                META_FILE_SIZE
            )));
        }

        let descriptor = StoreDescriptor::from_bytes(&data[..STORE_RECORD_SIZE])?;
        let mut blocks = Vec::with_capacity(NUM_BLOCKS);
        for k in 0..NUM_BLOCKS {
            let start = STORE_RECORD_SIZE + k * BLOCK_RECORD_SIZE;
            blocks.push(BlockDescriptor::from_bytes(
                &data[start..start + BLOCK_RECORD_SIZE],
            )?);
        }

        Ok((descriptor, blocks))
    }

    /// Load only the store record
    pub fn load_descriptor(&self) -> Result<StoreDescriptor> {
        let mut file = File::open(self.layout.metadata_path(self.id))?;
        let mut buf = [0u8; STORE_RECORD_SIZE];
        file.read_exact(&mut buf)
            .map_err(|_| Error::corrupt(format!("metadata file of store {} truncated", self.id)))?;
        StoreDescriptor::from_bytes(&buf)
    }

    /// Atomically overwrite the metadata file
    pub fn save(&self, descriptor: &StoreDescriptor, blocks: &[BlockDescriptor]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(META_FILE_SIZE);
        buf.extend_from_slice(&descriptor.to_bytes());
        for block in blocks {
            buf.extend_from_slice(&block.to_bytes()?);
        }

        let path = self.layout.metadata_path(self.id);
        let tmp_path = path.with_extension("bin.tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&buf)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Read `len` bytes from the start of block `k`
    pub fn read_block(&self, k: usize, len: usize) -> Result<Vec<u8>> {
        if k >= NUM_BLOCKS {
            return Err(Error::invalid_argument(format!(
                "block index {k} out of range"
            )));
        }
        if len > BLOCK_SIZE {
            return Err(Error::invalid_argument(format!(
                "read length {len} exceeds block size"
            )));
        }

        let file = File::open(self.layout.data_path(self.id))?;
        let mut buf = vec![0u8; len];
        file.read_exact_at(&mut buf, (k * BLOCK_SIZE) as u64)?;
        Ok(buf)
    }

    /// Write `payload` at the start of block `k`, leaving the remainder of
    /// the slot as it was
    pub fn write_block(&self, k: usize, payload: &[u8]) -> Result<()> {
        if k >= NUM_BLOCKS {
            return Err(Error::invalid_argument(format!(
                "block index {k} out of range"
            )));
        }
        if payload.len() > BLOCK_SIZE {
            return Err(Error::invalid_argument(format!(
                "payload of {} bytes exceeds block size",
                payload.len()
            )));
        }

        let file = OpenOptions::new()
            .write(true)
            .open(self.layout.data_path(self.id))?;
        file.write_all_at(payload, (k * BLOCK_SIZE) as u64)?;
        file.sync_data()?;
        Ok(())
    }

    /// Remove the store directory and everything in it
    pub fn remove(&self) -> Result<()> {
        fs::remove_dir_all(self.layout.store_dir(self.id))?;
        debug!(store = %self.id, "removed store container");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_load() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let container = Container::new(&layout, StoreId::new(0));

        container.create().unwrap();
        assert!(container.exists());

        let (descriptor, blocks) = container.load().unwrap();
        assert_eq!(descriptor.store_id, StoreId::new(0));
        assert_eq!(descriptor.used_blocks, 0);
        assert!(!descriptor.is_replica);
        assert!(descriptor.replica_of.is_none());
        assert!(descriptor.ha_group_id.is_none());
        assert!(!descriptor.is_destroyed);
        assert_eq!(blocks.len(), NUM_BLOCKS);
        assert!(blocks.iter().all(|b| !b.is_used));
    }

    #[test]
    fn test_create_fails_if_exists() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let container = Container::new(&layout, StoreId::new(0));

        container.create().unwrap();
        assert!(matches!(container.create(), Err(Error::StoreExists(_))));
    }

    #[test]
    fn test_data_file_has_exact_size() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let id = StoreId::new(1);
        Container::new(&layout, id).create().unwrap();

        let meta = fs::metadata(layout.data_path(id)).unwrap();
        assert_eq!(meta.len(), DATA_FILE_SIZE);
    }

    #[test]
    fn test_block_write_read() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let container = Container::new(&layout, StoreId::new(2));
        container.create().unwrap();

        container.write_block(3, b"hello blocks").unwrap();
        let read = container.read_block(3, 12).unwrap();
        assert_eq!(read, b"hello blocks");

        // The rest of the slot stays zeroed.
        let tail = container.read_block(3, 64).unwrap();
        assert_eq!(&tail[..12], b"hello blocks");
        assert!(tail[12..].iter().all(|&b| b == 0));

        // Neighboring blocks are untouched.
        let neighbor = container.read_block(4, 16).unwrap();
        assert!(neighbor.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let container = Container::new(&layout, StoreId::new(3));
        container.create().unwrap();

        let (mut descriptor, mut blocks) = container.load().unwrap();
        descriptor.used_blocks = 1;
        blocks[0] = BlockDescriptor {
            is_used: true,
            object_id: "1732780800000_9999".to_string(),
            data_size: 42,
            timestamp: 1_732_780_800,
        };
        container.save(&descriptor, &blocks).unwrap();

        let (descriptor2, blocks2) = container.load().unwrap();
        assert_eq!(descriptor2, descriptor);
        assert_eq!(blocks2[0], blocks[0]);
        assert!(!blocks2[1].is_used);

        // No temp file left behind.
        assert!(!layout
            .metadata_path(StoreId::new(3))
            .with_extension("bin.tmp")
            .exists());
    }

    #[test]
    fn test_truncated_metadata_is_corrupt() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let id = StoreId::new(4);
        let container = Container::new(&layout, id);
        container.create().unwrap();

        let path = layout.metadata_path(id);
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() / 2]).unwrap();

        assert!(matches!(container.load(), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_out_of_range_block() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let container = Container::new(&layout, StoreId::new(5));
        container.create().unwrap();

        assert!(container.read_block(NUM_BLOCKS, 1).is_err());
        assert!(container.write_block(NUM_BLOCKS, b"x").is_err());
    }
}
