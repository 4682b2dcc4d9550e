//! Gridstore Storage Engine
//!
//! A local, file-backed object store. Each store is a fault-isolated
//! container: a directory with a pre-sized data file laid out as a fixed
//! grid of 1 MiB blocks, and a metadata file of fixed-width records. One
//! block holds at most one object.
//!
//! Stores compose into two redundancy arrangements:
//! - Replica pairs: two stores kept bytewise identical, either side can
//!   serve reads when the other is lost.
//! - HA groups: N >= 2 stores plus an XOR parity file, tolerating the
//!   loss of exactly one member via reconstruction.
//!
//! All I/O is synchronous and blocking; commands are expected to run as
//! short-lived processes. Per-store advisory locks serialize cooperating
//! mutators.

pub mod codec;
pub mod container;
pub mod ha;
pub mod layout;
pub mod lock;
pub mod ops;
pub mod placement;
pub mod replica;

// Re-exports
pub use codec::{BlockDescriptor, GroupStatus, StoreDescriptor};
pub use container::Container;
pub use layout::{PathLayout, BLOCK_SIZE, DATA_FILE_SIZE, NUM_BLOCKS};
pub use lock::StoreLock;
pub use ops::Engine;
