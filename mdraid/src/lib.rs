//! A software RAID-like controller over a JBOD disk array.
//!
//! The array only understands per-disk, per-block operations behind the
//! [`jbod::JbodDevice`] primitive; this crate layers a flat,
//! byte-addressable address space on top of it. Three pieces:
//!
//! 1. Session state: mount/unmount and write-permission flags, gating
//!    every data operation.
//! 2. Block cache: a fixed-capacity, access-frequency-evicted cache of
//!    whole blocks keyed by `(disk, block)`.
//! 3. Translation engine ([`Raid`]): byte-range reads and writes
//!    decomposed into seeks and whole-block transfers, with
//!    read-modify-write merging for partial blocks.
//!
//! Despite the name there is no striping, parity or redundancy, and no
//! durability or concurrency guarantee: the controller is a
//! single-threaded address mapper with a caching layer.

mod cache;
mod error;
mod raid;
mod session;

pub use cache::{BlockCache, CacheStats, MAX_CACHE_ENTRIES, MIN_CACHE_ENTRIES};
pub use error::{RaidError, Result};
pub use raid::{Raid, MAX_IO_LEN};
pub use session::{Permission, Session};
