use std::fmt;

use jbod::{Block, BLOCKS_PER_DISK, BLOCK_SIZE, NUM_DISKS};

use crate::error::{RaidError, Result};

/// Smallest cache worth having.
pub const MIN_CACHE_ENTRIES: usize = 2;
/// Upper bound keeps the linear scans cheap.
pub const MAX_CACHE_ENTRIES: usize = 4096;

struct Slot {
    disk: usize,
    block: usize,
    data: Block,
    valid: bool,
    accesses: u64,
}

impl Slot {
    fn empty() -> Self {
        Slot {
            disk: 0,
            block: 0,
            data: [0; BLOCK_SIZE],
            valid: false,
            accesses: 0,
        }
    }

    fn holds(&self, disk: usize, block: usize) -> bool {
        self.valid && self.disk == disk && self.block == block
    }
}

/// Fixed-capacity cache of whole device blocks keyed by `(disk, block)`.
///
/// Eviction is least-frequently-used by cumulative access count, not
/// recency: a block accessed many times long ago outranks one accessed
/// once recently, and there is no decay or aging. That makes the policy
/// vulnerable to pollution by historically hot blocks, which is an
/// accepted trade-off for a bounded-size cache with O(capacity) scans.
pub struct BlockCache {
    slots: Vec<Slot>,
    len: usize,
    hits: u64,
    lookups: u64,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < MIN_CACHE_ENTRIES || capacity > MAX_CACHE_ENTRIES {
            return Err(RaidError::InvalidCapacity(capacity));
        }
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot::empty());
        }
        Ok(BlockCache {
            slots,
            len: 0,
            hits: 0,
            lookups: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of valid entries currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Scans for a cached copy of `(disk, block)` and returns it, bumping
    /// the entry's access count. Every call lands in the lookup counter,
    /// hit or miss, so the reported hit rate stays honest even when the
    /// cache is empty.
    pub fn lookup(&mut self, disk: usize, block: usize) -> Option<Block> {
        self.lookups += 1;
        let slot = self.slots.iter_mut().find(|s| s.holds(disk, block))?;
        slot.accesses += 1;
        self.hits += 1;
        Some(slot.data)
    }

    /// Caches a block that is not yet present. A valid entry under the
    /// same key is an error rather than a silent overwrite; refreshing an
    /// existing entry goes through [`BlockCache::update`]. When full, the
    /// entry with the smallest access count is evicted, the lowest slot
    /// index winning ties.
    pub fn insert(&mut self, disk: usize, block: usize, data: &Block) -> Result<()> {
        if disk >= NUM_DISKS || block >= BLOCKS_PER_DISK {
            return Err(RaidError::InvalidAddress { disk, block });
        }
        if self.slots.iter().any(|s| s.holds(disk, block)) {
            return Err(RaidError::DuplicateEntry { disk, block });
        }

        // Not full: the first invalid slot takes the entry. Full: the
        // least-frequently-used victim is overwritten in place.
        let idx = match self.slots.iter().position(|s| !s.valid) {
            Some(idx) if self.len < self.slots.len() => {
                self.len += 1;
                idx
            }
            _ => self.victim_index(),
        };

        let slot = &mut self.slots[idx];
        slot.disk = disk;
        slot.block = block;
        slot.data = *data;
        slot.accesses = 1;
        slot.valid = true;
        Ok(())
    }

    /// Refreshes the entry whose disk and block both match, resetting its
    /// access count to 1. Returns whether such an entry existed.
    pub fn update(&mut self, disk: usize, block: usize, data: &Block) -> bool {
        match self.slots.iter_mut().find(|s| s.holds(disk, block)) {
            Some(slot) => {
                slot.data = *data;
                slot.accesses = 1;
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            lookups: self.lookups,
        }
    }

    fn victim_index(&self) -> usize {
        let mut victim = 0;
        let mut fewest = u64::MAX;
        for (i, slot) in self.slots.iter().enumerate() {
            // Strict comparison keeps the lowest index among ties.
            if slot.accesses < fewest {
                fewest = slot.accesses;
                victim = i;
            }
        }
        victim
    }
}

/// Hit-rate counters, exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub lookups: u64,
}

impl CacheStats {
    /// Hit percentage over every lookup ever issued, 0 before the first.
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            return 0.0;
        }
        100.0 * self.hits as f64 / self.lookups as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "num_hits: {}, num_queries: {}, hit rate: {:5.1}%",
            self.hits,
            self.lookups,
            self.hit_rate()
        )
    }
}
