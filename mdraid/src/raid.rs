use jbod::{Block, Instruction, JbodDevice, BLOCKS_PER_DISK, BLOCK_SIZE, DISK_SIZE, TOTAL_SIZE};
use log::{debug, info};

use crate::cache::{BlockCache, CacheStats};
use crate::error::{RaidError, Result};
use crate::session::{Permission, Session};

/// Largest single transfer the controller accepts, in bytes.
pub const MAX_IO_LEN: usize = 2048;

/// Linear I/O translation engine: presents the disk array as one flat,
/// byte-addressable space and turns every byte-range request into the
/// disk-seek, block-seek and whole-block operations the device actually
/// understands. Sub-block writes are handled by read-modify-write so the
/// untouched bytes of a block survive.
///
/// The engine owns the device, the session flags and the optional block
/// cache outright, so independent arrays are just independent `Raid`
/// values. Nothing here is synchronized; a caller that wants concurrent
/// access puts the whole engine behind one lock, since the device's seek
/// cursors are inherently sequential.
pub struct Raid<D: JbodDevice> {
    dev: D,
    session: Session,
    cache: Option<BlockCache>,
}

impl<D: JbodDevice> Raid<D> {
    pub fn new(dev: D) -> Self {
        Raid {
            dev,
            session: Session::new(),
            cache: None,
        }
    }

    /// Returns ownership of the underlying device to the caller.
    pub fn into_device(self) -> D {
        self.dev
    }

    pub fn mount(&mut self) -> Result<()> {
        self.session.mount(&mut self.dev)
    }

    pub fn unmount(&mut self) -> Result<()> {
        self.session.unmount(&mut self.dev)
    }

    pub fn grant_write_permission(&mut self) -> Permission {
        self.session.grant_write(&mut self.dev)
    }

    pub fn revoke_write_permission(&mut self) {
        self.session.revoke_write(&mut self.dev)
    }

    /// Attaches a block cache that reads will consult before touching the
    /// device. Only one cache may exist at a time.
    pub fn attach_cache(&mut self, capacity: usize) -> Result<()> {
        if self.cache.is_some() {
            return Err(RaidError::CacheExists);
        }
        self.cache = Some(BlockCache::new(capacity)?);
        info!("block cache attached, capacity {}", capacity);
        Ok(())
    }

    /// Drops the cache, reporting its final counters.
    pub fn detach_cache(&mut self) -> Result<CacheStats> {
        let cache = self.cache.take().ok_or(RaidError::NoCache)?;
        let stats = cache.stats();
        info!("block cache detached: {}", stats);
        Ok(stats)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Reads `buf.len()` bytes starting at linear address `start_addr`,
    /// returning how many were read. An empty buffer reads nothing.
    pub fn read(&mut self, start_addr: usize, buf: &mut [u8]) -> Result<usize> {
        if !self.session.is_mounted() {
            return Err(RaidError::NotMounted);
        }
        let len = buf.len();
        if len > MAX_IO_LEN {
            return Err(RaidError::RequestTooLarge(len));
        }
        // Checked: a start address near usize::MAX must be rejected, not
        // wrapped into a small in-range one.
        match start_addr.checked_add(len) {
            Some(end) if end <= TOTAL_SIZE => {}
            _ => return Err(RaidError::OutOfBounds(start_addr.saturating_add(len))),
        }
        if len == 0 {
            return Ok(0);
        }

        let end_addr = start_addr + len - 1;
        let first_disk = start_addr / DISK_SIZE;
        let last_disk = end_addr / DISK_SIZE;

        let mut addr = start_addr;
        let mut copied = 0;

        for disk in first_disk..=last_disk {
            // On the first disk the range starts mid-disk; every later
            // disk is entered at its block 0.
            let start_block = addr / BLOCK_SIZE % BLOCKS_PER_DISK;
            self.seek(disk, start_block);
            // The device advances its block cursor after each block read,
            // so sequential misses need no reseeking. A cache hit skips
            // the device and leaves the cursor behind.
            let mut cursor_synced = true;

            let disk_last = end_addr.min((disk + 1) * DISK_SIZE - 1);
            while addr <= disk_last {
                let block = addr / BLOCK_SIZE % BLOCKS_PER_DISK;
                let offset = addr % BLOCK_SIZE;
                let count = (BLOCK_SIZE - offset).min(disk_last - addr + 1);

                let data = match self.cache_lookup(disk, block) {
                    Some(cached) => {
                        cursor_synced = false;
                        cached
                    }
                    None => {
                        if !cursor_synced {
                            self.dev
                                .execute(Instruction::seek_to_block(block).encode(), None);
                            cursor_synced = true;
                        }
                        let mut data: Block = [0; BLOCK_SIZE];
                        self.dev
                            .execute(Instruction::read_block().encode(), Some(&mut data));
                        self.cache_fill(disk, block, &data);
                        data
                    }
                };

                buf[copied..copied + count].copy_from_slice(&data[offset..offset + count]);
                addr += count;
                copied += count;
            }
        }

        debug!("read {} bytes at address {}", copied, start_addr);
        Ok(copied)
    }

    /// Writes `buf` starting at linear address `start_addr`, returning how
    /// many bytes were written. Blocks only partially covered by the
    /// request are read first and merged, so their untouched bytes are
    /// preserved. An empty buffer is a legal no-op.
    pub fn write(&mut self, start_addr: usize, buf: &[u8]) -> Result<usize> {
        if !self.session.can_write() {
            return Err(RaidError::PermissionDenied);
        }
        let len = buf.len();
        if len > MAX_IO_LEN {
            return Err(RaidError::RequestTooLarge(len));
        }
        match start_addr.checked_add(len) {
            Some(end) if end <= TOTAL_SIZE => {}
            _ => return Err(RaidError::OutOfBounds(start_addr.saturating_add(len))),
        }
        if !self.session.is_mounted() {
            return Err(RaidError::NotMounted);
        }
        if len == 0 {
            return Ok(0);
        }

        let end_addr = start_addr + len - 1;
        // Whole-array block indices, disks laid end to end.
        let first_block = start_addr / BLOCK_SIZE;
        let last_block = end_addr / BLOCK_SIZE;

        let mut cur_disk = first_block / BLOCKS_PER_DISK;
        self.seek(cur_disk, first_block % BLOCKS_PER_DISK);

        let mut addr = start_addr;
        let mut written = 0;

        for abs_block in first_block..=last_block {
            let disk = abs_block / BLOCKS_PER_DISK;
            let block = abs_block % BLOCKS_PER_DISK;
            if disk != cur_disk {
                cur_disk = disk;
                self.seek(disk, block);
            }

            // Read-modify-write: fetch the block's current content before
            // splicing, since a device write replaces the whole block.
            // The entry loop invariant leaves the device cursor on
            // `block`, which a device read then advances past; seek back
            // before the write below.
            let mut data = match self.cache_lookup(disk, block) {
                Some(cached) => cached,
                None => {
                    let mut data: Block = [0; BLOCK_SIZE];
                    self.dev
                        .execute(Instruction::read_block().encode(), Some(&mut data));
                    self.dev
                        .execute(Instruction::seek_to_block(block).encode(), None);
                    data
                }
            };

            let offset = addr % BLOCK_SIZE;
            let count = (BLOCK_SIZE - offset).min(end_addr - addr + 1);
            data[offset..offset + count].copy_from_slice(&buf[written..written + count]);

            self.dev
                .execute(Instruction::write_block().encode(), Some(&mut data));
            // The write advanced the cursor onto the next block, which is
            // exactly where the next iteration of this loop expects it.

            self.cache_store(disk, block, &data);
            addr += count;
            written += count;
        }

        debug!("wrote {} bytes at address {}", written, start_addr);
        Ok(written)
    }

    fn seek(&mut self, disk: usize, block: usize) {
        self.dev
            .execute(Instruction::seek_to_disk(disk).encode(), None);
        self.dev
            .execute(Instruction::seek_to_block(block).encode(), None);
    }

    fn cache_lookup(&mut self, disk: usize, block: usize) -> Option<Block> {
        self.cache.as_mut().and_then(|c| c.lookup(disk, block))
    }

    /// Caches a block just fetched from the device. The preceding lookup
    /// missed, so the insert cannot collide.
    fn cache_fill(&mut self, disk: usize, block: usize, data: &Block) {
        if let Some(cache) = self.cache.as_mut() {
            let _ = cache.insert(disk, block, data);
        }
    }

    /// Keeps the cache coherent with a block that just hit the device:
    /// refresh the existing entry, or admit the block if it is new.
    fn cache_store(&mut self, disk: usize, block: usize, data: &Block) {
        if let Some(cache) = self.cache.as_mut() {
            if !cache.update(disk, block, data) {
                let _ = cache.insert(disk, block, data);
            }
        }
    }
}
