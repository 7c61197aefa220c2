use std::fs::File;
use std::io::prelude::*;
use std::io::{BufWriter, SeekFrom};

use log::warn;

use crate::{Block, Instruction, JbodDevice, Op, BLOCKS_PER_DISK, BLOCK_SIZE, NUM_DISKS, TOTAL_SIZE};

const STATUS_OK: i32 = 0;
const STATUS_ERR: i32 = -1;

/// Emulates the JBOD array in userspace using a file as block storage.
/// This is only meant to be used for controller development and testing.
///
/// The emulator models the full device contract: the mount gate, the
/// write-permission gate, both seek cursors, and the rule that a block
/// read or write advances the block cursor by one. Seeking to a disk
/// rewinds the block cursor to zero.
pub struct FileJbodEmulator {
    /// A fixed-size file of exactly `TOTAL_SIZE` bytes, disks laid out
    /// back to back.
    fd: File,
    mounted: bool,
    write_allowed: bool,
    cur_disk: usize,
    /// May run one past the last block after reading or writing the end
    /// of a disk; the next block operation then fails instead of wrapping.
    cur_block: usize,
}

impl FileJbodEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn byte_offset(&self) -> u64 {
        ((self.cur_disk * BLOCKS_PER_DISK + self.cur_block) * BLOCK_SIZE) as u64
    }

    fn read_current_block(&mut self, buf: &mut Block) -> std::io::Result<()> {
        let offset = self.byte_offset();
        self.fd.seek(SeekFrom::Start(offset))?;
        self.fd.read_exact(buf)?;
        Ok(())
    }

    fn write_current_block(&mut self, buf: &Block) -> std::io::Result<()> {
        let offset = self.byte_offset();
        self.fd.seek(SeekFrom::Start(offset))?;
        self.fd.write_all(buf)?;
        Ok(())
    }
}

impl JbodDevice for FileJbodEmulator {
    fn execute(&mut self, word: u32, block: Option<&mut Block>) -> i32 {
        let instr = match Instruction::decode(word) {
            Some(instr) => instr,
            None => {
                warn!("rejecting malformed instruction word {:#010x}", word);
                return STATUS_ERR;
            }
        };

        // The mount gate covers everything except mount itself and the
        // permission operations.
        match instr.op {
            Op::Mount | Op::WritePermission | Op::RevokeWritePermission => {}
            _ if !self.mounted => return STATUS_ERR,
            _ => {}
        }

        match instr.op {
            Op::Mount => {
                if self.mounted {
                    return STATUS_ERR;
                }
                self.mounted = true;
                STATUS_OK
            }
            Op::Unmount => {
                self.mounted = false;
                STATUS_OK
            }
            Op::WritePermission => {
                self.write_allowed = true;
                STATUS_OK
            }
            Op::RevokeWritePermission => {
                self.write_allowed = false;
                STATUS_OK
            }
            Op::SeekToDisk => {
                if usize::from(instr.disk) >= NUM_DISKS {
                    return STATUS_ERR;
                }
                self.cur_disk = usize::from(instr.disk);
                self.cur_block = 0;
                STATUS_OK
            }
            Op::SeekToBlock => {
                self.cur_block = usize::from(instr.block);
                STATUS_OK
            }
            Op::ReadBlock => {
                if self.cur_block >= BLOCKS_PER_DISK {
                    return STATUS_ERR;
                }
                let buf = match block {
                    Some(buf) => buf,
                    None => return STATUS_ERR,
                };
                if self.read_current_block(buf).is_err() {
                    return STATUS_ERR;
                }
                self.cur_block += 1;
                STATUS_OK
            }
            Op::WriteBlock => {
                if !self.write_allowed || self.cur_block >= BLOCKS_PER_DISK {
                    return STATUS_ERR;
                }
                let buf = match block {
                    Some(buf) => buf,
                    None => return STATUS_ERR,
                };
                if self.write_current_block(buf).is_err() {
                    return STATUS_ERR;
                }
                self.cur_block += 1;
                STATUS_OK
            }
        }
    }
}

pub struct FileJbodEmulatorBuilder {
    fd: File,
}

impl From<File> for FileJbodEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileJbodEmulatorBuilder { fd }
    }
}

impl FileJbodEmulatorBuilder {
    /// This builder assumes ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Additionally,
    /// ownership of the file is transferred to the emulator meaning this
    /// builder can only be used to create one emulator.
    pub fn build(mut self) -> std::io::Result<FileJbodEmulator> {
        self.zero_disks()?;
        Ok(FileJbodEmulator {
            fd: self.fd,
            mounted: false,
            write_allowed: false,
            cur_disk: 0,
            cur_block: 0,
        })
    }

    fn zero_disks(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out every "disk" block, buffering each write to prevent
        // excessive syscalls.
        for _ in 0..TOTAL_SIZE / BLOCK_SIZE {
            bfd.write_all(&[0u8; BLOCK_SIZE])?;
        }
        bfd.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_emulator() -> FileJbodEmulator {
        let fd = tempfile::tempfile().unwrap();
        FileJbodEmulatorBuilder::from(fd)
            .build()
            .expect("failed to allocate jbod backing file")
    }

    fn mounted_emulator() -> FileJbodEmulator {
        let mut emu = test_emulator();
        assert_eq!(emu.execute(Instruction::control(Op::Mount).encode(), None), 0);
        emu
    }

    #[test]
    fn emulator_allocates_correct_num_bytes() {
        let emu = test_emulator();
        assert_eq!(emu.into_file().metadata().unwrap().len(), TOTAL_SIZE as u64);
    }

    #[test]
    fn block_ops_require_a_mounted_array() {
        let mut emu = test_emulator();
        let mut block: Block = [0; BLOCK_SIZE];
        assert_eq!(emu.execute(Instruction::read_block().encode(), Some(&mut block)), -1);
        assert_eq!(emu.execute(Instruction::seek_to_disk(1).encode(), None), -1);

        assert_eq!(emu.execute(Instruction::control(Op::Mount).encode(), None), 0);
        assert_eq!(emu.execute(Instruction::read_block().encode(), Some(&mut block)), 0);
    }

    #[test]
    fn mounting_twice_fails() {
        let mut emu = mounted_emulator();
        assert_eq!(emu.execute(Instruction::control(Op::Mount).encode(), None), -1);
    }

    #[test]
    fn writes_require_permission() {
        let mut emu = mounted_emulator();
        let mut block: Block = [0x55; BLOCK_SIZE];
        assert_eq!(emu.execute(Instruction::write_block().encode(), Some(&mut block)), -1);

        assert_eq!(emu.execute(Instruction::control(Op::WritePermission).encode(), None), 0);
        assert_eq!(emu.execute(Instruction::write_block().encode(), Some(&mut block)), 0);

        assert_eq!(
            emu.execute(Instruction::control(Op::RevokeWritePermission).encode(), None),
            0
        );
        assert_eq!(emu.execute(Instruction::write_block().encode(), Some(&mut block)), -1);
    }

    #[test]
    fn blocks_round_trip_through_the_backing_file() {
        let mut emu = mounted_emulator();
        emu.execute(Instruction::control(Op::WritePermission).encode(), None);

        let mut block: Block = [0x55; BLOCK_SIZE];
        emu.execute(Instruction::seek_to_disk(2).encode(), None);
        emu.execute(Instruction::seek_to_block(7).encode(), None);
        assert_eq!(emu.execute(Instruction::write_block().encode(), Some(&mut block)), 0);

        let mut readback: Block = [0; BLOCK_SIZE];
        emu.execute(Instruction::seek_to_disk(2).encode(), None);
        emu.execute(Instruction::seek_to_block(7).encode(), None);
        assert_eq!(emu.execute(Instruction::read_block().encode(), Some(&mut readback)), 0);
        assert_eq!(readback[..], block[..]);

        // A neighboring block is still zero-filled.
        emu.execute(Instruction::seek_to_block(8).encode(), None);
        assert_eq!(emu.execute(Instruction::read_block().encode(), Some(&mut readback)), 0);
        assert_eq!(readback[..], [0u8; BLOCK_SIZE][..]);
    }

    #[test]
    fn block_ops_advance_the_block_cursor() {
        let mut emu = mounted_emulator();
        emu.execute(Instruction::control(Op::WritePermission).encode(), None);

        let mut block: Block = [0xaa; BLOCK_SIZE];
        emu.execute(Instruction::seek_to_block(3).encode(), None);
        emu.execute(Instruction::write_block().encode(), Some(&mut block));

        // No reseek: the cursor moved on to block 4.
        let mut readback: Block = [0; BLOCK_SIZE];
        emu.execute(Instruction::seek_to_block(3).encode(), None);
        emu.execute(Instruction::read_block().encode(), Some(&mut readback));
        assert_eq!(readback[..], block[..]);
        readback = [0; BLOCK_SIZE];
        assert_eq!(emu.execute(Instruction::read_block().encode(), Some(&mut readback)), 0);
        assert_eq!(readback[..], [0u8; BLOCK_SIZE][..]);
    }

    #[test]
    fn reading_past_the_last_block_fails() {
        let mut emu = mounted_emulator();
        let mut block: Block = [0; BLOCK_SIZE];
        emu.execute(Instruction::seek_to_block(BLOCKS_PER_DISK - 1).encode(), None);
        assert_eq!(emu.execute(Instruction::read_block().encode(), Some(&mut block)), 0);
        assert_eq!(emu.execute(Instruction::read_block().encode(), Some(&mut block)), -1);
    }

    #[test]
    fn seeking_to_a_disk_rewinds_the_block_cursor() {
        let mut emu = mounted_emulator();
        emu.execute(Instruction::control(Op::WritePermission).encode(), None);

        let mut block: Block = [0x11; BLOCK_SIZE];
        emu.execute(Instruction::seek_to_block(5).encode(), None);
        emu.execute(Instruction::seek_to_disk(1).encode(), None);
        emu.execute(Instruction::write_block().encode(), Some(&mut block));

        let mut readback: Block = [0; BLOCK_SIZE];
        emu.execute(Instruction::seek_to_disk(1).encode(), None);
        emu.execute(Instruction::seek_to_block(0).encode(), None);
        emu.execute(Instruction::read_block().encode(), Some(&mut readback));
        assert_eq!(readback[..], block[..]);
    }
}
