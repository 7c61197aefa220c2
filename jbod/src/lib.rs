//! Device boundary for a JBOD ("just a bunch of disks") array: a fixed
//! bank of fixed-size disks driven through a single instruction-word
//! primitive. The array is stateful, keeping a current-disk and a
//! current-block cursor, and exposes exactly eight operations: mount,
//! unmount, grant/revoke write permission, the two seeks, and whole-block
//! read/write.
//!
//! Controllers consume this boundary through the [`JbodDevice`] trait; a
//! file-backed emulator is provided for development and testing.

mod emulator;

pub use emulator::{FileJbodEmulator, FileJbodEmulatorBuilder};

/// Bytes per block, the unit of device read/write granularity.
pub const BLOCK_SIZE: usize = 256;
/// Number of disks in the array, indexed 0..16.
pub const NUM_DISKS: usize = 16;
/// Blocks held by each disk, indexed 0..256.
pub const BLOCKS_PER_DISK: usize = 256;
/// Bytes per disk.
pub const DISK_SIZE: usize = BLOCK_SIZE * BLOCKS_PER_DISK;
/// Total bytes addressable across the whole array.
pub const TOTAL_SIZE: usize = NUM_DISKS * DISK_SIZE;

// Address math throughout the controller divides by BLOCK_SIZE to find a
// block and by DISK_SIZE to find a disk; the two must agree.
const _: () = assert!(DISK_SIZE == BLOCK_SIZE * BLOCKS_PER_DISK);
const _: () = assert!(TOTAL_SIZE == NUM_DISKS * BLOCKS_PER_DISK * BLOCK_SIZE);

/// One whole device block.
pub type Block = [u8; BLOCK_SIZE];

/// Operation selector carried in bits 12..16 of an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Op {
    Mount = 0,
    Unmount = 1,
    WritePermission = 2,
    RevokeWritePermission = 3,
    SeekToDisk = 4,
    SeekToBlock = 5,
    ReadBlock = 6,
    WriteBlock = 7,
}

impl Op {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Op::Mount),
            1 => Some(Op::Unmount),
            2 => Some(Op::WritePermission),
            3 => Some(Op::RevokeWritePermission),
            4 => Some(Op::SeekToDisk),
            5 => Some(Op::SeekToBlock),
            6 => Some(Op::ReadBlock),
            7 => Some(Op::WriteBlock),
            _ => None,
        }
    }
}

/// A decoded instruction word.
///
/// # Layout
/// ```text
/// | 31 .. 16 | 15 .. 12 | 11 .. 8 | 7 .. 0   |
/// | reserved | opcode   | disk id | block id |
/// ```
/// The operand fields are meaningful only for the seek operations; every
/// other opcode ignores them and encodes them as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub disk: u8,
    pub block: u8,
}

impl Instruction {
    /// An instruction with no operands (mount, unmount, permission ops,
    /// block read/write).
    pub fn control(op: Op) -> Self {
        Instruction { op, disk: 0, block: 0 }
    }

    pub fn seek_to_disk(disk: usize) -> Self {
        debug_assert!(disk < NUM_DISKS);
        Instruction {
            op: Op::SeekToDisk,
            disk: disk as u8,
            block: 0,
        }
    }

    pub fn seek_to_block(block: usize) -> Self {
        debug_assert!(block < BLOCKS_PER_DISK);
        Instruction {
            op: Op::SeekToBlock,
            disk: 0,
            block: block as u8,
        }
    }

    pub fn read_block() -> Self {
        Instruction::control(Op::ReadBlock)
    }

    pub fn write_block() -> Self {
        Instruction::control(Op::WriteBlock)
    }

    /// Packs the instruction into the device's word format.
    pub fn encode(self) -> u32 {
        u32::from(self.block) | (u32::from(self.disk) & 0xf) << 8 | (self.op as u32) << 12
    }

    /// Unpacks a word, rejecting unknown opcodes and nonzero reserved bits.
    pub fn decode(word: u32) -> Option<Self> {
        if word >> 16 != 0 {
            return None;
        }
        let op = Op::from_bits(word >> 12 & 0xf)?;
        Some(Instruction {
            op,
            disk: (word >> 8 & 0xf) as u8,
            block: (word & 0xff) as u8,
        })
    }
}

/// The opaque operation primitive of the disk array.
///
/// `block` must be `Some` (and is exactly one [`Block`]) for
/// [`Op::ReadBlock`] and [`Op::WriteBlock`], `None` for everything else.
/// Returns 0 on success and -1 on failure, matching the device's status
/// convention. A successful block read or write advances the device's
/// block cursor by one.
pub trait JbodDevice {
    fn execute(&mut self, word: u32, block: Option<&mut Block>) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_survive_an_encode_decode_round_trip() {
        let cases = [
            Instruction::control(Op::Mount),
            Instruction::control(Op::Unmount),
            Instruction::control(Op::WritePermission),
            Instruction::control(Op::RevokeWritePermission),
            Instruction::seek_to_disk(NUM_DISKS - 1),
            Instruction::seek_to_block(BLOCKS_PER_DISK - 1),
            Instruction::read_block(),
            Instruction::write_block(),
        ];
        for instr in cases.iter() {
            assert_eq!(Instruction::decode(instr.encode()), Some(*instr));
        }
    }

    #[test]
    fn operand_fields_land_in_their_own_bits() {
        let word = Instruction::seek_to_disk(0xf).encode();
        assert_eq!(word, 0xf00 | (Op::SeekToDisk as u32) << 12);

        let word = Instruction::seek_to_block(0xff).encode();
        assert_eq!(word, 0xff | (Op::SeekToBlock as u32) << 12);
    }

    #[test]
    fn decoding_rejects_garbage_words() {
        // Reserved bits set.
        assert_eq!(Instruction::decode(1 << 18), None);
        // Opcode out of range.
        assert_eq!(Instruction::decode(0xf << 12), None);
    }
}
