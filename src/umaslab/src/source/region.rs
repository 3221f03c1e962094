//! Memory Region Types
//!
//! Mapping from kernel virtual address ranges to offsets in an image file.

use elf::abi::PT_LOAD;
use elf::segment::ProgramHeader;

/// A contiguous range of kernel virtual addresses backed by an image file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u64,
    pub end: u64,
    /// File offset of `start`
    pub offset: u64,
}

impl MemoryRegion {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    /// File offset of `address` and the number of bytes left in this region from there
    pub fn translate(&self, address: u64) -> Option<(u64, u64)> {
        if !self.contains(address) {
            return None;
        }
        Some((self.offset + (address - self.start), self.end - address))
    }

    /// Region for a loadable ELF segment
    ///
    /// Only the file-backed part of the segment is mapped; segments without
    /// file contents or a virtual address are skipped.
    pub fn from_segment(ph: &ProgramHeader) -> Option<Self> {
        if ph.p_type != PT_LOAD || ph.p_filesz == 0 || ph.p_vaddr == 0 {
            return None;
        }
        Some(MemoryRegion {
            start: ph.p_vaddr,
            end: ph.p_vaddr.checked_add(ph.p_filesz)?,
            offset: ph.p_offset,
        })
    }
}
