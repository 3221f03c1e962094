//! Mock Memory Source
//!
//! An in-memory kernel image for building synthetic kegs, zones and slabs in tests.

use super::{MemoryRegion, MemorySource};
use crate::error::{Error, Result};
use byteorder::{ByteOrder, LE};

/// A mock memory source backed by a contiguous buffer
pub struct MockMemorySource {
    /// Raw memory data (contiguous, starting at base_address)
    pub data: Vec<u8>,
    /// Base virtual address for the data
    pub base_address: u64,
    regions: Vec<MemoryRegion>,
}

impl MockMemorySource {
    /// Create a new mock with data at given base address
    pub fn new(data: Vec<u8>, base_address: u64) -> Self {
        let mut source = Self {
            data,
            base_address,
            regions: Vec::new(),
        };
        source.sync_regions();
        source
    }

    /// Create a zero-filled mock of `size` bytes
    pub fn zeroed(size: usize, base_address: u64) -> Self {
        Self::new(vec![0; size], base_address)
    }

    fn sync_regions(&mut self) {
        self.regions = vec![MemoryRegion {
            start: self.base_address,
            end: self.base_address + self.data.len() as u64,
            offset: 0,
        }];
    }

    fn offset_of(&self, address: u64) -> usize {
        (address - self.base_address) as usize
    }

    pub fn write_bytes(&mut self, address: u64, bytes: &[u8]) {
        let offset = self.offset_of(address);
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn write_u64(&mut self, address: u64, value: u64) {
        let offset = self.offset_of(address);
        LE::write_u64(&mut self.data[offset..offset + 8], value);
    }

    pub fn write_u32(&mut self, address: u64, value: u32) {
        let offset = self.offset_of(address);
        LE::write_u32(&mut self.data[offset..offset + 4], value);
    }

    pub fn write_u16(&mut self, address: u64, value: u16) {
        let offset = self.offset_of(address);
        LE::write_u16(&mut self.data[offset..offset + 2], value);
    }

    /// Drop everything at and above `address`, as if the image ended there
    pub fn truncate_at(&mut self, address: u64) {
        let offset = self.offset_of(address);
        self.data.truncate(offset);
        self.sync_regions();
    }
}

impl MemorySource for MockMemorySource {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let end = self.base_address + self.data.len() as u64;
        if address < self.base_address || address >= end {
            return Err(Error::Unmapped { address });
        }

        let offset = self.offset_of(address);
        if offset + size > self.data.len() {
            return Err(Error::ShortRead {
                address,
                wanted: size,
                got: self.data.len() - offset,
            });
        }

        Ok(self.data[offset..offset + size].to_vec())
    }

    fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// Build a minimal little-endian ELF64 core image with one `PT_LOAD` per segment
pub fn elf_core_image(segments: &[(u64, &[u8])]) -> Vec<u8> {
    const EHDR_SIZE: usize = 64;
    const PHDR_SIZE: usize = 56;

    let mut image = vec![0u8; EHDR_SIZE + PHDR_SIZE * segments.len()];
    image[0..4].copy_from_slice(b"\x7fELF");
    image[4] = 2; // ELFCLASS64
    image[5] = 1; // ELFDATA2LSB
    image[6] = 1; // EV_CURRENT
    LE::write_u16(&mut image[0x10..0x12], 4); // ET_CORE
    LE::write_u16(&mut image[0x12..0x14], 62); // EM_X86_64
    LE::write_u32(&mut image[0x14..0x18], 1);
    LE::write_u64(&mut image[0x20..0x28], EHDR_SIZE as u64);
    LE::write_u16(&mut image[0x34..0x36], EHDR_SIZE as u16);
    LE::write_u16(&mut image[0x36..0x38], PHDR_SIZE as u16);
    LE::write_u16(&mut image[0x38..0x3a], segments.len() as u16);
    LE::write_u16(&mut image[0x3a..0x3c], 64);

    for (i, (vaddr, data)) in segments.iter().enumerate() {
        let offset = image.len() as u64;
        let ph = EHDR_SIZE + i * PHDR_SIZE;
        LE::write_u32(&mut image[ph..ph + 4], elf::abi::PT_LOAD);
        LE::write_u32(&mut image[ph + 4..ph + 8], 4); // PF_R
        LE::write_u64(&mut image[ph + 8..ph + 16], offset);
        LE::write_u64(&mut image[ph + 16..ph + 24], *vaddr);
        LE::write_u64(&mut image[ph + 32..ph + 40], data.len() as u64);
        LE::write_u64(&mut image[ph + 40..ph + 48], data.len() as u64);
        LE::write_u64(&mut image[ph + 48..ph + 56], 0x1000);
        image.extend_from_slice(data);
    }

    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_source_read_bytes() {
        let data = vec![0x41, 0x42, 0x43, 0x44]; // "ABCD"
        let source = MockMemorySource::new(data, 0x1000);

        let result = source.read_bytes(0x1000, 4).unwrap();
        assert_eq!(result, vec![0x41, 0x42, 0x43, 0x44]);

        let partial = source.read_bytes(0x1001, 2).unwrap();
        assert_eq!(partial, vec![0x42, 0x43]);
    }

    #[test]
    fn test_mock_source_read_u64() {
        let data = vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let source = MockMemorySource::new(data, 0x1000);

        let value = source.read_u64(0x1000).unwrap();
        assert_eq!(value, 0x0807060504030201); // Little-endian
    }

    #[test]
    fn test_mock_source_read_ptr() {
        let mut source = MockMemorySource::zeroed(16, 0x1000);
        source.write_u64(0x1008, 0xffff_f800_0012_3000);

        assert_eq!(source.read_ptr(0x1008).unwrap(), 0xffff_f800_0012_3000);
    }

    #[test]
    fn test_read_cstring_stops_at_nul() {
        let data = b"mbuf\0mbuf_packet\0".to_vec();
        let source = MockMemorySource::new(data, 0x1000);

        assert_eq!(source.read_cstring(0x1000, 128).unwrap(), "mbuf");
        assert_eq!(source.read_cstring(0x1005, 128).unwrap(), "mbuf_packet");
    }

    #[test]
    fn test_read_cstring_truncates_without_nul() {
        let source = MockMemorySource::new(b"abcdefgh".to_vec(), 0x1000);

        // A 4 byte buffer keeps room for the terminator
        assert_eq!(source.read_cstring(0x1000, 4).unwrap(), "abc");
        assert_eq!(source.read_cstring(0x1000, 0).unwrap(), "");
    }

    #[test]
    fn test_read_cbytes_keeps_raw_bytes() {
        let source = MockMemorySource::new(vec![b'z', 0xff, 0xfe, 0], 0x1000);

        assert_eq!(source.read_cbytes(0x1000, 128).unwrap(), vec![b'z', 0xff, 0xfe]);
        assert_eq!(source.read_cstring(0x1000, 128).unwrap(), "z\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn test_read_cstring_never_reads_past_bound() {
        // The string runs into the end of the image; bounded reads stay inside it
        let source = MockMemorySource::new(b"abcd".to_vec(), 0x1000);

        assert_eq!(source.read_cstring(0x1000, 4).unwrap(), "abc");
        assert!(matches!(
            source.read_cstring(0x1000, 5),
            Err(Error::Unmapped { address: 0x1004 })
        ));
    }

    #[test]
    fn test_mock_source_read_out_of_bounds() {
        let data = vec![0x41, 0x42, 0x43, 0x44];
        let source = MockMemorySource::new(data, 0x1000);

        assert!(matches!(
            source.read_bytes(0x1002, 10),
            Err(Error::ShortRead {
                address: 0x1002,
                wanted: 10,
                got: 2
            })
        ));
        assert!(matches!(
            source.read_bytes(0x500, 4),
            Err(Error::Unmapped { address: 0x500 })
        ));
    }

    #[test]
    fn test_truncate_at() {
        let mut source = MockMemorySource::zeroed(0x100, 0x1000);
        source.truncate_at(0x1080);

        assert_eq!(source.regions()[0].end, 0x1080);
        assert!(source.read_bytes(0x1070, 0x10).is_ok());
        assert!(source.read_bytes(0x1080, 1).is_err());
    }

    #[test]
    fn test_mock_source_find_region() {
        let source = MockMemorySource::zeroed(0x1000, 0x1000);

        assert_eq!(source.find_region(0x1500).map(|r| r.start), Some(0x1000));
        assert!(source.find_region(0x5000).is_none());
        assert!(!source.is_live());
    }
}
