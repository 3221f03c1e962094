//! Memory Source Trait
//!
//! Core abstraction for reading foreign kernel memory.

use super::MemoryRegion;
use crate::error::{Error, Result};
use byteorder::{ByteOrder, LE};

/// Trait for reading memory from a kernel image (live or crash dump)
///
/// Every read is a copy taken at the time of the call. Implementations either
/// return exactly the requested number of bytes or fail; a read that only
/// partially succeeds is reported as [`Error::ShortRead`].
pub trait MemorySource: Send + Sync {
    /// Read bytes from a kernel virtual address
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Get the list of mapped regions
    fn regions(&self) -> &[MemoryRegion];

    /// Whether the underlying kernel is running (and may mutate between reads)
    fn is_live(&self) -> bool;

    /// Read a u64 from memory
    fn read_u64(&self, address: u64) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(LE::read_u64(&bytes))
    }

    /// Read a u32 from memory
    fn read_u32(&self, address: u64) -> Result<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(LE::read_u32(&bytes))
    }

    /// Read a kernel pointer from memory
    fn read_ptr(&self, address: u64) -> Result<u64> {
        self.read_u64(address)
    }

    /// Read the bytes of a nul-terminated string, one byte at a time
    ///
    /// Never touches more than `max_len` bytes. If no terminator is found the
    /// string is cut to `max_len - 1` bytes, as a `max_len` sized C buffer
    /// would be. The terminator is not included.
    fn read_cbytes(&self, address: u64, max_len: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(max_len);
        for i in 0..max_len {
            let at = address
                .checked_add(i as u64)
                .ok_or(Error::Unmapped { address })?;
            let byte = self.read_bytes(at, 1)?[0];
            if byte == 0 {
                return Ok(bytes);
            }
            bytes.push(byte);
        }
        bytes.pop();
        Ok(bytes)
    }

    /// [`read_cbytes`](Self::read_cbytes) decoded as lossy UTF-8
    fn read_cstring(&self, address: u64, max_len: usize) -> Result<String> {
        let bytes = self.read_cbytes(address, max_len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Find a region containing the given address
    fn find_region(&self, address: u64) -> Option<&MemoryRegion> {
        self.regions().iter().find(|r| r.contains(address))
    }
}
