//! Memory Source Abstraction
//!
//! Core abstractions for reading kernel memory from various sources:
//! - Running kernel via `LiveImage` (`/proc/kcore`)
//! - Saved images via `DumpFile` (ELF cores and raw dumps)
//! - Mock sources for testing

mod dump;
mod live;
#[cfg(test)]
mod mock;
mod region;
mod traits;

pub use dump::DumpFile;
pub use live::{LiveImage, DEFAULT_CORE_PATH, KCORE_PATH, KMEM_PATH};
#[cfg(test)]
pub use mock::MockMemorySource;
pub use region::MemoryRegion;
pub use traits::MemorySource;

use crate::error::Result;
use std::path::Path;

/// Open a memory source for `path`
///
/// Paths under `/proc` or `/dev` name a running kernel and are read through
/// [`LiveImage`]; everything else is treated as a saved dump. `maps` forces
/// the region map of a raw dump.
pub fn open(path: &Path, maps: Option<&Path>) -> Result<Box<dyn MemorySource>> {
    if let Some(maps) = maps {
        return Ok(Box::new(DumpFile::open_with_maps(path, maps)?));
    }
    if is_live_path(path) {
        Ok(Box::new(LiveImage::open(path)?))
    } else {
        Ok(Box::new(DumpFile::open(path)?))
    }
}

fn is_live_path(path: &Path) -> bool {
    path.starts_with("/proc") || path.starts_with("/dev")
}
