//! Live Kernel Memory Source
//!
//! Memory source implementation for a running kernel, exposed either as an
//! ELF core file (`/proc/kcore` on Linux) or as a device whose file offsets
//! are kernel virtual addresses (`/dev/kmem` on FreeBSD). Neither can be
//! memory-mapped, so every read is a positional read against the open file.

use super::{MemoryRegion, MemorySource};
use crate::error::{Error, Result};

use elf::endian::AnyEndian;
use elf::ElfStream;
use std::fs::File;
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Running kernel's memory as an ELF core (Linux)
pub const KCORE_PATH: &str = "/proc/kcore";
/// Running kernel's virtual memory, addressed directly (FreeBSD)
pub const KMEM_PATH: &str = "/dev/kmem";

/// Memory image used when none is given
#[cfg(target_os = "freebsd")]
pub const DEFAULT_CORE_PATH: &str = KMEM_PATH;
#[cfg(not(target_os = "freebsd"))]
pub const DEFAULT_CORE_PATH: &str = KCORE_PATH;

/// Read-only handle on a running kernel's memory
///
/// The kernel keeps running while it is read: two reads may observe different
/// states of the same structure.
pub struct LiveImage {
    file: File,
    regions: Vec<MemoryRegion>,
    pub path: PathBuf,
}

impl LiveImage {
    /// Open a live image; device paths (under `/dev`) are addressed directly,
    /// anything else must be an ELF core
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| Error::SourceUnavailable {
            path: path.clone(),
            source,
        })?;

        if path.starts_with("/dev") {
            tracing::info!("Opened live device {:?}", path);
            return Ok(Self::direct(file, path));
        }

        let regions: Vec<MemoryRegion> = {
            let elf = ElfStream::<AnyEndian, _>::open_stream(&file)
                .map_err(|e| Error::InvalidImage(format!("{}: {e}", path.display())))?;
            elf.segments()
                .iter()
                .filter_map(MemoryRegion::from_segment)
                .collect()
        };
        if regions.is_empty() {
            return Err(Error::InvalidImage(format!(
                "{}: no loadable segments",
                path.display()
            )));
        }

        tracing::info!("Opened live image {:?} with {} regions", path, regions.len());

        Ok(LiveImage {
            file,
            regions,
            path,
        })
    }

    /// A file whose offsets are the kernel's virtual addresses
    fn direct(file: File, path: PathBuf) -> Self {
        LiveImage {
            file,
            regions: vec![MemoryRegion {
                start: 0,
                end: u64::MAX,
                offset: 0,
            }],
            path,
        }
    }
}

impl MemorySource for LiveImage {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let (offset, available) = self
            .find_region(address)
            .and_then(|r| r.translate(address))
            .ok_or(Error::Unmapped { address })?;
        if (size as u64) > available {
            return Err(Error::ShortRead {
                address,
                wanted: size,
                got: available as usize,
            });
        }

        let mut buffer = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            match self.file.read_at(&mut buffer[filled..], offset + filled as u64) {
                Ok(0) => {
                    return Err(Error::ShortRead {
                        address,
                        wanted: size,
                        got: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(source) => {
                    return Err(Error::Io {
                        address,
                        size,
                        source,
                    })
                }
            }
        }

        Ok(buffer)
    }

    fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    fn is_live(&self) -> bool {
        true
    }
}
