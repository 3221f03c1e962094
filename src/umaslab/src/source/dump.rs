//! Dump File Memory Source
//!
//! Memory source implementation for reading from saved kernel images.

use super::{MemoryRegion, MemorySource};
use crate::error::{Error, Result};

use elf::endian::AnyEndian;
use elf::ElfBytes;
use memmap2::Mmap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Kernel memory dump file source
///
/// Supports ELF core images (kernel crash dumps, saved `/proc/kcore`), whose
/// `PT_LOAD` segments give the address map, and raw images accompanied by a
/// maps file. A raw image without a maps file is mapped linearly, with file
/// offset == virtual address.
///
/// ELF segments are mapped by `p_vaddr`. Images that record physical
/// addresses there (FreeBSD full dumps) do not resolve kernel virtual
/// addresses; read them as raw images with a maps file instead.
pub struct DumpFile {
    /// Memory-mapped dump file
    mmap: Mmap,
    /// Virtual address regions parsed from the image or the maps file
    regions: Vec<MemoryRegion>,
    /// Path to the dump file
    pub path: PathBuf,
}

impl DumpFile {
    /// Open a memory dump file
    ///
    /// A raw image picks up a sibling `.maps` file if one exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mmap = map_file(&path)?;

        let regions = if mmap.starts_with(ELF_MAGIC) {
            parse_elf_regions(&mmap)?
        } else {
            let maps_path = path.with_extension("maps");
            if maps_path.exists() {
                parse_maps_file(&maps_path)?
            } else {
                vec![MemoryRegion {
                    start: 0,
                    end: mmap.len() as u64,
                    offset: 0,
                }]
            }
        };

        tracing::info!(
            "Opened dump file: {:?} ({} MB, {} regions)",
            path,
            mmap.len() / 1_000_000,
            regions.len()
        );

        Ok(DumpFile {
            mmap,
            regions,
            path,
        })
    }

    /// Open a raw dump with an explicit maps file
    pub fn open_with_maps<P: AsRef<Path>, Q: AsRef<Path>>(
        dump_path: P,
        maps_path: Q,
    ) -> Result<Self> {
        let path = dump_path.as_ref().to_path_buf();
        let mmap = map_file(&path)?;
        let regions = parse_maps_file(maps_path.as_ref())?;

        tracing::info!(
            "Opened dump file: {:?} ({} MB) with {} regions",
            path,
            mmap.len() / 1_000_000,
            regions.len()
        );

        Ok(DumpFile {
            mmap,
            regions,
            path,
        })
    }
}

fn map_file(path: &Path) -> Result<Mmap> {
    let unavailable = |source| Error::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(unavailable)?;
    // SAFETY: the mapping is read-only and the file is not modified by this process.
    unsafe { Mmap::map(&file) }.map_err(unavailable)
}

fn parse_elf_regions(data: &[u8]) -> Result<Vec<MemoryRegion>> {
    let elf = ElfBytes::<AnyEndian>::minimal_parse(data)
        .map_err(|e| Error::InvalidImage(format!("ELF header: {e}")))?;
    let segments = elf
        .segments()
        .ok_or_else(|| Error::InvalidImage("ELF image has no program headers".to_string()))?;

    let regions: Vec<MemoryRegion> = segments
        .iter()
        .filter_map(|ph| MemoryRegion::from_segment(&ph))
        .collect();
    if regions.is_empty() {
        return Err(Error::InvalidImage(
            "ELF image has no loadable segments".to_string(),
        ));
    }
    Ok(regions)
}

/// Parse a maps file: one `0xSTART 0xEND SIZE FILE_OFFSET` line per region
fn parse_maps_file(path: &Path) -> Result<Vec<MemoryRegion>> {
    let contents = fs::read_to_string(path).map_err(|source| Error::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_maps(&contents)
}

fn parse_maps(contents: &str) -> Result<Vec<MemoryRegion>> {
    let mut regions = Vec::new();

    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(Error::InvalidImage(format!(
                "maps line {}: expected 4 fields, found {}",
                lineno + 1,
                parts.len()
            )));
        }

        let field = |s: &str| {
            u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|_| {
                Error::InvalidImage(format!("maps line {}: invalid number {:?}", lineno + 1, s))
            })
        };

        let start = field(parts[0])?;
        let end = field(parts[1])?;
        let offset = field(parts[3])?;
        if end <= start {
            return Err(Error::InvalidImage(format!(
                "maps line {}: empty region {:#x}-{:#x}",
                lineno + 1,
                start,
                end
            )));
        }

        regions.push(MemoryRegion { start, end, offset });
    }

    Ok(regions)
}

impl MemorySource for DumpFile {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let (offset, available) = self
            .find_region(address)
            .and_then(|r| r.translate(address))
            .ok_or(Error::Unmapped { address })?;

        let file_len = self.mmap.len() as u64;
        let in_file = file_len.saturating_sub(offset);
        let got = available.min(in_file);
        if (size as u64) > got {
            return Err(Error::ShortRead {
                address,
                wanted: size,
                got: got as usize,
            });
        }

        let offset = offset as usize;
        Ok(self.mmap[offset..offset + size].to_vec())
    }

    fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    fn is_live(&self) -> bool {
        false
    }
}
