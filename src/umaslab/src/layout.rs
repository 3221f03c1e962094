//! Kernel structure layouts
//!
//! Field offsets and record sizes for the allocator structures that are
//! copied out of the kernel. Nothing here is known at compile time: the
//! defaults describe a 64-bit FreeBSD 12 kernel, and a TOML layout file can
//! override any subset of the values for the kernel actually being read.
//!
//! ```toml
//! page_size = 4096
//!
//! [keg]
//! header_size = 0xa8
//!
//! [page]
//! phys_addr_offset = 0x48
//! ```

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const PTR_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layout {
    /// Size of a kernel page in bytes
    pub page_size: u64,
    /// Size of the buffer zone names are read into, terminator included
    pub name_max: usize,
    pub keg: KegLayout,
    pub domain: DomainLayout,
    pub zone: ZoneLayout,
    pub slab: SlabLayout,
    pub page: PageLayout,
    pub flags: FlagLayout,
}

/// `struct uma_keg`, up to (not including) its per-domain array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KegLayout {
    /// Offset of the per-domain array, i.e. the size of the fixed part
    pub header_size: usize,
    /// `uk_zones` list head
    pub zones_offset: usize,
    /// `uk_ppera` (u16)
    pub ppera_offset: usize,
    /// `uk_flags` (u32)
    pub flags_offset: usize,
    /// `uk_link` list entry
    pub link_offset: usize,
}

/// One element of the keg's per-domain array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DomainLayout {
    pub entry_size: usize,
    pub partial_offset: usize,
    pub free_offset: usize,
    pub full_offset: usize,
}

/// `struct uma_zone`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZoneLayout {
    pub size: usize,
    /// `uz_name` (pointer to a nul-terminated string)
    pub name_offset: usize,
    /// `uz_link` list entry within the keg's zone list
    pub link_offset: usize,
    /// `uz_keg` back-pointer
    pub keg_offset: usize,
}

/// `struct uma_slab`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlabLayout {
    pub size: usize,
    /// `us_link` list entry
    pub link_offset: usize,
}

/// `struct vm_page`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageLayout {
    pub size: usize,
    /// Owning zone, valid while the page belongs to a slab
    pub zone_offset: usize,
    pub phys_addr_offset: usize,
    /// Reference/wire count (u32)
    pub ref_count_offset: usize,
    /// Reference count of a page held by exactly one wiring (a slab page)
    pub wired_sentinel: u32,
}

/// Keg flag bits that select how slabs are found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlagLayout {
    /// Slab ownership is recorded in the page array (`UMA_ZONE_VTOSLAB`)
    pub vtoslab: u32,
    /// Slab headers live outside the slab's pages (`UMA_ZONE_OFFPAGE`)
    pub offpage: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            page_size: 4096,
            name_max: 128,
            keg: KegLayout::default(),
            domain: DomainLayout::default(),
            zone: ZoneLayout::default(),
            slab: SlabLayout::default(),
            page: PageLayout::default(),
            flags: FlagLayout::default(),
        }
    }
}

impl Default for KegLayout {
    fn default() -> Self {
        KegLayout {
            header_size: 0xa8,
            zones_offset: 0x38,
            ppera_offset: 0x84,
            flags_offset: 0x88,
            link_offset: 0x98,
        }
    }
}

impl Default for DomainLayout {
    fn default() -> Self {
        DomainLayout {
            entry_size: 0x20,
            partial_offset: 0x00,
            free_offset: 0x08,
            full_offset: 0x10,
        }
    }
}

impl Default for ZoneLayout {
    fn default() -> Self {
        ZoneLayout {
            size: 0x100,
            name_offset: 0x60,
            link_offset: 0x70,
            keg_offset: 0x90,
        }
    }
}

impl Default for SlabLayout {
    fn default() -> Self {
        SlabLayout {
            size: 0x28,
            link_offset: 0x00,
        }
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        PageLayout {
            size: 0x68,
            zone_offset: 0x08,
            phys_addr_offset: 0x48,
            ref_count_offset: 0x50,
            wired_sentinel: 1,
        }
    }
}

impl Default for FlagLayout {
    fn default() -> Self {
        FlagLayout {
            vtoslab: 0x2000,
            offpage: 0x0008,
        }
    }
}

impl Layout {
    /// Parse a layout from TOML; missing keys keep their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let layout: Layout = toml::from_str(contents).map_err(|e| Error::Layout(e.to_string()))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Load a layout file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Layout(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Layout(e.to_string()))
    }

    /// Size of a keg record carrying `domain_count` per-domain entries
    pub fn keg_size(&self, domain_count: usize) -> Result<usize> {
        domain_count
            .checked_mul(self.domain.entry_size)
            .and_then(|entries| entries.checked_add(self.keg.header_size))
            .ok_or_else(|| {
                Error::DomainCount(format!("{domain_count} domains overflow the keg record size"))
            })
    }

    /// Check that every field lies inside its record
    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two() {
            return Err(Error::Layout(format!(
                "page_size {} is not a power of two",
                self.page_size
            )));
        }
        if self.name_max == 0 {
            return Err(Error::Layout("name_max must be positive".to_string()));
        }
        if self.domain.entry_size == 0 {
            return Err(Error::Layout("domain.entry_size must be positive".to_string()));
        }
        if self.flags.vtoslab == 0 || self.flags.offpage == 0 {
            return Err(Error::Layout("flag bits must be non-zero".to_string()));
        }

        let keg = &self.keg;
        let domain = &self.domain;
        let zone = &self.zone;
        let page = &self.page;
        let fields = [
            ("keg.zones_offset", keg.zones_offset, PTR_SIZE, keg.header_size),
            ("keg.ppera_offset", keg.ppera_offset, 2, keg.header_size),
            ("keg.flags_offset", keg.flags_offset, 4, keg.header_size),
            ("keg.link_offset", keg.link_offset, PTR_SIZE, keg.header_size),
            ("domain.partial_offset", domain.partial_offset, PTR_SIZE, domain.entry_size),
            ("domain.free_offset", domain.free_offset, PTR_SIZE, domain.entry_size),
            ("domain.full_offset", domain.full_offset, PTR_SIZE, domain.entry_size),
            ("zone.name_offset", zone.name_offset, PTR_SIZE, zone.size),
            ("zone.link_offset", zone.link_offset, PTR_SIZE, zone.size),
            ("zone.keg_offset", zone.keg_offset, PTR_SIZE, zone.size),
            ("slab.link_offset", self.slab.link_offset, PTR_SIZE, self.slab.size),
            ("page.zone_offset", page.zone_offset, PTR_SIZE, page.size),
            ("page.phys_addr_offset", page.phys_addr_offset, 8, page.size),
            ("page.ref_count_offset", page.ref_count_offset, 4, page.size),
        ];
        for (name, offset, width, record) in fields {
            if offset + width > record {
                return Err(Error::Layout(format!(
                    "{name} ({offset:#x}, {width} bytes) does not fit in a {record:#x} byte record"
                )));
            }
        }

        Ok(())
    }
}

// Field decoders for copied records. Offsets come from a validated layout.

pub(crate) fn u64_at(data: &[u8], offset: usize) -> u64 {
    LE::read_u64(&data[offset..offset + 8])
}

pub(crate) fn u32_at(data: &[u8], offset: usize) -> u32 {
    LE::read_u32(&data[offset..offset + 4])
}

pub(crate) fn u16_at(data: &[u8], offset: usize) -> u16 {
    LE::read_u16(&data[offset..offset + 2])
}
