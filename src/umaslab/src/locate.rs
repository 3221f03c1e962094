//! Slab location
//!
//! Where a keg's slabs live depends on how the keg tracks them:
//!
//! - `PageArray`: the keg is marked VTOSLAB, so every page descriptor of a
//!   slab page records its zone. The whole page array is copied in one read
//!   and scanned for pages held by the zone.
//! - `DomainLists`: slab headers sit inside the slab's own pages (OFFPAGE is
//!   clear), so walking the per-domain lists gives header addresses from which
//!   the backing pages are derived.
//! - `Unsupported`: off-page headers without VTOSLAB. Neither method applies
//!   and nothing is reported.
//!
//! The page array scan reads once and is as consistent as a single read of a
//! live kernel can be. The list walk makes one read per slab, so on a live
//! kernel its result can mix states from different moments.

use crate::error::{Error, Result};
use crate::keg::{Keg, SlabList};
use crate::layout::{u32_at, u64_at, Layout};
use crate::list::ForeignList;
use crate::source::MemorySource;
use crate::symbols::KernelSymbols;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PageArray,
    DomainLists,
    Unsupported,
}

impl Strategy {
    pub fn for_keg(keg: &Keg, layout: &Layout) -> Self {
        if keg.has_flags(layout.flags.vtoslab) {
            Strategy::PageArray
        } else if !keg.has_flags(layout.flags.offpage) {
            Strategy::DomainLists
        } else {
            Strategy::Unsupported
        }
    }
}

/// Where a located address was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Index into the page descriptor array
    Page { index: usize },
    /// Slab list of a domain
    Slab { domain: usize, list: SlabList },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabLocation {
    /// Physical address for pages, kernel virtual address for slabs
    pub address: u64,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub strategy: Strategy,
    pub locations: Vec<SlabLocation>,
}

impl Located {
    pub fn addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.locations.iter().map(|l| l.address)
    }
}

/// Locate the backing memory of the zone at `zone_address`, owned by `keg`
pub fn locate(
    source: &dyn MemorySource,
    layout: &Layout,
    symbols: &KernelSymbols,
    keg: &Keg,
    zone_address: u64,
) -> Result<Located> {
    let strategy = Strategy::for_keg(keg, layout);
    tracing::info!("Keg {:#x} flags {:#x}: {:?}", keg.address, keg.flags, strategy);

    let locations = match strategy {
        Strategy::PageArray => scan_page_array(source, layout, symbols, zone_address)?,
        Strategy::DomainLists => walk_domain_lists(source, layout, keg)?,
        Strategy::Unsupported => Vec::new(),
    };

    Ok(Located {
        strategy,
        locations,
    })
}

/// Physical addresses of every page owned by the zone, in array order
pub fn scan_page_array(
    source: &dyn MemorySource,
    layout: &Layout,
    symbols: &KernelSymbols,
    zone_address: u64,
) -> Result<Vec<SlabLocation>> {
    let count = source.read_u64(symbols.vm_page_array_size)?;
    if count == 0 {
        return Ok(Vec::new());
    }
    let base = source.read_ptr(symbols.vm_page_array)?;
    let page = &layout.page;

    let bytes = usize::try_from(count)
        .ok()
        .and_then(|n| n.checked_mul(page.size))
        .ok_or_else(|| {
            Error::InvalidImage(format!("page array of {count} entries is too large to copy"))
        })?;
    tracing::debug!("Copying {} page descriptors from {:#x}", count, base);
    let array = source.read_bytes(base, bytes)?;

    Ok(array
        .chunks_exact(page.size)
        .enumerate()
        .filter(|(_, desc)| {
            u32_at(desc, page.ref_count_offset) == page.wired_sentinel
                && u64_at(desc, page.zone_offset) == zone_address
        })
        .map(|(index, desc)| SlabLocation {
            address: u64_at(desc, page.phys_addr_offset),
            origin: Origin::Page { index },
        })
        .collect())
}

/// Slab base addresses from every domain's partial, free and full lists
pub fn walk_domain_lists(
    source: &dyn MemorySource,
    layout: &Layout,
    keg: &Keg,
) -> Result<Vec<SlabLocation>> {
    let mut locations = Vec::new();

    for (domain, heads) in keg.domains.iter().enumerate() {
        for list in SlabList::ALL {
            let walk = ForeignList::starting_at(
                source,
                heads.head(list),
                layout.slab.link_offset,
                layout.slab.size,
            );
            for node in walk {
                let node = node?;
                locations.push(SlabLocation {
                    address: slab_base(node.address, keg.pages_per_alloc, layout.page_size),
                    origin: Origin::Slab { domain, list },
                });
            }
        }
    }

    Ok(locations)
}

/// Start of the allocation holding an in-page slab header
///
/// The header sits in the last page of a `pages_per_alloc` page allocation,
/// so the allocation starts at the header's page minus the pages before it.
pub fn slab_base(header: u64, pages_per_alloc: u16, page_size: u64) -> u64 {
    let header_page = header & !(page_size - 1);
    let preceding = u64::from(pages_per_alloc.max(1) - 1);
    header_page.wrapping_sub(preceding * page_size)
}
