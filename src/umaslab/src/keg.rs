//! Kegs and zones
//!
//! Reconstructs `uma_keg` and `uma_zone` records from kernel memory. A keg
//! ends in an array with one entry per memory domain, so its size is only
//! known once the domain count is: the whole record, array included, is copied
//! in a single read.

use crate::error::{Error, Result};
use crate::layout::{u16_at, u32_at, u64_at, Layout};
use crate::list::{ForeignList, ForeignNode};
use crate::source::MemorySource;

/// The three slab lists each keg keeps per domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlabList {
    Partial,
    Free,
    Full,
}

impl SlabList {
    /// Enumeration order of a keg's lists
    pub const ALL: [SlabList; 3] = [SlabList::Partial, SlabList::Free, SlabList::Full];

    pub fn name(&self) -> &'static str {
        match self {
            SlabList::Partial => "partial",
            SlabList::Free => "free",
            SlabList::Full => "full",
        }
    }
}

/// List heads of one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KegDomain {
    pub partial: u64,
    pub free: u64,
    pub full: u64,
}

impl KegDomain {
    pub fn head(&self, list: SlabList) -> u64 {
        match list {
            SlabList::Partial => self.partial,
            SlabList::Free => self.free,
            SlabList::Full => self.full,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Keg {
    /// Kernel address of the keg
    pub address: u64,
    pub flags: u32,
    /// Pages per slab allocation
    pub pages_per_alloc: u16,
    /// First zone of the keg's zone list
    pub first_zone: u64,
    pub domains: Vec<KegDomain>,
}

impl Keg {
    /// Decode a keg copied with [`Layout::keg_size`] bytes for `domain_count` domains
    pub fn decode(
        address: u64,
        data: &[u8],
        layout: &Layout,
        domain_count: usize,
    ) -> Result<Self> {
        let wanted = layout.keg_size(domain_count)?;
        if data.len() != wanted {
            return Err(Error::ShortRead {
                address,
                wanted,
                got: data.len(),
            });
        }

        let entry = &layout.domain;
        let domains = (0..domain_count)
            .map(|d| {
                let base = layout.keg.header_size + d * entry.entry_size;
                KegDomain {
                    partial: u64_at(data, base + entry.partial_offset),
                    free: u64_at(data, base + entry.free_offset),
                    full: u64_at(data, base + entry.full_offset),
                }
            })
            .collect();

        Ok(Keg {
            address,
            flags: u32_at(data, layout.keg.flags_offset),
            pages_per_alloc: u16_at(data, layout.keg.ppera_offset),
            first_zone: u64_at(data, layout.keg.zones_offset),
            domains,
        })
    }

    pub fn has_flags(&self, bits: u32) -> bool {
        self.flags & bits == bits
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Kernel address of the zone
    pub address: u64,
    /// Name bytes as stored by the kernel, without the terminator
    pub raw_name: Vec<u8>,
    /// Lossy UTF-8 rendering of `raw_name`, for display
    pub name: String,
    /// Owning keg as recorded by the zone (not followed)
    pub keg: u64,
}

impl Zone {
    /// Decode a copied zone record and read its name
    pub fn read(source: &dyn MemorySource, layout: &Layout, node: &ForeignNode) -> Result<Self> {
        let name_ptr = u64_at(&node.data, layout.zone.name_offset);
        let raw_name = source.read_cbytes(name_ptr, layout.name_max)?;
        Ok(Zone {
            address: node.address,
            name: String::from_utf8_lossy(&raw_name).into_owned(),
            raw_name,
            keg: u64_at(&node.data, layout.zone.keg_offset),
        })
    }

    /// Byte-for-byte comparison against the kernel's copy of the name
    pub fn is_named(&self, target: &str) -> bool {
        self.raw_name == target.as_bytes()
    }
}

/// Walk the global keg list whose head is stored at `keg_list_head`
///
/// Fails up front if `domain_count` cannot size a keg record.
pub fn kegs<'a>(
    source: &'a dyn MemorySource,
    layout: &'a Layout,
    keg_list_head: u64,
    domain_count: usize,
) -> Result<impl Iterator<Item = Result<Keg>> + 'a> {
    let keg_size = layout.keg_size(domain_count)?;
    let walk = ForeignList::from_head(source, keg_list_head, layout.keg.link_offset, keg_size);
    Ok(walk.map(move |node| {
        node.and_then(|n| Keg::decode(n.address, &n.data, layout, domain_count))
    }))
}

/// Walk the zones of a keg
pub fn zones<'a>(
    source: &'a dyn MemorySource,
    layout: &'a Layout,
    keg: &Keg,
) -> impl Iterator<Item = Result<Zone>> + 'a {
    ForeignList::starting_at(source, keg.first_zone, layout.zone.link_offset, layout.zone.size)
        .map(move |node| node.and_then(|n| Zone::read(source, layout, &n)))
}

/// Find the zone called `target` (exact, case-sensitive) and its keg
///
/// Returns `Ok(None)` when no zone of any keg has that name.
pub fn find_zone(
    source: &dyn MemorySource,
    layout: &Layout,
    keg_list_head: u64,
    domain_count: usize,
    target: &str,
) -> Result<Option<(Keg, Zone)>> {
    for keg in kegs(source, layout, keg_list_head, domain_count)? {
        let keg = keg?;
        tracing::debug!("Keg at {:#x} (flags {:#x})", keg.address, keg.flags);
        for zone in zones(source, layout, &keg) {
            let zone = zone?;
            if zone.is_named(target) {
                tracing::debug!("Zone {:?} at {:#x}", zone.name, zone.address);
                return Ok(Some((keg, zone)));
            }
        }
    }
    Ok(None)
}

/// A keg and all of its zones
#[derive(Debug, Clone)]
pub struct KegZones {
    pub keg: Keg,
    pub zones: Vec<Zone>,
}

/// Enumerate every keg with its zones
pub fn list_kegs(
    source: &dyn MemorySource,
    layout: &Layout,
    keg_list_head: u64,
    domain_count: usize,
) -> Result<Vec<KegZones>> {
    kegs(source, layout, keg_list_head, domain_count)?
        .map(|keg| {
            let keg = keg?;
            let zones = zones(source, layout, &keg).collect::<Result<Vec<_>>>()?;
            Ok(KegZones { keg, zones })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::SyntheticKernel;

    #[test]
    fn test_keg_copy_covers_every_domain() {
        for domain_count in 1..=6 {
            let mut kernel = SyntheticKernel::new(domain_count);
            let keg = kernel.add_keg(0, 1);
            let last = domain_count - 1;
            kernel.add_slab(keg, last, SlabList::Full, 0x7000);

            let head = kernel.symbols.uma_kegs;
            let nodes: Vec<ForeignNode> = ForeignList::from_head(
                &kernel.source,
                head,
                kernel.layout.keg.link_offset,
                kernel.layout.keg_size(domain_count).unwrap(),
            )
            .collect::<Result<_>>()
            .unwrap();

            // The copy is exactly header + domains and ends on the source's last entry
            let copy = &nodes[0].data;
            let size = kernel.layout.keg_size(domain_count).unwrap();
            assert_eq!(copy.len(), size);
            let tail_start = size - kernel.layout.domain.entry_size;
            let source_tail = kernel
                .source
                .read_bytes(keg + tail_start as u64, kernel.layout.domain.entry_size)
                .unwrap();
            assert_eq!(&copy[tail_start..], &source_tail[..]);

            let decoded = Keg::decode(keg, copy, &kernel.layout, domain_count).unwrap();
            assert_eq!(decoded.domains.len(), domain_count);
            assert_eq!(decoded.domains[last].full, 0x7000);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_record_size() {
        let layout = Layout::default();
        let data = vec![0u8; layout.keg_size(1).unwrap()];

        let err = Keg::decode(0x1000, &data, &layout, 2).unwrap_err();
        assert!(matches!(err, Error::ShortRead { .. }));
    }

    #[test]
    fn test_decode_keg_fields() {
        let mut kernel = SyntheticKernel::new(2);
        let keg = kernel.add_keg(0x2000 | 0x4, 3);
        let zone = kernel.add_zone(keg, "vmem btag");
        kernel.add_slab(keg, 1, SlabList::Partial, 0x5000);

        let found = kegs(&kernel.source, &kernel.layout, kernel.symbols.uma_kegs, 2)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();

        assert_eq!(found.address, keg);
        assert_eq!(found.flags, 0x2004);
        assert!(found.has_flags(0x2000));
        assert!(!found.has_flags(0x8));
        assert_eq!(found.pages_per_alloc, 3);
        assert_eq!(found.first_zone, zone);
        assert_eq!(found.domains[0].head(SlabList::Partial), 0);
        assert_eq!(found.domains[1].head(SlabList::Partial), 0x5000);
    }

    #[test]
    fn test_find_zone_across_kegs() {
        let mut kernel = SyntheticKernel::new(1);
        let first = kernel.add_keg(0, 1);
        kernel.add_zone(first, "UMA Kegs");
        let second = kernel.add_keg(0, 1);
        kernel.add_zone(second, "mbuf_packet");
        let mbuf = kernel.add_zone(second, "mbuf");

        let (keg, zone) =
            find_zone(&kernel.source, &kernel.layout, kernel.symbols.uma_kegs, 1, "mbuf")
                .unwrap()
                .unwrap();

        assert_eq!(keg.address, second);
        assert_eq!(zone.address, mbuf);
        assert_eq!(zone.name, "mbuf");
        assert_eq!(zone.keg, second);
    }

    #[test]
    fn test_zone_names_match_exactly() {
        let mut kernel = SyntheticKernel::new(1);
        let keg = kernel.add_keg(0, 1);
        kernel.add_zone(keg, "mbuf_packet");

        let lookup = |name: &str| {
            find_zone(&kernel.source, &kernel.layout, kernel.symbols.uma_kegs, 1, name).unwrap()
        };

        assert!(lookup("mbuf").is_none());
        assert!(lookup("Mbuf_Packet").is_none());
        assert!(lookup("mbuf_packet_").is_none());
        assert!(lookup("mbuf_packet").is_some());
    }

    #[test]
    fn test_invalid_utf8_name_matches_only_its_bytes() {
        let mut kernel = SyntheticKernel::new(1);
        let keg = kernel.add_keg(0, 1);
        let zone = kernel.add_zone(keg, "");
        let name_ptr = kernel.alloc(2);
        kernel.source.write_bytes(name_ptr, &[0xff, 0]);
        let name_slot = zone + kernel.layout.zone.name_offset as u64;
        kernel.source.write_u64(name_slot, name_ptr);

        let lookup = |name: &str| {
            find_zone(&kernel.source, &kernel.layout, kernel.symbols.uma_kegs, 1, name).unwrap()
        };

        assert!(lookup("\u{FFFD}").is_none());
        assert!(lookup("").is_none());

        let kegs = list_kegs(&kernel.source, &kernel.layout, kernel.symbols.uma_kegs, 1).unwrap();
        let found = &kegs[0].zones[0];
        assert_eq!(found.raw_name, vec![0xff]);
        assert_eq!(found.name, "\u{FFFD}");
        assert!(!found.is_named("\u{FFFD}"));
    }

    #[test]
    fn test_oversized_domain_count_is_an_error() {
        let mut kernel = SyntheticKernel::new(1);
        let keg = kernel.add_keg(0, 1);
        kernel.add_zone(keg, "mbuf");

        let head = kernel.symbols.uma_kegs;
        let err = find_zone(&kernel.source, &kernel.layout, head, usize::MAX / 8, "mbuf")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = list_kegs(&kernel.source, &kernel.layout, head, usize::MAX).unwrap_err();
        assert!(matches!(err, Error::DomainCount(_)));
    }

    #[test]
    fn test_find_zone_in_empty_keg_list() {
        let kernel = SyntheticKernel::new(1);
        let found =
            find_zone(&kernel.source, &kernel.layout, kernel.symbols.uma_kegs, 1, "mbuf").unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_find_zone_stops_at_first_match() {
        let mut kernel = SyntheticKernel::new(1);
        let first = kernel.add_keg(0, 1);
        let zone = kernel.add_zone(first, "dup");
        let second = kernel.add_keg(0, 1);
        kernel.add_zone(second, "dup");
        // Anything past the match is unreadable; the walk must not get there
        let link = first + kernel.layout.keg.link_offset as u64;
        kernel.source.write_u64(link, 0xdead_0000_0000);

        let (keg, found) =
            find_zone(&kernel.source, &kernel.layout, kernel.symbols.uma_kegs, 1, "dup")
                .unwrap()
                .unwrap();
        assert_eq!(keg.address, first);
        assert_eq!(found.address, zone);
    }

    #[test]
    fn test_truncated_zone_list_is_a_read_error() {
        let mut kernel = SyntheticKernel::new(1);
        let keg = kernel.add_keg(0, 1);
        let zone = kernel.add_zone(keg, "first");
        let link = zone + kernel.layout.zone.link_offset as u64;
        kernel.source.write_u64(link, 0xdead_0000_0000);

        let head = kernel.symbols.uma_kegs;
        let err = find_zone(&kernel.source, &kernel.layout, head, 1, "second").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[test]
    fn test_list_kegs() {
        let mut kernel = SyntheticKernel::new(1);
        let first = kernel.add_keg(0, 1);
        kernel.add_zone(first, "mbuf_packet");
        kernel.add_zone(first, "mbuf");
        let second = kernel.add_keg(0, 1);
        kernel.add_zone(second, "socket");

        let listed = list_kegs(&kernel.source, &kernel.layout, kernel.symbols.uma_kegs, 1).unwrap();

        let names: Vec<Vec<&str>> = listed
            .iter()
            .map(|k| k.zones.iter().map(|z| z.name.as_str()).collect())
            .collect();
        assert_eq!(names, vec![vec!["mbuf_packet", "mbuf"], vec!["socket"]]);
        assert_eq!(listed[1].keg.address, second);
    }
}
