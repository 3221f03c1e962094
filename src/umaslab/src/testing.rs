//! Synthetic kernel images for tests

use crate::keg::SlabList;
use crate::layout::Layout;
use crate::source::MockMemorySource;
use crate::symbols::KernelSymbols;
use std::collections::HashMap;

/// Size of the synthetic address space, starting at address 0
const IMAGE_SIZE: usize = 0x100000;
/// Records are allocated from here up; lower addresses are free for slabs
const HEAP_START: u64 = 0x40000;

pub(crate) struct SyntheticKernel {
    pub source: MockMemorySource,
    pub layout: Layout,
    pub symbols: KernelSymbols,
    pub domain_count: usize,
    next_free: u64,
    /// list head slot -> slot holding the last node's next pointer
    tails: HashMap<u64, u64>,
}

impl SyntheticKernel {
    pub fn new(domain_count: usize) -> Self {
        let mut kernel = SyntheticKernel {
            source: MockMemorySource::zeroed(IMAGE_SIZE, 0),
            layout: Layout::default(),
            symbols: KernelSymbols {
                uma_kegs: 0,
                vm_page_array: 0,
                vm_page_array_size: 0,
            },
            domain_count,
            next_free: HEAP_START,
            tails: HashMap::new(),
        };
        kernel.symbols = KernelSymbols {
            uma_kegs: kernel.alloc(8),
            vm_page_array: kernel.alloc(8),
            vm_page_array_size: kernel.alloc(8),
        };
        kernel
    }

    pub fn alloc(&mut self, size: usize) -> u64 {
        let address = self.next_free;
        self.next_free = (address + size as u64 + 0xf) & !0xf;
        assert!(self.next_free as usize <= IMAGE_SIZE, "synthetic image full");
        address
    }

    fn append(&mut self, head_slot: u64, node: u64, link_offset: usize) {
        let slot = self.tails.get(&head_slot).copied().unwrap_or(head_slot);
        self.source.write_u64(slot, node);
        self.tails.insert(head_slot, node + link_offset as u64);
    }

    pub fn add_keg(&mut self, flags: u32, ppera: u16) -> u64 {
        let size = self.layout.keg_size(self.domain_count).unwrap();
        let keg = self.alloc(size);
        let layout = self.layout.keg.clone();
        self.source.write_u32(keg + layout.flags_offset as u64, flags);
        self.source.write_u16(keg + layout.ppera_offset as u64, ppera);
        self.append(self.symbols.uma_kegs, keg, layout.link_offset);
        keg
    }

    pub fn add_zone(&mut self, keg: u64, name: &str) -> u64 {
        let zone = self.alloc(self.layout.zone.size);
        let name_ptr = self.alloc(name.len() + 1);
        self.source.write_bytes(name_ptr, name.as_bytes());

        let layout = self.layout.zone.clone();
        self.source.write_u64(zone + layout.name_offset as u64, name_ptr);
        self.source.write_u64(zone + layout.keg_offset as u64, keg);
        let head_slot = keg + self.layout.keg.zones_offset as u64;
        self.append(head_slot, zone, layout.link_offset);
        zone
    }

    /// Address of a keg's list head for one domain and category
    pub fn slab_head(&self, keg: u64, domain: usize, list: SlabList) -> u64 {
        let entry = keg
            + self.layout.keg.header_size as u64
            + (domain * self.layout.domain.entry_size) as u64;
        let offset = match list {
            SlabList::Partial => self.layout.domain.partial_offset,
            SlabList::Free => self.layout.domain.free_offset,
            SlabList::Full => self.layout.domain.full_offset,
        };
        entry + offset as u64
    }

    /// Thread a slab header at `node` onto a keg's list
    pub fn add_slab(&mut self, keg: u64, domain: usize, list: SlabList, node: u64) {
        let head_slot = self.slab_head(keg, domain, list);
        self.append(head_slot, node, self.layout.slab.link_offset);
    }

    /// Install a page array of `(phys_addr, ref_count, zone)` descriptors
    pub fn set_pages(&mut self, pages: &[(u64, u32, u64)]) -> u64 {
        let layout = self.layout.page.clone();
        let array = self.alloc(pages.len() * layout.size);
        for (i, &(phys, ref_count, zone)) in pages.iter().enumerate() {
            let page = array + (i * layout.size) as u64;
            self.source.write_u64(page + layout.phys_addr_offset as u64, phys);
            self.source.write_u32(page + layout.ref_count_offset as u64, ref_count);
            self.source.write_u64(page + layout.zone_offset as u64, zone);
        }
        self.source.write_u64(self.symbols.vm_page_array, array);
        self.source
            .write_u64(self.symbols.vm_page_array_size, pages.len() as u64);
        array
    }
}
