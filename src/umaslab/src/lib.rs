//! # umaslab
//!
//! Read-only reconstruction of the UMA slab allocator from kernel memory.
//!
//! This library provides functionality to:
//! - Read kernel memory from a running kernel (`/proc/kcore`) or a saved image
//! - Resolve kernel globals from System.map, kallsyms or an ELF kernel
//! - Walk the global keg list and each keg's zones
//! - Locate the pages backing a zone's slabs
//!
//! Nothing is ever written to the kernel, and nothing stops a running kernel
//! from changing the structures while they are being read.
//!
//! ## Example
//!
//! ```no_run
//! use umaslab::{source, KernelSymbols, Layout, Lookup, SymbolTable};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let memory = source::open(Path::new("/proc/kcore"), None)?;
//! let table = SymbolTable::load("/proc/kallsyms")?;
//! let symbols = KernelSymbols::resolve(&table)?;
//! let layout = Layout::default();
//! let domains = umaslab::query_domain_count()?;
//!
//! if let Lookup::Found { located, .. } =
//!     umaslab::lookup(memory.as_ref(), &layout, &symbols, domains, "mbuf")?
//! {
//!     for address in located.addresses() {
//!         println!("{:#x}", address);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod domains;
pub mod error;
pub mod keg;
pub mod layout;
pub mod list;
pub mod locate;
pub mod lookup;
pub mod source;
pub mod symbols;

#[cfg(test)]
mod testing;

// Re-export commonly used items
#[doc(inline)]
pub use domains::query_domain_count;
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use keg::{find_zone, list_kegs, Keg, KegZones, SlabList, Zone};
#[doc(inline)]
pub use layout::Layout;
#[doc(inline)]
pub use locate::{locate, Located, Origin, SlabLocation, Strategy};
#[doc(inline)]
pub use lookup::{lookup, Lookup};
#[doc(inline)]
pub use source::MemorySource;
#[doc(inline)]
pub use symbols::{KernelSymbols, SymbolTable};
