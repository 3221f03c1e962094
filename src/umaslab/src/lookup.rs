//! Zone lookup from name to slab locations

use crate::error::Result;
use crate::keg::{find_zone, Keg, Zone};
use crate::layout::Layout;
use crate::locate::{locate, Located};
use crate::source::MemorySource;
use crate::symbols::KernelSymbols;

#[derive(Debug, Clone)]
pub enum Lookup {
    /// No zone has the requested name
    NotFound,
    Found {
        keg: Keg,
        zone: Zone,
        located: Located,
    },
}

/// Find the zone named `zone_name` and locate all of its slabs
///
/// Everything is read before anything is returned: a read failure anywhere
/// fails the whole lookup and no partial location list escapes.
pub fn lookup(
    source: &dyn MemorySource,
    layout: &Layout,
    symbols: &KernelSymbols,
    domain_count: usize,
    zone_name: &str,
) -> Result<Lookup> {
    let Some((keg, zone)) = find_zone(source, layout, symbols.uma_kegs, domain_count, zone_name)?
    else {
        tracing::debug!("No zone named {:?}", zone_name);
        return Ok(Lookup::NotFound);
    };

    let located = locate(source, layout, symbols, &keg, zone.address)?;
    Ok(Lookup::Found { keg, zone, located })
}
