//! Slab location command handler

use anyhow::{Context, Result};
use umaslab::{Located, Lookup, Origin, Strategy};

use crate::target::{Session, Target};

/// Print one address per slab of `zone`
///
/// The whole list is collected before anything is printed, so a read
/// failure part way through produces no output at all.
pub fn handle(target: &Target, zone: &str, annotate: bool) -> Result<()> {
    let session = Session::open(target)?;

    let result = umaslab::lookup(
        session.memory.as_ref(),
        &session.layout,
        &session.symbols,
        session.domain_count,
        zone,
    )
    .with_context(|| format!("Failed to locate slabs of zone {:?}", zone))?;

    for line in report(&result, zone, annotate) {
        println!("{}", line);
    }

    Ok(())
}

/// Output lines for a lookup; outcomes with nothing to print are logged
fn report(result: &Lookup, zone: &str, annotate: bool) -> Vec<String> {
    let (keg, located) = match result {
        Lookup::NotFound => {
            tracing::warn!("No zone named {:?}", zone);
            return Vec::new();
        }
        Lookup::Found { keg, located, .. } => (keg, located),
    };

    if located.strategy == Strategy::Unsupported {
        tracing::warn!(
            "Keg {:#x} (flags {:#x}) keeps its slab headers off-page; slabs cannot be located",
            keg.address,
            keg.flags
        );
    }

    render(located, annotate)
}

/// Format located addresses, optionally with where each one came from
pub fn render(located: &Located, annotate: bool) -> Vec<String> {
    located
        .locations
        .iter()
        .map(|location| {
            if annotate {
                format!("{:#x}\t{}", location.address, describe(&location.origin))
            } else {
                format!("{:#x}", location.address)
            }
        })
        .collect()
}

fn describe(origin: &Origin) -> String {
    match origin {
        Origin::Page { index } => format!("page {}", index),
        Origin::Slab { domain, list } => format!("domain {} {}", domain, list.name()),
    }
}
