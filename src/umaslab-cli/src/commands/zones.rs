//! Keg and zone listing command handler

use anyhow::{Context, Result};
use umaslab::{KegZones, Strategy};

use crate::target::{Session, Target};

/// Print every keg on one line followed by the names of its zones
pub fn handle(target: &Target) -> Result<()> {
    let session = Session::open(target)?;

    let kegs = umaslab::list_kegs(
        session.memory.as_ref(),
        &session.layout,
        session.symbols.uma_kegs,
        session.domain_count,
    )
    .context("Failed to walk the keg list")?;

    for entry in &kegs {
        let strategy = Strategy::for_keg(&entry.keg, &session.layout);
        println!("{}", format_keg(entry, strategy));
    }
    tracing::info!("{} kegs", kegs.len());

    Ok(())
}

fn format_keg(entry: &KegZones, strategy: Strategy) -> String {
    let names: Vec<&str> = entry.zones.iter().map(|z| z.name.as_str()).collect();
    let tag = match strategy {
        Strategy::PageArray => "vtoslab",
        Strategy::DomainLists => "lists",
        Strategy::Unsupported => "offpage",
    };
    format!(
        "keg {:#x} [{}] zones: {}",
        entry.keg.address,
        tag,
        names.join(" ")
    )
}
