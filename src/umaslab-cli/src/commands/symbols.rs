//! Symbol resolution command handler

use anyhow::Result;

use crate::target::Target;

/// Resolve the kernel globals and print their addresses
pub fn handle(target: &Target) -> Result<()> {
    let symbols = target.load_symbols()?;

    println!("Symbols from {}", target.symbols.display());
    for (name, address) in symbols.iter() {
        println!("  {:<20} {:#018x}", name, address);
    }

    Ok(())
}
