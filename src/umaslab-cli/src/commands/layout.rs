//! Layout command handler
//!
//! Prints the structure layout in effect, so it can be saved and edited for
//! a kernel whose offsets differ from the defaults.

use anyhow::{Context, Result};

use crate::target::Target;

pub fn handle(target: &Target) -> Result<()> {
    let layout = target.load_layout()?;
    let text = layout
        .to_toml_string()
        .context("Failed to serialize layout")?;

    match &target.layout {
        Some(path) => println!("# Layout from {}", path.display()),
        None => println!("# Built-in layout"),
    }
    print!("{}", text);

    Ok(())
}
