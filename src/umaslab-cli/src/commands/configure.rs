//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up umaslabs defaults.

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Handle the configure command
///
/// # Arguments
/// * `core` - Optional memory image to use by default
/// * `symbols` - Optional symbol file to use by default
/// * `layout` - Optional layout file to use by default
/// * `show` - If true, show current configuration
pub fn handle(
    core: Option<PathBuf>,
    symbols: Option<PathBuf>,
    layout: Option<PathBuf>,
    show: bool,
) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if apply(&mut config, core, symbols, layout)? {
        config.save()?;
        show_config(&config);
        if let Ok(path) = Config::config_path() {
            println!("Config saved to: {}", path.display());
        }
    } else {
        show_usage();
    }

    Ok(())
}

/// Store the given paths, returning whether anything changed
///
/// Paths are made absolute so the config stays valid from any directory.
fn apply(
    config: &mut Config,
    core: Option<PathBuf>,
    symbols: Option<PathBuf>,
    layout: Option<PathBuf>,
) -> Result<bool> {
    let mut changed = false;

    for (slot, value) in [
        (&mut config.core, core),
        (&mut config.symbols, symbols),
        (&mut config.layout, layout),
    ] {
        if let Some(path) = value {
            let path = std::path::absolute(&path)
                .with_context(|| format!("Invalid path {}", path.display()))?;
            *slot = Some(path);
            changed = true;
        }
    }

    Ok(changed)
}

/// Display current configuration
fn show_config(config: &Config) {
    let show = |label: &str, value: &Option<PathBuf>, fallback: &str| match value {
        Some(path) => println!("{:<8} {}", label, path.display()),
        None => println!("{:<8} {} (default)", label, fallback),
    };

    show("Core:", &config.core, umaslab::source::DEFAULT_CORE_PATH);
    show("Symbols:", &config.symbols, umaslab::symbols::DEFAULT_SYMBOLS_PATH);
    show("Layout:", &config.layout, "built-in");

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

/// Show usage help for the configure command
fn show_usage() {
    println!("Usage: umaslabs configure --set-core VMCORE --set-symbols KERNEL");
    println!("   or: umaslabs configure --set-layout LAYOUT.toml");
    println!("   or: umaslabs configure --show");
    println!();
    println!("Note: without configuration the running kernel is inspected");
    println!(
        "      through {} and {}.",
        umaslab::source::DEFAULT_CORE_PATH,
        umaslab::symbols::DEFAULT_SYMBOLS_PATH
    );
}
