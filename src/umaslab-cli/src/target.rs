//! Resolution of the inspection target
//!
//! Every path comes from the command line first, then the config file, then
//! the live-system default.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use umaslab::source::{self, DEFAULT_CORE_PATH};
use umaslab::symbols::DEFAULT_SYMBOLS_PATH;
use umaslab::{KernelSymbols, Layout, MemorySource, SymbolTable};

use crate::cli::TargetArgs;
use crate::config::Config;

/// Paths and counts after merging CLI arguments with the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub core: PathBuf,
    pub maps: Option<PathBuf>,
    pub symbols: PathBuf,
    pub layout: Option<PathBuf>,
    pub domains: Option<usize>,
}

impl Target {
    pub fn resolve(args: TargetArgs, config: &Config) -> Self {
        Target {
            core: args
                .core
                .or_else(|| config.core.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CORE_PATH)),
            maps: args.maps,
            symbols: args
                .symbols
                .or_else(|| config.symbols.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SYMBOLS_PATH)),
            layout: args.layout.or_else(|| config.layout.clone()),
            domains: args.domains,
        }
    }

    pub fn load_layout(&self) -> Result<Layout> {
        match &self.layout {
            Some(path) => Layout::load(path)
                .with_context(|| format!("Failed to load layout from {}", path.display())),
            None => Ok(Layout::default()),
        }
    }

    pub fn load_symbols(&self) -> Result<KernelSymbols> {
        let table = SymbolTable::load(&self.symbols)
            .with_context(|| format!("Failed to load symbols from {}", self.symbols.display()))?;
        tracing::debug!("{} symbols in {}", table.len(), self.symbols.display());

        KernelSymbols::resolve(&table)
            .with_context(|| format!("Failed to resolve symbols in {}", self.symbols.display()))
    }

    /// Domain count, checked against the keg record size it implies
    pub fn domain_count(&self, layout: &Layout) -> Result<usize> {
        let count = match self.domains {
            Some(count) => count,
            None => umaslab::query_domain_count().context("Failed to query memory domains")?,
        };
        if count == 0 {
            bail!("Memory domain count must be at least 1");
        }
        layout
            .keg_size(count)
            .with_context(|| format!("Invalid memory domain count {count}"))?;
        Ok(count)
    }

    pub fn open_memory(&self) -> Result<Box<dyn MemorySource>> {
        open_memory(&self.core, self.maps.as_deref())
    }
}

fn open_memory(core: &Path, maps: Option<&Path>) -> Result<Box<dyn MemorySource>> {
    let memory = source::open(core, maps)
        .with_context(|| format!("Failed to open kernel memory {}", core.display()))?;
    tracing::info!(
        "Opened {} ({} regions{})",
        core.display(),
        memory.regions().len(),
        if memory.is_live() { ", live" } else { "" }
    );
    Ok(memory)
}

/// Everything needed to walk the allocator
pub struct Session {
    pub memory: Box<dyn MemorySource>,
    pub layout: Layout,
    pub symbols: KernelSymbols,
    pub domain_count: usize,
}

impl Session {
    /// Load symbols and layout, size the keg records, then open memory
    pub fn open(target: &Target) -> Result<Self> {
        let layout = target.load_layout()?;
        let symbols = target.load_symbols()?;
        let domain_count = target.domain_count(&layout)?;
        let memory = target.open_memory()?;

        Ok(Session {
            memory,
            layout,
            symbols,
            domain_count,
        })
    }
}
