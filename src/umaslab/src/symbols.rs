//! Kernel symbol resolution
//!
//! A [`SymbolTable`] is loaded once from a System.map / kallsyms text file or
//! from the symbol table of an ELF kernel image, and never changes afterwards.
//! [`KernelSymbols`] resolves the fixed set of globals the slab walker needs in
//! one batch, so a kernel that does not match is rejected before any memory
//! is read.

use crate::error::{Error, Result};
use elf::abi::SHN_UNDEF;
use elf::endian::AnyEndian;
use elf::ElfStream;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

/// Symbol table of the running kernel (Linux)
pub const KALLSYMS_PATH: &str = "/proc/kallsyms";
/// Kernel image of the running system (FreeBSD)
pub const KERNEL_PATH: &str = "/boot/kernel/kernel";

/// Symbol source used when none is given
#[cfg(target_os = "freebsd")]
pub const DEFAULT_SYMBOLS_PATH: &str = KERNEL_PATH;
#[cfg(not(target_os = "freebsd"))]
pub const DEFAULT_SYMBOLS_PATH: &str = KALLSYMS_PATH;

/// Head of the global keg list
pub const UMA_KEGS: &str = "uma_kegs";
/// Base of the page descriptor array
pub const VM_PAGE_ARRAY: &str = "vm_page_array";
/// Number of entries in the page descriptor array
pub const VM_PAGE_ARRAY_SIZE: &str = "vm_page_array_size";

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, u64>,
}

impl SymbolTable {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut symbols = HashMap::new();
        for (name, address) in entries {
            symbols.entry(name.into()).or_insert(address);
        }
        SymbolTable { symbols }
    }

    /// Load a symbol file, detecting ELF images by their magic
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut magic = [0u8; 4];
        let is_elf = File::open(path)
            .and_then(|mut f| f.read_exact(&mut magic))
            .map(|_| &magic == b"\x7fELF")
            .unwrap_or(false);

        if is_elf {
            Self::from_elf_file(path)
        } else {
            Self::from_map_file(path)
        }
    }

    pub fn from_map_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::SymbolTable(format!("{}: {e}", path.display())))?;
        Self::parse_map(&contents)
    }

    /// Parse `ADDRESS TYPE NAME [module]` lines (System.map, /proc/kallsyms)
    ///
    /// Entries with a zero address carry no information (kallsyms hides
    /// addresses from unprivileged readers) and are dropped.
    pub fn parse_map(contents: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut hidden = 0usize;

        for (lineno, line) in contents.lines().enumerate() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            if parts.len() < 3 {
                return Err(Error::SymbolTable(format!(
                    "line {}: expected \"ADDRESS TYPE NAME\"",
                    lineno + 1
                )));
            }

            let address = u64::from_str_radix(parts[0], 16).map_err(|_| {
                Error::SymbolTable(format!(
                    "line {}: invalid address {:?}",
                    lineno + 1,
                    parts[0]
                ))
            })?;
            if address == 0 {
                hidden += 1;
                continue;
            }
            entries.push((parts[2], address));
        }

        if hidden > 0 {
            tracing::debug!("Skipped {} symbols with hidden addresses", hidden);
        }
        if entries.is_empty() && hidden > 0 {
            return Err(Error::SymbolTable(
                "all symbol addresses are hidden; run with sufficient privileges".to_string(),
            ));
        }

        Ok(Self::from_entries(entries))
    }

    /// Read the `.symtab` of an ELF kernel image
    pub fn from_elf_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let fail =
            |e: &dyn std::fmt::Display| Error::SymbolTable(format!("{}: {e}", path.display()));

        let file = File::open(path).map_err(|e| fail(&e))?;
        let mut elf = ElfStream::<AnyEndian, _>::open_stream(file).map_err(|e| fail(&e))?;
        let (symtab, strtab) = elf
            .symbol_table()
            .map_err(|e| fail(&e))?
            .ok_or_else(|| fail(&"no symbol table"))?;

        let mut entries = Vec::new();
        for sym in symtab.iter() {
            if sym.st_shndx == SHN_UNDEF || sym.st_name == 0 {
                continue;
            }
            let name = strtab.get(sym.st_name as usize).map_err(|e| fail(&e))?;
            entries.push((name.to_string(), sym.st_value));
        }

        Ok(Self::from_entries(entries))
    }

    /// Look up a symbol by name
    ///
    /// Also tries the leading-underscore spelling used by a.out-style name
    /// lists, in both directions.
    pub fn lookup(&self, name: &str) -> Option<u64> {
        if let Some(&address) = self.symbols.get(name) {
            return Some(address);
        }
        match name.strip_prefix('_') {
            Some(bare) => self.symbols.get(bare).copied(),
            None => self.symbols.get(&format!("_{name}")).copied(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Addresses of the kernel globals the slab walker reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSymbols {
    pub uma_kegs: u64,
    pub vm_page_array: u64,
    pub vm_page_array_size: u64,
}

impl KernelSymbols {
    pub const REQUIRED: [&'static str; 3] = [UMA_KEGS, VM_PAGE_ARRAY, VM_PAGE_ARRAY_SIZE];

    /// Resolve every required symbol, failing with the full list of missing names
    pub fn resolve(table: &SymbolTable) -> Result<Self> {
        let resolved: Vec<Option<u64>> = Self::REQUIRED.iter().map(|n| table.lookup(n)).collect();
        let missing: Vec<String> = Self::REQUIRED
            .iter()
            .zip(&resolved)
            .filter(|(_, address)| address.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::UnresolvedSymbols(missing));
        }

        let symbols = KernelSymbols {
            uma_kegs: resolved[0].unwrap_or_default(),
            vm_page_array: resolved[1].unwrap_or_default(),
            vm_page_array_size: resolved[2].unwrap_or_default(),
        };
        tracing::debug!("Resolved kernel symbols: {:x?}", symbols);
        Ok(symbols)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> {
        [
            (UMA_KEGS, self.uma_kegs),
            (VM_PAGE_ARRAY, self.vm_page_array),
            (VM_PAGE_ARRAY_SIZE, self.vm_page_array_size),
        ]
        .into_iter()
    }
}
