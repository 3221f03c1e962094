//! Core CLI definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "umaslabs")]
#[command(about = "Locate the slabs of a UMA zone in kernel memory", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where to read the kernel from and how to interpret it
#[derive(Args, Debug, Default, Clone)]
pub struct TargetArgs {
    /// Memory image: /proc/kcore, an ELF core, or a raw dump
    #[arg(short = 'M', long = "core", global = true, env = "UMASLABS_CORE")]
    pub core: Option<PathBuf>,

    /// Region map for a raw dump (`0xSTART 0xEND SIZE FILE_OFFSET` per line)
    #[arg(long, global = true)]
    pub maps: Option<PathBuf>,

    /// Kernel symbols: System.map, /proc/kallsyms, or an unstripped kernel
    #[arg(short = 'N', long, global = true, env = "UMASLABS_SYMBOLS")]
    pub symbols: Option<PathBuf>,

    /// Structure layout description (TOML)
    #[arg(short, long, global = true)]
    pub layout: Option<PathBuf>,

    /// Number of memory domains (queried from the running system if omitted)
    #[arg(short, long, global = true)]
    pub domains: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the address of every slab of a zone
    #[command(visible_alias = "m")]
    Slabs {
        /// Zone name (exact, case-sensitive)
        zone: String,

        /// Show where each address was found
        #[arg(short, long)]
        annotate: bool,
    },

    /// List every keg and the zones it backs
    #[command(visible_alias = "z")]
    Zones,

    /// Show the resolved kernel symbols
    Symbols,

    /// Print the effective structure layout as TOML
    Layout,

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Set default memory image
        #[arg(long)]
        set_core: Option<PathBuf>,

        /// Set default symbol file
        #[arg(long)]
        set_symbols: Option<PathBuf>,

        /// Set default layout file
        #[arg(long)]
        set_layout: Option<PathBuf>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}
