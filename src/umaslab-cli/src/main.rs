mod cli;
mod commands;
mod config;
mod target;

use anyhow::Result;
use clap::Parser;
use config::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use target::Target;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("umaslabs: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "umaslab=warn,umaslabs=warn",
        1 => "umaslab=info,umaslabs=info",
        2 => "umaslab=debug,umaslabs=debug",
        _ => "umaslab=trace,umaslabs=trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let target_args = cli.target;
    let target = || -> Result<Target> {
        let target = Target::resolve(target_args, &Config::load()?);
        tracing::debug!("Target: {:?}", target);
        Ok(target)
    };

    match cli.command {
        Commands::Slabs { zone, annotate } => commands::slabs::handle(&target()?, &zone, annotate),
        Commands::Zones => commands::zones::handle(&target()?),
        Commands::Symbols => commands::symbols::handle(&target()?),
        Commands::Layout => commands::layout::handle(&target()?),
        Commands::Configure {
            set_core,
            set_symbols,
            set_layout,
            show,
        } => commands::configure::handle(set_core, set_symbols, set_layout, show),
    }
}
