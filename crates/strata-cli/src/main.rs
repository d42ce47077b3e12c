use std::env;

use clap::Parser;
use cli::{Args, Commands};
use logging::setup_logging;
use state::{display_status, inspect, reset, StateContext};
use strata_config::{
    config::{generate_default_config, set_config_path, Config},
    error::ConfigError,
};
use strata_specialize::Result;
use strata_utils::path::resolve_path;
use tracing::{debug, info};

mod cli;
mod logging;
mod state;
mod utils;

fn open_state() -> Result<StateContext> {
    StateContext::open(&Config::new()?)
}

fn handle_cli() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        utils::disable_color();
    }

    if let Some(ref c) = args.config {
        let path = resolve_path(c).map_err(ConfigError::from)?;
        let path = if path.is_absolute() {
            path
        } else {
            env::current_dir()
                .map_err(ConfigError::from)?
                .join(path)
        };
        debug!("Using config file {}", path.display());
        set_config_path(path);
    }

    match args.command {
        Commands::DefConfig => {
            generate_default_config()?;
        }
        Commands::Config => {
            let config = Config::new()?;
            print!("{}", config.to_annotated_document()?);
        }
        Commands::Status => display_status(&open_state()?, args.json)?,
        Commands::Inspect { key } => inspect(&open_state()?, &key, args.json)?,
        Commands::Reset {
            key,
            all: _,
            keep_artifacts,
        } => {
            let count = reset(&open_state()?, key.as_deref(), keep_artifacts)?;
            info!("Reset {} identities", count);
        }
    }

    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
