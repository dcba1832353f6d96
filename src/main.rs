//! atoll - a static site generator for markdown sites with component islands.

mod build;
mod bundler;
mod cli;
mod config;
mod data;
mod diagnostics;
mod islands;
mod logger;
mod serve;
mod utils;
mod watch;

use anyhow::Result;
use build::Builder;
use clap::Parser;
use cli::{Cli, Commands};
use config::ConfigOverrides;
use diagnostics::Style;
use serve::serve_site;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));

    let mut builder = match Builder::new(root, ConfigOverrides::from(&cli)) {
        Ok(builder) => builder,
        Err(err) => exit_with(&err),
    };

    match &cli.command {
        Commands::Build { .. } => {
            if let Err(err) = builder.build() {
                exit_with(&err);
            }
            Ok(())
        }
        Commands::Serve { .. } => serve_site(builder),
    }
}

/// Print a build error as a code frame and exit.
fn exit_with(err: &build::BuildError) -> ! {
    log!("error"; "{}", err.render(Style::Terminal));
    std::process::exit(1)
}
