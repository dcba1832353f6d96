//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// atoll static site generator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Site root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: atoll.toml)
    #[arg(short = 'C', long, default_value = "atoll.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Shared build arguments for Build and Serve commands
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Clean output directory completely before building
    #[arg(long)]
    pub clean: bool,

    /// Minify the html content (production only)
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub minify: Option<bool>,

    /// Build mode: `production` or `development`
    #[arg(long)]
    pub mode: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the site into the output directory
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Serve the site. Rebuild and reload on change automatically
    Serve {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// enable watch
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}

impl Cli {
    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;

    #[test]
    fn test_parse_build() {
        let cli = Cli::parse_from(["atoll", "build", "--clean", "--mode", "development"]);
        let overrides = ConfigOverrides::from(&cli);

        assert!(!cli.is_serve());
        assert_eq!(overrides.mode.as_deref(), Some("development"));
        assert_eq!(overrides.clean, Some(true));
        assert_eq!(overrides.config, Some(PathBuf::from("atoll.toml")));
    }

    #[test]
    fn test_serve_defaults_to_development() {
        let cli = Cli::parse_from(["atoll", "serve", "--port", "8080"]);
        let overrides = ConfigOverrides::from(&cli);

        assert!(cli.is_serve());
        assert_eq!(overrides.mode.as_deref(), Some("development"));
        assert_eq!(overrides.port, Some(8080));
        assert_eq!(overrides.clean, None);
    }

    #[test]
    fn test_serve_explicit_mode_wins() {
        let cli = Cli::parse_from(["atoll", "serve", "--mode", "production"]);
        let overrides = ConfigOverrides::from(&cli);

        assert_eq!(overrides.mode.as_deref(), Some("production"));
    }

    #[test]
    fn test_minify_flag_without_value() {
        let cli = Cli::parse_from(["atoll", "build", "--minify"]);
        let overrides = ConfigOverrides::from(&cli);

        assert_eq!(overrides.minify, Some(true));
    }
}
