//! `[build]` section configuration.
//!
//! Contains site layout paths, build mode and output settings.

use super::{ConfigError, defaults};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

// ============================================================================
// Enums
// ============================================================================

/// Build mode, selecting between cache-friendly output and fast iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Fingerprinted bundle names, minified output.
    #[default]
    Production,
    /// Stable bundle names and live reload.
    Development,
}

impl Mode {
    pub const NAMES: &[&str] = &["production", "development"];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(ConfigError::invalid_value("build.mode", s, Self::NAMES)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// BuildConfig
// ============================================================================

/// `[build]` section in atoll.toml - build pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// pages = "pages"          # Markdown source directory
/// output = "_site"         # Output directory
/// mode = "production"      # or "development"
/// minify = true
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Pages directory, relative to the root. Must stay inside the site.
    #[serde(default = "defaults::build::pages")]
    #[educe(Default = defaults::build::pages())]
    pub pages: PathBuf,

    /// Build output directory.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Bundled assets directory, relative to the output directory.
    #[serde(default = "defaults::build::assets")]
    #[educe(Default = defaults::build::assets())]
    pub assets: PathBuf,

    /// Global page template. An embedded default is used when missing.
    #[serde(default = "defaults::build::template")]
    #[educe(Default = defaults::build::template())]
    pub template: PathBuf,

    /// `production` or `development`.
    #[serde(default = "defaults::build::mode")]
    #[educe(Default = defaults::build::mode())]
    pub mode: String,

    /// Minify HTML output (production only).
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub minify: bool,

    /// Remove the output directory before building.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub clean: bool,

    /// `chrono` format used to parse front matter dates.
    #[serde(default = "defaults::build::date_format")]
    #[educe(Default = defaults::build::date_format())]
    pub date_format: String,
}
