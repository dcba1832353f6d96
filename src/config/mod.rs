//! Site configuration management for `atoll.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                          |
//! |----------------|--------------------------------------------------|
//! | `[build]`      | Paths, build mode, minification, date format     |
//! | `[islands]`    | Import map, CDN resolution, remote module cache  |
//! | `[markdown]`   | Markdown rendering hooks                         |
//! | `[serve]`      | Dev server address, watching, live reload        |
//!
//! # Example
//!
//! ```toml
//! [build]
//! pages = "pages"
//! output = "_site"
//! mode = "production"
//!
//! [islands]
//! cdn = true
//!
//! [islands.import_map]
//! preact = "https://esm.sh/preact@10.19.3"
//!
//! [serve]
//! port = 5277
//! ```
//!
//! The file is optional: a missing `atoll.toml` means all defaults.

mod build;
pub mod defaults;
mod error;
mod islands;
mod markdown;
mod serve;

pub use build::{BuildConfig, Mode};
pub use error::ConfigError;
pub use islands::IslandsConfig;
pub use markdown::MarkdownConfig;
pub use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

/// Default config file name, looked up in the site root.
pub const CONFIG_FILE: &str = "atoll.toml";

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B (bytes), KB (kilobytes), MB (megabytes).
/// Case-insensitive for the suffix.
///
/// # Examples
/// ```ignore
/// parse_size_string("20KB") // → 20480
/// parse_size_string("5MB")  // → 5242880
/// parse_size_string("100")  // → 100 (defaults to bytes)
/// ```
fn parse_size_string(s: &str) -> usize {
    let s = s.to_uppercase();
    let (multiplier, suffix_len) = if s.ends_with("MB") {
        (1024 * 1024, 2)
    } else if s.ends_with("KB") {
        (1024, 2)
    } else if s.ends_with('B') {
        (1, 1)
    } else {
        (1, 0)
    };
    let value: usize = s[..s.len() - suffix_len].trim().parse().unwrap_or(0);
    multiplier * value
}

/// True for relative paths that never climb above their base.
fn stays_inside(path: &Path) -> bool {
    !path.to_string_lossy().starts_with('~')
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

// ============================================================================
// CLI Overrides
// ============================================================================

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Config file name relative to the root.
    pub config: Option<PathBuf>,
    pub mode: Option<String>,
    pub minify: Option<bool>,
    pub clean: Option<bool>,
    pub interface: Option<String>,
    pub port: Option<u16>,
    pub watch: Option<bool>,
}

impl From<&Cli> for ConfigOverrides {
    fn from(cli: &Cli) -> Self {
        let mut overrides = Self {
            config: Some(cli.config.clone()),
            ..Self::default()
        };

        match &cli.command {
            Commands::Build { build_args } => {
                overrides.mode = build_args.mode.clone();
                overrides.minify = build_args.minify;
                overrides.clean = build_args.clean.then_some(true);
            }
            Commands::Serve {
                build_args,
                interface,
                port,
                watch,
            } => {
                // Serving defaults to development builds
                overrides.mode = build_args
                    .mode
                    .clone()
                    .or_else(|| Some(Mode::Development.name().to_owned()));
                overrides.minify = build_args.minify;
                overrides.clean = build_args.clean.then_some(true);
                overrides.interface = interface.clone();
                overrides.port = *port;
                overrides.watch = *watch;
            }
        }

        overrides
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing atoll.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Island component settings
    #[serde(default)]
    pub islands: IslandsConfig,

    /// Markdown rendering settings
    #[serde(default)]
    pub markdown: MarkdownConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: PathBuf::from(CONFIG_FILE),
            contents: content.to_owned(),
            source,
        })
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content).map_err(|err| match err {
            ConfigError::Toml { contents, source, .. } => ConfigError::Toml {
                path: path.to_path_buf(),
                contents,
                source,
            },
            other => other,
        })
    }

    /// Read, override, validate and normalize the configuration of the site
    /// rooted at `root`.
    pub fn load(root: &Path, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let name = overrides
            .config
            .as_deref()
            .unwrap_or(Path::new(CONFIG_FILE));
        let config_path = root.join(name);

        let mut config = if config_path.is_file() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };

        config.config_path = Self::normalize_path(&config_path);
        config.update_with_overrides(overrides);
        config.validate()?;
        config.update_path_with_root(root);

        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf());
    }

    /// Validated build mode.
    pub fn mode(&self) -> Mode {
        self.build.mode.parse().unwrap_or_default()
    }

    pub fn is_dev(&self) -> bool {
        self.mode() == Mode::Development
    }

    /// Directory bundled scripts, styles and media are written to.
    pub fn assets_dir(&self) -> PathBuf {
        self.build.output.join(&self.build.assets)
    }

    /// Public URL prefix of [`Self::assets_dir`], without trailing slash.
    pub fn assets_url(&self) -> String {
        let parts: Vec<_> = self
            .build
            .assets
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        format!("/{}", parts.join("/"))
    }

    /// Sandbox heap limit in bytes.
    pub fn memory_limit(&self) -> usize {
        parse_size_string(&self.islands.memory_limit)
    }

    /// Apply command-line values over file values
    fn update_with_overrides(&mut self, overrides: &ConfigOverrides) {
        Self::update_option(&mut self.build.mode, overrides.mode.as_ref());
        Self::update_option(&mut self.build.minify, overrides.minify.as_ref());
        Self::update_option(&mut self.build.clean, overrides.clean.as_ref());
        Self::update_option(&mut self.serve.interface, overrides.interface.as_ref());
        Self::update_option(&mut self.serve.port, overrides.port.as_ref());
        Self::update_option(&mut self.serve.watch, overrides.watch.as_ref());
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve all paths against the root and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path) {
        let root = Self::normalize_path(root);
        self.set_root(&root);

        self.build.pages = Self::normalize_path(&root.join(&self.build.pages));
        self.build.output = Self::normalize_path(&root.join(&self.build.output));
        self.build.template = Self::normalize_path(&root.join(&self.build.template));

        let cache_dir = self.islands.cache_dir.to_string_lossy().into_owned();
        let cache_dir = PathBuf::from(shellexpand::tilde(&cache_dir).into_owned());
        self.islands.cache_dir = if cache_dir.is_relative() {
            Self::normalize_path(&root.join(cache_dir))
        } else {
            cache_dir
        };
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate raw (not yet normalized) configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build.mode.parse::<Mode>()?;

        if !stays_inside(&self.build.pages) {
            return Err(ConfigError::Validation(format!(
                "[build.pages] must be inside the site, got `{}`",
                self.build.pages.display()
            )));
        }

        if !stays_inside(&self.build.assets) {
            return Err(ConfigError::Validation(format!(
                "[build.assets] must be inside the output directory, got `{}`",
                self.build.assets.display()
            )));
        }

        match url::Url::parse(&self.islands.cdn_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Validation(
                    "[islands.cdn_url] must start with http:// or https://".into(),
                ));
            }
        }

        self.serve.validate()?;

        for (name, target) in &self.islands.import_map {
            if name.trim().is_empty() || target.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "[islands.import_map] entry `{name}` must map a name to a non-empty target"
                )));
            }
        }

        let valid_size_suffixes = ["B", "KB", "MB"];
        let limit = self.islands.memory_limit.to_uppercase();
        if !valid_size_suffixes.iter().any(|s| limit.ends_with(s)) || self.memory_limit() == 0 {
            return Err(ConfigError::Validation(
                "[islands.memory_limit] must be a positive size ending with B, KB, or MB".into(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_size_string() {
        assert_eq!(parse_size_string("20KB"), 20 * 1024);
        assert_eq!(parse_size_string("20kb"), 20 * 1024);
        assert_eq!(parse_size_string("5MB"), 5 * 1024 * 1024);
        assert_eq!(parse_size_string("100B"), 100);
        assert_eq!(parse_size_string("100"), 100);
        assert_eq!(parse_size_string(" 20 KB"), 20 * 1024);
        assert_eq!(parse_size_string("invalid"), 0);
    }

    #[test]
    fn test_from_str_invalid_toml_keeps_contents() {
        let invalid = "[build\npages = 1";
        let err = SiteConfig::from_str(invalid).unwrap_err();

        match err {
            ConfigError::Toml { contents, .. } => assert_eq!(contents, invalid),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_top_level_field_rejection() {
        let result = SiteConfig::from_str("[base]\ntitle = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_without_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig::load(dir.path(), &ConfigOverrides::default()).unwrap();

        assert_eq!(config.mode(), Mode::Production);
        assert!(config.build.output.is_absolute());
        assert!(config.build.output.ends_with("_site"));
        assert_eq!(config.assets_dir(), config.build.output.join("_assets"));
        assert_eq!(config.assets_url(), "/_assets");
    }

    #[test]
    fn test_load_applies_overrides() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[build]\nmode = \"production\"\nminify = true\n").unwrap();

        let overrides = ConfigOverrides {
            mode: Some("development".into()),
            minify: Some(false),
            port: Some(9000),
            ..ConfigOverrides::default()
        };
        let config = SiteConfig::load(dir.path(), &overrides).unwrap();

        assert!(config.is_dev());
        assert!(!config.build.minify);
        assert_eq!(config.serve.port, 9000);
    }

    #[test]
    fn test_load_rejects_invalid_mode() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[build]\nmode = \"staging\"\n").unwrap();

        let err = SiteConfig::load(dir.path(), &ConfigOverrides::default()).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, allowed } => {
                assert_eq!(key, "build.mode");
                assert_eq!(value, "staging");
                assert_eq!(allowed, vec!["development", "production"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_pages_outside_site() {
        for pages in ["../elsewhere", "/abs/pages", "~/pages"] {
            let mut config = SiteConfig::default();
            config.build.pages = PathBuf::from(pages);
            assert!(
                matches!(config.validate(), Err(ConfigError::Validation(_))),
                "{pages} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_cdn_url_scheme() {
        let mut config = SiteConfig::default();
        config.islands.cdn_url = "ftp://cdn.example".into();
        assert!(config.validate().is_err());

        config.islands.cdn_url = "https://cdn.example".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_import_map_target() {
        let mut config = SiteConfig::default();
        config.islands.import_map.insert("preact".into(), " ".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_memory_limit() {
        let mut config = SiteConfig::default();
        config.islands.memory_limit = "lots".into();
        assert!(config.validate().is_err());

        config.islands.memory_limit = "64MB".into();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory_limit(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_relative_cache_dir_resolves_against_root() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[islands]\ncache_dir = \".cache/modules\"\n").unwrap();

        let config = SiteConfig::load(dir.path(), &ConfigOverrides::default()).unwrap();
        assert!(config.islands.cache_dir.is_absolute());
        assert!(config.islands.cache_dir.ends_with(".cache/modules"));
    }
}
