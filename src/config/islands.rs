//! `[islands]` section configuration.
//!
//! Controls how island components resolve their imports.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

/// `[islands]` section in atoll.toml.
///
/// # Example
/// ```toml
/// [islands]
/// cdn = true                        # resolve bare imports from a CDN
/// cdn_url = "https://esm.sh"
///
/// [islands.import_map]
/// preact = "https://esm.sh/preact@10.19.3"
/// "@ui" = "./components/ui.js"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct IslandsConfig {
    /// Bare import name → local path or remote URL.
    #[serde(default)]
    pub import_map: BTreeMap<String, String>,

    /// Resolve bare imports that are not installed locally from `cdn_url`.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub cdn: bool,

    /// Base URL for CDN resolution.
    #[serde(default = "defaults::islands::cdn_url")]
    #[educe(Default = defaults::islands::cdn_url())]
    pub cdn_url: String,

    /// On-disk cache for fetched remote modules (`~` is expanded).
    #[serde(default = "defaults::islands::cache_dir")]
    #[educe(Default = defaults::islands::cache_dir())]
    pub cache_dir: PathBuf,

    /// Heap limit of the build-time script engine (e.g. "256MB").
    #[serde(default = "defaults::islands::memory_limit")]
    #[educe(Default = defaults::islands::memory_limit())]
    pub memory_limit: String,
}
