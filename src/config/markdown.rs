//! `[markdown]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[markdown]` section in atoll.toml - markdown rendering hooks.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct MarkdownConfig {
    /// Give headings an id and wrap them in a self-link.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub heading_anchors: bool,

    /// Open absolute links in a new tab without an opener.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub external_links: bool,
}
