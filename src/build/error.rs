//! Build error type.

use crate::{
    config::ConfigError,
    diagnostics::{SourceError, Style, from_toml_error},
};
use std::{io, path::PathBuf};
use thiserror::Error;

/// One representative failure of a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Located in a real or virtual source file.
    #[error("{0}")]
    Source(Box<SourceError>),

    /// Bundler failure without a usable location.
    #[error("{0}")]
    Bundle(String),

    #[error("cannot access `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<SourceError> for BuildError {
    fn from(err: SourceError) -> Self {
        Self::Source(Box::new(err))
    }
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Code frame when the error has a location, the message chain otherwise.
    pub fn render(&self, style: Style) -> String {
        match self {
            Self::Source(err) => err.render(style),
            Self::Config(ConfigError::Toml {
                path,
                contents,
                source,
            }) => from_toml_error(source, path, contents, 0).render(style),
            Self::Other(err) => format!("{err:#}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    #[test]
    fn test_config_toml_error_renders_a_frame() {
        colored::control::set_override(false);
        let err: BuildError = SiteConfig::from_str("[build]\nminify = maybe\n").unwrap_err().into();

        let text = err.render(Style::Plain);
        assert!(text.contains("atoll.toml:2"), "{text}");
        assert!(text.contains("minify = maybe"), "{text}");
    }

    #[test]
    fn test_io_error_names_the_path() {
        let err = BuildError::io("/site/_site/index.html", io::Error::other("disk full"));
        assert_eq!(err.to_string(), "cannot access `/site/_site/index.html`: disk full");
    }

    #[test]
    fn test_other_keeps_context_chain() {
        let err = anyhow::anyhow!("root cause").context("reading pages");
        let text = BuildError::from(err).render(Style::Terminal);
        assert_eq!(text, "reading pages: root cause");
    }
}
