//! Front matter splitting and parsing.
//!
//! ```text
//! ---                 +++
//! title: YAML         title = "TOML"
//! ---                 +++
//! body                body
//! ```

use crate::{
    data::{Data, DataMap},
    diagnostics::{SourceError, from_toml_error, from_yaml_error},
};
use std::path::Path;

/// A source file split at the end of its front matter.
#[derive(Debug, Default, PartialEq)]
pub struct FrontMatter {
    pub data: DataMap,
    /// Byte offset where the body starts.
    pub body_start: usize,
    /// Lines before the body.
    pub line_offset: usize,
}

impl FrontMatter {
    pub fn body<'a>(&self, source: &'a str) -> &'a str {
        &source[self.body_start..]
    }
}

#[derive(Clone, Copy)]
enum Format {
    Yaml,
    Toml,
}

/// Find the fenced block at the start of `source`: (format, text range,
/// body start).
fn split(source: &str) -> Option<(Format, std::ops::Range<usize>, usize)> {
    let (format, fence) = if source.starts_with("---") {
        (Format::Yaml, "---")
    } else if source.starts_with("+++") {
        (Format::Toml, "+++")
    } else {
        return None;
    };

    let first_line_end = source.find('\n')?;
    if source[..first_line_end].trim_end() != fence {
        return None;
    }
    let start = first_line_end + 1;

    let mut offset = start;
    for line in source[start..].split_inclusive('\n') {
        if line.trim_end() == fence {
            return Some((format, start..offset, offset + line.len()));
        }
        offset += line.len();
    }
    None
}

/// Parse the front matter of `source`, read from `file`.
pub fn parse(source: &str, file: &Path) -> Result<FrontMatter, SourceError> {
    let Some((format, range, body_start)) = split(source) else {
        return Ok(FrontMatter::default());
    };
    let text = &source[range];

    let data = match format {
        _ if text.trim().is_empty() => Data::Null,
        Format::Yaml => serde_yaml::from_str::<Data>(text)
            .map_err(|err| from_yaml_error(&err, file, source, 1))?,
        Format::Toml => toml::from_str::<toml::Value>(text)
            .map(Data::from)
            .map_err(|err| from_toml_error(&err, file, source, 1))?,
    };
    let data = match data {
        Data::Map(map) => map,
        Data::Null => DataMap::new(),
        _ => {
            return Err(SourceError::new(
                file.to_string_lossy(),
                2,
                "front matter must be a table of keys and values",
            )
            .with_contents(source, 0));
        }
    };

    Ok(FrontMatter {
        data,
        body_start,
        line_offset: source[..body_start].matches('\n').count(),
    })
}
