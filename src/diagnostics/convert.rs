//! Converters from parser, bundler and sandbox failures to located errors.

use super::SourceError;
use crate::{
    build::BuildError,
    bundler::{Message, SourceMap},
    islands::sandbox::{STACK_FRAME, SandboxError},
};
use regex::{Captures, Regex};
use std::{fs, path::Path, sync::LazyLock};

static YAML_POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" at line \d+ column \d+$").unwrap());

/// 1-based (line, column) of byte `offset` in `text`.
fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = text.get(..offset).unwrap_or(text);
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (
        before.matches('\n').count() + 1,
        before[line_start..].chars().count() + 1,
    )
}

pub fn from_bundler_message(message: &Message) -> BuildError {
    let text = format!("bundle: {}", message.text);
    let details = message.notes.join("\n");

    let Some(location) = &message.location else {
        let text = if details.is_empty() {
            text
        } else {
            format!("{text}\n{details}")
        };
        return BuildError::Bundle(text);
    };

    let err = SourceError::new(location.file.as_str(), location.line, text)
        .with_column(Some(location.column))
        .with_details(details);

    let contents = location
        .is_file()
        .then(|| fs::read_to_string(&location.file).ok())
        .flatten();
    let err = match contents {
        Some(contents) => err.with_contents(contents, 0),
        None => {
            let mut err = err
                .with_contents(location.line_text.as_str(), location.line.saturating_sub(1))
                .virtual_source();
            if !location.is_file() {
                err.file = format!("{}:{}", location.namespace, location.file);
            }
            err
        }
    };
    err.into()
}

/// Resolve a generated 1-based position through `map`.
fn original(map: &SourceMap, line: usize, column: Option<usize>) -> Option<(SourceError, String)> {
    let position = map.lookup(
        line.checked_sub(1)? as u32,
        column.unwrap_or(1).saturating_sub(1) as u32,
    )?;
    let (line, column) = (position.line as usize + 1, position.column as usize + 1);

    let source = position.source;
    let (err, label) = match (&source.path, &source.content) {
        (Some(path), _) => (
            SourceError::new(path.to_string_lossy(), line, ""),
            super::display_path(path),
        ),
        (None, Some(content)) => (
            SourceError::new(source.name.as_str(), line, "")
                .with_contents(content.as_str(), 0)
                .virtual_source(),
            source.name.clone(),
        ),
        (None, None) => return None,
    };
    Some((err.with_column(Some(column)), format!("{label}:{line}:{column}")))
}

/// Map a sandbox failure back to original sources.
///
/// The throw site and every stack frame are looked up in `map`; frames that
/// don't resolve keep their generated position. When the throw site itself
/// doesn't resolve, the error points into `script` as a virtual file.
pub fn from_sandbox_error(err: &SandboxError, map: &SourceMap, script: &str) -> BuildError {
    let message = format!("sandbox: {}", err.message);

    let details = err.stack.as_deref().map(|stack| {
        STACK_FRAME
            .replace_all(stack, |caps: &Captures<'_>| {
                let line = caps[3].parse().unwrap_or(0);
                let column = caps.get(4).and_then(|c| c.as_str().parse().ok());
                let name = caps.get(1).map_or("<anonymous>", |m| m.as_str());
                match original(map, line, column) {
                    Some((_, position)) => format!("at {name} ({position})"),
                    None => caps[0].to_owned(),
                }
            })
            .into_owned()
    });

    let Some((line, column)) = err.location else {
        return BuildError::Other(anyhow::anyhow!(
            "{message}{}",
            details.map(|d| format!("\n{d}")).unwrap_or_default()
        ));
    };

    let located = match original(map, line, column) {
        Some((located, _)) => located,
        None => SourceError::new(map.file(), line, "")
            .with_column(column)
            .with_contents(script, 0)
            .virtual_source(),
    };
    let mut located = located.with_details(details.unwrap_or_default());
    located.message = message;
    located.into()
}

/// Front matter parse failure. `line_offset` counts the lines of `contents`
/// before the YAML text (the opening fence).
pub fn from_yaml_error(
    err: &serde_yaml::Error,
    file: &Path,
    contents: &str,
    line_offset: usize,
) -> SourceError {
    let text = err.to_string();
    let text = YAML_POSITION.replace(&text, "");
    let (line, column) = err
        .location()
        .map_or((1, None), |l| (l.line(), Some(l.column())));

    SourceError::new(file.to_string_lossy(), line + line_offset, format!("yaml: {text}"))
        .with_column(column)
        .with_details("Couldn't parse the front matter from this file.")
        .with_contents(contents, 0)
}

/// TOML parse failure (front matter or `atoll.toml`).
pub fn from_toml_error(
    err: &toml::de::Error,
    file: &Path,
    contents: &str,
    line_offset: usize,
) -> SourceError {
    let inner: String = contents
        .split_inclusive('\n')
        .skip(line_offset)
        .collect();
    let (line, column) = err
        .span()
        .map_or((1, None), |span| {
            let (line, column) = line_column(&inner, span.start);
            (line, Some(column))
        });

    SourceError::new(
        file.to_string_lossy(),
        line + line_offset,
        format!("toml: {}", err.message().trim_end()),
    )
    .with_column(column)
    .with_contents(contents, 0)
}

/// Template failure. `contents` is the template source as parsed, which
/// starts `line_offset` lines into `file`.
pub fn from_template_error(
    err: &minijinja::Error,
    file: &Path,
    contents: &str,
    line_offset: usize,
) -> SourceError {
    let message = match err.detail() {
        Some(detail) => format!("template: {}: {detail}", err.kind()),
        None => format!("template: {}", err.kind()),
    };
    let line = err.line().unwrap_or(1);
    let column = err.range().map(|range| line_column(contents, range.start).1);

    SourceError::new(file.to_string_lossy(), line + line_offset, message)
        .with_column(column)
        .with_contents(contents, line_offset)
}
