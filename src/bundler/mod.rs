//! In-crate JavaScript bundler.
//!
//! Builds a module graph through the plugin chain, assigns modules to output
//! files and emits them with source maps:
//!
//! ```text
//! entries ─► graph::build ─► link::link ─► emit::emit ─► Vec<OutputFile>
//!               (plugins)       (chunks)      (code + maps)
//! ```
//!
//! Errors never abort halfway through graph construction; every failed
//! import is reported as a [`Message`] before the build stops.

mod emit;
mod graph;
mod lexer;
mod link;
pub mod plugin;
pub mod resolve;
mod scan;
pub mod sourcemap;

pub use plugin::{
    LoadResult, Loader, OnLoadArgs, OnResolveArgs, Plugin, PluginBuild, ResolveKind, ResolveResult,
};
pub use resolve::FILE_NAMESPACE;
pub use scan::js_string;
pub use sourcemap::SourceMap;

use std::{fmt, fs, io, path::PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub namespace: String,
    /// 1-based.
    pub line: usize,
    /// 1-based, in characters.
    pub column: usize,
    pub line_text: String,
}

impl Location {
    /// Location of byte `offset` inside `text`.
    pub fn at(file: &str, namespace: &str, text: &str, offset: usize) -> Self {
        let offset = offset.min(text.len());
        let before = &text[..offset];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let line_end = text[offset..].find('\n').map_or(text.len(), |i| offset + i);
        Self {
            file: file.to_owned(),
            namespace: namespace.to_owned(),
            line: before.matches('\n').count() + 1,
            column: text[line_start..offset].chars().count() + 1,
            line_text: text[line_start..line_end].trim_end_matches('\r').to_owned(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.namespace == FILE_NAMESPACE
    }
}

/// A bundler error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub location: Option<Location>,
    pub notes: Vec<String>,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
            notes: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}:{}:{}: {}", loc.file, loc.line, loc.column, self.text),
            None => f.write_str(&self.text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntryPoint {
    /// Specifier resolved from `BuildOptions::resolve_dir`.
    pub input: String,
    /// Substituted for `[name]` in `entry_names`.
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One self-executing script per entry.
    Iife,
    /// Browser ES modules.
    Esm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMapMode {
    /// Maps are only returned with the outputs.
    Memory,
    /// A `.map` output is emitted and referenced from each script.
    Linked,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub entry_points: Vec<EntryPoint>,
    pub resolve_dir: PathBuf,
    pub format: Format,
    pub splitting: bool,
    pub outdir: PathBuf,
    /// URL prefix of `outdir`.
    pub public_path: String,
    pub entry_names: String,
    pub chunk_names: String,
    pub asset_names: String,
    /// Hash file contents (production) or only module ids (development).
    pub content_hash: bool,
    pub sourcemap: SourceMapMode,
}

impl BuildOptions {
    pub fn new(resolve_dir: impl Into<PathBuf>, outdir: impl Into<PathBuf>) -> Self {
        Self {
            entry_points: Vec::new(),
            resolve_dir: resolve_dir.into(),
            format: Format::Iife,
            splitting: false,
            outdir: outdir.into(),
            public_path: String::new(),
            entry_names: "[name]".into(),
            chunk_names: "chunk-[hash]".into(),
            asset_names: "media/[name]-[hash]".into(),
            content_hash: true,
            sourcemap: SourceMapMode::Memory,
        }
    }

    pub fn entry(mut self, input: impl Into<String>, name: impl Into<String>) -> Self {
        self.entry_points.push(EntryPoint {
            input: input.into(),
            name: name.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Script,
    Stylesheet,
    SourceMap,
    Asset,
}

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: PathBuf,
    pub url: String,
    pub contents: Vec<u8>,
    pub kind: OutputKind,
    /// Entry point that produced this file, for entry scripts and styles.
    pub entry: Option<String>,
    pub map: Option<SourceMap>,
}

impl OutputFile {
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.contents).unwrap_or_default()
    }

    pub fn write(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, &self.contents)
    }
}

#[derive(Debug, Default)]
pub struct BuildResult {
    pub errors: Vec<Message>,
    pub outputs: Vec<OutputFile>,
}

impl BuildResult {
    pub fn entry_outputs<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a OutputFile> + 'a {
        self.outputs
            .iter()
            .filter(move |o| o.entry.as_deref() == Some(name))
    }
}

pub struct Bundler {
    plugins: Vec<Plugin>,
}

impl Bundler {
    pub fn new(plugins: Vec<Plugin>) -> Self {
        Self { plugins }
    }

    pub fn build(&self, options: &BuildOptions) -> BuildResult {
        let build = PluginBuild::new(&self.plugins);
        match graph::build(&build, options) {
            Ok(graph) => {
                let chunks = link::link(&graph, options);
                BuildResult {
                    errors: Vec::new(),
                    outputs: emit::emit(&graph, &chunks, options),
                }
            }
            Err(errors) => BuildResult {
                errors,
                outputs: Vec::new(),
            },
        }
    }
}

/// Fill `[name]` and `[hash]` in a naming template.
pub(crate) fn render_name(template: &str, name: &str, hash: &str) -> String {
    template.replace("[name]", name).replace("[hash]", hash)
}
