//! Source map v3 generation and lookup.
//!
//! Mappings are kept as decoded segments per generated line so the static
//! renderer can reverse sandbox locations without re-parsing the JSON form.
//! All lines and columns are 0-based here; callers convert at the edges.

use serde::Serialize;
use std::path::PathBuf;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// One original source referenced by a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSource {
    /// Name written to `sources` (module display id).
    pub name: String,
    /// Original text, written to `sourcesContent`.
    pub content: Option<String>,
    /// Location on disk for `file` namespace modules.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub gen_column: u32,
    pub source: u32,
    pub line: u32,
    pub column: u32,
}

/// Result of [`SourceMap::lookup`].
#[derive(Debug, Clone, Copy)]
pub struct OriginalPosition<'a> {
    pub source: &'a MapSource,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    file: String,
    sources: Vec<MapSource>,
    lines: Vec<Vec<Segment>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap<'a> {
    version: u8,
    file: &'a str,
    sources: Vec<&'a str>,
    sources_content: Vec<Option<&'a str>>,
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMap {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn add_source(&mut self, source: MapSource) -> u32 {
        self.sources.push(source);
        (self.sources.len() - 1) as u32
    }

    /// Name of the generated file.
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn sources(&self) -> &[MapSource] {
        &self.sources
    }

    /// Record a segment on generated line `gen_line`.
    ///
    /// Segments on one line must be added in increasing column order.
    pub fn add_mapping(&mut self, gen_line: usize, segment: Segment) {
        if self.lines.len() <= gen_line {
            self.lines.resize_with(gen_line + 1, Vec::new);
        }
        self.lines[gen_line].push(segment);
    }

    /// Find the original position of a generated location.
    ///
    /// Picks the last segment starting at or before `column`; a column left
    /// of every segment maps to the first segment of the line.
    pub fn lookup(&self, line: u32, column: u32) -> Option<OriginalPosition<'_>> {
        let segments = self.lines.get(line as usize)?;
        let index = segments.partition_point(|s| s.gen_column <= column);
        let segment = segments.get(index.saturating_sub(1))?;
        let source = self.sources.get(segment.source as usize)?;
        Some(OriginalPosition {
            source,
            line: segment.line,
            column: segment.column,
        })
    }

    pub fn to_json(&self) -> String {
        let raw = RawSourceMap {
            version: 3,
            file: &self.file,
            sources: self.sources.iter().map(|s| s.name.as_str()).collect(),
            sources_content: self.sources.iter().map(|s| s.content.as_deref()).collect(),
            names: [],
            mappings: self.encode_mappings(),
        };
        serde_json::to_string(&raw).unwrap_or_default()
    }

    fn encode_mappings(&self) -> String {
        let mut out = String::new();
        let (mut source, mut line, mut column) = (0i64, 0i64, 0i64);

        for (i, segments) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let mut gen_column = 0i64;
            for (j, seg) in segments.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                encode_vlq(&mut out, i64::from(seg.gen_column) - gen_column);
                encode_vlq(&mut out, i64::from(seg.source) - source);
                encode_vlq(&mut out, i64::from(seg.line) - line);
                encode_vlq(&mut out, i64::from(seg.column) - column);
                gen_column = i64::from(seg.gen_column);
                source = i64::from(seg.source);
                line = i64::from(seg.line);
                column = i64::from(seg.column);
            }
        }
        out
    }
}

fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}
