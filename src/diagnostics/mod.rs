//! Located build errors.
//!
//! Every parser, bundler and sandbox failure that can be tied to a source
//! position becomes a [`SourceError`], rendered as a code frame for the
//! terminal or as HTML for the development server's error page.

mod convert;
mod frame;

pub use convert::{
    from_bundler_message, from_sandbox_error, from_template_error, from_toml_error,
    from_yaml_error,
};
pub use frame::{CodeFrame, Style};

use crate::build::BuildError;
use std::{fmt, fs, path::Path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    /// Path on disk, or a module name for virtual sources.
    pub file: String,
    /// No file exists on disk for `file`.
    pub is_virtual: bool,
    /// 1-based line in the outer file.
    pub line: usize,
    /// 1-based column, when known.
    pub column: Option<usize>,
    pub message: String,
    pub details: Option<String>,
    /// Lines stripped from the front of `contents` (e.g. front matter).
    pub line_offset: usize,
    /// Source text; read from `file` when absent.
    pub contents: Option<String>,
}

impl std::error::Error for SourceError {}

impl SourceError {
    pub fn new(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            is_virtual: false,
            line,
            column: None,
            message: message.into(),
            details: None,
            line_offset: 0,
            contents: None,
        }
    }

    pub fn with_column(mut self, column: Option<usize>) -> Self {
        self.column = column.filter(|&c| c > 0);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        let details = details.into();
        self.details = (!details.trim().is_empty()).then_some(details);
        self
    }

    pub fn with_contents(mut self, contents: impl Into<String>, line_offset: usize) -> Self {
        self.contents = Some(contents.into());
        self.line_offset = line_offset;
        self
    }

    pub fn virtual_source(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// `file:line[:column]`, relative to the working directory when possible.
    pub fn location(&self) -> String {
        let path = Path::new(&self.file);
        let file = if path.is_absolute() {
            display_path(path)
        } else if self.is_virtual {
            format!("<{}>", self.file)
        } else {
            self.file.clone()
        };
        match self.column {
            Some(column) => format!("{file}:{}:{column}", self.line),
            None => format!("{file}:{}", self.line),
        }
    }

    pub fn frame(&self) -> CodeFrame {
        let contents = match &self.contents {
            Some(contents) => Some(contents.clone()),
            None if !self.is_virtual => fs::read_to_string(&self.file).ok(),
            None => None,
        };
        let source_lines: Vec<&str> = contents.as_deref().map_or_else(Vec::new, |c| c.split('\n').collect());
        let lines = self
            .line
            .checked_sub(self.line_offset + 1)
            .map(|target| CodeFrame::window(&source_lines, target, self.line_offset + 1, self.column))
            .unwrap_or_default();

        CodeFrame {
            message: self.message.clone(),
            location: self.location(),
            lines,
            details: self.details.clone(),
        }
    }

    pub fn render(&self, style: Style) -> String {
        self.frame().render(style)
    }

    pub fn to_html(&self) -> String {
        pre(&self.render(Style::Html))
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.render(Style::Plain).trim_end())
    }
}

/// `path` relative to the working directory when it lies inside it.
pub fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

fn pre(body: &str) -> String {
    format!(
        r#"<pre style="overflow-x:auto;font-family:Consolas,Menlo,Monaco,monospace;margin:32px;">{body}</pre>"#
    )
}

/// Full error document served by the development server.
pub fn html_page(err: &BuildError) -> String {
    let body = match err {
        BuildError::Source(source) => source.to_html(),
        other => pre(&format!(
            r#"<span style="color: #e41010; font-weight: bold">{}</span>"#,
            quick_xml::escape::escape(other.to_string().as_str())
        )),
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Build failed</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}
