//! Code frame model and painters.
//!
//! A [`CodeFrame`] is laid out once as lines of toned pieces; each [`Style`]
//! only decides how a tone looks. Terminal, plain and HTML output therefore
//! always carry the same text.
//!
//! ```text
//! template: unknown function: nope is unknown
//!    ┌─ posts/hello.md:7:3
//!    │
//!  6 │ Some text
//!  7 │ {{ nope() }}
//!    │    ^
//!  8 │
//! ```

use colored::Colorize;
use std::fmt::Write;

/// Lines of context shown on each side of the target line.
const CONTEXT: usize = 3;

mod gutter {
    pub const HEADER: &str = "┌─";
    pub const BAR: &str = "│";
    pub const MARKER: &str = "^";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Terminal,
    Plain,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Error,
    Focus,
    Dim,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLine {
    /// 1-based line number in the outer file.
    pub number: usize,
    pub text: String,
    /// 1-based caret column, on the target line only.
    pub caret: Option<usize>,
    pub is_target: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFrame {
    pub message: String,
    /// `file:line[:column]`
    pub location: String,
    pub lines: Vec<FrameLine>,
    pub details: Option<String>,
}

impl CodeFrame {
    /// Cut the context window around `target` (0-based index into `lines`),
    /// numbering lines from `first_number`.
    pub fn window(
        source_lines: &[&str],
        target: usize,
        first_number: usize,
        column: Option<usize>,
    ) -> Vec<FrameLine> {
        if source_lines.is_empty() || target >= source_lines.len() {
            return Vec::new();
        }
        let start = target.saturating_sub(CONTEXT);
        let end = (target + CONTEXT).min(source_lines.len() - 1);
        (start..=end)
            .map(|i| FrameLine {
                number: i + first_number,
                text: source_lines[i].trim_end_matches('\r').to_owned(),
                caret: column.filter(|_| i == target),
                is_target: i == target,
            })
            .collect()
    }

    fn layout(&self) -> Vec<Vec<(Tone, String)>> {
        let width = self
            .lines
            .iter()
            .map(|l| l.number.to_string().len())
            .max()
            .unwrap_or(1);
        let pad = " ".repeat(width);
        let mut out = vec![
            vec![(Tone::Error, self.message.clone())],
            vec![
                (Tone::Dim, format!("{pad} {} ", gutter::HEADER)),
                (Tone::Focus, self.location.clone()),
            ],
        ];

        if !self.lines.is_empty() {
            out.push(vec![(Tone::Dim, format!("{pad} {}", gutter::BAR))]);
        }
        for line in &self.lines {
            let number_tone = if line.is_target { Tone::Error } else { Tone::Dim };
            out.push(vec![
                (number_tone, format!("{:>width$} ", line.number)),
                (Tone::Dim, format!("{} ", gutter::BAR)),
                (Tone::Plain, line.text.clone()),
            ]);
            if let Some(column) = line.caret {
                // Keep tabs so the caret lines up under tab-indented code
                let indent: String = line
                    .text
                    .chars()
                    .take(column.saturating_sub(1))
                    .map(|c| if c == '\t' { '\t' } else { ' ' })
                    .collect();
                out.push(vec![
                    (Tone::Dim, format!("{pad} {} ", gutter::BAR)),
                    (Tone::Plain, indent),
                    (Tone::Error, gutter::MARKER.to_owned()),
                ]);
            }
        }
        if let Some(details) = &self.details {
            out.push(Vec::new());
            for line in details.lines() {
                out.push(vec![(Tone::Plain, line.to_owned())]);
            }
        }
        out
    }

    pub fn render(&self, style: Style) -> String {
        let mut out = String::new();
        for line in self.layout() {
            for (tone, text) in line {
                match style {
                    Style::Plain => out.push_str(&text),
                    Style::Terminal => {
                        let painted = match tone {
                            Tone::Error => text.red().bold(),
                            Tone::Focus => text.bold(),
                            Tone::Dim => text.dimmed(),
                            Tone::Plain => text.normal(),
                        };
                        _ = write!(out, "{painted}");
                    }
                    Style::Html => {
                        let escaped = quick_xml::escape::escape(text.as_str());
                        match tone {
                            Tone::Error => {
                                _ = write!(
                                    out,
                                    r#"<span style="color: #e41010; font-weight: bold">{escaped}</span>"#
                                );
                            }
                            Tone::Focus => {
                                _ = write!(out, r#"<span style="font-weight: bold">{escaped}</span>"#);
                            }
                            Tone::Dim => {
                                _ = write!(out, r#"<span style="color: #adadad">{escaped}</span>"#);
                            }
                            Tone::Plain => out.push_str(&escaped),
                        }
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Tags stripped from HTML renderings, for comparing text content.
#[cfg(test)]
pub(crate) fn strip_tags(html: &str) -> String {
    let re = regex::Regex::new("<[^>]+>").unwrap();
    let text = re.replace_all(html, "");
    quick_xml::escape::unescape(&text)
        .map(|s| s.into_owned())
        .unwrap_or_default()
}
