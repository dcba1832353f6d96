//! Pages and the site-wide page index.

use crate::{
    data::{Data, DataMap},
    islands::Island,
    utils::hash::short_hash,
};
use chrono::NaiveDate;
use minijinja::Value;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One markdown file under the pages directory.
#[derive(Debug, Clone)]
pub struct Page {
    /// Short hash of `path`; prefix of every island id on the page.
    pub id: String,
    /// Path relative to the pages directory, `/`-separated.
    pub path: String,
    /// Directory part of `path`, empty at the top level.
    pub dir: String,
    pub url: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub data: DataMap,
    pub date: Option<NaiveDate>,
    /// Rewritten by every stage: markdown body, HTML, full document.
    pub contents: String,
    /// Lines of front matter stripped from `contents`.
    pub line_offset: usize,
    pub islands: Vec<Island>,
}

impl Page {
    /// `rel` is relative to `pages_dir`.
    pub fn new(rel: &Path, pages_dir: &Path, output_dir: &Path) -> Self {
        let path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let dir = match path.rsplit_once('/') {
            Some((dir, _)) => dir.to_owned(),
            None => String::new(),
        };
        let out = match path.strip_suffix(".md") {
            Some(stem) => format!("{stem}.html"),
            None => format!("{path}.html"),
        };
        let url = match out.strip_suffix("index.html") {
            Some(dir) => format!("/{dir}"),
            None => format!("/{out}"),
        };

        Self {
            id: short_hash(&path),
            source: pages_dir.join(rel),
            output: output_dir.join(&out),
            path,
            dir,
            url,
            data: DataMap::new(),
            date: None,
            contents: String::new(),
            line_offset: 0,
            islands: Vec::new(),
        }
    }

    pub fn is_index(&self) -> bool {
        self.path == "index.md" || self.path.ends_with("/index.md")
    }

    /// Directory this page is listed in: `index.md` files belong to the
    /// parent of their own directory.
    pub fn index_dir(&self) -> &str {
        if !self.is_index() {
            return &self.dir;
        }
        match self.dir.rsplit_once('/') {
            Some((parent, _)) => parent,
            None => "",
        }
    }

    /// Absolute directory of the source file.
    pub fn source_dir(&self) -> &Path {
        self.source.parent().unwrap_or(Path::new("."))
    }

    /// Parse `data.date` with `format`, then as a plain ISO date.
    pub fn parse_date(&mut self, format: &str) {
        self.date = self.data.get("date").and_then(Data::as_str).and_then(|s| {
            NaiveDate::parse_from_str(s, format)
                .ok()
                .or_else(|| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
        });
    }

    pub fn summary(&self) -> PageSummary {
        PageSummary {
            id: self.id.clone(),
            path: self.path.clone(),
            dir: self.dir.clone(),
            url: self.url.clone(),
            data: self.data.clone(),
            date: self.date.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

/// What templates see of a page.
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub id: String,
    pub path: String,
    pub dir: String,
    pub url: String,
    pub data: DataMap,
    /// `YYYY-MM-DD`, so string order is date order.
    pub date: Option<String>,
}

/// Read-only view of every page, shared by all render workers.
#[derive(Debug, Default)]
pub struct SiteIndex {
    pages: Vec<Value>,
    dirs: FxHashMap<String, Vec<usize>>,
}

impl SiteIndex {
    pub fn new(pages: &[Page]) -> Self {
        let mut dirs: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (i, page) in pages.iter().enumerate() {
            dirs.entry(page.index_dir().to_owned()).or_default().push(i);
        }
        Self {
            pages: pages.iter().map(|p| Value::from_serialize(p.summary())).collect(),
            dirs,
        }
    }

    /// Pages listed in `dir`, oldest first.
    pub fn index(&self, dir: &str) -> Vec<Value> {
        let pages = self
            .dirs
            .get(dir)
            .map(|ids| ids.iter().map(|&i| self.pages[i].clone()).collect())
            .unwrap_or_default();
        order_by_date(pages)
    }

    /// Pages whose front matter has `key`.
    pub fn pages_with(&self, key: &str) -> Vec<Value> {
        self.pages
            .iter()
            .filter(|page| {
                page.get_attr("data")
                    .and_then(|data| data.get_attr(key))
                    .is_ok_and(|v| !v.is_undefined() && !v.is_none())
            })
            .cloned()
            .collect()
    }
}

/// Front matter value `key` of a page value, as [`Data`].
fn data_of(page: &Value, key: &str) -> Data {
    page.get_attr("data")
        .and_then(|data| data.get_attr(key))
        .ok()
        .filter(|v| !v.is_undefined())
        .and_then(|v| serde_json::to_value(&v).ok())
        .map(Data::from)
        .unwrap_or_default()
}

/// Stable sort by front matter `key` under the total [`Data`] order.
pub fn sort_by(mut pages: Vec<Value>, key: &str) -> Vec<Value> {
    pages.sort_by_cached_key(|page| data_of(page, key));
    pages
}

/// Stable sort by date, undated pages last.
pub fn order_by_date(mut pages: Vec<Value>) -> Vec<Value> {
    pages.sort_by_cached_key(|page| {
        let date = page
            .get_attr("date")
            .ok()
            .and_then(|d| d.as_str().map(str::to_owned));
        (date.is_none(), date)
    });
    pages
}
