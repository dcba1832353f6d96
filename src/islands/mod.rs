//! Island components.
//!
//! A page template declares islands with `component(entry, props)`. Each
//! declaration lands in the page's [`IslandRegistry`] and leaves a marker in
//! the page markup. After all pages are rendered:
//!
//! ```text
//! islands ─┬─► render::StaticRenderer  (one sandboxed script)  ─► id → HTML
//!          └─► bundle::bundle_client   (one split ESM build)   ─► page → tags
//! ```
//!
//! Both passes resolve imports through [`plugins`], which pick a
//! [`adapter::FrameworkAdapter`] per component file.

pub mod adapter;
pub mod bundle;
pub mod cache;
pub mod plugins;
pub mod render;
pub mod sandbox;

use crate::{
    bundler::resolve::is_relative,
    config::SiteConfig,
    data::Data,
};
use minijinja::{
    Error, ErrorKind, State, Value,
    value::{Object, ObjectRepr},
};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

/// When an island's client code runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Hydration {
    /// Rendered at build time only; no client code.
    #[default]
    Static,
    OnLoad,
    OnIdle,
    OnVisible,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Island {
    /// `{page id}_{n}`, unique across the site.
    pub id: String,
    /// Absolute path, bare package name or URL.
    pub entry: String,
    pub props: Data,
    pub hydration: Hydration,
    /// Skip the static render; the page gets an empty container.
    pub client_only: bool,
}

impl Island {
    pub fn marker(&self) -> String {
        format!("<!-- {} -->", self.id)
    }

    pub fn needs_static_render(&self) -> bool {
        !self.client_only
    }

    pub fn needs_client(&self) -> bool {
        self.hydration != Hydration::Static
    }

    /// Markup left in the page where the island was declared.
    pub fn placeholder(&self) -> String {
        if self.client_only {
            format!(r#"<div id="{}"></div>"#, self.id)
        } else if self.hydration == Hydration::Static {
            self.marker()
        } else {
            format!(r#"<div id="{}">{}</div>"#, self.id, self.marker())
        }
    }
}

/// Make `entry` independent of the declaring page: relative paths are joined
/// onto `page_dir`, bare names and URLs are kept.
pub fn normalize_entry(entry: &str, page_dir: &Path) -> String {
    if is_relative(entry) {
        crate::bundler::resolve::normalize(&page_dir.join(entry))
            .to_string_lossy()
            .into_owned()
    } else {
        entry.to_owned()
    }
}

/// Islands declared by one page, in declaration order.
#[derive(Debug, Default)]
pub struct IslandRegistry {
    page_id: String,
    islands: Mutex<Vec<Island>>,
}

impl IslandRegistry {
    pub fn new(page_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            islands: Mutex::new(Vec::new()),
        }
    }

    /// Declare an island and return its index.
    pub fn register(&self, entry: String, props: Data) -> usize {
        let mut islands = self.islands.lock();
        let index = islands.len();
        islands.push(Island {
            id: format!("{}_{index}", self.page_id),
            entry,
            props,
            hydration: Hydration::Static,
            client_only: false,
        });
        index
    }

    fn update(&self, index: usize, f: impl FnOnce(&mut Island)) {
        if let Some(island) = self.islands.lock().get_mut(index) {
            f(island);
        }
    }

    pub fn get(&self, index: usize) -> Option<Island> {
        self.islands.lock().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.islands.lock().len()
    }

    pub fn snapshot(&self) -> Vec<Island> {
        self.islands.lock().clone()
    }
}

/// Template handle returned by `component()`.
///
/// Modifier methods change the island in place and return the same handle,
/// so they chain: `component("./counter.js", {"count": 1}).on_visible()`.
#[derive(Debug, Clone)]
pub struct IslandRef {
    registry: Arc<IslandRegistry>,
    index: usize,
}

impl IslandRef {
    pub fn new(registry: Arc<IslandRegistry>, index: usize) -> Self {
        Self { registry, index }
    }
}

impl Object for IslandRef {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let island = self.registry.get(self.index)?;
        match key.as_str()? {
            "id" => Some(Value::from(island.id)),
            "entry" => Some(Value::from(island.entry)),
            _ => None,
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        if !args.is_empty() {
            return Err(Error::new(
                ErrorKind::TooManyArguments,
                format!("{method}() takes no arguments"),
            ));
        }
        match method {
            "on_load" => self.registry.update(self.index, |i| i.hydration = Hydration::OnLoad),
            "on_idle" => self.registry.update(self.index, |i| i.hydration = Hydration::OnIdle),
            "on_visible" => self.registry.update(self.index, |i| i.hydration = Hydration::OnVisible),
            "client_only" => self.registry.update(self.index, |i| {
                i.client_only = true;
                if i.hydration == Hydration::Static {
                    i.hydration = Hydration::OnLoad;
                }
            }),
            _ => return Err(Error::from(ErrorKind::UnknownMethod)),
        }
        Ok(Value::from_object((**self).clone()))
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        Self: Sized + 'static,
    {
        match self.registry.get(self.index) {
            Some(island) => f.write_str(&island.placeholder()),
            None => Ok(()),
        }
    }
}

/// Everything the islands passes need from the site configuration.
#[derive(Debug, Clone)]
pub struct IslandOptions {
    /// Directory bare imports and import map aliases resolve from.
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    pub assets_url: String,
    pub production: bool,
    pub import_map: BTreeMap<String, String>,
    /// CDN base for bare imports not installed locally.
    pub cdn_url: Option<String>,
}

impl IslandOptions {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            root: config.get_root().to_path_buf(),
            assets_dir: config.assets_dir(),
            assets_url: config.assets_url(),
            production: !config.is_dev(),
            import_map: config.islands.import_map.clone(),
            cdn_url: config
                .islands
                .cdn
                .then(|| config.islands.cdn_url.trim_end_matches('/').to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(source: &str, registry: &Arc<IslandRegistry>) -> String {
        let mut env = minijinja::Environment::new();
        let registry = registry.clone();
        env.add_function("component", move |entry: String, props: Value| {
            let props = serde_json::to_value(&props).map(Data::from).unwrap_or_default();
            let index = registry.register(entry, props);
            Value::from_object(IslandRef::new(registry.clone(), index))
        });
        env.render_str(source, ()).unwrap()
    }

    #[test]
    fn test_ids_are_sequential() {
        let registry = Arc::new(IslandRegistry::new("abcd"));
        render("{{ component('a.js', {}) }}{{ component('b.js', {}) }}", &registry);

        let ids: Vec<_> = registry.snapshot().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, ["abcd_0", "abcd_1"]);
    }

    #[test]
    fn test_static_marker() {
        let registry = Arc::new(IslandRegistry::new("p"));
        let html = render("{{ component('./c.js', {'count': 1}) }}", &registry);

        assert_eq!(html, "<!-- p_0 -->");
        let island = registry.get(0).unwrap();
        assert_eq!(island.hydration, Hydration::Static);
        assert_eq!(island.props.get("count"), Some(&Data::Int(1)));
    }

    #[test]
    fn test_modifiers_chain_in_place() {
        let registry = Arc::new(IslandRegistry::new("p"));
        let html = render("{{ component('c.js', {}).on_idle().on_visible() }}", &registry);

        assert_eq!(html, r#"<div id="p_0"><!-- p_0 --></div>"#);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(0).unwrap().hydration, Hydration::OnVisible);
    }

    #[test]
    fn test_client_only() {
        let registry = Arc::new(IslandRegistry::new("p"));
        let html = render("{{ component('c.js', {}).client_only() }}", &registry);

        assert_eq!(html, r#"<div id="p_0"></div>"#);
        let island = registry.get(0).unwrap();
        assert!(island.client_only);
        assert!(!island.needs_static_render());
        assert!(island.needs_client());
    }

    #[test]
    fn test_handle_attributes() {
        let registry = Arc::new(IslandRegistry::new("p"));
        let out = render("{% set c = component('c.js', {}) %}{{ c.id }}", &registry);
        assert_eq!(out, "p_0");
    }

    #[test]
    fn test_normalize_entry() {
        let dir = Path::new("/site/posts");
        assert_eq!(normalize_entry("./widgets/c.js", dir), "/site/posts/widgets/c.js");
        assert_eq!(normalize_entry("../c.js", dir), "/site/c.js");
        assert_eq!(normalize_entry("preact-widget", dir), "preact-widget");
        assert_eq!(normalize_entry("https://x.dev/c.js", dir), "https://x.dev/c.js");
    }
}
