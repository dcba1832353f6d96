//! Static rendering of islands at build time.
//!
//! Every island that needs markup is rendered by one generated module:
//!
//! ```js
//! import { render as __r0 } from "/site/components/counter.preact.js?static";
//! globalThis.__atoll_elements = {};
//! __atoll_elements["ab12cd34_0"] = __r0({"count":1});
//! ```
//!
//! The module is bundled as a single script and evaluated in the
//! [`Sandbox`]; the resulting map of island id to HTML is spliced into pages
//! by the build.

use super::{
    Island, IslandOptions,
    cache::SourceCache,
    plugins::{self, STATIC_SUFFIX, VirtualModule},
    sandbox::Sandbox,
};
use crate::{
    build::BuildError,
    bundler::{BuildOptions, Bundler, OutputKind, js_string},
    diagnostics::{from_bundler_message, from_sandbox_error},
    log,
};
use anyhow::anyhow;
use rustc_hash::FxHashMap;
use std::sync::Arc;

const ENTRY: &str = "atoll:static-entry";
const ENTRY_NAME: &str = "static";
const ELEMENTS: &str = "__atoll_elements";

#[derive(Debug, Default)]
pub struct StaticRender {
    /// Island id to rendered markup.
    pub elements: FxHashMap<String, String>,
    /// URLs of stylesheets imported by rendered components.
    pub styles: Vec<String>,
}

pub struct StaticRenderer {
    sandbox: Sandbox,
}

impl StaticRenderer {
    pub fn new(memory_limit: usize) -> Result<Self, BuildError> {
        let sandbox = Sandbox::new(memory_limit).map_err(|err| anyhow!("sandbox: {err}"))?;
        Ok(Self { sandbox })
    }

    pub fn render(
        &self,
        islands: &[Island],
        options: &IslandOptions,
        cache: &Arc<SourceCache>,
    ) -> Result<StaticRender, BuildError> {
        let islands: Vec<&Island> = islands.iter().filter(|i| i.needs_static_render()).collect();
        if islands.is_empty() {
            return Ok(StaticRender::default());
        }

        let mut modules = FxHashMap::default();
        modules.insert(
            ENTRY.to_owned(),
            VirtualModule {
                contents: entry_module(&islands),
                resolve_dir: options.root.clone(),
            },
        );

        let mut build = BuildOptions::new(&options.root, &options.assets_dir).entry(ENTRY, ENTRY_NAME);
        build.public_path = options.assets_url.clone();
        build.entry_names = if options.production { "[name]-[hash]" } else { "[name]" }.into();
        build.content_hash = options.production;

        let result = Bundler::new(plugins::plugins(modules, options, cache.clone())).build(&build);
        if let Some(message) = result.errors.first() {
            return Err(from_bundler_message(message));
        }

        let mut script = None;
        let mut styles = Vec::new();
        for output in &result.outputs {
            match output.kind {
                OutputKind::Script if output.entry.as_deref() == Some(ENTRY_NAME) => {
                    script = Some(output);
                }
                OutputKind::Stylesheet | OutputKind::Asset => {
                    output.write().map_err(|source| BuildError::Io {
                        path: output.path.clone(),
                        source,
                    })?;
                    if output.kind == OutputKind::Stylesheet {
                        styles.push(output.url.clone());
                    }
                }
                _ => {}
            }
        }
        let script = script.ok_or_else(|| anyhow!("static render produced no script"))?;

        let json = self.sandbox.eval_json(script.text(), ELEMENTS).map_err(|err| match &script.map {
            Some(map) => from_sandbox_error(&err, map, script.text()),
            None => BuildError::Other(anyhow!("sandbox: {err}")),
        })?;

        let values: FxHashMap<String, serde_json::Value> =
            serde_json::from_str(&json).map_err(|err| anyhow!("static render: {err}"))?;
        let mut elements = FxHashMap::default();
        for (id, value) in values {
            match value {
                serde_json::Value::String(html) => {
                    elements.insert(id, html);
                }
                other => {
                    return Err(anyhow!(
                        "Island {id} rendered {other} instead of a string of markup"
                    )
                    .into());
                }
            }
        }

        log!("islands"; "rendered {} static island(s)", elements.len());
        Ok(StaticRender { elements, styles })
    }
}

/// Source of the generated entry: one import per component file, one call
/// per island.
fn entry_module(islands: &[&Island]) -> String {
    let mut imports: FxHashMap<&str, usize> = FxHashMap::default();
    let mut head = String::new();
    let mut body = format!("globalThis.{ELEMENTS} = {{}};\n");

    for island in islands {
        let next = imports.len();
        let index = *imports.entry(island.entry.as_str()).or_insert_with(|| {
            head.push_str(&format!(
                "import {{ render as __r{next} }} from {};\n",
                js_string(&format!("{}{STATIC_SUFFIX}", island.entry))
            ));
            next
        });
        body.push_str(&format!(
            "{ELEMENTS}[{}] = __r{index}({});\n",
            js_string(&island.id),
            island.props.to_json()
        ));
    }
    head + &body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Data,
        islands::{
            Hydration,
            cache::{CacheError, Fetch},
        },
    };
    use std::{collections::BTreeMap, fs, path::Path};
    use tempfile::TempDir;

    struct Offline;

    impl Fetch for Offline {
        fn fetch(&self, url: &str) -> Result<String, CacheError> {
            Err(CacheError::Fetch {
                url: url.to_owned(),
                message: "offline".into(),
            })
        }
    }

    fn setup(files: &[(&str, &str)]) -> (TempDir, IslandOptions, Arc<SourceCache>) {
        let dir = TempDir::new().unwrap();
        for (rel, contents) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        let options = IslandOptions {
            root: dir.path().to_path_buf(),
            assets_dir: dir.path().join("_site/_assets"),
            assets_url: "/_assets".into(),
            production: false,
            import_map: BTreeMap::new(),
            cdn_url: None,
        };
        let cache = Arc::new(SourceCache::open(&dir.path().join(".cache"), Box::new(Offline)).unwrap());
        (dir, options, cache)
    }

    fn island(id: &str, entry: &Path, props: &str) -> Island {
        Island {
            id: id.into(),
            entry: entry.to_string_lossy().into_owned(),
            props: Data::from(serde_json::from_str::<serde_json::Value>(props).unwrap()),
            hydration: Hydration::Static,
            client_only: false,
        }
    }

    fn renderer() -> StaticRenderer {
        StaticRenderer::new(64 * 1024 * 1024).unwrap()
    }

    #[test]
    fn test_vanilla_render() {
        let (dir, options, cache) = setup(&[(
            "components/counter.js",
            "export function render(props) { return `<button>${props.count}</button>`; }\n",
        )]);
        let entry = dir.path().join("components/counter.js");
        let islands = [island("p_0", &entry, r#"{"count": 3}"#), island("p_1", &entry, r#"{"count": 7}"#)];

        let out = renderer().render(&islands, &options, &cache).unwrap();
        assert_eq!(out.elements["p_0"], "<button>3</button>");
        assert_eq!(out.elements["p_1"], "<button>7</button>");
        assert!(out.styles.is_empty());
    }

    #[test]
    fn test_client_only_islands_are_skipped() {
        let (dir, options, cache) = setup(&[("c.js", "export function render() { return 'x'; }\n")]);
        let mut only = island("p_0", &dir.path().join("c.js"), "{}");
        only.client_only = true;

        let out = renderer().render(&[only], &options, &cache).unwrap();
        assert!(out.elements.is_empty());
    }

    #[test]
    fn test_imported_css_is_written() {
        let (dir, options, cache) = setup(&[
            ("c.js", "import './c.css';\nexport function render() { return '<p>styled</p>'; }\n"),
            ("c.css", "p { color: red; }\n"),
        ]);

        let out = renderer()
            .render(&[island("p_0", &dir.path().join("c.js"), "{}")], &options, &cache)
            .unwrap();
        assert_eq!(out.styles, ["/_assets/static.css"]);
        let css = fs::read_to_string(dir.path().join("_site/_assets/static.css")).unwrap();
        assert!(css.contains("color: red"));
    }

    #[test]
    fn test_throw_points_at_component_source() {
        let (dir, options, cache) = setup(&[(
            "components/broken.js",
            "export function render(props) {\n  const label = props.label;\n  throw new Error('no label: ' + label);\n}\n",
        )]);
        let entry = dir.path().join("components/broken.js");

        let err = renderer()
            .render(&[island("p_0", &entry, r#"{"label": "x"}"#)], &options, &cache)
            .unwrap_err();
        let BuildError::Source(source) = err else {
            panic!("expected a located error, got {err:?}");
        };
        assert!(source.message.contains("no label: x"), "{}", source.message);
        assert_eq!(source.line, 3);
        assert!(source.file.ends_with("broken.js"), "{}", source.file);
    }

    #[test]
    fn test_unresolved_component_is_a_bundle_error() {
        let (dir, options, cache) = setup(&[]);
        let err = renderer()
            .render(&[island("p_0", &dir.path().join("missing.js"), "{}")], &options, &cache)
            .unwrap_err();
        assert!(err.to_string().contains("missing.js"), "{err}");
    }

    #[test]
    fn test_entry_module_imports_each_file_once() {
        let a = island("p_0", Path::new("/c/a.js"), "{}");
        let b = island("p_1", Path::new("/c/a.js"), r#"{"n": 1}"#);
        let c = island("q_0", Path::new("/c/b.preact.js"), "{}");

        let source = entry_module(&[&a, &b, &c]);
        assert_eq!(source.matches("from \"/c/a.js?static\"").count(), 1);
        assert!(source.contains("import { render as __r1 } from \"/c/b.preact.js?static\";"));
        assert!(source.contains("__atoll_elements[\"p_1\"] = __r0({\"n\":1});"));
        assert!(source.contains("__atoll_elements[\"q_0\"] = __r1({});"));
    }
}
