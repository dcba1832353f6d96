//! Client bundle for hydrated islands.
//!
//! Each page with client islands gets one generated entry, `atoll:page/<id>`,
//! and all entries are bundled together as split ESM so components and
//! libraries shared between pages land in common chunks:
//!
//! ```text
//! atoll:page/ab12 ─┐                 ┌─► bundle-ab12.js ─┐
//!                  ├─► Bundler ──────┤                   ├─► chunk-<hash>.js
//! atoll:page/cd34 ─┘   (splitting)   └─► bundle-cd34.js ─┘
//! ```

use super::{
    Hydration, Island, IslandOptions,
    cache::SourceCache,
    plugins::{self, HYDRATE_SUFFIX, VirtualModule},
};
use crate::{
    build::BuildError,
    bundler::{BuildOptions, Bundler, Format, OutputKind, SourceMapMode, js_string},
    diagnostics::from_bundler_message,
    log,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;

const CLIENT: &str = "atoll:client";
const PAGE_PREFIX: &str = "atoll:page/";

/// Tags one page needs for its islands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageBundle {
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
}

/// Bundle the client code of every page and write it to the assets
/// directory. Pages without client islands are absent from the result.
pub fn bundle_client(
    pages: &[(String, Vec<Island>)],
    options: &IslandOptions,
    cache: &Arc<SourceCache>,
) -> Result<FxHashMap<String, PageBundle>, BuildError> {
    let mut modules = FxHashMap::default();
    modules.insert(
        CLIENT.to_owned(),
        VirtualModule {
            contents: include_str!("client.js").to_owned(),
            resolve_dir: options.root.clone(),
        },
    );

    let mut build = BuildOptions::new(&options.root, &options.assets_dir);
    for (page_id, islands) in pages {
        let hydrated: Vec<&Island> = islands.iter().filter(|i| i.needs_client()).collect();
        if hydrated.is_empty() {
            continue;
        }
        let name = format!("{PAGE_PREFIX}{page_id}");
        modules.insert(
            name.clone(),
            VirtualModule {
                contents: page_entry(&hydrated),
                resolve_dir: options.root.clone(),
            },
        );
        build = build.entry(name, page_id.as_str());
    }
    if build.entry_points.is_empty() {
        return Ok(FxHashMap::default());
    }

    build.format = Format::Esm;
    build.splitting = true;
    build.sourcemap = SourceMapMode::Linked;
    build.public_path = options.assets_url.clone();
    build.chunk_names = "chunk-[hash]".into();
    if options.production {
        build.entry_names = "bundle-[name]-[hash]".into();
        build.content_hash = true;
    } else {
        build.entry_names = "bundle-[name]".into();
        build.content_hash = false;
    }

    let result = Bundler::new(plugins::plugins(modules, options, cache.clone())).build(&build);
    if let Some(message) = result.errors.first() {
        return Err(from_bundler_message(message));
    }

    let mut bundles: FxHashMap<String, PageBundle> = FxHashMap::default();
    for output in &result.outputs {
        output.write().map_err(|source| BuildError::Io {
            path: output.path.clone(),
            source,
        })?;
        let Some(page_id) = &output.entry else {
            continue;
        };
        let bundle = bundles.entry(page_id.clone()).or_default();
        match output.kind {
            OutputKind::Script => bundle.scripts.push(output.url.clone()),
            OutputKind::Stylesheet => bundle.styles.push(output.url.clone()),
            _ => {}
        }
    }

    log!("islands"; "bundled client code for {} page(s)", bundles.len());
    Ok(bundles)
}

/// Entry module for one page's hydrated islands.
fn page_entry(islands: &[&Island]) -> String {
    let mut source = String::new();
    if islands
        .iter()
        .any(|i| matches!(i.hydration, Hydration::OnIdle | Hydration::OnVisible))
    {
        source.push_str(&format!("import {{ onIdle, onVisible }} from {};\n", js_string(CLIENT)));
    }

    for (n, island) in islands.iter().enumerate() {
        let module = js_string(&format!("{}{HYDRATE_SUFFIX}", island.entry));
        let id = js_string(&island.id);
        let props = island.props.to_json();
        let line = match island.hydration {
            Hydration::OnLoad | Hydration::Static => format!(
                "import {{ hydrate as __h{n} }} from {module};\n\
                 __h{n}({props}, document.getElementById({id}));\n"
            ),
            Hydration::OnIdle => format!(
                "onIdle().then(() => import({module})).then((m) => m.hydrate({props}, document.getElementById({id})));\n"
            ),
            Hydration::OnVisible => format!(
                "const __e{n} = document.getElementById({id});\n\
                 onVisible(__e{n}).then(() => import({module})).then((m) => m.hydrate({props}, __e{n}));\n"
            ),
        };
        source.push_str(&line);
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Data,
        islands::cache::{CacheError, Fetch},
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

    const COUNTER: &str = "import { clamp } from './util.js';\n\
        export function render(props) { return '<b>' + clamp(props.count) + '</b>'; }\n\
        export function hydrate(props, element) { element.dataset.count = clamp(props.count); }\n";

    fn setup(production: bool) -> (TempDir, IslandOptions, Arc<SourceCache>) {
        let dir = TempDir::new().unwrap();
        let c = dir.path().join("components");
        fs::create_dir_all(&c).unwrap();
        fs::write(c.join("counter.js"), COUNTER).unwrap();
        fs::write(c.join("util.js"), "export function clamp(n) { return Math.max(0, n); }\n").unwrap();
        fs::write(
            c.join("clock.js"),
            "export function hydrate(props, element) { element.textContent = props.zone; }\n",
        )
        .unwrap();

        let options = IslandOptions {
            root: dir.path().to_path_buf(),
            assets_dir: dir.path().join("_site/_assets"),
            assets_url: "/_assets".into(),
            production,
            import_map: BTreeMap::new(),
            cdn_url: None,
        };
        let cache = Arc::new(SourceCache::open(&dir.path().join(".cache"), Box::new(Offline)).unwrap());
        (dir, options, cache)
    }

    fn island(id: &str, entry: &Path, hydration: Hydration) -> Island {
        Island {
            id: id.into(),
            entry: entry.to_string_lossy().into_owned(),
            props: Data::from(serde_json::json!({ "count": 2 })),
            hydration,
            client_only: false,
        }
    }

    #[test]
    fn test_shared_component_lands_in_a_chunk() {
        let (dir, options, cache) = setup(true);
        let counter = dir.path().join("components/counter.js");
        let pages = vec![
            ("aaaa".to_owned(), vec![island("aaaa_0", &counter, Hydration::OnLoad)]),
            ("bbbb".to_owned(), vec![island("bbbb_0", &counter, Hydration::OnLoad)]),
        ];

        let bundles = bundle_client(&pages, &options, &cache).unwrap();
        assert_eq!(bundles.len(), 2);
        let a = &bundles["aaaa"].scripts[0];
        let b = &bundles["bbbb"].scripts[0];
        assert!(a.starts_with("/_assets/bundle-aaaa-"), "{a}");
        assert_ne!(a, b);

        let chunks: Vec<String> = fs::read_dir(&options.assets_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("chunk-") && name.ends_with(".js"))
            .collect();
        assert_eq!(chunks.len(), 1, "{chunks:?}");
        let shared = fs::read_to_string(options.assets_dir.join(&chunks[0])).unwrap();
        assert!(shared.contains("Math.max(0, n)"));

        let page = fs::read_to_string(options.assets_dir.join(a.trim_start_matches("/_assets/"))).unwrap();
        assert!(!page.contains("Math.max(0, n)"));
    }

    #[test]
    fn test_visible_island_loads_from_its_own_chunk() {
        let (dir, options, cache) = setup(false);
        let clock = dir.path().join("components/clock.js");
        let pages = vec![("aaaa".to_owned(), vec![island("aaaa_0", &clock, Hydration::OnVisible)])];

        let bundles = bundle_client(&pages, &options, &cache).unwrap();
        assert_eq!(bundles["aaaa"].scripts, ["/_assets/bundle-aaaa.js"]);

        let chunks: Vec<String> = fs::read_dir(&options.assets_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("chunk-") && name.ends_with(".js"))
            .collect();
        assert_eq!(chunks.len(), 1, "{chunks:?}");
        let chunk = fs::read_to_string(options.assets_dir.join(&chunks[0])).unwrap();
        assert!(chunk.contains("element.textContent = props.zone"), "{chunk}");

        let page = fs::read_to_string(options.assets_dir.join("bundle-aaaa.js")).unwrap();
        assert!(!page.contains("element.textContent"), "{page}");
        assert!(!page.contains(&format!("import \"./{}\"", chunks[0])), "{page}");
        assert!(page.contains(&format!("\"/_assets/{}\"", chunks[0])), "{page}");
        assert!(page.contains("onVisible(__e0).then(() => __import("), "{page}");
    }

    #[test]
    fn test_static_only_pages_get_no_entry() {
        let (dir, options, cache) = setup(false);
        let counter = dir.path().join("components/counter.js");
        let pages = vec![
            ("aaaa".to_owned(), vec![island("aaaa_0", &counter, Hydration::Static)]),
            ("bbbb".to_owned(), vec![island("bbbb_0", &counter, Hydration::OnIdle)]),
        ];

        let bundles = bundle_client(&pages, &options, &cache).unwrap();
        assert!(!bundles.contains_key("aaaa"));
        assert_eq!(bundles["bbbb"].scripts, ["/_assets/bundle-bbbb.js"]);
    }

    #[test]
    fn test_nothing_to_hydrate_skips_the_bundler() {
        let (dir, options, cache) = setup(false);
        let counter = dir.path().join("components/counter.js");
        let pages = vec![("aaaa".to_owned(), vec![island("aaaa_0", &counter, Hydration::Static)])];

        assert!(bundle_client(&pages, &options, &cache).unwrap().is_empty());
        assert!(!options.assets_dir.exists());
    }

    #[test]
    fn test_dev_names_are_stable() {
        let (dir, options, cache) = setup(false);
        let pages = vec![(
            "aaaa".to_owned(),
            vec![island("aaaa_0", &dir.path().join("components/clock.js"), Hydration::OnLoad)],
        )];

        let first = bundle_client(&pages, &options, &cache).unwrap();
        fs::write(
            dir.path().join("components/clock.js"),
            "export function hydrate(props, element) { element.title = props.zone; }\n",
        )
        .unwrap();
        let second = bundle_client(&pages, &options, &cache).unwrap();
        assert_eq!(first, second);
        assert_eq!(first["aaaa"].scripts, ["/_assets/bundle-aaaa.js"]);
    }

    #[test]
    fn test_missing_adapter_is_reported() {
        let (dir, options, cache) = setup(false);
        fs::write(dir.path().join("components/widget.tsx"), "export {}").unwrap();
        let pages = vec![(
            "aaaa".to_owned(),
            vec![island("aaaa_0", &dir.path().join("components/widget.tsx"), Hydration::OnLoad)],
        )];

        let err = bundle_client(&pages, &options, &cache).unwrap_err();
        assert!(err.to_string().contains("No framework adapter"), "{err}");
    }

    #[test]
    fn test_page_entry_strategies() {
        let c = Path::new("/c/counter.js");
        let load = island("p_0", c, Hydration::OnLoad);
        let idle = island("p_1", c, Hydration::OnIdle);
        let visible = island("p_2", c, Hydration::OnVisible);

        let source = page_entry(&[&load, &idle, &visible]);
        assert!(source.starts_with("import { onIdle, onVisible } from \"atoll:client\";"));
        assert!(source.contains("import { hydrate as __h0 } from \"/c/counter.js?hydrate\";"));
        assert!(source.contains("__h0({\"count\":2}, document.getElementById(\"p_0\"));"));
        assert!(source.contains("onIdle().then(() => import(\"/c/counter.js?hydrate\"))"));
        assert!(source.contains("onVisible(__e2).then("));

        let source = page_entry(&[&load]);
        assert!(!source.contains("atoll:client"));
    }
}
