//! Site building orchestration.
//!
//! # Architecture
//!
//! ```text
//! Builder::build()
//!     │
//!     ├── SiteConfig::load()        config + CLI overrides, validated
//!     ├── Templates::load()         global page template
//!     ├── discover()                pages (*.md) and public assets
//!     ├── read_front_matter()       ┐ one rayon task per page,
//!     ├── render_pages()            ┘ first error wins
//!     ├── render_islands()          one sandboxed script for the whole site
//!     ├── bundle_islands()          one split ESM build for the whole site
//!     └── write_pages() + copy_assets()
//! ```
//!
//! Every call to [`Builder::build`] threads a fresh [`BuildContext`] through
//! the stages and replaces the retained [`BuildState`] only when it succeeds.

mod error;
pub mod frontmatter;
pub mod inject;
pub mod markdown;
pub mod page;
pub mod template;

pub use error::BuildError;

use crate::{
    config::{CONFIG_FILE, ConfigOverrides, SiteConfig},
    diagnostics::display_path,
    islands::{
        IslandOptions, IslandRegistry,
        bundle::{PageBundle, bundle_client},
        cache::{Fetch, HttpFetcher, SourceCache},
        render::StaticRenderer,
    },
    log,
    logger::Progress,
    utils::minify::minify_page,
};
use anyhow::anyhow;
use page::{Page, SiteIndex};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use template::{PageScope, Templates};
use walkdir::WalkDir;

/// Directories never searched for pages or assets.
const IGNORED_DIRS: &[&str] = &["node_modules"];

/// A non-markdown file under the pages directory, copied as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub source: PathBuf,
    pub output: PathBuf,
}

/// What the last successful build produced.
#[derive(Debug, Default)]
pub struct BuildState {
    pub pages: Vec<Page>,
    /// Directory to the pages listed in it.
    pub index: Arc<SiteIndex>,
    pub assets: Vec<Asset>,
}

/// Long-lived build driver. The source cache and the script sandbox are
/// created once and shared by every build.
pub struct Builder {
    root: PathBuf,
    overrides: ConfigOverrides,
    config: SiteConfig,
    cache: Arc<SourceCache>,
    renderer: StaticRenderer,
    state: BuildState,
}

impl Builder {
    pub fn new(root: &Path, overrides: ConfigOverrides) -> Result<Self, BuildError> {
        Self::with_fetcher(root, overrides, Box::new(HttpFetcher::default()))
    }

    pub fn with_fetcher(
        root: &Path,
        overrides: ConfigOverrides,
        fetcher: Box<dyn Fetch>,
    ) -> Result<Self, BuildError> {
        let config = SiteConfig::load(root, &overrides)?;
        let cache = SourceCache::open(&config.islands.cache_dir, fetcher).map_err(anyhow::Error::from)?;
        if cache.len() > 0 {
            log!("fetch"; "{} remote modules cached in {}", cache.len(), display_path(&config.islands.cache_dir));
        }
        let renderer = StaticRenderer::new(config.memory_limit())?;

        Ok(Self {
            root: root.to_path_buf(),
            overrides,
            config,
            cache: Arc::new(cache),
            renderer,
            state: BuildState::default(),
        })
    }

    /// Configuration of the most recent build attempt.
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// Run one full build. The first failing stage aborts the rest; files
    /// written before the failure stay on disk.
    pub fn build(&mut self) -> Result<Duration, BuildError> {
        let started = Instant::now();
        self.config = SiteConfig::load(&self.root, &self.overrides)?;
        log!("config"; "{} build of {}", self.config.mode(), display_path(self.config.get_root()));

        let ctx = BuildContext::new(&self.config, &self.cache, &self.renderer)?;
        self.state = ctx.run()?;

        let elapsed = started.elapsed();
        log!("build"; "done in {:.2?}", elapsed);
        Ok(elapsed)
    }

    /// Drop everything the last build retained.
    pub fn reset(&mut self) {
        self.state = BuildState::default();
    }
}

/// State scoped to one build, threaded through every stage.
pub struct BuildContext<'a> {
    config: &'a SiteConfig,
    options: IslandOptions,
    cache: &'a Arc<SourceCache>,
    renderer: &'a StaticRenderer,
    templates: Templates,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        config: &'a SiteConfig,
        cache: &'a Arc<SourceCache>,
        renderer: &'a StaticRenderer,
    ) -> Result<Self, BuildError> {
        clean_output(config)?;
        let templates = Templates::load(&config.build.template)?;
        Ok(Self {
            config,
            options: IslandOptions::from_config(config),
            cache,
            renderer,
            templates,
        })
    }

    pub fn run(self) -> Result<BuildState, BuildError> {
        let (mut pages, assets) = discover(self.config)?;
        log!("pages"; "found {} pages, {} assets", pages.len(), assets.len());

        self.read_front_matter(&mut pages)?;
        let index = Arc::new(SiteIndex::new(&pages));
        self.render_pages(&mut pages, &index)?;
        self.render_islands(&mut pages)?;
        self.bundle_islands(&mut pages)?;
        self.write_pages(&mut pages)?;
        copy_assets(&assets)?;

        Ok(BuildState {
            pages,
            index,
            assets,
        })
    }

    fn read_front_matter(&self, pages: &mut [Page]) -> Result<(), BuildError> {
        let date_format = &self.config.build.date_format;
        try_each_page(pages, |page| {
            let source = fs::read_to_string(&page.source).map_err(|err| BuildError::io(&page.source, err))?;
            let front = frontmatter::parse(&source, &page.source)?;
            page.contents = front.body(&source).to_owned();
            page.line_offset = front.line_offset;
            page.data = front.data;
            page.parse_date(date_format);
            Ok(())
        })
    }

    /// Page template, markdown, then the global template.
    fn render_pages(&self, pages: &mut [Page], index: &Arc<SiteIndex>) -> Result<(), BuildError> {
        let progress = Progress::start("pages", pages.len());
        try_each_page(pages, |page| {
            let registry = Arc::new(IslandRegistry::new(&page.id));
            let scope = PageScope::new(page, self.config, index, &registry);

            let body = self.templates.render_body(page, &scope)?;
            let html = markdown::render(&body, &self.config.markdown);
            page.contents = self.templates.render_layout(&html, &scope)?;
            page.islands = registry.snapshot();

            if let Some(progress) = &progress {
                progress.tick();
            }
            Ok(())
        })
    }

    fn render_islands(&self, pages: &mut [Page]) -> Result<(), BuildError> {
        let islands: Vec<_> = pages.iter().flat_map(|p| p.islands.iter().cloned()).collect();
        let rendered = self.renderer.render(&islands, &self.options, self.cache)?;

        let styles = PageBundle {
            scripts: Vec::new(),
            styles: rendered.styles,
        };
        pages.par_iter_mut().for_each(|page| {
            inject::splice_islands(&mut page.contents, &page.islands, &rendered.elements);
            if page.islands.iter().any(|i| i.needs_static_render()) {
                inject::inject_bundle(&mut page.contents, &styles);
            }
        });
        Ok(())
    }

    fn bundle_islands(&self, pages: &mut [Page]) -> Result<(), BuildError> {
        let inputs: Vec<_> = pages
            .iter()
            .filter(|p| p.islands.iter().any(|i| i.needs_client()))
            .map(|p| (p.id.clone(), p.islands.clone()))
            .collect();
        let bundles = bundle_client(&inputs, &self.options, self.cache)?;

        pages.par_iter_mut().for_each(|page| {
            if let Some(bundle) = bundles.get(&page.id) {
                inject::inject_bundle(&mut page.contents, bundle);
            }
        });
        Ok(())
    }

    fn write_pages(&self, pages: &mut [Page]) -> Result<(), BuildError> {
        let live_reload = self.config.is_dev() && self.config.serve.live_reload;
        try_each_page(pages, |page| {
            if live_reload {
                inject::inject_live_reload(&mut page.contents);
            }
            let html = minify_page(&page.contents, self.config);
            write_file(&page.output, html.as_bytes())
        })
    }
}

/// Run `f` on every page in parallel. Every task runs to completion; the
/// first error to arrive is returned and the rest are dropped.
fn try_each_page<F>(pages: &mut [Page], f: F) -> Result<(), BuildError>
where
    F: Fn(&mut Page) -> Result<(), BuildError> + Sync + Send,
{
    let first = Mutex::new(None);
    pages.par_iter_mut().for_each(|page| {
        if let Err(err) = f(page) {
            first.lock().get_or_insert(err);
        }
    });
    match first.into_inner() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn clean_output(config: &SiteConfig) -> Result<(), BuildError> {
    let output = &config.build.output;
    if !config.build.clean || !output.exists() {
        return Ok(());
    }
    if config.get_root().starts_with(output) {
        return Err(anyhow!(
            "refusing to clean `{}`: it contains the site root",
            output.display()
        )
        .into());
    }
    log!("build"; "cleaning {}", display_path(output));
    fs::remove_dir_all(output).map_err(|err| BuildError::io(output, err))
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

/// Walk the pages directory. `_` and `.` entries, `node_modules`, the config
/// file and the output directory are skipped.
pub fn discover(config: &SiteConfig) -> Result<(Vec<Page>, Vec<Asset>), BuildError> {
    let pages_dir = &config.build.pages;
    let output_dir = &config.build.output;
    let config_file = config.get_root().join(CONFIG_FILE);

    let mut pages = Vec::new();
    let mut assets = Vec::new();

    let walker = WalkDir::new(pages_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !is_hidden(&name)
                && !(entry.file_type().is_dir() && IGNORED_DIRS.contains(&name.as_ref()))
                && entry.path() != output_dir.as_path()
        });

    for entry in walker {
        let entry = entry.map_err(|err| anyhow!("cannot read {}: {err}", display_path(pages_dir)))?;
        if !entry.file_type().is_file() || entry.path() == config_file {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(pages_dir) else {
            continue;
        };
        if rel.extension().is_some_and(|ext| ext == "md") {
            pages.push(Page::new(rel, pages_dir, output_dir));
        } else {
            assets.push(Asset {
                source: entry.path().to_path_buf(),
                output: output_dir.join(rel),
            });
        }
    }

    Ok((pages, assets))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| BuildError::io(parent, err))?;
    }
    fs::write(path, contents).map_err(|err| BuildError::io(path, err))
}

fn copy_assets(assets: &[Asset]) -> Result<(), BuildError> {
    assets.par_iter().try_for_each(|asset| {
        if let Some(parent) = asset.output.parent() {
            fs::create_dir_all(parent).map_err(|err| BuildError::io(parent, err))?;
        }
        fs::copy(&asset.source, &asset.output)
            .map(|_| ())
            .map_err(|err| BuildError::io(&asset.source, err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::islands::cache::CacheError;
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

    const COUNTER: &str = "export function render(props) { return \"<button>count=\" + props.count + \"</button>\"; }\n\
                           export function hydrate(props, element) { element.dataset.count = props.count; }\n";

    fn site(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[islands]\ncache_dir = \".cache\"\n").unwrap();
        for (rel, contents) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        dir
    }

    fn builder(dir: &TempDir, mode: &str) -> Builder {
        let overrides = ConfigOverrides {
            mode: Some(mode.into()),
            ..ConfigOverrides::default()
        };
        Builder::with_fetcher(dir.path(), overrides, Box::new(Offline)).unwrap()
    }

    fn read(dir: &TempDir, rel: &str) -> String {
        fs::read_to_string(dir.path().join("_site").join(rel)).unwrap()
    }

    fn page_id(builder: &Builder, path: &str) -> String {
        builder
            .state()
            .pages
            .iter()
            .find(|p| p.path == path)
            .map(|p| p.id.clone())
            .unwrap()
    }

    fn asset_names(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path().join("_site/_assets"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_preact_island_renders_and_hydrates() {
        let dir = site(&[
            ("node_modules/preact/index.js", "export function h(type, props) { return { type: type, props: props }; }\n\
                                              export function hydrate(vnode, element) { element.hydrated = true; }\n"),
            ("node_modules/preact-render-to-string/index.js", "export function renderToString(vnode) { return vnode.type(vnode.props); }\n"),
            ("components/counter.preact.js", "export default function Counter(props) { return \"<p>count=\" + props.count + \"</p>\"; }\n"),
            ("index.md", "# Home\n\n{{ component('./components/counter.preact.js', {'count': 1}).on_load() }}\n"),
        ]);
        let mut builder = builder(&dir, "development");
        builder.build().unwrap();

        let id = format!("{}_0", page_id(&builder, "index.md"));
        let html = read(&dir, "index.html");
        assert!(html.contains(&format!(r#"<div id="{id}"><p>count=1</p></div>"#)), "{html}");
        assert!(!html.contains(&format!("<!-- {id} -->")));

        let script = format!("/_assets/bundle-{}.js", page_id(&builder, "index.md"));
        assert_eq!(html.matches(r#"<script type="module""#).count(), 1, "{html}");
        assert!(html.contains(&format!(r#"<script type="module" src="{script}"></script>"#)));

        let bundle = read(&dir, script.trim_start_matches('/'));
        assert!(bundle.contains(&id), "{bundle}");
    }

    #[test]
    fn test_shared_dependency_is_one_chunk() {
        let dir = site(&[
            ("node_modules/tiny-lib/index.js", "export function clamp(n) { return Math.min(10, Math.max(0, n)); }\n"),
            ("components/a.js", "import { clamp } from \"tiny-lib\";\nexport function render(p) { return \"<i>a</i>\"; }\nexport function hydrate(p, el) { el.title = clamp(p); }\n"),
            ("components/b.js", "import { clamp } from \"tiny-lib\";\nexport function render(p) { return \"<i>b</i>\"; }\nexport function hydrate(p, el) { el.title = clamp(p); }\n"),
            ("one.md", "{{ component('./components/a.js', 1).on_load() }}\n"),
            ("two.md", "{{ component('./components/b.js', 2).on_load() }}\n"),
        ]);
        let mut builder = builder(&dir, "production");
        builder.build().unwrap();

        let chunks: Vec<_> = asset_names(&dir)
            .into_iter()
            .filter(|name| name.starts_with("chunk-") && name.ends_with(".js"))
            .collect();
        assert_eq!(chunks.len(), 1, "{chunks:?}");
        assert!(read(&dir, &format!("_assets/{}", chunks[0])).contains("Math.max(0, n)"));

        for page in ["one.html", "two.html"] {
            let html = read(&dir, page);
            let src = html
                .split(r#"<script type="module" src=""#)
                .nth(1)
                .and_then(|rest| rest.split('"').next())
                .unwrap();
            let entry = read(&dir, src.trim_start_matches('/'));
            assert!(entry.contains(&chunks[0]), "{entry}");
            assert!(!entry.contains("Math.max(0, n)"));
        }
    }

    #[test]
    fn test_component_throw_points_at_source() {
        let dir = site(&[
            ("broken.js", "export function render(props) {\n  const x = props.count;\n  throw new Error(\"boom \" + x);\n}\nexport function hydrate() {}\n"),
            ("index.md", "{{ component('./broken.js', {'count': 3}) }}\n"),
        ]);
        let err = builder(&dir, "development").build().unwrap_err();

        match err {
            BuildError::Source(err) => {
                assert!(err.file.ends_with("broken.js"), "{}", err.file);
                assert_eq!(err.line, 3);
                assert!(err.message.contains("boom 3"), "{}", err.message);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dev_rebuild_is_byte_identical() {
        let dir = site(&[
            ("components/counter.js", COUNTER),
            ("posts/a.md", "{{ component('../components/counter.js', {'count': 2}).on_idle() }}\n"),
            ("posts/b.md", "plain\n"),
        ]);
        let mut builder = builder(&dir, "development");

        builder.build().unwrap();
        let first = (read(&dir, "posts/a.html"), read(&dir, "posts/b.html"), asset_names(&dir));

        builder.reset();
        assert!(builder.state().pages.is_empty());
        builder.build().unwrap();
        let second = (read(&dir, "posts/a.html"), read(&dir, "posts/b.html"), asset_names(&dir));

        assert_eq!(first, second);
        assert_eq!(builder.state().pages.len(), 2);
    }

    #[test]
    fn test_client_only_gets_an_empty_container() {
        let dir = site(&[
            ("counter.js", COUNTER),
            ("index.md", "{{ component('./counter.js', {'count': 5}).client_only() }}\n"),
        ]);
        let mut builder = builder(&dir, "development");
        builder.build().unwrap();

        let id = format!("{}_0", page_id(&builder, "index.md"));
        let html = read(&dir, "index.html");
        assert!(html.contains(&format!(r#"<div id="{id}"></div>"#)), "{html}");
        assert!(!html.contains("count=5"));
        assert!(html.contains(r#"<script type="module""#));
    }

    #[test]
    fn test_static_pages_ship_no_scripts() {
        let dir = site(&[
            ("counter.js", COUNTER),
            ("index.md", "{{ component('./counter.js', {'count': 7}) }}\n"),
            ("about.md", "# About\n"),
        ]);
        builder(&dir, "production").build().unwrap();

        let index = read(&dir, "index.html");
        assert!(index.contains("<button>count=7</button>"), "{index}");
        for html in [index, read(&dir, "about.html")] {
            assert!(!html.contains(r#"<script type="module""#), "{html}");
        }
    }

    #[test]
    fn test_front_matter_error_is_located() {
        let dir = site(&[
            ("ok.md", "# fine\n"),
            ("bad.md", "---\ntitle: ok\ntags: [open\n---\nbody\n"),
        ]);
        let err = builder(&dir, "development").build().unwrap_err();

        match err {
            BuildError::Source(err) => {
                assert!(err.file.ends_with("bad.md"), "{}", err.file);
                assert!(err.line >= 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_template_error_line_counts_front_matter() {
        let dir = site(&[("page.md", "---\ntitle: x\n---\n# Heading\n{{ broken( }}\n")]);
        let err = builder(&dir, "development").build().unwrap_err();

        match err {
            BuildError::Source(err) => assert_eq!(err.line, 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_discovery_and_assets() {
        let dir = site(&[
            ("index.md", "---\ntitle: Home\n---\n{% for p in index() %}[{{ p.url }}]{% endfor %}\n"),
            ("posts/index.md", "posts"),
            ("posts/one.md", "one"),
            ("_drafts/secret.md", "hidden"),
            (".git/config", "x"),
            ("images/logo.svg", "<svg/>"),
            ("node_modules/x/index.js", ""),
        ]);
        let mut builder = builder(&dir, "development");
        builder.build().unwrap();

        let paths: Vec<_> = builder.state().pages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, ["index.md", "posts/index.md", "posts/one.md"]);
        assert_eq!(read(&dir, "images/logo.svg"), "<svg/>");
        assert!(!dir.path().join("_site/_drafts").exists());
        assert!(!dir.path().join("_site/atoll.toml").exists());

        let index = read(&dir, "index.html");
        assert!(index.contains("<title>Home</title>"));
        assert!(index.contains("[/posts/]"), "{index}");
        assert!(index.contains("ws://"));
    }

    #[test]
    fn test_production_minifies_and_skips_live_reload() {
        let dir = site(&[("index.md", "# Title\n\nSome   text.\n")]);
        builder(&dir, "production").build().unwrap();

        let html = read(&dir, "index.html");
        assert!(!html.contains("WebSocket"));
        assert!(!html.contains("\n<body>"), "{html}");
        assert!(html.contains("Title</h1>"));
    }

    #[test]
    fn test_dev_pages_reload_unless_disabled() {
        let dir = site(&[("index.md", "home\n")]);
        builder(&dir, "development").build().unwrap();
        assert!(read(&dir, "index.html").contains("/ws"));

        let config = "[islands]\ncache_dir = \".cache\"\n[serve]\nlive_reload = false\n";
        fs::write(dir.path().join(CONFIG_FILE), config).unwrap();
        builder(&dir, "development").build().unwrap();
        assert!(!read(&dir, "index.html").contains("WebSocket"));
    }

    #[test]
    fn test_first_error_wins() {
        let dir = site(&[
            ("a.md", "{{ one( }}"),
            ("b.md", "{{ two( }}"),
        ]);
        let err = builder(&dir, "development").build().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("a.md") ^ text.contains("b.md"), "{text}");
    }

    #[test]
    fn test_clean_removes_stale_output() {
        let dir = site(&[("index.md", "home")]);
        fs::create_dir_all(dir.path().join("_site")).unwrap();
        fs::write(dir.path().join("_site/stale.html"), "old").unwrap();

        let overrides = ConfigOverrides {
            mode: Some("development".into()),
            clean: Some(true),
            ..ConfigOverrides::default()
        };
        let mut builder = Builder::with_fetcher(dir.path(), overrides, Box::new(Offline)).unwrap();
        builder.build().unwrap();

        assert!(!dir.path().join("_site/stale.html").exists());
        assert!(dir.path().join("_site/index.html").exists());
    }
}
