//! Module graph construction.
//!
//! Starting from the entry points, every import is resolved through the
//! plugin chain, loaded, and scanned. Modules are keyed by
//! `namespace:path`, so one file is loaded once however many importers it has.

use super::{
    BuildOptions, Location, Message,
    plugin::{Loader, OnLoadArgs, OnResolveArgs, PluginBuild, ResolveKind, ResolveResult},
    resolve::FILE_NAMESPACE,
    scan::{self, ModuleSyntax, js_string},
};
use crate::utils::hash::short_hash;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// A copied file-loader asset.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Path relative to the output directory.
    pub rel: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct Module {
    pub path: String,
    pub namespace: String,
    /// Registry id in emitted code.
    pub id: String,
    /// Original text, as written to `sourcesContent`.
    pub source: String,
    /// JavaScript program for the module body, line-aligned with `source`
    /// for mapped loaders.
    pub program: String,
    pub loader: Loader,
    pub resolve_dir: Option<PathBuf>,
    pub syntax: ModuleSyntax,
    /// Module index per entry of `syntax.imports`.
    pub deps: Vec<usize>,
    pub asset: Option<Asset>,
}

impl Module {
    /// Whether the body maps line-for-line onto `source`.
    pub fn is_mapped(&self) -> bool {
        matches!(self.loader, Loader::Js | Loader::Json)
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        (self.namespace == FILE_NAMESPACE).then(|| PathBuf::from(&self.path))
    }

    /// Static and dynamic dependencies, in import order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        self.syntax
            .imports
            .iter()
            .zip(&self.deps)
            .map(|(site, &dep)| (dep, site.is_dynamic()))
    }

    fn location(&self, offset: usize) -> Location {
        Location::at(&self.path, &self.namespace, &self.program, offset)
    }
}

#[derive(Debug, Default)]
pub struct Graph {
    pub modules: Vec<Module>,
    /// (entry name, module index)
    pub entries: Vec<(String, usize)>,
}

enum LoadFailure {
    /// Not located yet: reported at the import site.
    Unlocated(String),
    Located(Message),
}

pub fn build(build: &PluginBuild<'_>, options: &BuildOptions) -> Result<Graph, Vec<Message>> {
    let mut builder = GraphBuilder {
        build,
        options,
        graph: Graph::default(),
        keys: FxHashMap::default(),
        errors: Vec::new(),
    };

    for entry in &options.entry_points {
        let args = OnResolveArgs {
            path: entry.input.clone(),
            importer: String::new(),
            namespace: String::new(),
            resolve_dir: Some(options.resolve_dir.clone()),
            kind: ResolveKind::EntryPoint,
        };
        let added = builder
            .build
            .resolve(&args)
            .map_err(LoadFailure::Unlocated)
            .and_then(|result| builder.add(result));
        match added {
            Ok(index) => builder.graph.entries.push((entry.name.clone(), index)),
            Err(LoadFailure::Unlocated(text)) => builder.errors.push(Message::new(text)),
            Err(LoadFailure::Located(message)) => builder.errors.push(message),
        }
    }

    let mut next = 0;
    while next < builder.graph.modules.len() {
        builder.link_imports(next);
        next += 1;
    }

    if builder.errors.is_empty() {
        Ok(builder.graph)
    } else {
        Err(builder.errors)
    }
}

struct GraphBuilder<'a, 'b> {
    build: &'a PluginBuild<'b>,
    options: &'a BuildOptions,
    graph: Graph,
    keys: FxHashMap<String, usize>,
    errors: Vec<Message>,
}

impl GraphBuilder<'_, '_> {
    fn link_imports(&mut self, index: usize) {
        let count = self.graph.modules[index].syntax.imports.len();
        let mut deps = Vec::with_capacity(count);

        for k in 0..count {
            let module = &self.graph.modules[index];
            let site = &module.syntax.imports[k];
            let args = OnResolveArgs {
                path: site.specifier.clone(),
                importer: module.path.clone(),
                namespace: module.namespace.clone(),
                resolve_dir: module.resolve_dir.clone(),
                kind: if site.is_dynamic() {
                    ResolveKind::DynamicImport
                } else {
                    ResolveKind::Import
                },
            };
            let site_location = module.location(site.spec_span.start);

            let added = self
                .build
                .resolve(&args)
                .map_err(LoadFailure::Unlocated)
                .and_then(|result| self.add(result));
            match added {
                Ok(dep) => deps.push(dep),
                Err(failure) => {
                    deps.push(index);
                    self.errors.push(match failure {
                        LoadFailure::Unlocated(text) => Message::new(text).with_location(site_location),
                        LoadFailure::Located(message) => message,
                    });
                }
            }
        }
        self.graph.modules[index].deps = deps;
    }

    fn add(&mut self, resolved: ResolveResult) -> Result<usize, LoadFailure> {
        let key = format!("{}:{}", resolved.namespace, resolved.path);
        if let Some(&index) = self.keys.get(&key) {
            return Ok(index);
        }
        let module = self.load(resolved)?;
        let index = self.graph.modules.len();
        self.graph.modules.push(module);
        self.keys.insert(key, index);
        Ok(index)
    }

    fn load(&self, resolved: ResolveResult) -> Result<Module, LoadFailure> {
        let loaded = self
            .build
            .load(&OnLoadArgs {
                path: resolved.path.clone(),
                namespace: resolved.namespace.clone(),
            })
            .map_err(LoadFailure::Unlocated)?;

        let id = self.module_id(&resolved);
        let mut module = Module {
            path: resolved.path,
            namespace: resolved.namespace,
            id,
            source: loaded.contents,
            program: String::new(),
            loader: loaded.loader,
            resolve_dir: loaded.resolve_dir,
            syntax: ModuleSyntax::default(),
            deps: Vec::new(),
            asset: None,
        };

        match module.loader {
            Loader::Js => {
                module.program = module.source.trim_start_matches('\u{feff}').to_owned();
                module.syntax = scan::scan(&module.program).map_err(|err| {
                    LoadFailure::Located(Message::new(err.message).with_location(module.location(err.offset)))
                })?;
            }
            Loader::Json => {
                if let Err(err) = serde_json::from_str::<serde_json::Value>(&module.source) {
                    let line_text = module.source.lines().nth(err.line().saturating_sub(1)).unwrap_or("");
                    return Err(LoadFailure::Located(
                        Message::new(format!("Invalid JSON: {err}")).with_location(Location {
                            file: module.path.clone(),
                            namespace: module.namespace.clone(),
                            line: err.line(),
                            column: err.column(),
                            line_text: line_text.to_owned(),
                        }),
                    ));
                }
                module.program = format!("const __json = {};", module.source.trim_end());
                module.syntax = ModuleSyntax::default_only("__json");
            }
            Loader::Text => {
                module.program = format!("const __text = {};", js_string(&module.source));
                module.syntax = ModuleSyntax::default_only("__text");
            }
            Loader::Css => {}
            Loader::File => {
                let bytes = match module.file_path() {
                    Some(path) => std::fs::read(&path).map_err(|err| {
                        LoadFailure::Unlocated(format!("Could not read \"{}\": {err}", path.display()))
                    })?,
                    None => std::mem::take(&mut module.source).into_bytes(),
                };
                let rel = asset_name(&self.options.asset_names, &module.path, &bytes);
                let url = format!("{}/{rel}", self.options.public_path.trim_end_matches('/'));
                module.program = format!("const __url = {};", js_string(&url));
                module.syntax = ModuleSyntax::default_only("__url");
                module.asset = Some(Asset { rel, bytes });
            }
        }
        Ok(module)
    }

    /// Registry id: paths relative to the resolve dir for files,
    /// `namespace:path` otherwise.
    fn module_id(&self, resolved: &ResolveResult) -> String {
        if !resolved.is_file() {
            return format!("{}:{}", resolved.namespace, resolved.path);
        }
        let path = Path::new(&resolved.path);
        path.strip_prefix(&self.options.resolve_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Apply the asset naming template to a file path.
fn asset_name(template: &str, path: &str, bytes: &[u8]) -> String {
    let clean = path.split(['?', '#']).next().unwrap_or(path);
    let file = Path::new(clean);
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("asset");
    let mut name = super::render_name(template, stem, &short_hash(bytes));
    if let Some(ext) = file.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_name() {
        let name = asset_name("media/[name]-[hash]", "/site/img/logo.png", b"png");
        assert_eq!(name, format!("media/logo-{}.png", short_hash(b"png")));
    }
}
