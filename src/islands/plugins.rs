//! Resolution plugins shared by the static renderer and the client bundler.
//!
//! Installed in this order; the first plugin that answers wins:
//!
//! 1. [`virtual_modules`]: literal specifiers served from memory.
//! 2. [`framework_dispatch`]: `path?static` / `path?hydrate` become adapter
//!    entries for the real file behind `path`.
//! 3. [`import_map`]: configured bare names become a local alias or a URL.
//! 4. [`remote`]: URLs, imports inside fetched modules and, with a CDN
//!    configured, bare names that are not installed locally.

use super::{IslandOptions, adapter::adapter_for, cache::SourceCache};
use crate::bundler::{
    FILE_NAMESPACE, LoadResult, Loader, OnResolveArgs, Plugin, ResolveResult,
    resolve::is_bare,
};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

pub const VIRTUAL_NAMESPACE: &str = "atoll";
pub const ISLAND_NAMESPACE: &str = "island";
pub const REMOTE_NAMESPACE: &str = "remote";

pub const STATIC_SUFFIX: &str = "?static";
pub const HYDRATE_SUFFIX: &str = "?hydrate";

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://").unwrap());

/// An in-memory module.
#[derive(Debug, Clone)]
pub struct VirtualModule {
    pub contents: String,
    pub resolve_dir: PathBuf,
}

/// All plugins for one bundler run.
pub fn plugins(
    modules: FxHashMap<String, VirtualModule>,
    options: &IslandOptions,
    cache: Arc<SourceCache>,
) -> Vec<Plugin> {
    vec![
        virtual_modules(modules),
        framework_dispatch(),
        import_map(&options.import_map, &options.root),
        remote(cache, options.cdn_url.clone()),
    ]
}

pub fn virtual_modules(modules: FxHashMap<String, VirtualModule>) -> Plugin {
    let modules = Arc::new(modules);
    let names = modules.clone();

    Plugin::new("virtual-modules")
        .on_resolve(Regex::new(".*").unwrap(), None, move |args, _| {
            Ok(names
                .contains_key(&args.path)
                .then(|| ResolveResult::new(args.path.as_str(), VIRTUAL_NAMESPACE)))
        })
        .on_load(Regex::new(".*").unwrap(), Some(VIRTUAL_NAMESPACE), move |args| {
            Ok(modules.get(&args.path).map(|module| {
                LoadResult::js(module.contents.clone(), Some(module.resolve_dir.clone()))
            }))
        })
}

/// Split `path?static` into the path and its suffix.
fn split_suffix(path: &str) -> Option<(&str, &'static str)> {
    [STATIC_SUFFIX, HYDRATE_SUFFIX]
        .into_iter()
        .find_map(|suffix| path.strip_suffix(suffix).map(|rest| (rest, suffix)))
}

pub fn framework_dispatch() -> Plugin {
    let filter = Regex::new(r"\?(?:static|hydrate)$").unwrap();

    Plugin::new("framework-dispatch")
        .on_resolve(filter, None, |args, build| {
            let Some((path, suffix)) = split_suffix(&args.path) else {
                return Ok(None);
            };
            let real = build.resolve(&OnResolveArgs {
                path: path.to_owned(),
                ..args.clone()
            })?;
            if adapter_for(&real.path).is_none() {
                return Err(format!("No framework adapter handles \"{}\"", real.path));
            }
            Ok(Some(ResolveResult::new(
                format!("{}{suffix}", real.path),
                ISLAND_NAMESPACE,
            )))
        })
        .on_load(Regex::new(".*").unwrap(), Some(ISLAND_NAMESPACE), |args| {
            let Some((path, suffix)) = split_suffix(&args.path) else {
                return Ok(None);
            };
            let adapter = adapter_for(path)
                .ok_or_else(|| format!("No framework adapter handles \"{path}\""))?;
            let contents = if suffix == STATIC_SUFFIX {
                adapter.static_entry(path)
            } else {
                adapter.client_entry(path)
            };
            let resolve_dir = (!URL.is_match(path))
                .then(|| Path::new(path).parent().map(Path::to_path_buf))
                .flatten();
            Ok(Some(LoadResult::js(contents, resolve_dir)))
        })
}

/// Find the import map entry for `name`: an exact key, or the longest
/// `prefix/` key with the rest of the name appended to its target.
fn lookup(map: &FxHashMap<String, String>, name: &str) -> Option<String> {
    if let Some(target) = map.get(name) {
        return Some(target.clone());
    }
    map.iter()
        .filter(|(key, _)| key.ends_with('/') && name.starts_with(key.as_str()))
        .max_by_key(|(key, _)| key.len())
        .map(|(key, target)| format!("{target}{}", &name[key.len()..]))
}

pub fn import_map(entries: &std::collections::BTreeMap<String, String>, root: &Path) -> Plugin {
    let map: FxHashMap<String, String> = entries
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let root = root.to_path_buf();

    Plugin::new("import-map").on_resolve(Regex::new(r"^[^./]").unwrap(), None, move |args, build| {
        if !is_bare(&args.path) {
            return Ok(None);
        }
        let Some(target) = lookup(&map, &args.path) else {
            return Ok(None);
        };
        if URL.is_match(&target) {
            return Ok(Some(ResolveResult::new(target, REMOTE_NAMESPACE)));
        }
        if target == args.path {
            // Mapped onto itself: plain package resolution
            return Ok(None);
        }
        // Local aliases are relative to the site root
        build
            .resolve(&OnResolveArgs {
                path: target,
                resolve_dir: Some(root.clone()),
                namespace: FILE_NAMESPACE.to_owned(),
                ..args.clone()
            })
            .map(Some)
    })
}

pub fn remote(cache: Arc<SourceCache>, cdn_url: Option<String>) -> Plugin {
    let plugin = Plugin::new("remote-imports")
        // Imports inside fetched modules resolve against the module's URL
        .on_resolve(Regex::new(".*").unwrap(), Some(REMOTE_NAMESPACE), {
            let cdn_url = cdn_url.clone();
            move |args, _| {
                if URL.is_match(&args.path) {
                    return Ok(Some(ResolveResult::new(args.path.as_str(), REMOTE_NAMESPACE)));
                }
                if is_bare(&args.path) {
                    return match &cdn_url {
                        Some(cdn) => Ok(Some(ResolveResult::new(
                            format!("{cdn}/{}", args.path),
                            REMOTE_NAMESPACE,
                        ))),
                        None => Err(format!(
                            "Cannot resolve \"{}\" inside {}: add it to [islands.import_map] or enable [islands.cdn]",
                            args.path, args.importer
                        )),
                    };
                }
                let base = url::Url::parse(&args.importer).map_err(|err| err.to_string())?;
                let joined = base.join(&args.path).map_err(|err| err.to_string())?;
                Ok(Some(ResolveResult::new(joined.as_str(), REMOTE_NAMESPACE)))
            }
        })
        .on_resolve(Regex::clone(&URL), None, |args, _| {
            Ok(Some(ResolveResult::new(args.path.as_str(), REMOTE_NAMESPACE)))
        })
        .on_load(Regex::new(".*").unwrap(), Some(REMOTE_NAMESPACE), move |args| {
            let contents = cache.fetch(&args.path).map_err(|err| err.to_string())?;
            let path = url::Url::parse(&args.path)
                .map(|url| url.path().to_owned())
                .unwrap_or_default();
            Ok(Some(LoadResult {
                contents,
                resolve_dir: None,
                loader: remote_loader(&path),
            }))
        });

    let Some(cdn) = cdn_url else {
        return plugin;
    };
    plugin.on_resolve(Regex::new(r"^[a-z@]").unwrap(), None, move |args, build| {
        // Protocol-like specifiers name in-memory modules
        if args.path.contains(':') || !is_bare(&args.path) {
            return Ok(None);
        }
        let installed = args
            .resolve_dir
            .as_deref()
            .and_then(|dir| build.resolve_file(&args.path, dir));
        if installed.is_some() {
            return Ok(None);
        }
        Ok(Some(ResolveResult::new(
            format!("{cdn}/{}", args.path),
            REMOTE_NAMESPACE,
        )))
    })
}

/// Remote modules without a known extension are JavaScript.
fn remote_loader(path: &str) -> Loader {
    match Loader::for_path(path) {
        Loader::File | Loader::Text => Loader::Js,
        loader => loader,
    }
}
