//! Resolution and load hooks.
//!
//! A [`Plugin`] is an ordered set of callbacks keyed by a path filter and an
//! optional namespace. The bundler consults plugins in installation order and
//! the first callback returning `Some` wins:
//!
//! ```text
//! import "x" ─► on_resolve* ─► default file resolver
//!                  │
//!                  ▼ {path, namespace}
//!              on_load* ─► read from disk (file namespace)
//! ```

use super::resolve::{self, FILE_NAMESPACE};
use regex::Regex;
use std::{
    cell::Cell,
    path::{Path, PathBuf},
};

/// Nested `PluginBuild::resolve` calls allowed before reporting a loop.
const MAX_RESOLVE_DEPTH: usize = 16;

/// How loaded contents are turned into a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Js,
    Json,
    Css,
    Text,
    File,
}

impl Loader {
    /// Pick a loader from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext {
            "js" | "mjs" | "cjs" => Self::Js,
            "json" => Self::Json,
            "css" => Self::Css,
            "txt" | "md" | "html" => Self::Text,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "avif" | "ico" | "woff" | "woff2"
            | "ttf" | "otf" => Self::File,
            _ => return None,
        })
    }

    /// Pick a loader from a path or URL, defaulting to `Js`.
    pub fn for_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .unwrap_or(Self::Js)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    EntryPoint,
    Import,
    DynamicImport,
}

#[derive(Debug, Clone)]
pub struct OnResolveArgs {
    pub path: String,
    /// Path of the importing module (empty for entry points).
    pub importer: String,
    /// Namespace of the importing module.
    pub namespace: String,
    pub resolve_dir: Option<PathBuf>,
    pub kind: ResolveKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
    pub path: String,
    pub namespace: String,
}

impl ResolveResult {
    pub fn new(path: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: namespace.into(),
        }
    }

    pub fn file(path: &Path) -> Self {
        Self::new(path.to_string_lossy(), FILE_NAMESPACE)
    }

    pub fn is_file(&self) -> bool {
        self.namespace == FILE_NAMESPACE
    }
}

#[derive(Debug, Clone)]
pub struct OnLoadArgs {
    pub path: String,
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub contents: String,
    /// Directory used to resolve relative imports inside `contents`.
    pub resolve_dir: Option<PathBuf>,
    pub loader: Loader,
}

impl LoadResult {
    pub fn js(contents: impl Into<String>, resolve_dir: Option<PathBuf>) -> Self {
        Self {
            contents: contents.into(),
            resolve_dir,
            loader: Loader::Js,
        }
    }
}

pub type ResolveCallback =
    Box<dyn Fn(&OnResolveArgs, &PluginBuild<'_>) -> Result<Option<ResolveResult>, String> + Send + Sync>;
pub type LoadCallback =
    Box<dyn Fn(&OnLoadArgs) -> Result<Option<LoadResult>, String> + Send + Sync>;

pub struct OnResolve {
    pub filter: Regex,
    /// Only run for importers in this namespace (any when `None`).
    pub namespace: Option<String>,
    pub callback: ResolveCallback,
}

pub struct OnLoad {
    pub filter: Regex,
    /// Only run for modules in this namespace (any when `None`).
    pub namespace: Option<String>,
    pub callback: LoadCallback,
}

pub struct Plugin {
    pub name: &'static str,
    pub on_resolve: Vec<OnResolve>,
    pub on_load: Vec<OnLoad>,
}

impl Plugin {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            on_resolve: Vec::new(),
            on_load: Vec::new(),
        }
    }

    pub fn on_resolve<F>(mut self, filter: Regex, namespace: Option<&str>, callback: F) -> Self
    where
        F: Fn(&OnResolveArgs, &PluginBuild<'_>) -> Result<Option<ResolveResult>, String>
            + Send
            + Sync
            + 'static,
    {
        self.on_resolve.push(OnResolve {
            filter,
            namespace: namespace.map(str::to_owned),
            callback: Box::new(callback),
        });
        self
    }

    pub fn on_load<F>(mut self, filter: Regex, namespace: Option<&str>, callback: F) -> Self
    where
        F: Fn(&OnLoadArgs) -> Result<Option<LoadResult>, String> + Send + Sync + 'static,
    {
        self.on_load.push(OnLoad {
            filter,
            namespace: namespace.map(str::to_owned),
            callback: Box::new(callback),
        });
        self
    }
}

fn namespace_matches(wanted: Option<&str>, actual: &str) -> bool {
    wanted.is_none_or(|ns| ns == actual)
}

/// Handle given to resolve callbacks for re-entering resolution.
pub struct PluginBuild<'a> {
    plugins: &'a [Plugin],
    depth: Cell<usize>,
}

impl<'a> PluginBuild<'a> {
    pub fn new(plugins: &'a [Plugin]) -> Self {
        Self {
            plugins,
            depth: Cell::new(0),
        }
    }

    /// Run the whole resolve chain for `args`, falling back to the default
    /// file resolver.
    pub fn resolve(&self, args: &OnResolveArgs) -> Result<ResolveResult, String> {
        let depth = self.depth.get();
        if depth >= MAX_RESOLVE_DEPTH {
            return Err(format!("Resolving \"{}\" does not terminate", args.path));
        }
        self.depth.set(depth + 1);
        let result = self.resolve_inner(args);
        self.depth.set(depth);
        result
    }

    fn resolve_inner(&self, args: &OnResolveArgs) -> Result<ResolveResult, String> {
        for plugin in self.plugins {
            for hook in &plugin.on_resolve {
                if !namespace_matches(hook.namespace.as_deref(), &args.namespace)
                    || !hook.filter.is_match(&args.path)
                {
                    continue;
                }
                if let Some(result) = (hook.callback)(args, self)
                    .map_err(|err| format!("[plugin {}] {err}", plugin.name))?
                {
                    return Ok(result);
                }
            }
        }

        args.resolve_dir
            .as_deref()
            .and_then(|dir| resolve::resolve_file(&args.path, dir))
            .map(|path| ResolveResult::file(&path))
            .ok_or_else(|| format!("Could not resolve \"{}\"", args.path))
    }

    /// Default file resolution only, skipping every plugin.
    pub fn resolve_file(&self, path: &str, resolve_dir: &Path) -> Option<PathBuf> {
        resolve::resolve_file(path, resolve_dir)
    }

    /// Run the load chain, falling back to reading `file` namespace paths.
    pub fn load(&self, args: &OnLoadArgs) -> Result<LoadResult, String> {
        for plugin in self.plugins {
            for hook in &plugin.on_load {
                if !namespace_matches(hook.namespace.as_deref(), &args.namespace)
                    || !hook.filter.is_match(&args.path)
                {
                    continue;
                }
                if let Some(result) =
                    (hook.callback)(args).map_err(|err| format!("[plugin {}] {err}", plugin.name))?
                {
                    return Ok(result);
                }
            }
        }

        if args.namespace != FILE_NAMESPACE {
            return Err(format!(
                "No loader is registered for \"{}:{}\"",
                args.namespace, args.path
            ));
        }
        let path = Path::new(&args.path);
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let loader = Loader::from_extension(ext).ok_or_else(|| match ext {
            "ts" | "tsx" | "jsx" => format!(
                "\"{}\" needs a compile step: TypeScript and JSX are not supported",
                args.path
            ),
            _ => format!("No loader is configured for \".{ext}\" files: {}", args.path),
        })?;
        // Binary assets are read by the graph itself
        let contents = if loader == Loader::File {
            String::new()
        } else {
            std::fs::read_to_string(path)
                .map_err(|err| format!("Could not read \"{}\": {err}", args.path))?
        };
        Ok(LoadResult {
            contents,
            resolve_dir: path.parent().map(Path::to_path_buf),
            loader,
        })
    }
}
