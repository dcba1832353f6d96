//! Output file generation.
//!
//! Each module becomes one registry entry:
//!
//! ```text
//! __define("id", function (__exports, __require, __import) {<exports>
//! <module body, line for line>
//! });
//! ```
//!
//! `Iife` output wraps everything in one function scope with a private
//! registry. `Esm` output shares a registry through `globalThis` so chunks
//! loaded by different entries see each other's modules.

use super::{
    BuildOptions, Format, OutputFile, OutputKind, SourceMapMode,
    graph::{Graph, Module},
    link::{Chunk, ChunkKind},
    render_name,
    scan::{self, js_string},
    sourcemap::{MapSource, Segment, SourceMap},
};
use crate::utils::hash::short_hash;

const HELPERS: &str = "function __export(target, getters) { for (const key in getters) Object.defineProperty(target, key, { get: getters[key], enumerable: true }); } \
function __reexport(target, source) { for (const key in source) if (key !== \"default\" && !(key in target)) Object.defineProperty(target, key, { get: () => source[key], enumerable: true }); }";

const IIFE_RUNTIME: &str = "const __modules = {}, __cache = {}; \
function __define(id, factory) { __modules[id] = factory; } \
function __require(id) { if (id in __cache) return __cache[id]; if (!(id in __modules)) throw new Error(\"Module not found: \" + id); const exports = __cache[id] = {}; __modules[id](exports, __require, __import); return exports; } \
function __import(id) { return Promise.resolve().then(() => __require(id)); }";

const ESM_RUNTIME: &str = "const __r = globalThis.__atoll || (globalThis.__atoll = { modules: {}, cache: {}, chunks: {} }); \
function __define(id, factory) { __r.modules[id] = factory; } \
function __chunk(id, url) { __r.chunks[id] = url; } \
function __require(id) { if (id in __r.cache) return __r.cache[id]; if (!(id in __r.modules)) throw new Error(\"Module not found: \" + id); const exports = __r.cache[id] = {}; __r.modules[id](exports, __require, __import); return exports; } \
function __import(id) { const url = __r.chunks[id]; return (url ? import(url) : Promise.resolve()).then(() => __require(id)); }";

struct FileBuilder {
    code: String,
    line: usize,
    map: SourceMap,
}

impl FileBuilder {
    fn new(file_name: &str) -> Self {
        Self {
            code: String::new(),
            line: 0,
            map: SourceMap::new(file_name),
        }
    }

    fn push(&mut self, text: &str) {
        self.code.push_str(text);
        self.code.push('\n');
        self.line += text.matches('\n').count() + 1;
    }

    /// Append `body` with one mapping per word start, each pointing at the
    /// same line and column of the original.
    fn push_mapped(&mut self, body: &str, source: u32) {
        let body = body.strip_suffix('\n').unwrap_or(body);
        for (line, text) in body.split('\n').enumerate() {
            let mut previous_blank = true;
            for (column, c) in text.chars().enumerate() {
                let blank = c.is_whitespace();
                if !blank && previous_blank {
                    let (line, column) = (line as u32, column as u32);
                    self.map.add_mapping(
                        self.line,
                        Segment {
                            gen_column: column,
                            source,
                            line,
                            column,
                        },
                    );
                }
                previous_blank = blank;
            }
            self.push(text);
        }
    }

    fn push_module(&mut self, module: &Module, graph: &Graph) {
        let ids: Vec<String> = module
            .deps
            .iter()
            .map(|&dep| graph.modules[dep].id.clone())
            .collect();
        let rewritten = scan::rewrite(&module.program, &module.syntax, &ids);
        self.push(&format!(
            "__define({}, function (__exports, __require, __import) {{{}",
            js_string(&module.id),
            rewritten.header
        ));
        if module.is_mapped() {
            let source = self.map.add_source(MapSource {
                name: module.id.clone(),
                content: Some(module.source.clone()),
                path: module.file_path(),
            });
            self.push_mapped(&rewritten.body, source);
        } else if !rewritten.body.is_empty() {
            self.push(rewritten.body.strip_suffix('\n').unwrap_or(&rewritten.body));
        }
        self.push("});");
    }
}

pub fn emit(graph: &Graph, chunks: &[Chunk], options: &BuildOptions) -> Vec<OutputFile> {
    let public = options.public_path.trim_end_matches('/');
    let mut outputs = Vec::new();

    for chunk in chunks {
        let mut file = FileBuilder::new(&chunk.file_name);
        match options.format {
            Format::Iife => {
                file.push("(() => {");
                file.push(IIFE_RUNTIME);
            }
            Format::Esm => {
                for &import in &chunk.imports {
                    file.push(&format!("import \"./{}\";", chunks[import].file_name));
                }
                file.push(ESM_RUNTIME);
                for &(module, target) in &chunk.dynamic {
                    file.push(&format!(
                        "__chunk({}, {});",
                        js_string(&graph.modules[module].id),
                        js_string(&format!("{public}/{}", chunks[target].file_name))
                    ));
                }
            }
        }
        file.push(HELPERS);
        for &module in &chunk.modules {
            file.push_module(&graph.modules[module], graph);
        }
        if let ChunkKind::Entry { module, .. } = &chunk.kind {
            file.push(&format!("__require({});", js_string(&graph.modules[*module].id)));
        }
        if options.format == Format::Iife {
            file.push("})();");
        }

        let FileBuilder { mut code, map, .. } = file;
        if options.sourcemap == SourceMapMode::Linked {
            let map_name = format!("{}.map", chunk.file_name);
            code.push_str(&format!("//# sourceMappingURL={map_name}\n"));
            outputs.push(OutputFile {
                path: options.outdir.join(&map_name),
                url: format!("{public}/{map_name}"),
                contents: map.to_json().into_bytes(),
                kind: OutputKind::SourceMap,
                entry: None,
                map: None,
            });
        }
        outputs.push(OutputFile {
            path: options.outdir.join(&chunk.file_name),
            url: format!("{public}/{}", chunk.file_name),
            contents: code.into_bytes(),
            kind: OutputKind::Script,
            entry: chunk.entry_name().map(str::to_owned),
            map: Some(map),
        });

        if let ChunkKind::Entry { name, module } = &chunk.kind {
            let css = stylesheet(graph, *module, options);
            if !css.is_empty() {
                let hash = if options.content_hash {
                    short_hash(&css)
                } else {
                    short_hash(name)
                };
                let file_name = format!("{}.css", render_name(&options.entry_names, name, &hash));
                outputs.push(OutputFile {
                    path: options.outdir.join(&file_name),
                    url: format!("{public}/{file_name}"),
                    contents: css.into_bytes(),
                    kind: OutputKind::Stylesheet,
                    entry: Some(name.to_owned()),
                    map: None,
                });
            }
        }
    }

    for module in &graph.modules {
        if let Some(asset) = &module.asset {
            outputs.push(OutputFile {
                path: options.outdir.join(&asset.rel),
                url: format!("{public}/{}", asset.rel),
                contents: asset.bytes.clone(),
                kind: OutputKind::Asset,
                entry: None,
                map: None,
            });
        }
    }
    outputs
}

/// Concatenated CSS reached from `root`, in import order.
fn stylesheet(graph: &Graph, root: usize, options: &BuildOptions) -> String {
    let mut seen = vec![false; graph.modules.len()];
    let mut order = Vec::new();
    visit(graph, root, options.splitting, &mut seen, &mut order);

    let mut css = String::new();
    for module in order {
        let module = &graph.modules[module];
        if module.loader == super::Loader::Css {
            css.push_str(&format!("/* {} */\n", module.id));
            css.push_str(module.source.trim_end());
            css.push('\n');
        }
    }
    css
}

fn visit(graph: &Graph, module: usize, splitting: bool, seen: &mut [bool], order: &mut Vec<usize>) {
    if std::mem::replace(&mut seen[module], true) {
        return;
    }
    for (dep, dynamic) in graph.modules[module].edges() {
        if !dynamic || !splitting {
            visit(graph, dep, splitting, seen, order);
        }
    }
    order.push(module);
}
