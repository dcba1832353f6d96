//! Chunk assignment and naming.
//!
//! Every entry point and, with splitting, every dynamic import target is a
//! root. A module belongs to the set of roots that reach it through static
//! imports:
//!
//! ```text
//! roots {A}      -> A's own file
//! roots {A, B}   -> shared chunk imported by A and B
//! ```
//!
//! Without splitting each root file carries everything it reaches, dynamic
//! imports included.

use super::{BuildOptions, graph::Graph, render_name};
use crate::utils::hash::Fingerprint;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkKind {
    Entry { name: String, module: usize },
    Dynamic { module: usize },
    Shared,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub kind: ChunkKind,
    /// Member modules in graph order.
    pub modules: Vec<usize>,
    /// Shared chunks this file imports.
    pub imports: Vec<usize>,
    /// (dynamically imported module, chunk that runs it)
    pub dynamic: Vec<(usize, usize)>,
    pub file_name: String,
}

impl Chunk {
    fn new(kind: ChunkKind) -> Self {
        Self {
            kind,
            modules: Vec::new(),
            imports: Vec::new(),
            dynamic: Vec::new(),
            file_name: String::new(),
        }
    }

    pub fn entry_name(&self) -> Option<&str> {
        match &self.kind {
            ChunkKind::Entry { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Module run when the file loads.
    pub fn root_module(&self) -> Option<usize> {
        match self.kind {
            ChunkKind::Entry { module, .. } | ChunkKind::Dynamic { module } => Some(module),
            ChunkKind::Shared => None,
        }
    }
}

pub fn link(graph: &Graph, options: &BuildOptions) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = graph
        .entries
        .iter()
        .map(|(name, module)| {
            Chunk::new(ChunkKind::Entry {
                name: name.clone(),
                module: *module,
            })
        })
        .collect();

    // Root chunk index per module
    let mut root_of: FxHashMap<usize, usize> = FxHashMap::default();
    for (index, chunk) in chunks.iter().enumerate() {
        if let Some(module) = chunk.root_module() {
            root_of.entry(module).or_insert(index);
        }
    }
    if options.splitting {
        for module in &graph.modules {
            for (dep, dynamic) in module.edges() {
                if dynamic && !root_of.contains_key(&dep) {
                    root_of.insert(dep, chunks.len());
                    chunks.push(Chunk::new(ChunkKind::Dynamic { module: dep }));
                }
            }
        }
    }

    let mut owners: Vec<Vec<usize>> = vec![Vec::new(); graph.modules.len()];
    for (root, chunk) in chunks.iter().enumerate() {
        let Some(start) = chunk.root_module() else {
            continue;
        };
        let mut stack = vec![start];
        while let Some(module) = stack.pop() {
            if owners[module].last() == Some(&root) {
                continue;
            }
            owners[module].push(root);
            for (dep, dynamic) in graph.modules[module].edges().collect::<Vec<_>>().into_iter().rev() {
                if !dynamic || !options.splitting {
                    stack.push(dep);
                }
            }
        }
    }

    let mut shared: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
    for (module, roots_of_module) in owners.iter().enumerate() {
        match roots_of_module.as_slice() {
            [] => {}
            [root] => chunks[*root].modules.push(module),
            _ if !options.splitting => {
                for &root in roots_of_module {
                    chunks[root].modules.push(module);
                }
            }
            _ => {
                let index = *shared.entry(roots_of_module.clone()).or_insert_with(|| {
                    chunks.push(Chunk::new(ChunkKind::Shared));
                    chunks.len() - 1
                });
                chunks[index].modules.push(module);
                for &root in roots_of_module {
                    if !chunks[root].imports.contains(&index) {
                        chunks[root].imports.push(index);
                    }
                }
            }
        }
    }

    if options.splitting {
        for chunk in &mut chunks {
            let mut table = Vec::new();
            for &module in &chunk.modules {
                for (dep, dynamic) in graph.modules[module].edges() {
                    if dynamic
                        && let Some(&target) = root_of.get(&dep)
                        && !table.contains(&(dep, target))
                    {
                        table.push((dep, target));
                    }
                }
            }
            chunk.dynamic = table;
        }
    }

    name_chunks(graph, options, &mut chunks);
    chunks
}

/// Assign file names. A chunk's hash covers its own members and every chunk
/// it references, transitively, so a changed dependency renames its
/// importers too.
fn name_chunks(graph: &Graph, options: &BuildOptions, chunks: &mut [Chunk]) {
    let own: Vec<String> = chunks
        .iter()
        .map(|chunk| {
            let mut hash = Fingerprint::new();
            if let Some(name) = chunk.entry_name() {
                hash.update(name);
            }
            if let Some(root) = chunk.root_module() {
                hash.update(&graph.modules[root].id);
            }
            for &module in &chunk.modules {
                let module = &graph.modules[module];
                hash.update(&module.id);
                if options.content_hash {
                    hash.update(&module.source);
                }
            }
            hash.finish()
        })
        .collect();

    let hashes: Vec<String> = (0..chunks.len())
        .map(|start| {
            let mut seen = vec![false; chunks.len()];
            let mut stack = vec![start];
            let mut reached = Vec::new();
            while let Some(index) = stack.pop() {
                if std::mem::replace(&mut seen[index], true) {
                    continue;
                }
                if index != start {
                    reached.push(own[index].as_str());
                }
                stack.extend(chunks[index].imports.iter().copied());
                stack.extend(chunks[index].dynamic.iter().map(|&(_, chunk)| chunk));
            }
            reached.sort_unstable();
            let mut hash = Fingerprint::new();
            hash.update(&own[start]);
            for part in reached {
                hash.update(part);
            }
            hash.finish()
        })
        .collect();

    for (chunk, hash) in chunks.iter_mut().zip(hashes) {
        let base = match &chunk.kind {
            ChunkKind::Entry { name, .. } => render_name(&options.entry_names, name, &hash),
            _ => render_name(&options.chunk_names, "chunk", &hash),
        };
        chunk.file_name = format!("{base}.js");
    }
}
