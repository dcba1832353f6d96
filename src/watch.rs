//! File system watcher for live reload.
//!
//! Watches the site root and rebuilds the whole site on change. Builds are
//! never patched incrementally: every batch of changes runs
//! [`Builder::reset`] then [`Builder::build`], and connected pages reload
//! whether the build failed or not.
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌──────────────────────────────┐
//! │ notify   │───▶│ Debouncer │───▶│ reset + build                │
//! │ events   │    │ (debounce)│    │ DevServer::update + reload   │
//! └──────────┘    └───────────┘    └──────────────────────────────┘
//! ```

use crate::{
    build::Builder,
    config::SiteConfig,
    diagnostics::Style,
    log,
    logger::WatchStatus,
    serve::DevServer,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Component, Path, PathBuf},
    sync::{Arc, mpsc},
    time::{Duration, Instant},
};

const REBUILD_COOLDOWN_MS: u64 = 800;

/// Directories whose changes never trigger a rebuild.
const IGNORED_DIRS: &[&str] = &["node_modules", "target"];

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Changes under the output or cache directory, or inside hidden and
/// dependency directories, are produced by builds or tools, not authors.
fn is_source_change(path: &Path, config: &SiteConfig) -> bool {
    if is_temp_file(path)
        || path.starts_with(&config.build.output)
        || path.starts_with(&config.islands.cache_dir)
    {
        return false;
    }
    let rel = path.strip_prefix(config.get_root()).unwrap_or(path);
    !rel.components().any(|c| match c {
        Component::Normal(part) => {
            let part = part.to_string_lossy();
            part.starts_with('.') || IGNORED_DIRS.contains(&part.as_ref())
        }
        _ => false,
    })
}

/// `/proj/posts/a.md` → `posts/a.md`
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// Batches rapid file events with debouncing and rebuild cooldown.
struct Debouncer {
    delay: Duration,
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
}

impl Debouncer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: FxHashSet::default(),
            last_event: None,
            last_rebuild: None,
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_rebuild
            .is_some_and(|t| t.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS))
    }

    fn add(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        let before = self.pending.len();
        self.pending.extend(paths);
        if self.pending.len() > before {
            self.last_event = Some(Instant::now());
        }
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= self.delay)
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn mark_rebuild(&mut self) {
        self.last_rebuild = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            self.delay
        }
    }
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

/// Full rebuild after `changed`; always ends with a reload broadcast.
fn rebuild(builder: &mut Builder, server: &DevServer, status: &mut WatchStatus, changed: &[PathBuf]) {
    let root = builder.config().get_root().to_path_buf();
    let trigger = match changed {
        [one] => rel_path(one, &root),
        [first, rest @ ..] => format!("{} (+{} more)", rel_path(first, &root), rest.len()),
        [] => return,
    };

    builder.reset();
    match builder.build() {
        Ok(elapsed) => {
            server.update(Ok(()));
            status.success(&format!("{trigger} changed, rebuilt in {elapsed:.2?}"));
        }
        Err(err) => {
            server.update(Err(&err));
            status.error(&format!("{trigger} changed, build failed"), &err.render(Style::Terminal));
        }
    }
    server.broadcast_reload();
}

/// Block on file events, rebuilding through `builder` until the watcher
/// channel closes.
pub fn watch_for_changes_blocking(mut builder: Builder, server: Arc<DevServer>) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;

    let root = builder.config().get_root().to_path_buf();
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;
    log!("watch"; "watching {}", root.display());

    let mut debouncer = Debouncer::new(builder.config().serve.debounce());
    let mut status = WatchStatus::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) && !debouncer.in_cooldown() => {
                let config = builder.config();
                debouncer.add(event.paths.into_iter().filter(|p| is_source_change(p, config)));
            }
            Ok(Err(err)) => log!("watch"; "error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                rebuild(&mut builder, &server, &mut status, &debouncer.take());
                debouncer.mark_rebuild();
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            _ => {}
        }
    }

    Ok(())
}
