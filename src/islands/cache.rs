//! Disk-backed cache of remote modules.
//!
//! Fetched modules are treated as immutable per URL: once a URL is in the
//! cache it is never fetched again by this process. Each entry is one file
//! in the cache directory, named by the percent-encoded URL, and the whole
//! directory is read when the cache is opened.

use crate::{log, utils::hash::short_hash};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache error at `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
}

/// Network access, swappable in tests.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, CacheError>;
}

pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(10))
                .build(),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, CacheError> {
        let fail = |message: String| CacheError::Fetch {
            url: url.to_owned(),
            message,
        };
        let response = self.agent.get(url).call().map_err(|err| fail(err.to_string()))?;
        response.into_string().map_err(|err| fail(err.to_string()))
    }
}

pub struct SourceCache {
    dir: PathBuf,
    /// Also serializes writes to `dir`.
    modules: Mutex<FxHashMap<String, String>>,
    fetcher: Box<dyn Fetch>,
}

impl SourceCache {
    /// Open the cache in `dir`, loading every stored module.
    pub fn open(dir: &Path, fetcher: Box<dyn Fetch>) -> Result<Self, CacheError> {
        let io_err = |source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let mut modules = FxHashMap::default();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(url) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| urlencoding::decode(n).ok())
            else {
                continue;
            };
            // Leftovers of interrupted writes are not entries
            if !url.contains("://") {
                continue;
            }
            if let Ok(contents) = fs::read_to_string(&path) {
                modules.insert(url.into_owned(), contents);
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            modules: Mutex::new(modules),
            fetcher,
        })
    }

    pub fn len(&self) -> usize {
        self.modules.lock().len()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.modules.lock().contains_key(url)
    }

    /// Contents of `url`, from memory or over the network.
    ///
    /// Concurrent misses for one URL may both fetch; the last write wins with
    /// identical contents.
    pub fn fetch(&self, url: &str) -> Result<String, CacheError> {
        if let Some(contents) = self.modules.lock().get(url) {
            return Ok(contents.clone());
        }

        log!("fetch"; "{url}");
        let contents = self.fetcher.fetch(url)?;

        let mut modules = self.modules.lock();
        self.persist(url, &contents)?;
        modules.insert(url.to_owned(), contents.clone());
        Ok(contents)
    }

    /// Write through a temporary file so readers never see a partial entry.
    fn persist(&self, url: &str, contents: &str) -> Result<(), CacheError> {
        let name = urlencoding::encode(url);
        let path = self.dir.join(name.as_ref());
        let tmp = self.dir.join(format!(".{}.tmp", short_hash(name.as_bytes())));
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)
    }
}
