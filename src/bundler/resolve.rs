//! Default file resolution for the `file` namespace.
//!
//! Relative and absolute paths are probed with a fixed extension list, bare
//! names are looked up in the nearest `node_modules`. `package.json` is read
//! for `module` then `main`; export maps and conditions are not consulted.

use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const FILE_NAMESPACE: &str = "file";

const EXTENSIONS: &[&str] = &["js", "mjs", "json", "css"];
const INDEX_FILES: &[&str] = &["index.js", "index.mjs"];

#[derive(Deserialize, Default)]
struct PackageJson {
    module: Option<String>,
    main: Option<String>,
}

pub fn is_relative(spec: &str) -> bool {
    spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../")
}

/// Bare specifiers name a package (`preact`, `@scope/pkg/sub`).
pub fn is_bare(spec: &str) -> bool {
    !is_relative(spec) && !spec.starts_with('/') && !spec.contains("://")
}

/// Resolve `spec` as imported from a module living in `dir`.
pub fn resolve_file(spec: &str, dir: &Path) -> Option<PathBuf> {
    if is_relative(spec) {
        return probe(&dir.join(spec));
    }
    let path = Path::new(spec);
    if path.is_absolute() {
        return probe(path);
    }
    if spec.contains("://") {
        return None;
    }
    resolve_package(spec, dir)
}

fn resolve_package(spec: &str, dir: &Path) -> Option<PathBuf> {
    let (name, subpath) = split_package(spec);
    dir.ancestors().find_map(|base| {
        let package = base.join("node_modules").join(name);
        if !package.is_dir() {
            return None;
        }
        match subpath {
            Some(sub) => probe(&package.join(sub)),
            None => package_entry(&package),
        }
    })
}

/// Split `@scope/pkg/a/b` into (`@scope/pkg`, `a/b`).
fn split_package(spec: &str) -> (&str, Option<&str>) {
    let name_parts = if spec.starts_with('@') { 2 } else { 1 };
    let mut end = 0;
    for (count, (i, _)) in spec.match_indices('/').enumerate() {
        if count + 1 == name_parts {
            end = i;
            break;
        }
    }
    if end == 0 {
        (spec, None)
    } else {
        (&spec[..end], Some(&spec[end + 1..]))
    }
}

fn probe(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(normalize(path));
    }
    for ext in EXTENSIONS {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return Some(normalize(&candidate));
        }
    }
    if path.is_dir() {
        return package_entry(path);
    }
    None
}

fn package_entry(dir: &Path) -> Option<PathBuf> {
    let manifest = dir.join("package.json");
    if let Ok(text) = fs::read_to_string(&manifest) {
        let package: PackageJson = serde_json::from_str(&text).unwrap_or_default();
        for field in [package.module, package.main].into_iter().flatten() {
            let target = dir.join(field);
            if target.is_file() {
                return Some(normalize(&target));
            }
            if let Some(found) = probe_without_dir(&target) {
                return Some(found);
            }
        }
    }
    INDEX_FILES
        .iter()
        .map(|index| dir.join(index))
        .find(|p| p.is_file())
        .map(|p| normalize(&p))
}

fn probe_without_dir(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        return INDEX_FILES
            .iter()
            .map(|index| path.join(index))
            .find(|p| p.is_file())
            .map(|p| normalize(&p));
    }
    probe(path)
}

/// Collapse `.` and `..` so one file always gets one module key.
pub fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_split_package() {
        assert_eq!(split_package("preact"), ("preact", None));
        assert_eq!(split_package("preact/hooks"), ("preact", Some("hooks")));
        assert_eq!(split_package("@scope/pkg"), ("@scope/pkg", None));
        assert_eq!(split_package("@scope/pkg/a/b"), ("@scope/pkg", Some("a/b")));
    }

    #[test]
    fn test_relative_with_extension_probing() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "components/counter.js", "");
        touch(dir.path(), "lib/index.js", "");
        let pages = dir.path().join("pages");
        fs::create_dir_all(&pages).unwrap();

        let found = resolve_file("../components/counter", &pages).unwrap();
        assert_eq!(found, dir.path().join("components/counter.js"));
        assert_eq!(
            resolve_file("./lib", dir.path()).unwrap(),
            dir.path().join("lib/index.js")
        );
        assert!(resolve_file("./nope", dir.path()).is_none());
    }

    #[test]
    fn test_absolute_path() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.mjs", "");
        let abs = dir.path().join("a");

        assert_eq!(
            resolve_file(abs.to_str().unwrap(), Path::new("/")).unwrap(),
            dir.path().join("a.mjs")
        );
    }

    #[test]
    fn test_node_modules_lookup() {
        let dir = TempDir::new().unwrap();
        touch(
            dir.path(),
            "node_modules/lib/package.json",
            r#"{"main": "dist/lib.cjs.js", "module": "dist/lib.mjs"}"#,
        );
        touch(dir.path(), "node_modules/lib/dist/lib.mjs", "");
        touch(dir.path(), "node_modules/lib/hooks/index.js", "");
        let nested = dir.path().join("src/deep");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            resolve_file("lib", &nested).unwrap(),
            dir.path().join("node_modules/lib/dist/lib.mjs")
        );
        assert_eq!(
            resolve_file("lib/hooks", &nested).unwrap(),
            dir.path().join("node_modules/lib/hooks/index.js")
        );
        assert!(resolve_file("missing-pkg", &nested).is_none());
    }

    #[test]
    fn test_urls_are_not_files() {
        assert!(resolve_file("https://esm.sh/preact", Path::new("/")).is_none());
        assert!(!is_bare("https://esm.sh/preact"));
        assert!(is_bare("preact"));
        assert!(!is_bare("./x"));
    }
}
