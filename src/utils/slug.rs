//! Slugs for heading anchors.

use rustc_hash::FxHashMap;

/// Transliterate to ASCII and join alphanumeric runs with `-`.
///
/// `"Hello, Wörld!"` → `"hello-world"`
pub fn slugify(text: &str) -> String {
    let ascii = deunicode::deunicode(text);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c != '\'' {
            pending_dash = true;
        }
    }

    slug
}

/// Hands out unique anchor ids within one document.
///
/// Repeated headings get `-1`, `-2`, ... suffixes.
#[derive(Debug, Default)]
pub struct AnchorSlugger {
    seen: FxHashMap<String, usize>,
}

impl AnchorSlugger {
    pub fn slug(&mut self, text: &str) -> String {
        let base = match slugify(text) {
            s if s.is_empty() => "heading".to_owned(),
            s => s,
        };

        let count = self.seen.entry(base.clone()).or_insert(0);
        let id = if *count == 0 {
            base
        } else {
            format!("{base}-{count}")
        };
        *count += 1;
        id
    }
}
