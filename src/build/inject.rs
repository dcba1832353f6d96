//! Splicing island output into finished pages.

use crate::islands::{Island, bundle::PageBundle};
use rustc_hash::FxHashMap;

/// Opens a socket to the dev server and reloads on any message.
pub const LIVE_RELOAD: &str = "<script>new WebSocket(`ws://${location.host}/ws`).onmessage = () => location.reload();</script>";

/// Replace the first marker of every rendered island with its markup.
/// Islands missing from `elements` keep their marker.
pub fn splice_islands(contents: &mut String, islands: &[Island], elements: &FxHashMap<String, String>) {
    for island in islands {
        let Some(html) = elements.get(&island.id) else {
            continue;
        };
        let marker = island.marker();
        if let Some(at) = contents.find(&marker) {
            contents.replace_range(at..at + marker.len(), html);
        }
    }
}

/// Insert `snippet` before the last `</tag>`, or append it.
fn insert_before_close(contents: &mut String, tag: &str, snippet: &str) {
    let close = format!("</{tag}>");
    match contents.rfind(&close) {
        Some(at) => contents.insert_str(at, snippet),
        None => contents.push_str(snippet),
    }
}

pub fn stylesheet_tags(styles: &[String]) -> String {
    styles
        .iter()
        .map(|url| format!(r#"<link rel="stylesheet" href="{url}">"#))
        .collect()
}

pub fn script_tags(scripts: &[String]) -> String {
    scripts
        .iter()
        .map(|url| format!(r#"<script type="module" src="{url}"></script>"#))
        .collect()
}

/// Link tags before `</head>`, module scripts before `</body>`.
pub fn inject_bundle(contents: &mut String, bundle: &PageBundle) {
    if !bundle.styles.is_empty() {
        insert_before_close(contents, "head", &stylesheet_tags(&bundle.styles));
    }
    if !bundle.scripts.is_empty() {
        insert_before_close(contents, "body", &script_tags(&bundle.scripts));
    }
}

pub fn inject_live_reload(contents: &mut String) {
    insert_before_close(contents, "body", LIVE_RELOAD);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Data, islands::Hydration};

    fn island(id: &str) -> Island {
        Island {
            id: id.into(),
            entry: "/c.js".into(),
            props: Data::Null,
            hydration: Hydration::Static,
            client_only: false,
        }
    }

    #[test]
    fn test_splice_replaces_first_marker_only() {
        let mut html = "<p><!-- a_0 --></p><pre><!-- a_0 --></pre><!-- a_1 -->".to_owned();
        let mut elements = FxHashMap::default();
        elements.insert("a_0".to_owned(), "<b>x</b>".to_owned());

        splice_islands(&mut html, &[island("a_0"), island("a_1")], &elements);
        assert_eq!(html, "<p><b>x</b></p><pre><!-- a_0 --></pre><!-- a_1 -->");
    }

    #[test]
    fn test_inject_bundle() {
        let mut html = "<html><head><title>t</title></head><body><p>hi</p></body></html>".to_owned();
        let bundle = PageBundle {
            scripts: vec!["/_assets/bundle-ab.js".into()],
            styles: vec!["/_assets/bundle-ab.css".into()],
        };
        inject_bundle(&mut html, &bundle);

        assert_eq!(
            html,
            concat!(
                r#"<html><head><title>t</title><link rel="stylesheet" href="/_assets/bundle-ab.css"></head>"#,
                r#"<body><p>hi</p><script type="module" src="/_assets/bundle-ab.js"></script></body></html>"#,
            )
        );
    }

    #[test]
    fn test_empty_bundle_changes_nothing() {
        let mut html = "<body></body>".to_owned();
        inject_bundle(&mut html, &PageBundle::default());
        assert_eq!(html, "<body></body>");
    }

    #[test]
    fn test_fragment_without_body_gets_appended() {
        let mut html = "<p>fragment</p>".to_owned();
        inject_live_reload(&mut html);
        assert!(html.starts_with("<p>fragment</p><script>"));
        assert!(html.contains("/ws"));
    }
}
