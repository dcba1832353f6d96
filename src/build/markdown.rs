//! Markdown to HTML with heading anchors and external links.
//!
//! Raw HTML passes through untouched so island markers and containers left
//! by the page template survive conversion.

use crate::{config::MarkdownConfig, utils::slug::AnchorSlugger};
use pulldown_cmark::{CowStr, Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd, html};
use quick_xml::escape::escape;

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

fn is_external(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// `posts/a.md` → `posts/a.html`, `docs/index.md` → `docs/`.
fn page_link(url: CowStr<'_>) -> CowStr<'_> {
    if !url.ends_with(".md") {
        return url;
    }
    url.replacen(".md", ".html", 1)
        .replacen("index.html", "", 1)
        .into()
}

/// Heading being collected until its end tag.
struct OpenHeading<'a> {
    level: HeadingLevel,
    id: Option<CowStr<'a>>,
    events: Vec<Event<'a>>,
}

pub fn render(markdown: &str, config: &MarkdownConfig) -> String {
    let mut events = Vec::new();
    let mut slugger = AnchorSlugger::default();
    let mut heading: Option<OpenHeading<'_>> = None;
    // One entry per open link: was it rewritten?
    let mut links: Vec<bool> = Vec::new();

    for event in Parser::new_ext(markdown, options()) {
        let event = match event {
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                ..
            }) if config.external_links
                && is_external(&dest_url)
                && link_type != LinkType::Email =>
            {
                links.push(true);
                let title = if title.is_empty() {
                    String::new()
                } else {
                    format!(r#" title="{}""#, escape(&*title))
                };
                Event::Html(
                    format!(
                        r#"<a href="{}"{title} target="_blank" rel="noopener noreferrer">"#,
                        escape(&*dest_url)
                    )
                    .into(),
                )
            }
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => {
                links.push(false);
                Event::Start(Tag::Link {
                    link_type,
                    dest_url: page_link(dest_url),
                    title,
                    id,
                })
            }
            Event::End(TagEnd::Link) => match links.pop() {
                Some(true) => Event::Html("</a>".into()),
                _ => Event::End(TagEnd::Link),
            },
            other => other,
        };

        match event {
            Event::Start(Tag::Heading { level, id, .. }) if config.heading_anchors => {
                heading = Some(OpenHeading {
                    level,
                    id,
                    events: Vec::new(),
                });
            }
            Event::End(TagEnd::Heading(_)) if heading.is_some() => {
                if let Some(open) = heading.take() {
                    events.push(Event::Html(close_heading(open, &mut slugger).into()));
                }
            }
            event => match heading.as_mut() {
                Some(open) => open.events.push(event),
                None => events.push(event),
            },
        }
    }

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

/// `<a href="#id" class="permalink"><h2 id="id">…</h2></a>`, or a plain
/// heading with an id when the heading already starts with a link.
fn close_heading(open: OpenHeading<'_>, slugger: &mut AnchorSlugger) -> String {
    let text: String = open
        .events
        .iter()
        .filter_map(|event| match event {
            Event::Text(text) | Event::Code(text) => Some(&**text),
            _ => None,
        })
        .collect();
    let id = match &open.id {
        Some(id) => id.to_string(),
        None => slugger.slug(&text),
    };
    let starts_with_link = matches!(
        open.events.first(),
        Some(Event::Start(Tag::Link { .. })) | Some(Event::Html(_))
    );

    let mut inner = String::new();
    html::push_html(&mut inner, open.events.into_iter());
    let tag = open.level;
    let id = escape(id.as_str());

    if starts_with_link {
        format!(r#"<{tag} id="{id}">{inner}</{tag}>"#)
    } else {
        format!(r##"<a href="#{id}" class="permalink"><{tag} id="{id}">{inner}</{tag}></a>"##)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(heading_anchors: bool, external_links: bool) -> MarkdownConfig {
        MarkdownConfig {
            heading_anchors,
            external_links,
        }
    }

    #[test]
    fn test_heading_anchors() {
        let html = render("## Hello, World!\n\n## Hello, World!\n", &config(true, false));
        assert!(html.contains(r##"<a href="#hello-world" class="permalink"><h2 id="hello-world">Hello, World!</h2></a>"##), "{html}");
        assert!(html.contains(r#"<h2 id="hello-world-1">"#), "{html}");
    }

    #[test]
    fn test_heading_with_inline_code() {
        let html = render("# Using `render()`\n", &config(true, false));
        assert!(html.contains(r#"<h1 id="using-render">Using <code>render()</code></h1>"#), "{html}");
    }

    #[test]
    fn test_heading_starting_with_link_is_not_wrapped() {
        let html = render("## [Docs](/docs)\n", &config(true, false));
        assert!(html.starts_with(r#"<h2 id="docs"><a href="/docs">Docs</a></h2>"#), "{html}");
    }

    #[test]
    fn test_anchors_disabled() {
        let html = render("## Title\n", &config(false, false));
        assert_eq!(html, "<h2>Title</h2>\n");
    }

    #[test]
    fn test_external_links() {
        let html = render("[a](https://example.com) [b](/local)\n", &config(false, true));
        assert!(html.contains(r#"<a href="https://example.com" target="_blank" rel="noopener noreferrer">a</a>"#), "{html}");
        assert!(html.contains(r#"<a href="/local">b</a>"#), "{html}");
    }

    #[test]
    fn test_page_links_point_at_output() {
        let html = render(
            "[a](./posts/hello.md) [b](./docs/index.md) [c](/index.md) [d](notes.md#top)\n",
            &config(false, true),
        );
        assert!(html.contains(r#"<a href="./posts/hello.html">a</a>"#), "{html}");
        assert!(html.contains(r#"<a href="./docs/">b</a>"#), "{html}");
        assert!(html.contains(r#"<a href="/">c</a>"#), "{html}");
        assert!(html.contains(r#"<a href="notes.md#top">d</a>"#), "{html}");
    }

    #[test]
    fn test_raw_html_survives() {
        let source = "Before\n\n<div id=\"ab12_0\"><!-- ab12_0 --></div>\n\nAfter\n";
        let html = render(source, &config(true, true));
        assert!(html.contains("<div id=\"ab12_0\"><!-- ab12_0 --></div>"), "{html}");
    }

    #[test]
    fn test_tables_and_tasks() {
        let html = render("| a |\n|---|\n| 1 |\n\n- [x] done\n", &config(true, true));
        assert!(html.contains("<table>"));
        assert!(html.contains("checkbox"));
    }
}
