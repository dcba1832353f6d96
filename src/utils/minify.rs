//! HTML minification for production pages.

use crate::config::SiteConfig;
use std::borrow::Cow;

/// Minify a finished page when the configuration asks for it.
///
/// Development builds are never minified, whatever `build.minify` says.
pub fn minify_page<'a>(html: &'a str, config: &SiteConfig) -> Cow<'a, str> {
    if !config.build.minify || config.is_dev() {
        return Cow::Borrowed(html);
    }
    let minified = minify_html_inner(html.as_bytes());
    match String::from_utf8(minified) {
        Ok(out) => Cow::Owned(out),
        Err(_) => Cow::Borrowed(html),
    }
}

fn minify_html_inner(html: &[u8]) -> Vec<u8> {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    // Module scripts are bundler output already
    cfg.minify_js = false;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;
    minify_html::minify(html, &cfg)
}
