//! Framework adapters.
//!
//! An adapter turns a component file into two entry modules with one shape:
//!
//! ```text
//! ?static   export function render(props) -> string
//! ?hydrate  export function hydrate(props, element)
//! ```
//!
//! Files are matched by suffix. Explicit markers (`counter.preact.js`) are
//! checked across every adapter before any implicit extension, so a marker
//! always beats another framework's catch-all.

use crate::bundler::js_string;

pub trait FrameworkAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Suffixes that name this framework outright.
    fn explicit(&self) -> &'static [&'static str];

    /// Suffixes claimed when no explicit marker matched.
    fn implicit(&self) -> &'static [&'static str] {
        &[]
    }

    fn detect(&self, path: &str) -> bool {
        let path = strip_query(path);
        self.explicit()
            .iter()
            .chain(self.implicit())
            .any(|suffix| path.ends_with(suffix))
    }

    /// Module exporting `render(props)` for the static renderer.
    fn static_entry(&self, path: &str) -> String;

    /// Module exporting `hydrate(props, element)` for the browser.
    fn client_entry(&self, path: &str) -> String;
}

/// Plain modules exporting `render` and `hydrate` themselves.
pub struct Vanilla;

impl FrameworkAdapter for Vanilla {
    fn name(&self) -> &'static str {
        "vanilla"
    }

    fn explicit(&self) -> &'static [&'static str] {
        &[".vanilla.js", ".vanilla.mjs"]
    }

    fn implicit(&self) -> &'static [&'static str] {
        &[".js", ".mjs"]
    }

    fn static_entry(&self, path: &str) -> String {
        format!(
            "import {{ render as renderComponent }} from {};\n\
             export function render(props) {{ return String(renderComponent(props)); }}\n",
            js_string(path)
        )
    }

    fn client_entry(&self, path: &str) -> String {
        format!(
            "import {{ hydrate as hydrateComponent }} from {};\n\
             export function hydrate(props, element) {{ return hydrateComponent(props, element); }}\n",
            js_string(path)
        )
    }
}

/// Preact function or class components as the default export.
pub struct Preact;

impl FrameworkAdapter for Preact {
    fn name(&self) -> &'static str {
        "preact"
    }

    fn explicit(&self) -> &'static [&'static str] {
        &[".preact.js", ".preact.mjs"]
    }

    fn static_entry(&self, path: &str) -> String {
        format!(
            "import {{ h }} from \"preact\";\n\
             import {{ renderToString }} from \"preact-render-to-string\";\n\
             import Component from {};\n\
             export function render(props) {{ return renderToString(h(Component, props)); }}\n",
            js_string(path)
        )
    }

    fn client_entry(&self, path: &str) -> String {
        format!(
            "import {{ h, hydrate as hydrateTree }} from \"preact\";\n\
             import Component from {};\n\
             export function hydrate(props, element) {{ hydrateTree(h(Component, props), element); }}\n",
            js_string(path)
        )
    }
}

/// Every registered adapter, in precedence order.
pub static ADAPTERS: &[&dyn FrameworkAdapter] = &[&Vanilla, &Preact];

/// Adapter for `path`: explicit markers first, then implicit extensions.
pub fn adapter_for(path: &str) -> Option<&'static dyn FrameworkAdapter> {
    let path = strip_query(path);
    let find = |suffixes: fn(&dyn FrameworkAdapter) -> &'static [&'static str]| {
        ADAPTERS
            .iter()
            .copied()
            .find(|adapter| suffixes(*adapter).iter().any(|s| path.ends_with(s)))
    };
    find(|a| a.explicit()).or_else(|| find(|a| a.implicit()))
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}
