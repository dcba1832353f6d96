//! MiniJinja surface shared by page bodies and the global page template.
//!
//! | Name                   | Kind     | Result                                  |
//! |------------------------|----------|-----------------------------------------|
//! | `page`, `site`         | value    | current page summary, build mode        |
//! | `contents`             | value    | rendered page HTML (global template)    |
//! | `component(e, props)`  | function | island handle, see [`IslandRef`]        |
//! | `index()`              | function | pages listed in the page's directory    |
//! | `pages_with(key)`      | function | pages whose front matter has `key`      |
//! | `include(path)`        | function | raw file relative to the page           |
//! | `sort_by(pages, key)`  | both     | stable sort by a front matter key       |
//! | `order_by_date(pages)` | both     | oldest first, undated last              |

use super::page::{Page, SiteIndex, order_by_date, sort_by};
use crate::{
    build::BuildError,
    config::SiteConfig,
    data::Data,
    diagnostics::{SourceError, from_template_error},
    islands::{IslandRef, IslandRegistry, normalize_entry},
};
use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior, Value, context};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Name the embedded page template reports in errors.
pub const EMBEDDED_TEMPLATE: &str = "atoll:template.html";
const EMBEDDED_SOURCE: &str = include_str!("template.html");

pub struct Templates {
    env: Environment<'static>,
    layout: String,
    layout_file: PathBuf,
    embedded: bool,
}

impl Templates {
    /// Read and compile the global page template at `path`, falling back to
    /// the embedded one when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let (layout, embedded) = match fs::read_to_string(path) {
            Ok(source) => (source, false),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                (EMBEDDED_SOURCE.to_owned(), true)
            }
            Err(err) => return Err(BuildError::io(path, err)),
        };

        let templates = Self {
            env: environment(),
            layout,
            layout_file: if embedded {
                PathBuf::from(EMBEDDED_TEMPLATE)
            } else {
                path.to_path_buf()
            },
            embedded,
        };
        templates
            .env
            .template_from_named_str(templates.name(), &templates.layout)
            .map_err(|err| templates.layout_error(&err))?;
        Ok(templates)
    }

    fn name(&self) -> &str {
        self.layout_file.to_str().unwrap_or(EMBEDDED_TEMPLATE)
    }

    fn layout_error(&self, err: &Error) -> SourceError {
        let err = from_template_error(err, &self.layout_file, &self.layout, 0);
        if self.embedded { err.virtual_source() } else { err }
    }

    /// Evaluate the template in a page body. `page.contents` holds the body
    /// without front matter.
    pub fn render_body(&self, page: &Page, scope: &PageScope) -> Result<String, SourceError> {
        self.env
            .render_named_str(&page.path, &page.contents, scope.context(None))
            .map_err(|err| from_template_error(&err, &page.source, &page.contents, page.line_offset))
    }

    /// Wrap rendered page HTML in the global template.
    pub fn render_layout(&self, contents: &str, scope: &PageScope) -> Result<String, SourceError> {
        self.env
            .render_named_str(self.name(), &self.layout, scope.context(Some(contents)))
            .map_err(|err| self.layout_error(&err))
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    // Templates produce markup on purpose
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_undefined_behavior(UndefinedBehavior::Chainable);

    env.add_function("sort_by", |pages: Vec<Value>, key: String| sort_by(pages, &key));
    env.add_filter("sort_by", |pages: Vec<Value>, key: String| sort_by(pages, &key));
    env.add_function("order_by_date", order_by_date);
    env.add_filter("order_by_date", order_by_date);
    env
}

/// Values bound for one page: the page itself, the site index and the
/// island registry `component()` writes to.
pub struct PageScope {
    page: Value,
    site: Value,
    component: Value,
    include: Value,
    index: Value,
    pages_with: Value,
}

impl PageScope {
    pub fn new(
        page: &Page,
        config: &SiteConfig,
        index: &Arc<SiteIndex>,
        registry: &Arc<IslandRegistry>,
    ) -> Self {
        let page_dir = page.source_dir().to_path_buf();

        let component = {
            let registry = registry.clone();
            let page_dir = page_dir.clone();
            Value::from_function(move |entry: String, props: Option<Value>| {
                let props = props
                    .and_then(|props| serde_json::to_value(&props).ok())
                    .map(Data::from)
                    .unwrap_or_default();
                let index = registry.register(normalize_entry(&entry, &page_dir), props);
                Value::from_object(IslandRef::new(registry.clone(), index))
            })
        };

        let include = Value::from_function(move |path: String| -> Result<String, Error> {
            let file = page_dir.join(&path);
            fs::read_to_string(&file).map_err(|err| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("cannot include `{path}`: {err}"),
                )
            })
        });

        let index_fn = {
            let index = index.clone();
            let dir = page.dir.clone();
            Value::from_function(move || index.index(&dir))
        };

        let pages_with = {
            let index = index.clone();
            Value::from_function(move |key: String| index.pages_with(&key))
        };

        Self {
            page: Value::from_serialize(page.summary()),
            site: context! {
                mode => config.mode().name(),
                dev => config.is_dev(),
            },
            component,
            include,
            index: index_fn,
            pages_with,
        }
    }

    fn context(&self, contents: Option<&str>) -> Value {
        context! {
            page => self.page,
            site => self.site,
            contents => contents,
            component => self.component,
            include => self.include,
            index => self.index,
            pages_with => self.pages_with,
        }
    }
}
