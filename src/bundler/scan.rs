//! ES module syntax extraction and rewriting.
//!
//! [`scan`] finds every import/export form on top of the token stream;
//! [`rewrite`] turns them into calls against the module registry emitted by
//! `bundler::emit`. Replacements never change the number of lines, so line
//! numbers in the output match the source.

use super::lexer::{LexError, Token, TokenKind, tokenize};
use std::ops::Range;

/// Binding that holds an anonymous default export.
pub const DEFAULT_BINDING: &str = "__dflt";

const STATEMENT_KEYWORDS: &[&str] = &[
    "export", "import", "const", "let", "var", "function", "class", "async", "if", "for", "while",
    "return", "throw", "try", "switch", "do",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportClause {
    pub default: Option<String>,
    pub namespace: Option<String>,
    /// (imported, local)
    pub named: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReExport {
    /// (imported, exported)
    Named(Vec<(String, String)>),
    Star,
    Namespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteKind {
    Import(ImportClause),
    ReExport(ReExport),
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSite {
    pub specifier: String,
    pub kind: SiteKind,
    /// Source range replaced by the rewrite.
    pub span: Range<usize>,
    /// Range of the specifier literal, for error locations.
    pub spec_span: Range<usize>,
}

impl ImportSite {
    pub fn is_dynamic(&self) -> bool {
        self.kind == SiteKind::Dynamic
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleSyntax {
    pub imports: Vec<ImportSite>,
    /// (exported, local binding)
    pub exports: Vec<(String, String)>,
    edits: Vec<(Range<usize>, Edit)>,
}

#[derive(Debug, Clone)]
enum Edit {
    Blank,
    Replace(&'static str),
}

impl ModuleSyntax {
    /// Syntax of a generated module exposing one default binding.
    pub fn default_only(binding: &str) -> Self {
        Self {
            exports: vec![("default".into(), binding.into())],
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

impl From<LexError> for SyntaxError {
    fn from(err: LexError) -> Self {
        Self {
            offset: err.offset,
            message: err.message.to_owned(),
        }
    }
}

pub fn scan(src: &str) -> Result<ModuleSyntax, SyntaxError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        src,
        tokens: &tokens,
        syntax: ModuleSyntax::default(),
    };
    parser.run()?;
    Ok(parser.syntax)
}

struct Parser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    syntax: ModuleSyntax,
}

impl<'a> Parser<'a> {
    fn text(&self, i: usize) -> &'a str {
        self.tokens
            .get(i)
            .map_or("", |t| &self.src[t.start..t.end])
    }

    fn is_word(&self, i: usize, word: &str) -> bool {
        self.tokens.get(i).is_some_and(|t| t.kind == TokenKind::Ident) && self.text(i) == word
    }

    fn is_punct(&self, i: usize, c: u8) -> bool {
        self.tokens.get(i).is_some_and(|t| t.is_punct(c))
    }

    fn kind(&self, i: usize) -> Option<TokenKind> {
        self.tokens.get(i).map(|t| t.kind)
    }

    fn unexpected(&self, i: usize, what: &str) -> SyntaxError {
        match self.tokens.get(i) {
            Some(t) => SyntaxError {
                offset: t.start,
                message: format!("Unexpected \"{}\" in {what}", self.text(i)),
            },
            None => SyntaxError {
                offset: self.src.len(),
                message: format!("Unexpected end of file in {what}"),
            },
        }
    }

    fn string_at(&self, i: usize, what: &str) -> Result<String, SyntaxError> {
        match self.kind(i) {
            Some(TokenKind::String) => Ok(unquote(self.text(i))),
            _ => Err(self.unexpected(i, what)),
        }
    }

    /// Identifier or string name in a specifier list.
    fn name_at(&self, i: usize, what: &str) -> Result<String, SyntaxError> {
        match self.kind(i) {
            Some(TokenKind::Ident) => Ok(self.text(i).to_owned()),
            Some(TokenKind::String) => Ok(unquote(self.text(i))),
            _ => Err(self.unexpected(i, what)),
        }
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        let mut depth = 0usize;
        let mut i = 0;
        while i < self.tokens.len() {
            let after_dot = i > 0 && self.is_punct(i - 1, b'.');
            match self.tokens[i].kind {
                TokenKind::Punct(b'{' | b'(' | b'[') => depth += 1,
                TokenKind::Punct(b'}' | b')' | b']') => depth = depth.saturating_sub(1),
                TokenKind::Ident if !after_dot && self.text(i) == "import" => {
                    if self.is_punct(i + 1, b'(') {
                        i = self.dynamic_import(i);
                        continue;
                    }
                    if depth == 0 && !self.is_punct(i + 1, b'.') {
                        i = self.import(i)?;
                        continue;
                    }
                }
                TokenKind::Ident if !after_dot && depth == 0 && self.text(i) == "export" => {
                    i = self.export(i)?;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }

    /// `import("x")`; non-literal arguments are left alone.
    fn dynamic_import(&mut self, i: usize) -> usize {
        if self.kind(i + 2) == Some(TokenKind::String) && self.is_punct(i + 3, b')') {
            let spec = &self.tokens[i + 2];
            self.syntax.imports.push(ImportSite {
                specifier: unquote(self.text(i + 2)),
                kind: SiteKind::Dynamic,
                span: self.tokens[i].start..self.tokens[i + 3].end,
                spec_span: spec.start..spec.end,
            });
            return i + 4;
        }
        i + 1
    }

    fn import(&mut self, i: usize) -> Result<usize, SyntaxError> {
        const WHAT: &str = "import statement";
        let mut clause = ImportClause::default();
        let mut j = i + 1;

        if self.kind(j) != Some(TokenKind::String) {
            if self.kind(j) == Some(TokenKind::Ident) && !self.is_word(j, "from") {
                clause.default = Some(self.text(j).to_owned());
                j += 1;
                if self.is_punct(j, b',') {
                    j += 1;
                }
            }
            if self.is_punct(j, b'*') {
                if !self.is_word(j + 1, "as") || self.kind(j + 2) != Some(TokenKind::Ident) {
                    return Err(self.unexpected(j + 1, WHAT));
                }
                clause.namespace = Some(self.text(j + 2).to_owned());
                j += 3;
            } else if self.is_punct(j, b'{') {
                let (named, next) = self.specifiers(j, WHAT)?;
                clause.named = named;
                j = next;
            }
            if !self.is_word(j, "from") {
                return Err(self.unexpected(j, WHAT));
            }
            j += 1;
        }

        let specifier = self.string_at(j, WHAT)?;
        let spec_span = self.tokens[j].start..self.tokens[j].end;
        let end = self.statement_end(j + 1);
        self.syntax.imports.push(ImportSite {
            specifier,
            kind: SiteKind::Import(clause),
            span: self.tokens[i].start..self.tokens[end - 1].end,
            spec_span,
        });
        Ok(end)
    }

    /// Parse `{ a, b as c }` starting at the `{`; returns pairs and the index
    /// after `}`.
    fn specifiers(
        &self,
        open: usize,
        what: &str,
    ) -> Result<(Vec<(String, String)>, usize), SyntaxError> {
        let mut pairs = Vec::new();
        let mut j = open + 1;
        loop {
            if self.is_punct(j, b'}') {
                return Ok((pairs, j + 1));
            }
            let name = self.name_at(j, what)?;
            j += 1;
            let alias = if self.is_word(j, "as") {
                let alias = self.name_at(j + 1, what)?;
                j += 2;
                alias
            } else {
                name.clone()
            };
            pairs.push((name, alias));
            if self.is_punct(j, b',') {
                j += 1;
            } else if !self.is_punct(j, b'}') {
                return Err(self.unexpected(j, what));
            }
        }
    }

    /// Skip import attributes and a trailing `;`, returning the first index
    /// past the statement.
    fn statement_end(&self, mut j: usize) -> usize {
        if (self.is_word(j, "with") || self.is_word(j, "assert")) && self.is_punct(j + 1, b'{') {
            j += 2;
            while j < self.tokens.len() && !self.is_punct(j, b'}') {
                j += 1;
            }
            j += 1;
        }
        if self.is_punct(j, b';') {
            j += 1;
        }
        j.min(self.tokens.len())
    }

    fn export(&mut self, i: usize) -> Result<usize, SyntaxError> {
        const WHAT: &str = "export statement";
        let export = self.tokens[i];
        let j = i + 1;

        match self.text(j) {
            "default" if self.kind(j) == Some(TokenKind::Ident) => {
                let span = export.start..self.tokens[j].end;
                match self.declaration_name(j + 1) {
                    Some(name) => {
                        self.syntax.edits.push((span, Edit::Blank));
                        self.syntax.exports.push(("default".into(), name));
                    }
                    None => {
                        self.syntax.edits.push((span, Edit::Replace("const __dflt =")));
                        self.syntax
                            .exports
                            .push(("default".into(), DEFAULT_BINDING.into()));
                    }
                }
                Ok(j + 1)
            }
            "function" | "class" | "async" => {
                let name = self
                    .declaration_name(j)
                    .ok_or_else(|| self.unexpected(j + 1, WHAT))?;
                self.syntax.edits.push((export.start..export.end, Edit::Blank));
                self.syntax.exports.push((name.clone(), name));
                Ok(j)
            }
            "const" | "let" | "var" => {
                for name in self.declared_names(j + 1) {
                    self.syntax.exports.push((name.clone(), name));
                }
                self.syntax.edits.push((export.start..export.end, Edit::Blank));
                Ok(j)
            }
            "{" => {
                let (pairs, next) = self.specifiers(j, WHAT)?;
                if self.is_word(next, "from") {
                    let specifier = self.string_at(next + 1, WHAT)?;
                    let end = self.statement_end(next + 2);
                    self.push_reexport(i, next + 1, end, specifier, ReExport::Named(pairs));
                    return Ok(end);
                }
                let end = self.statement_end(next);
                for (local, exported) in pairs {
                    self.syntax.exports.push((exported, local));
                }
                self.syntax
                    .edits
                    .push((export.start..self.tokens[end - 1].end, Edit::Blank));
                Ok(end)
            }
            "*" => {
                let (kind, from) = if self.is_word(j + 1, "as") {
                    let name = self.name_at(j + 2, WHAT)?;
                    (ReExport::Namespace(name), j + 3)
                } else {
                    (ReExport::Star, j + 1)
                };
                if !self.is_word(from, "from") {
                    return Err(self.unexpected(from, WHAT));
                }
                let specifier = self.string_at(from + 1, WHAT)?;
                let end = self.statement_end(from + 2);
                self.push_reexport(i, from + 1, end, specifier, kind);
                Ok(end)
            }
            _ => Err(self.unexpected(j, WHAT)),
        }
    }

    fn push_reexport(&mut self, start: usize, spec: usize, end: usize, specifier: String, kind: ReExport) {
        self.syntax.imports.push(ImportSite {
            specifier,
            kind: SiteKind::ReExport(kind),
            span: self.tokens[start].start..self.tokens[end - 1].end,
            spec_span: self.tokens[spec].start..self.tokens[spec].end,
        });
    }

    /// Name of a `function`, `async function`, `function*` or `class`
    /// declaration starting at `j`; `None` when anonymous or not a
    /// declaration.
    fn declaration_name(&self, mut j: usize) -> Option<String> {
        if self.is_word(j, "async") && self.is_word(j + 1, "function") {
            j += 1;
        }
        if self.is_word(j, "function") {
            j += 1;
            if self.is_punct(j, b'*') {
                j += 1;
            }
        } else if self.is_word(j, "class") {
            j += 1;
            if self.is_word(j, "extends") {
                return None;
            }
        } else {
            return None;
        }
        (self.kind(j) == Some(TokenKind::Ident)).then(|| self.text(j).to_owned())
    }

    /// Binding names of a `const`/`let`/`var` declaration list.
    fn declared_names(&self, mut j: usize) -> Vec<String> {
        let mut names = Vec::new();
        loop {
            match self.kind(j) {
                Some(TokenKind::Ident) => {
                    names.push(self.text(j).to_owned());
                    j += 1;
                }
                Some(TokenKind::Punct(b'{' | b'[')) => j = self.pattern_names(j, &mut names),
                _ => return names,
            }
            if self.is_punct(j, b'=') {
                j = self.skip_initializer(j + 1);
            }
            if self.is_punct(j, b',') {
                j += 1;
            } else {
                return names;
            }
        }
    }

    /// Collect bindings of a destructuring pattern opened at `open`.
    fn pattern_names(&self, open: usize, names: &mut Vec<String>) -> usize {
        let mut depth = 0usize;
        let mut j = open;
        while j < self.tokens.len() {
            match self.tokens[j].kind {
                TokenKind::Punct(b'{' | b'[') => depth += 1,
                TokenKind::Punct(b'}' | b']') => {
                    depth -= 1;
                    if depth == 0 {
                        return j + 1;
                    }
                }
                TokenKind::Punct(b'=') => {
                    j = self.skip_initializer(j + 1);
                    continue;
                }
                TokenKind::Ident if !self.is_punct(j + 1, b':') => {
                    names.push(self.text(j).to_owned());
                }
                _ => {}
            }
            j += 1;
        }
        j
    }

    /// Skip an expression up to the `,` or `;` ending it at the same nesting
    /// level, or to a line break followed by a new statement.
    fn skip_initializer(&self, mut j: usize) -> usize {
        let mut depth = 0usize;
        while let Some(token) = self.tokens.get(j) {
            match token.kind {
                TokenKind::Punct(b'{' | b'(' | b'[') => depth += 1,
                TokenKind::Punct(b'}' | b')' | b']') => {
                    if depth == 0 {
                        return j;
                    }
                    depth -= 1;
                }
                TokenKind::Punct(b',' | b';') if depth == 0 => return j,
                TokenKind::Ident
                    if depth == 0
                        && token.newline_before
                        && STATEMENT_KEYWORDS.contains(&self.text(j)) =>
                {
                    return j;
                }
                _ => {}
            }
            j += 1;
        }
        j
    }
}

/// Value of a quoted string literal with simple escapes resolved.
fn unquote(literal: &str) -> String {
    let inner = &literal[1..literal.len().saturating_sub(1).max(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\n') | None => {}
            Some(other) => out.push(other),
        }
    }
    out
}

/// JavaScript string literal for `s`.
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

fn property_key(name: &str) -> String {
    let plain = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if plain { name.to_owned() } else { js_string(name) }
}

/// Rewritten module body plus the export registration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub header: String,
    pub body: String,
}

/// Apply `syntax` to `src`. `ids[i]` is the registry id of the module that
/// `syntax.imports[i]` resolved to.
///
/// Imports run where they stand and are not hoisted. Default and named
/// imports are copied out of the exports object when the import runs, so
/// they do not follow later reassignment in the exporting module and a
/// circular import may see a binding that is not initialized yet. Namespace
/// imports read through the export getters and stay live.
pub fn rewrite(src: &str, syntax: &ModuleSyntax, ids: &[String]) -> Rewritten {
    let mut getters: Vec<String> = syntax
        .exports
        .iter()
        .map(|(exported, local)| format!("{}: () => {local}", property_key(exported)))
        .collect();

    let mut replacements: Vec<(Range<usize>, String)> = syntax
        .edits
        .iter()
        .map(|(span, edit)| {
            let text = match edit {
                Edit::Blank => blank(&src[span.clone()]),
                Edit::Replace(text) => (*text).to_owned(),
            };
            (span.clone(), text)
        })
        .collect();

    for (n, (site, id)) in syntax.imports.iter().zip(ids).enumerate() {
        let id = js_string(id);
        let text = match &site.kind {
            SiteKind::Dynamic => format!("__import({id})"),
            SiteKind::Import(clause) if *clause == ImportClause::default() => {
                format!("__require({id});")
            }
            SiteKind::Import(clause) => {
                let var = format!("__i{n}");
                let mut text = format!("const {var} = __require({id});");
                if let Some(default) = &clause.default {
                    text.push_str(&format!(" const {default} = {var}.default;"));
                }
                if let Some(ns) = &clause.namespace {
                    text.push_str(&format!(" const {ns} = {var};"));
                }
                if !clause.named.is_empty() {
                    let fields: Vec<String> = clause
                        .named
                        .iter()
                        .map(|(imported, local)| {
                            if imported == local {
                                local.clone()
                            } else {
                                format!("{}: {local}", property_key(imported))
                            }
                        })
                        .collect();
                    text.push_str(&format!(" const {{ {} }} = {var};", fields.join(", ")));
                }
                text
            }
            SiteKind::ReExport(ReExport::Star) => {
                format!("__reexport(__exports, __require({id}));")
            }
            SiteKind::ReExport(ReExport::Named(pairs)) => {
                for (imported, exported) in pairs {
                    getters.push(format!(
                        "{}: () => __require({id})[{}]",
                        property_key(exported),
                        js_string(imported)
                    ));
                }
                format!("__require({id});")
            }
            SiteKind::ReExport(ReExport::Namespace(name)) => {
                getters.push(format!("{}: () => __require({id})", property_key(name)));
                format!("__require({id});")
            }
        };
        replacements.push((site.span.clone(), text));
    }

    replacements.sort_by_key(|(span, _)| span.start);
    let mut body = String::with_capacity(src.len());
    let mut cursor = 0;
    for (span, text) in replacements {
        if span.start < cursor {
            continue;
        }
        body.push_str(&src[cursor..span.start]);
        splice(&mut body, &src[span.clone()], &text);
        cursor = span.end;
    }
    body.push_str(&src[cursor..]);

    let header = if getters.is_empty() {
        String::new()
    } else {
        format!("__export(__exports, {{ {} }});", getters.join(", "))
    };
    Rewritten { header, body }
}

/// Spaces in place of every character, line breaks kept.
fn blank(original: &str) -> String {
    original
        .chars()
        .map(|c| if c == '\n' { '\n' } else { ' ' })
        .collect()
}

/// Write `text` in place of `original`, keeping the line count and, on a
/// single line, the width.
fn splice(out: &mut String, original: &str, text: &str) {
    out.push_str(text);
    let lines = original.matches('\n').count();
    if lines == 0 {
        let width = original.chars().count();
        let used = text.chars().count();
        out.extend(std::iter::repeat_n(' ', width.saturating_sub(used)));
    } else {
        out.extend(std::iter::repeat_n('\n', lines.saturating_sub(text.matches('\n').count())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(syntax: &ModuleSyntax) -> Vec<String> {
        syntax.imports.iter().map(|s| format!("m:{}", s.specifier)).collect()
    }

    fn run(src: &str) -> (ModuleSyntax, Rewritten) {
        let syntax = scan(src).unwrap();
        let out = rewrite(src, &syntax, &ids(&syntax));
        (syntax, out)
    }

    #[test]
    fn test_import_forms() {
        let src = "import a from \"./a.js\";\nimport * as ns from './ns.js'\nimport b, { c, d as e } from \"./b.js\";\nimport './side.css';";
        let (syntax, _) = run(src);

        let kinds: Vec<_> = syntax.imports.iter().map(|s| &s.kind).collect();
        assert_eq!(syntax.imports.len(), 4);
        assert_eq!(
            kinds[0],
            &SiteKind::Import(ImportClause { default: Some("a".into()), ..Default::default() })
        );
        assert_eq!(
            kinds[1],
            &SiteKind::Import(ImportClause { namespace: Some("ns".into()), ..Default::default() })
        );
        assert_eq!(
            kinds[2],
            &SiteKind::Import(ImportClause {
                default: Some("b".into()),
                namespace: None,
                named: vec![("c".into(), "c".into()), ("d".into(), "e".into())],
            })
        );
        assert_eq!(syntax.imports[3].specifier, "./side.css");
        assert_eq!(&src[syntax.imports[0].spec_span.clone()], "\"./a.js\"");
    }

    #[test]
    fn test_minified_syntax() {
        let src = r#"import{h as t}from"/v1/preact.mjs";export{t as h};export*from"/v1/hooks.mjs";"#;
        let (syntax, out) = run(src);

        assert_eq!(syntax.imports.len(), 2);
        assert_eq!(syntax.exports, [("h".to_string(), "t".to_string())]);
        assert!(out.body.contains(r#"const { h: t } = __i0;"#));
        assert!(out.body.contains(r#"__reexport(__exports, __require("m:/v1/hooks.mjs"));"#));
    }

    #[test]
    fn test_export_declarations() {
        let src = "export function render(p) {}\nexport async function load() {}\nexport class A {}\nexport const x = 1, { y, z: w } = obj, [q = f(1, 2)] = arr;\nexport let n\nexport var v = 2;";
        let (syntax, out) = run(src);
        let exported: Vec<&str> = syntax.exports.iter().map(|(e, _)| e.as_str()).collect();

        assert_eq!(exported, ["render", "load", "A", "x", "y", "w", "q", "n", "v"]);
        assert!(out.body.starts_with("       function render(p) {}"));
        assert!(out.header.contains("render: () => render"));
    }

    #[test]
    fn test_export_default_forms() {
        let (syntax, out) = run("export default function Counter() {}");
        assert_eq!(syntax.exports, [("default".to_string(), "Counter".to_string())]);
        assert_eq!(out.body, "               function Counter() {}");

        let (syntax, out) = run("export default { a: 1 };");
        assert_eq!(syntax.exports[0].1, DEFAULT_BINDING);
        assert_eq!(out.body, "const __dflt = { a: 1 };");

        let (_, out) = run("export default class extends Base {}");
        assert!(out.body.starts_with("const __dflt = class extends Base"));
    }

    #[test]
    fn test_export_lists_and_reexports() {
        let src = "const a = 1;\nexport { a, a as b, a as default };\nexport { x as y } from './x.js';\nexport * as ns from './ns.js';";
        let (syntax, out) = run(src);

        assert_eq!(
            syntax.exports,
            [
                ("a".to_string(), "a".to_string()),
                ("b".to_string(), "a".to_string()),
                ("default".to_string(), "a".to_string())
            ]
        );
        assert!(out.header.contains(r#"y: () => __require("m:./x.js")["x"]"#));
        assert!(out.header.contains(r#"ns: () => __require("m:./ns.js")"#));
    }

    #[test]
    fn test_dynamic_import() {
        let src = "const load = () => import('./lazy.js');\nimport(name);\nobj.import('x');";
        let (syntax, out) = run(src);

        assert_eq!(syntax.imports.len(), 1);
        assert!(syntax.imports[0].is_dynamic());
        assert!(out.body.starts_with(r#"const load = () => __import("m:./lazy.js");"#));
    }

    #[test]
    fn test_nested_keywords_are_not_statements() {
        let src = "function f() { const o = { export: 1 }; return `import x from 'y'`; }\n// import z from 'z'";
        let (syntax, _) = run(src);

        assert!(syntax.imports.is_empty());
        assert!(syntax.exports.is_empty());
    }

    #[test]
    fn test_rewrite_preserves_lines() {
        let src = "import {\n  a,\n  b\n} from './ab.js';\nexport {\n  a\n};\nthrow new Error(a + b);\n";
        let (_, out) = run(src);

        assert_eq!(out.body.lines().count(), src.lines().count());
        assert_eq!(out.body.lines().nth(7), Some("throw new Error(a + b);"));
    }

    #[test]
    fn test_import_binding_forms() {
        let src = "setup();\nimport * as ns from './a.js';\nimport { b as c } from './a.js';\n";
        let (_, out) = run(src);
        let lines: Vec<&str> = out.body.lines().collect();

        assert_eq!(lines[0], "setup();");
        assert!(lines[1].starts_with(r#"const __i0 = __require("m:./a.js"); const ns = __i0;"#));
        assert!(lines[2].starts_with(r#"const __i1 = __require("m:./a.js"); const { b: c } = __i1;"#));
    }

    #[test]
    fn test_import_attributes() {
        let (syntax, out) = run("import data from './d.json' with { type: 'json' };\nx();");
        assert_eq!(syntax.imports[0].specifier, "./d.json");
        assert!(out.body.ends_with("\nx();"));
    }

    #[test]
    fn test_syntax_errors() {
        let err = scan("import { a from './a.js';").unwrap_err();
        assert_eq!(err.message, "Unexpected \"from\" in import statement");
        assert_eq!(err.offset, 11);

        let err = scan("const s = 'oops;\n").unwrap_err();
        assert_eq!(err.message, "Unterminated string literal");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r#""./a.js""#), "./a.js");
        assert_eq!(unquote(r"'it\'s'"), "it's");
    }
}
