//! Chunk intermediate representation
//!
//! Chunks are what a backend pattern-matches over to emit render logic. Every
//! chunk that comes from source text keeps the [`Position`] it was built from.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::parser::{Extension, Position};

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    SendLiteral(SendLiteralChunk),
    SendExpression(SendExpressionChunk),
    CodeStatement(CodeStatementChunk),
    LocalVariable(LocalVariableChunk),
    GlobalVariable(GlobalVariableChunk),
    DefaultVariable(DefaultVariableChunk),
    AssignVariable(AssignVariableChunk),
    ViewData(ViewDataChunk),
    ViewDataModel(ViewDataModelChunk),
    ForEach(ForEachChunk),
    Conditional(ConditionalChunk),
    Scope(ScopeChunk),
    Content(ContentChunk),
    UseContent(UseContentChunk),
    ContentSet(ContentSetChunk),
    RenderPartial(RenderPartialChunk),
    RenderSection(RenderSectionChunk),
    Cache(CacheChunk),
    Macro(MacroChunk),
    UseNamespace(UseNamespaceChunk),
    UseAssembly(UseAssemblyChunk),
    PageBaseType(PageBaseTypeChunk),
    Extension(ExtensionChunk),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SendLiteralChunk {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendExpressionChunk {
    pub code: String,
    pub position: Option<Position>,
    pub automatically_encode: bool,
    pub silent_nulls: bool,
}

/// Host code run for its effect, from `#code` lines and `<% %>` blocks
#[derive(Debug, Clone, PartialEq)]
pub struct CodeStatementChunk {
    pub code: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariableChunk {
    pub name: String,
    /// Declared type, `var` when omitted
    pub ty: String,
    pub value: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariableChunk {
    pub name: String,
    /// Declared type, `object` when omitted
    pub ty: String,
    pub value: String,
    pub position: Option<Position>,
}

/// Declares a local only when nothing visible already defines it
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultVariableChunk {
    pub name: String,
    pub ty: String,
    pub value: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignVariableChunk {
    pub name: String,
    pub value: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewDataChunk {
    pub name: String,
    pub ty: String,
    /// Key looked up in the view data, defaults to the name
    pub key: String,
    pub default: Option<String>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewDataModelChunk {
    pub model_type: String,
    pub alias: Option<String>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachChunk {
    /// `var item in items` style iteration code
    pub code: String,
    pub body: Vec<Chunk>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalType {
    If,
    ElseIf,
    Else,
    Once,
    Unless,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalChunk {
    pub kind: ConditionalType,
    /// Condition code, or the code of the once key for [`ConditionalType::Once`]
    pub condition: String,
    pub body: Vec<Chunk>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopeChunk {
    pub body: Vec<Chunk>,
    pub position: Option<Position>,
}

/// Capture output into a named content spool
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChunk {
    pub name: String,
    pub body: Vec<Chunk>,
    pub position: Option<Position>,
}

/// Replay a named content spool, or `default` when it was never written
#[derive(Debug, Clone, PartialEq)]
pub struct UseContentChunk {
    pub name: String,
    pub default: Vec<Chunk>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentAddType {
    Replace,
    InsertBefore,
    AppendAfter,
}

/// Capture output into a local string variable
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSetChunk {
    pub variable: String,
    pub add_type: ContentAddType,
    pub body: Vec<Chunk>,
    pub position: Option<Position>,
}

/// A compiled template file
#[derive(Debug, Clone, PartialEq)]
pub struct FileContext {
    pub view_path: String,
    pub last_modified: u64,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPartialChunk {
    /// Partial name as written, e.g. `_menu`
    pub name: String,
    /// Filled in by the view loader
    pub file_context: Option<Arc<FileContext>>,
    pub body: Vec<Chunk>,
    pub sections: IndexMap<String, Vec<Chunk>>,
    pub position: Option<Position>,
}

/// Callback point inside a partial: `<render/>` or `<render section="x"/>`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSectionChunk {
    /// `None` renders the caller's body
    pub name: Option<String>,
    pub default: Vec<Chunk>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheChunk {
    /// Stable per cache site within a compiled view
    pub site_id: String,
    /// Comma separated key expressions, possibly empty
    pub key: String,
    pub expires: String,
    pub signal: String,
    pub body: Vec<Chunk>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroParameter {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroChunk {
    pub name: String,
    pub parameters: Vec<MacroParameter>,
    pub body: Vec<Chunk>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseNamespaceChunk {
    pub namespace: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseAssemblyChunk {
    pub assembly: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageBaseTypeChunk {
    pub base_type: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct ExtensionChunk {
    pub extension: Arc<dyn Extension>,
    pub body: Vec<Chunk>,
    pub position: Option<Position>,
}

impl PartialEq for ExtensionChunk {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.extension, &other.extension)
            && self.body == other.body
            && self.position == other.position
    }
}

impl Chunk {
    pub fn literal(text: impl Into<String>) -> Self {
        Chunk::SendLiteral(SendLiteralChunk { text: text.into() })
    }

    pub fn position(&self) -> Option<&Position> {
        let position = match self {
            Chunk::SendLiteral(_) => return None,
            Chunk::SendExpression(c) => &c.position,
            Chunk::CodeStatement(c) => &c.position,
            Chunk::LocalVariable(c) => &c.position,
            Chunk::GlobalVariable(c) => &c.position,
            Chunk::DefaultVariable(c) => &c.position,
            Chunk::AssignVariable(c) => &c.position,
            Chunk::ViewData(c) => &c.position,
            Chunk::ViewDataModel(c) => &c.position,
            Chunk::ForEach(c) => &c.position,
            Chunk::Conditional(c) => &c.position,
            Chunk::Scope(c) => &c.position,
            Chunk::Content(c) => &c.position,
            Chunk::UseContent(c) => &c.position,
            Chunk::ContentSet(c) => &c.position,
            Chunk::RenderPartial(c) => &c.position,
            Chunk::RenderSection(c) => &c.position,
            Chunk::Cache(c) => &c.position,
            Chunk::Macro(c) => &c.position,
            Chunk::UseNamespace(c) => &c.position,
            Chunk::UseAssembly(c) => &c.position,
            Chunk::PageBaseType(c) => &c.position,
            Chunk::Extension(c) => &c.position,
        };
        position.as_ref()
    }

    /// Nested chunk lists, in source order
    pub fn children(&self) -> Vec<&[Chunk]> {
        match self {
            Chunk::ForEach(c) => vec![c.body.as_slice()],
            Chunk::Conditional(c) => vec![c.body.as_slice()],
            Chunk::Scope(c) => vec![c.body.as_slice()],
            Chunk::Content(c) => vec![c.body.as_slice()],
            Chunk::UseContent(c) => vec![c.default.as_slice()],
            Chunk::ContentSet(c) => vec![c.body.as_slice()],
            Chunk::RenderPartial(c) => {
                let mut lists: Vec<&[Chunk]> = vec![c.body.as_slice()];
                lists.extend(c.sections.values().map(Vec::as_slice));
                lists
            }
            Chunk::RenderSection(c) => vec![c.default.as_slice()],
            Chunk::Cache(c) => vec![c.body.as_slice()],
            Chunk::Macro(c) => vec![c.body.as_slice()],
            Chunk::Extension(c) => vec![c.body.as_slice()],
            _ => Vec::new(),
        }
    }

    /// Mutable access to every nested chunk list
    pub fn children_mut(&mut self) -> Vec<&mut Vec<Chunk>> {
        match self {
            Chunk::ForEach(c) => vec![&mut c.body],
            Chunk::Conditional(c) => vec![&mut c.body],
            Chunk::Scope(c) => vec![&mut c.body],
            Chunk::Content(c) => vec![&mut c.body],
            Chunk::UseContent(c) => vec![&mut c.default],
            Chunk::ContentSet(c) => vec![&mut c.body],
            Chunk::RenderPartial(c) => {
                let mut lists = vec![&mut c.body];
                lists.extend(c.sections.values_mut());
                lists
            }
            Chunk::RenderSection(c) => vec![&mut c.default],
            Chunk::Cache(c) => vec![&mut c.body],
            Chunk::Macro(c) => vec![&mut c.body],
            Chunk::Extension(c) => vec![&mut c.body],
            _ => Vec::new(),
        }
    }
}

/// Render a chunk tree as an indented outline, one chunk per line
pub fn dump_chunks(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    dump_into(&mut out, chunks, 0);
    out
}

fn dump_into(out: &mut String, chunks: &[Chunk], depth: usize) {
    for chunk in chunks {
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), ChunkLabel(chunk));
        match chunk {
            Chunk::RenderPartial(c) => {
                dump_into(out, &c.body, depth + 1);
                for (name, section) in &c.sections {
                    let _ = writeln!(out, "{}section {}", "  ".repeat(depth + 1), name);
                    dump_into(out, section, depth + 2);
                }
            }
            other => {
                for list in other.children() {
                    dump_into(out, list, depth + 1);
                }
            }
        }
    }
}

struct ChunkLabel<'a>(&'a Chunk);

impl fmt::Display for ChunkLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Chunk::SendLiteral(c) => write!(f, "literal {:?}", c.text),
            Chunk::SendExpression(c) => {
                let mode = if c.automatically_encode { "encoded" } else { "raw" };
                write!(f, "expression {} {:?}", mode, c.code)
            }
            Chunk::CodeStatement(c) => write!(f, "statement {:?}", c.code),
            Chunk::LocalVariable(c) => write!(f, "local {} {} = {}", c.ty, c.name, c.value),
            Chunk::GlobalVariable(c) => write!(f, "global {} {} = {}", c.ty, c.name, c.value),
            Chunk::DefaultVariable(c) => write!(f, "default {} {} = {}", c.ty, c.name, c.value),
            Chunk::AssignVariable(c) => write!(f, "assign {} = {}", c.name, c.value),
            Chunk::ViewData(c) => write!(f, "viewdata {} {} [{}]", c.ty, c.name, c.key),
            Chunk::ViewDataModel(c) => write!(f, "viewdata model {}", c.model_type),
            Chunk::ForEach(c) => write!(f, "foreach {}", c.code),
            Chunk::Conditional(c) if c.condition.is_empty() => write!(f, "{:?}", c.kind),
            Chunk::Conditional(c) => write!(f, "{:?} {}", c.kind, c.condition),
            Chunk::Scope(_) => write!(f, "scope"),
            Chunk::Content(c) => write!(f, "content {}", c.name),
            Chunk::UseContent(c) => write!(f, "use content {}", c.name),
            Chunk::ContentSet(c) => write!(f, "content set {} {:?}", c.variable, c.add_type),
            Chunk::RenderPartial(c) => write!(f, "render partial {}", c.name),
            Chunk::RenderSection(c) => match &c.name {
                Some(name) => write!(f, "render section {}", name),
                None => write!(f, "render body"),
            },
            Chunk::Cache(c) => write!(f, "cache [{}]", c.key),
            Chunk::Macro(c) => write!(f, "macro {}", c.name),
            Chunk::UseNamespace(c) => write!(f, "use namespace {}", c.namespace),
            Chunk::UseAssembly(c) => write!(f, "use assembly {}", c.assembly),
            Chunk::PageBaseType(c) => write!(f, "page base type {}", c.base_type),
            Chunk::Extension(c) => write!(f, "extension {}", c.extension.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_nested_chunks() {
        let chunks = vec![
            Chunk::literal("<ul>"),
            Chunk::ForEach(ForEachChunk {
                code: "var x in xs".into(),
                body: vec![Chunk::SendExpression(SendExpressionChunk {
                    code: "x".into(),
                    position: None,
                    automatically_encode: true,
                    silent_nulls: false,
                })],
                position: None,
            }),
        ];
        insta::assert_snapshot!(
            dump_chunks(&chunks).replace('\n', "|"),
            @r#"literal "<ul>"|foreach var x in xs|  expression encoded "x"|"#
        );
    }

    #[test]
    fn test_literal_has_no_position() {
        assert!(Chunk::literal("x").position().is_none());
        assert!(Chunk::literal("x").children().is_empty());
    }
}
