//! Bindings: custom element names that expand to code expressions
//!
//! A binding table is an XML file in the root of a view folder:
//!
//! ```xml
//! <bindings>
//!   <element name="hello">"world"</element>
//!   <element name="link">Html.ActionLink("@text", @action)</element>
//!   <element name="form">
//!     <start>Html.BeginForm(@action)</start>
//!     <end>Html.EndForm()</end>
//!   </element>
//! </bindings>
//! ```

mod grammar;
pub mod lexer;

use std::sync::Arc;

use tracing::debug;

use crate::error::{CompilerError, Error};
use crate::folder::ViewFolder;
use crate::parser::{parse_nodes, AttributeNode, ElementNode, Node, SourceContext};

pub use grammar::parse_phrase;

#[derive(Debug, Clone, PartialEq)]
pub enum BindingNode {
    Literal(String),
    Name(BindingNameReference),
    Prefix(BindingPrefixReference),
    /// `child::*`: the element's body
    Child,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindingNameReference {
    pub name: String,
    pub assume_string_value: bool,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindingPrefixReference {
    /// Attribute name prefix; empty matches every attribute
    pub prefix: String,
    pub assume_string_value: bool,
    pub assume_dictionary_syntax: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingPhrase {
    pub nodes: Vec<BindingNode>,
}

impl BindingPhrase {
    pub fn has_child_reference(&self) -> bool {
        self.nodes.iter().any(|n| matches!(n, BindingNode::Child))
    }
}

/// One `<element>` entry of a binding table
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub element_name: String,
    /// A single phrase, or a start and an end phrase wrapping the body
    pub phrases: Vec<BindingPhrase>,
}

impl Binding {
    pub fn nodes(&self) -> impl Iterator<Item = &BindingNode> {
        self.phrases.iter().flat_map(|p| p.nodes.iter())
    }

    pub fn has_child_reference(&self) -> bool {
        self.phrases.iter().any(BindingPhrase::has_child_reference)
    }

    pub fn is_start_end(&self) -> bool {
        self.phrases.len() == 2
    }

    /// Whether `element` provides everything this binding needs
    pub fn matches(&self, element: &ElementNode) -> bool {
        if self.has_child_reference() && element.is_empty {
            return false;
        }
        self.nodes().all(|node| match node {
            BindingNode::Name(reference) if !reference.optional => {
                element.attributes.iter().any(|a| a.name == reference.name)
            }
            _ => true,
        })
    }
}

/// Bindings of one view folder, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingTable {
    bindings: Vec<Binding>,
}

impl BindingTable {
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self { bindings }
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// The first binding for the element's name that the element satisfies
    pub fn find_match(&self, element: &ElementNode) -> Option<&Binding> {
        self.bindings
            .iter()
            .filter(|b| b.element_name == element.name)
            .find(|b| b.matches(element))
    }

    /// Load the table from `path` in the folder; a missing file is an empty
    /// table
    pub fn load(folder: &dyn ViewFolder, path: &str) -> Result<Self, Error> {
        if !folder.has_view(path) {
            debug!(path, "no binding table");
            return Ok(Self::default());
        }
        let source = folder.open_view(path)?;
        let last_modified = source.last_modified;
        let text = source.read_to_string(path)?;
        let table = Self::parse_with_name(&text, path, last_modified)?;
        debug!(path, count = table.bindings.len(), "loaded binding table");
        Ok(table)
    }

    /// Parse the XML text of a binding table
    pub fn parse(text: &str) -> Result<Self, Error> {
        Self::parse_with_name(text, "bindings.xml", 0)
    }

    fn parse_with_name(text: &str, name: &str, last_modified: u64) -> Result<Self, Error> {
        let source = SourceContext::with_file(text, name, last_modified);
        let nodes = parse_nodes(&source)?;
        let mut bindings = Vec::new();
        for (element, body) in child_elements(&nodes, "element") {
            bindings.push(parse_binding(element, body)?);
        }
        Ok(Self { bindings })
    }
}

fn parse_binding(element: &ElementNode, body: &[Node]) -> Result<Binding, CompilerError> {
    let element_name = element
        .attribute_value("name")
        .ok_or_else(|| CompilerError::InvalidBinding {
            element: "element".to_string(),
            message: "missing name attribute".to_string(),
        })?;
    let invalid = |message: String| CompilerError::InvalidBinding {
        element: element_name.clone(),
        message,
    };

    let start = child_elements(body, "start").into_iter().next();
    let end = child_elements(body, "end").into_iter().next();
    let phrases = match (start, end) {
        (Some((_, start)), Some((_, end))) => vec![
            parse_phrase(&inner_text(start)).map_err(invalid)?,
            parse_phrase(&inner_text(end)).map_err(invalid)?,
        ],
        _ => vec![parse_phrase(&inner_text(body)).map_err(invalid)?],
    };

    let binding = Binding {
        element_name: element_name.clone(),
        phrases,
    };
    if binding.is_start_end() && binding.has_child_reference() {
        return Err(invalid(
            "child::* can not be used in start or end phrases".to_string(),
        ));
    }
    Ok(binding)
}

/// Outermost elements named `name` in `nodes`, paired with their bodies
fn child_elements<'n>(nodes: &'n [Node], name: &str) -> Vec<(&'n ElementNode, &'n [Node])> {
    let mut found = Vec::new();
    let mut index = 0;
    while index < nodes.len() {
        if let Node::Element(element) = &nodes[index] {
            if element.name == name {
                let close = if element.is_empty {
                    None
                } else {
                    matching_end(nodes, index)
                };
                match close {
                    Some(end) => {
                        found.push((element, &nodes[index + 1..end]));
                        index = end + 1;
                    }
                    None => {
                        found.push((element, &nodes[index + 1..index + 1]));
                        index += 1;
                    }
                }
                continue;
            }
        }
        index += 1;
    }
    found
}

/// Index of the end element closing the element at `start`
fn matching_end(nodes: &[Node], start: usize) -> Option<usize> {
    let Node::Element(open) = &nodes[start] else {
        return None;
    };
    let mut depth = 0usize;
    for (index, node) in nodes.iter().enumerate().skip(start + 1) {
        match node {
            Node::Element(e) if e.name == open.name && !e.is_empty => depth += 1,
            Node::EndElement(e) if e.name == open.name => {
                if depth == 0 {
                    return Some(index);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Text content of nodes with entities decoded, trimmed
fn inner_text(nodes: &[Node]) -> String {
    let mut text = String::new();
    for node in nodes {
        match node {
            Node::Text(t) => text.push_str(&t.text),
            Node::Entity(e) => text.push_str(&e.decoded()),
            Node::Expression(e) => {
                text.push_str(if e.raw { "!{" } else { "${" });
                text.push_str(&e.code);
                text.push('}');
            }
            _ => {}
        }
    }
    text.trim().to_string()
}

/// Builds a string-valued expression out of literal text and code
///
/// A lone literal becomes a quoted string, a lone expression stays as is and
/// mixed content is joined with `+`.
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    parts: Vec<String>,
    literal: Option<String>,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_literal(&mut self, text: &str) {
        self.literal
            .get_or_insert_with(String::new)
            .push_str(&escape_string_contents(text));
    }

    pub fn append_expression(&mut self, code: &str) {
        self.flush();
        self.parts.push(code.to_string());
    }

    pub fn to_code(mut self) -> String {
        self.flush();
        match self.parts.len() {
            0 => "\"\"".to_string(),
            1 => self.parts.remove(0),
            _ => self
                .parts
                .iter()
                .map(|part| {
                    if part.starts_with('"') {
                        part.clone()
                    } else {
                        format!("({})", part)
                    }
                })
                .collect::<Vec<_>>()
                .join(" + "),
        }
    }

    fn flush(&mut self) {
        if let Some(literal) = self.literal.take() {
            self.parts.push(format!("\"{}\"", literal));
        }
    }
}

/// The attribute as a string expression: text is quoted and holes are
/// concatenated as code
pub fn string_code(attribute: &AttributeNode) -> String {
    let mut builder = ExpressionBuilder::new();
    for node in &attribute.nodes {
        match node {
            Node::Text(text) => builder.append_literal(&text.text),
            Node::Entity(entity) => builder.append_literal(&format!("&{};", entity.name)),
            Node::Expression(expression) => builder.append_expression(&expression.code),
            _ => {}
        }
    }
    builder.to_code()
}

fn escape_string_contents(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}
