//! Markup node types produced by the grammar and rewritten by the pipeline

use std::fmt;
use std::sync::Arc;

use super::position::Position;

/// A parsed markup node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    Entity(EntityNode),
    Doctype(DoctypeNode),
    Comment(CommentNode),
    Expression(ExpressionNode),
    Statement(StatementNode),
    Element(ElementNode),
    EndElement(EndElementNode),
    Special(SpecialNode),
    Extension(ExtensionNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub text: String,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// `&name;` or `&#123;`
#[derive(Debug, Clone, PartialEq)]
pub struct EntityNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalId {
    System { system_id: String },
    Public { public_id: String, system_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoctypeNode {
    pub name: String,
    pub external_id: Option<ExternalId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub text: String,
}

/// An expression hole: `${code}`, `$!{code}` or `!{code}`
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionNode {
    pub code: String,
    pub position: Option<Position>,
    /// `!{}` holes are never encoded
    pub raw: bool,
    pub silent_nulls: bool,
}

impl ExpressionNode {
    pub fn new(code: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            code: code.into(),
            position,
            raw: false,
            silent_nulls: false,
        }
    }

    pub fn raw(code: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            raw: true,
            ..Self::new(code, position)
        }
    }
}

/// A code statement: `#code` alone on a line, or `<% code %>`
#[derive(Debug, Clone, PartialEq)]
pub struct StatementNode {
    pub code: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNode {
    pub name: String,
    pub namespace: Option<String>,
    pub quote: char,
    pub nodes: Vec<Node>,
}

impl AttributeNode {
    /// An attribute holding a single literal value
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            namespace: None,
            quote: if value.contains('"') { '\'' } else { '"' },
            nodes: vec![Node::Text(TextNode::new(value))],
        }
    }

    /// The attribute value as code: text is taken verbatim and holes
    /// contribute their code
    pub fn value(&self) -> String {
        let mut value = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => value.push_str(&text.text),
                Node::Entity(entity) => value.push_str(&entity.decoded()),
                Node::Expression(expr) => value.push_str(&expr.code),
                _ => {}
            }
        }
        value
    }

    pub fn has_expressions(&self) -> bool {
        self.nodes.iter().any(|n| matches!(n, Node::Expression(_)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<AttributeNode>,
    pub is_empty: bool,
    pub position: Option<Position>,
}

impl ElementNode {
    pub fn new(name: impl Into<String>, attributes: Vec<AttributeNode>, is_empty: bool) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            attributes,
            is_empty,
            position: None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeNode> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_value(&self, name: &str) -> Option<String> {
        self.attribute(name).map(AttributeNode::value)
    }

    /// A copy of this element without the named attribute
    pub fn without_attribute(&self, name: &str) -> ElementNode {
        ElementNode {
            attributes: self
                .attributes
                .iter()
                .filter(|a| a.name != name)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndElementNode {
    pub name: String,
    pub namespace: Option<String>,
    pub position: Option<Position>,
}

impl EndElementNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            position: None,
        }
    }
}

/// A control tag paired with its body
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialNode {
    pub element: ElementNode,
    pub body: Vec<Node>,
}

impl SpecialNode {
    pub fn new(element: ElementNode, body: Vec<Node>) -> Self {
        Self { element, body }
    }
}

/// Lowering hook for elements claimed by an [`ExtensionFactory`]
pub trait Extension: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
}

/// Recognises elements that should be handed to an [`Extension`]
pub trait ExtensionFactory: Send + Sync {
    fn create(&self, element: &ElementNode) -> Option<Arc<dyn Extension>>;
}

#[derive(Debug, Clone)]
pub struct ExtensionNode {
    pub element: ElementNode,
    pub extension: Arc<dyn Extension>,
    pub body: Vec<Node>,
}

impl PartialEq for ExtensionNode {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
            && Arc::ptr_eq(&self.extension, &other.extension)
            && self.body == other.body
    }
}

impl EntityNode {
    /// The character this entity stands for, or the entity text itself when
    /// unknown
    pub fn decoded(&self) -> String {
        let known = match self.name.as_str() {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => None,
        };
        if let Some(c) = known {
            return c.to_string();
        }
        let numeric = if let Some(hex) = self
            .name
            .strip_prefix("#x")
            .or_else(|| self.name.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok()
        } else if let Some(dec) = self.name.strip_prefix('#') {
            dec.parse::<u32>().ok()
        } else {
            None
        };
        match numeric.and_then(char::from_u32) {
            Some(c) => c.to_string(),
            None => format!("&{};", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_decoding() {
        let decode = |name: &str| EntityNode { name: name.into() }.decoded();
        assert_eq!(decode("lt"), "<");
        assert_eq!(decode("#65"), "A");
        assert_eq!(decode("#x42"), "B");
        assert_eq!(decode("bogus"), "&bogus;");
    }

    #[test]
    fn test_attribute_value_concatenates_holes() {
        let attr = AttributeNode {
            name: "href".into(),
            namespace: None,
            quote: '"',
            nodes: vec![
                Node::Text(TextNode::new("/users/")),
                Node::Expression(ExpressionNode::new("user.Id", None)),
            ],
        };
        assert_eq!(attr.value(), "/users/user.Id");
        assert!(attr.has_expressions());
    }

    #[test]
    fn test_without_attribute() {
        let element = ElementNode::new(
            "li",
            vec![AttributeNode::new("each", "var x in xs"), AttributeNode::new("class", "a")],
            false,
        );
        let stripped = element.without_attribute("each");
        assert_eq!(stripped.attributes.len(), 1);
        assert_eq!(stripped.attributes[0].name, "class");
    }
}
