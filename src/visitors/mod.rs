//! Node pipeline: ordered rewrites from parsed markup to lowered nodes
//!
//! Every stage is a plain function from one node list to the next, so stages
//! can be run and tested on their own.

mod attributes;
mod binding;
mod include;
mod namespace;
mod prefix;
mod special;
mod whitespace;

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::bindings::BindingTable;
use crate::config::{NamespacesType, Settings};
use crate::error::{CompilerError, Error};
use crate::folder::ViewFolder;
use crate::parser::{AttributeNode, ElementNode, ExtensionFactory, Node};

pub use attributes::{lower_cache, lower_conditionals, lower_foreach, lower_once};
pub use binding::expand_bindings;
pub use include::expand_includes;
pub use namespace::resolve_namespaces;
pub use prefix::expand_prefixes;
pub use special::pair_special_nodes;
pub use whitespace::omit_blank_lines;

/// Namespace URIs understood by the pipeline
pub mod ns {
    pub const SPARK: &str = "http://sparkviewengine.com/";
    pub const CONTENT: &str = "http://sparkviewengine.com/content";
    pub const USE: &str = "http://sparkviewengine.com/use";
    pub const MACRO: &str = "http://sparkviewengine.com/macro";
    pub const SECTION: &str = "http://sparkviewengine.com/section";
    pub const SEGMENT: &str = "http://sparkviewengine.com/segment";
    pub const RENDER: &str = "http://sparkviewengine.com/render";
    pub const XINCLUDE: &str = "http://www.w3.org/2001/XInclude";
}

/// The part of a qualified name before the colon
pub fn prefix(name: &str) -> Option<&str> {
    name.split_once(':').map(|(prefix, _)| prefix)
}

/// The part of a qualified name after the colon
pub fn local_name(name: &str) -> &str {
    match name.split_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

/// Everything the stages need besides the nodes themselves
#[derive(Clone)]
pub struct VisitorContext {
    pub settings: Arc<Settings>,
    pub namespaces: NamespacesType,
    /// Path of the view being compiled, relative to the view folder
    pub view_path: String,
    pub view_folder: Option<Arc<dyn ViewFolder>>,
    /// Partial names without the leading underscore
    pub partial_file_names: Vec<String>,
    pub bindings: Arc<BindingTable>,
    pub extensions: Vec<Arc<dyn ExtensionFactory>>,
}

impl Default for VisitorContext {
    fn default() -> Self {
        Self::new(Arc::new(Settings::default()))
    }
}

impl VisitorContext {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            namespaces: settings.namespaces_type(),
            settings,
            view_path: String::new(),
            view_folder: None,
            partial_file_names: Vec::new(),
            bindings: BindingTable::empty(),
            extensions: Vec::new(),
        }
    }

    pub fn with_view_path(mut self, path: impl Into<String>) -> Self {
        self.view_path = path.into();
        self
    }

    pub fn with_view_folder(mut self, folder: Arc<dyn ViewFolder>) -> Self {
        self.view_folder = Some(folder);
        self
    }

    pub fn with_partial_file_names(mut self, names: Vec<String>) -> Self {
        self.partial_file_names = names;
        self
    }

    pub fn with_bindings(mut self, bindings: Arc<BindingTable>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_extension(mut self, factory: Arc<dyn ExtensionFactory>) -> Self {
        self.extensions.push(factory);
        self
    }

    /// Whether a node name refers to the control name `name`
    ///
    /// Unqualified views compare names directly. Qualified views need the
    /// node to live in the engine namespace.
    pub fn is_match(&self, name: &str, node_name: &str, node_namespace: Option<&str>) -> bool {
        match self.namespaces {
            NamespacesType::Unqualified => node_name == name,
            NamespacesType::Qualified => {
                node_namespace == Some(ns::SPARK) && local_name(node_name) == name
            }
        }
    }

    pub fn element_is(&self, name: &str, element: &ElementNode) -> bool {
        self.is_match(name, &element.name, element.namespace.as_deref())
    }

    pub fn attribute_is(&self, name: &str, attribute: &AttributeNode) -> bool {
        self.is_match(name, &attribute.name, attribute.namespace.as_deref())
    }

    /// Namespace to put on elements the pipeline synthesises
    pub fn control_namespace(&self) -> Option<String> {
        match self.namespaces {
            NamespacesType::Unqualified => None,
            NamespacesType::Qualified => Some(ns::SPARK.to_string()),
        }
    }

    /// A control element created by the pipeline
    pub fn control_element(
        &self,
        name: &str,
        attributes: Vec<AttributeNode>,
        template: &ElementNode,
    ) -> ElementNode {
        ElementNode {
            name: name.to_string(),
            namespace: self.control_namespace(),
            attributes,
            is_empty: false,
            position: template.position.clone(),
        }
    }

    /// The namespace mode implied by the settings and any `xmlns` declaration
    /// of the engine namespace in `nodes`
    fn detect_namespaces(&self, nodes: &[Node]) -> NamespacesType {
        let declared = nodes.iter().any(|node| match node {
            Node::Element(element) => element
                .attributes
                .iter()
                .any(|a| a.name.starts_with("xmlns:") && a.value() == ns::SPARK),
            _ => false,
        });
        if declared {
            NamespacesType::Qualified
        } else {
            self.namespaces
        }
    }
}

/// Signature shared by every pipeline stage
pub type Stage = fn(Vec<Node>, &VisitorContext) -> Result<Vec<Node>, Error>;

/// The stages in the order they run
pub const STAGES: &[(&str, Stage)] = &[
    ("namespaces", resolve_namespaces),
    ("includes", expand_includes),
    ("prefixes", expand_prefixes),
    ("special nodes", pair_special_nodes),
    ("bindings", expand_bindings),
    ("cache attributes", lower_cache),
    ("foreach attributes", lower_foreach),
    ("conditional attributes", lower_conditionals),
    ("once attributes", lower_once),
    ("blank lines", omit_blank_lines),
];

/// Run every stage over freshly parsed nodes
pub fn run_pipeline(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    let mut context = context.clone();
    context.namespaces = context.detect_namespaces(&nodes);

    let mut nodes = nodes;
    for (name, stage) in STAGES {
        nodes = stage(nodes, &context)?;
        trace!(stage = name, view = %context.view_path, count = nodes.len(), "ran pipeline stage");
    }
    Ok(nodes)
}

/// Take the nodes up to the end element closing `element`, counting nested
/// elements of the same name
///
/// Returns the body and the closing node, or `None` for the closing node when
/// the input ran out first.
pub(crate) fn take_body(
    element: &ElementNode,
    queue: &mut VecDeque<Node>,
) -> (Vec<Node>, Option<Node>) {
    let mut body = Vec::new();
    let mut depth = 0usize;
    while let Some(node) = queue.pop_front() {
        match &node {
            Node::Element(e) if e.name == element.name && !e.is_empty => depth += 1,
            Node::EndElement(e) if e.name == element.name => {
                if depth == 0 {
                    return (body, Some(node));
                }
                depth -= 1;
            }
            _ => {}
        }
        body.push(node);
    }
    (body, None)
}

/// Like [`take_body`], but an unterminated element is an error
pub(crate) fn take_closed_body(
    element: &ElementNode,
    queue: &mut VecDeque<Node>,
) -> Result<Vec<Node>, CompilerError> {
    match take_body(element, queue) {
        (body, Some(_)) => Ok(body),
        (_, None) => Err(CompilerError::UnclosedElement {
            name: element.name.clone(),
            position: element.position.clone(),
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{nodes, show};
    use super::*;

    #[test]
    fn test_unqualified_match() {
        let context = VisitorContext::default();
        assert!(context.is_match("if", "if", None));
        assert!(!context.is_match("if", "s:if", None));
    }

    #[test]
    fn test_qualified_match_needs_namespace() {
        let context = VisitorContext::new(Arc::new(Settings::default().with_prefix("s")));
        assert!(context.is_match("if", "s:if", Some(ns::SPARK)));
        assert!(!context.is_match("if", "if", None));
    }

    #[test]
    fn test_xmlns_declaration_selects_qualified_mode() {
        let context = VisitorContext::default();
        let parsed = nodes("<html xmlns:s='http://sparkviewengine.com/'><s:if condition='x'>a</s:if><if>b</if></html>");
        assert_eq!(context.detect_namespaces(&parsed), NamespacesType::Qualified);
        let result = run_pipeline(parsed, &context).expect("pipeline");
        assert_eq!(
            show(&result),
            "<html xmlns:s=http://sparkviewengine.com/>[s:if condition=x]a[/s:if]<if>b</if></html>"
        );
    }

    #[test]
    fn test_full_pipeline() {
        let context = VisitorContext::default();
        let result = run_pipeline(
            nodes("<ul>\n  <li each='var x in xs' if='x.Ok'>${x}</li>\n</ul>"),
            &context,
        )
        .expect("pipeline");
        assert_eq!(
            show(&result),
            "<ul>\n  [for each=var x in xs][if condition=x.Ok]<li>${x}</li>[/if][/for]\n</ul>"
        );
    }

    #[test]
    fn test_take_body_counts_nesting() {
        let mut queue: VecDeque<Node> = nodes("<p>a<p>b</p></p>tail").into();
        let Some(Node::Element(open)) = queue.pop_front() else {
            panic!("expected element");
        };
        let (body, close) = take_body(&open, &mut queue);
        assert_eq!(show(&body), "a<p>b</p>");
        assert!(close.is_some());
        assert_eq!(show(&Vec::from(queue)), "tail");
    }
}
