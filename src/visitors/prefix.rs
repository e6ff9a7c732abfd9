//! Prefixed control tags: `<content:x>` is `<content name="x">`

use super::{local_name, ns, prefix, VisitorContext};
use crate::config::NamespacesType;
use crate::error::Error;
use crate::parser::{AttributeNode, ElementNode, EndElementNode, Node};

/// (prefix, namespace, control tag, attribute receiving the local name)
const EXPANSIONS: &[(&str, &str, &str, &str)] = &[
    ("content", ns::CONTENT, "content", "name"),
    ("use", ns::USE, "use", "content"),
    ("macro", ns::MACRO, "macro", "name"),
    ("render", ns::RENDER, "render", "segment"),
    ("segment", ns::SEGMENT, "segment", "name"),
    ("section", ns::SECTION, "segment", "name"),
];

fn expansion_for(
    context: &VisitorContext,
    name: &str,
    namespace: Option<&str>,
) -> Option<(&'static str, &'static str)> {
    EXPANSIONS
        .iter()
        .find(|(p, uri, _, _)| match context.namespaces {
            NamespacesType::Unqualified => prefix(name) == Some(*p),
            NamespacesType::Qualified => namespace == Some(*uri),
        })
        .map(|(_, _, tag, attribute)| (*tag, *attribute))
}

/// Expand prefixed control tags and their end tags
pub fn expand_prefixes(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    let expanded = nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(element) => {
                match expansion_for(context, &element.name, element.namespace.as_deref()) {
                    Some((tag, attribute)) => {
                        let mut attributes =
                            vec![AttributeNode::new(attribute, local_name(&element.name))];
                        attributes.extend(element.attributes);
                        Node::Element(ElementNode {
                            name: tag.to_string(),
                            namespace: context.control_namespace(),
                            attributes,
                            ..element
                        })
                    }
                    None => Node::Element(element),
                }
            }
            Node::EndElement(end) => {
                match expansion_for(context, &end.name, end.namespace.as_deref()) {
                    Some((tag, _)) => Node::EndElement(EndElementNode {
                        name: tag.to_string(),
                        namespace: context.control_namespace(),
                        position: end.position,
                    }),
                    None => Node::EndElement(end),
                }
            }
            other => other,
        })
        .collect();
    Ok(expanded)
}
