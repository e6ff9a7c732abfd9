//! Control attributes: `<p if="x">`, `<li each="x in xs">`, `<div cache="k">`
//! and `<script once="jquery">` wrap their element in a control node

use std::collections::VecDeque;

use super::special::special_name;
use super::{take_body, VisitorContext};
use crate::error::Error;
use crate::parser::{AttributeNode, ElementNode, Node, SpecialNode};

/// One attribute lowering: which control nodes own the attribute already and
/// how to split an element into a wrapper and what remains
struct Lowering {
    owners: &'static [&'static str],
    split: fn(&ElementNode, &VisitorContext) -> Option<(ElementNode, ElementNode)>,
}

fn renamed(attribute: &AttributeNode, name: &str) -> AttributeNode {
    AttributeNode {
        name: name.to_string(),
        namespace: None,
        ..attribute.clone()
    }
}

fn without(element: &ElementNode, taken: &[&AttributeNode]) -> ElementNode {
    ElementNode {
        attributes: element
            .attributes
            .iter()
            .filter(|a| !taken.iter().any(|t| std::ptr::eq(*t, *a)))
            .cloned()
            .collect(),
        ..element.clone()
    }
}

fn split_conditional(element: &ElementNode, context: &VisitorContext) -> Option<(ElementNode, ElementNode)> {
    let (tag, attribute) = element.attributes.iter().find_map(|a| {
        ["if", "elseif", "unless"]
            .into_iter()
            .find(|tag| context.attribute_is(tag, a))
            .map(|tag| (tag, a))
    })?;
    let wrapper = context.control_element(tag, vec![renamed(attribute, "condition")], element);
    Some((wrapper, without(element, &[attribute])))
}

fn split_cache(element: &ElementNode, context: &VisitorContext) -> Option<(ElementNode, ElementNode)> {
    let parts = [("cache", "key"), ("cache.key", "key"), ("cache.expires", "expires"), ("cache.signal", "signal")];
    let found: Vec<(&AttributeNode, &str)> = element
        .attributes
        .iter()
        .filter_map(|a| {
            parts
                .iter()
                .find(|(name, _)| context.attribute_is(name, a))
                .map(|(_, target)| (a, *target))
        })
        .collect();
    if found.is_empty() {
        return None;
    }
    let attributes = found.iter().map(|(a, target)| renamed(a, target)).collect();
    let taken: Vec<&AttributeNode> = found.iter().map(|(a, _)| *a).collect();
    let wrapper = context.control_element("cache", attributes, element);
    Some((wrapper, without(element, &taken)))
}

fn split_foreach(element: &ElementNode, context: &VisitorContext) -> Option<(ElementNode, ElementNode)> {
    let attribute = element.attributes.iter().find(|a| context.attribute_is("each", a))?;
    let wrapper = context.control_element("for", vec![renamed(attribute, "each")], element);
    Some((wrapper, without(element, &[attribute])))
}

fn split_once(element: &ElementNode, context: &VisitorContext) -> Option<(ElementNode, ElementNode)> {
    let attribute = element.attributes.iter().find(|a| context.attribute_is("once", a))?;
    let wrapper = context.control_element("test", vec![renamed(attribute, "once")], element);
    Some((wrapper, without(element, &[attribute])))
}

impl Lowering {
    fn run(&self, nodes: Vec<Node>, context: &VisitorContext) -> Vec<Node> {
        let mut queue: VecDeque<Node> = nodes.into();
        let mut output = Vec::with_capacity(queue.len());

        while let Some(node) = queue.pop_front() {
            match node {
                Node::Element(element) => match (self.split)(&element, context) {
                    Some((wrapper, stripped)) => {
                        let mut body = vec![Node::Element(stripped)];
                        if !element.is_empty {
                            let (inner, close) = take_body(&element, &mut queue);
                            body.extend(self.run(inner, context));
                            body.extend(close);
                        }
                        output.push(Node::Special(SpecialNode::new(wrapper, body)));
                    }
                    None => output.push(Node::Element(element)),
                },
                Node::Special(special) => {
                    let owned = self.owners.contains(&special_name(&special));
                    let body = self.run(special.body, context);
                    match (self.split)(&special.element, context).filter(|_| !owned) {
                        Some((wrapper, stripped)) => {
                            let inner = SpecialNode::new(stripped, body);
                            output.push(Node::Special(SpecialNode::new(wrapper, vec![Node::Special(inner)])));
                        }
                        None => output.push(Node::Special(SpecialNode::new(special.element, body))),
                    }
                }
                Node::Extension(mut extension) => {
                    extension.body = self.run(extension.body, context);
                    match (self.split)(&extension.element, context) {
                        Some((wrapper, stripped)) => {
                            extension.element = stripped;
                            output.push(Node::Special(SpecialNode::new(wrapper, vec![Node::Extension(extension)])));
                        }
                        None => output.push(Node::Extension(extension)),
                    }
                }
                other => output.push(other),
            }
        }
        output
    }
}

const CONDITIONAL: Lowering = Lowering {
    owners: &["if", "test", "else", "elseif", "unless"],
    split: split_conditional,
};

const CACHE: Lowering = Lowering {
    owners: &["cache"],
    split: split_cache,
};

const FOREACH: Lowering = Lowering {
    owners: &["for"],
    split: split_foreach,
};

const ONCE: Lowering = Lowering {
    owners: &["test", "if"],
    split: split_once,
};

/// `if`, `elseif` and `unless` attributes
pub fn lower_conditionals(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    Ok(CONDITIONAL.run(nodes, context))
}

/// `cache`, `cache.key`, `cache.expires` and `cache.signal` attributes
pub fn lower_cache(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    Ok(CACHE.run(nodes, context))
}

/// `each` attributes
pub fn lower_foreach(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    Ok(FOREACH.run(nodes, context))
}

/// `once` attributes
pub fn lower_once(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    Ok(ONCE.run(nodes, context))
}
