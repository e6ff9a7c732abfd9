//! Replace bound elements with the expressions their binding produces

use std::collections::VecDeque;

use super::{take_closed_body, VisitorContext};
use crate::bindings::{string_code, Binding, BindingNode, BindingPhrase, BindingPrefixReference};
use crate::error::Error;
use crate::parser::{AttributeNode, ElementNode, ExpressionNode, Node, SpecialNode};

struct Expander<'c> {
    context: &'c VisitorContext,
    children: usize,
}

impl Expander<'_> {
    fn expand(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, Error> {
        let mut queue: VecDeque<Node> = nodes.into();
        let mut output = Vec::with_capacity(queue.len());

        while let Some(node) = queue.pop_front() {
            match node {
                Node::Element(element) => {
                    let Some(binding) = self.context.bindings.find_match(&element).cloned() else {
                        output.push(Node::Element(element));
                        continue;
                    };
                    let body = if element.is_empty {
                        Vec::new()
                    } else {
                        take_closed_body(&element, &mut queue)?
                    };
                    let body = self.expand(body)?;
                    output.extend(self.apply(&binding, &element, body));
                }
                Node::Special(mut special) => {
                    special.body = self.expand(special.body)?;
                    output.push(Node::Special(special));
                }
                Node::Extension(mut extension) => {
                    extension.body = self.expand(extension.body)?;
                    output.push(Node::Extension(extension));
                }
                other => output.push(other),
            }
        }
        Ok(output)
    }

    fn apply(&mut self, binding: &Binding, element: &ElementNode, body: Vec<Node>) -> Vec<Node> {
        let expression = |code: String| {
            Node::Expression(ExpressionNode::raw(code, element.position.clone()))
        };

        if binding.is_start_end() {
            let start = phrase_code(binding, &binding.phrases[0], element, None);
            let end = phrase_code(binding, &binding.phrases[1], element, None);
            let mut nodes = vec![expression(start)];
            nodes.extend(body);
            nodes.push(expression(end));
            return nodes;
        }

        let Some(phrase) = binding.phrases.first() else {
            return body;
        };
        if !phrase.has_child_reference() {
            let mut nodes = vec![expression(phrase_code(binding, phrase, element, None))];
            nodes.extend(body);
            return nodes;
        }

        // spool the body into a local and hand the local to the phrase
        self.children += 1;
        let variable = format!("__child{}", self.children);
        let capture = SpecialNode::new(
            self.context.control_element(
                "content",
                vec![AttributeNode::new("var", variable.clone())],
                element,
            ),
            body,
        );
        let code = phrase_code(binding, phrase, element, Some(&variable));
        let declare = self.context.control_element(
            "var",
            vec![AttributeNode::new(variable, "\"\"")],
            element,
        );
        vec![Node::Special(SpecialNode::new(
            declare,
            vec![Node::Special(capture), expression(code)],
        ))]
    }
}

fn phrase_code(
    binding: &Binding,
    phrase: &BindingPhrase,
    element: &ElementNode,
    child: Option<&str>,
) -> String {
    let mut code = String::new();
    for node in &phrase.nodes {
        match node {
            BindingNode::Literal(text) => code.push_str(text),
            BindingNode::Name(reference) => {
                for attribute in element.attributes.iter().filter(|a| a.name == reference.name) {
                    if reference.assume_string_value {
                        code.push_str(&string_code(attribute));
                    } else {
                        code.push_str(&attribute.value());
                    }
                }
            }
            BindingNode::Prefix(reference) => {
                code.push_str(&prefix_code(binding, reference, element));
            }
            BindingNode::Child => code.push_str(child.unwrap_or("\"\"")),
        }
    }
    code
}

/// Whether a name reference or a longer prefix elsewhere in the binding
/// claims `attribute` before `prefix` may
fn claimed_elsewhere(binding: &Binding, prefix: &str, attribute: &str) -> bool {
    binding.nodes().any(|node| match node {
        BindingNode::Name(reference) => reference.name == attribute,
        BindingNode::Prefix(other) => {
            other.prefix.len() > prefix.len() && attribute.starts_with(other.prefix.as_str())
        }
        _ => false,
    })
}

fn prefix_code(binding: &Binding, reference: &BindingPrefixReference, element: &ElementNode) -> String {
    element
        .attributes
        .iter()
        .filter(|a| a.name.starts_with(reference.prefix.as_str()))
        .filter(|a| !claimed_elsewhere(binding, &reference.prefix, &a.name))
        .map(|attribute| {
            let property = &attribute.name[reference.prefix.len()..];
            let value = if reference.assume_string_value {
                string_code(attribute)
            } else {
                attribute.value()
            };
            if reference.assume_dictionary_syntax {
                format!("{{\"{}\",{}}}", property, value)
            } else {
                format!("{}={}", property, value)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Expand every element that matches a binding
pub fn expand_bindings(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    if context.bindings.is_empty() {
        return Ok(nodes);
    }
    Expander {
        context,
        children: 0,
    }
    .expand(nodes)
}
