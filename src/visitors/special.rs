//! Pair control tags with their end tags into special nodes

use std::collections::VecDeque;
use std::sync::Arc;

use super::{local_name, take_closed_body, VisitorContext};
use crate::error::{CompilerError, Error};
use crate::parser::{AttributeNode, ElementNode, EndElementNode, Extension, ExtensionNode, Node, SpecialNode};

/// Control tags that wrap a body
const CONTAINING: &[&str] = &[
    "var", "default", "for", "use", "content", "test", "if", "else", "elseif", "unless", "macro",
    "render", "segment", "cache",
];

/// Control tags that never have a body; their end tags are ignored
const NON_CONTAINING: &[&str] = &["global", "set", "viewdata"];

enum Kind {
    Containing,
    NonContaining,
    /// `<menu>` for a `_menu` partial
    Partial(String),
    Extension(Arc<dyn Extension>),
}

struct Pairing<'c> {
    context: &'c VisitorContext,
}

impl Pairing<'_> {
    fn is_containing(&self, name: &str, namespace: Option<&str>) -> bool {
        CONTAINING.iter().any(|tag| self.context.is_match(tag, name, namespace))
            || (self.context.settings.parse_section_tag_as_segment
                && self.context.is_match("section", name, namespace))
    }

    fn is_non_containing(&self, name: &str, namespace: Option<&str>) -> bool {
        NON_CONTAINING
            .iter()
            .any(|tag| self.context.is_match(tag, name, namespace))
    }

    fn is_partial(&self, name: &str) -> bool {
        self.context.partial_file_names.iter().any(|p| p == name)
    }

    fn classify(&self, element: &ElementNode) -> Option<Kind> {
        let namespace = element.namespace.as_deref();
        if self.is_containing(&element.name, namespace) {
            return Some(Kind::Containing);
        }
        if self.is_non_containing(&element.name, namespace) {
            return Some(Kind::NonContaining);
        }
        if self.is_partial(&element.name) {
            return Some(Kind::Partial(format!("_{}", element.name)));
        }
        self.context
            .extensions
            .iter()
            .find_map(|factory| factory.create(element))
            .map(Kind::Extension)
    }

    fn is_control_end(&self, end: &EndElementNode) -> bool {
        self.is_containing(&end.name, end.namespace.as_deref()) || self.is_partial(&end.name)
    }

    fn pair(&self, nodes: Vec<Node>) -> Result<Vec<Node>, Error> {
        let mut queue: VecDeque<Node> = nodes.into();
        let mut output = Vec::with_capacity(queue.len());

        while let Some(node) = queue.pop_front() {
            match node {
                Node::Element(element) => match self.classify(&element) {
                    None => output.push(Node::Element(element)),
                    Some(kind) => {
                        let body = match kind {
                            Kind::NonContaining => Vec::new(),
                            _ if element.is_empty => Vec::new(),
                            _ => self.pair(take_closed_body(&element, &mut queue)?)?,
                        };
                        output.extend(self.build(kind, element, body));
                    }
                },
                Node::EndElement(end) if self.is_non_containing(&end.name, end.namespace.as_deref()) => {}
                Node::EndElement(end) if self.is_control_end(&end) => {
                    return Err(CompilerError::UnexpectedEndElement {
                        name: end.name,
                        position: end.position,
                    }
                    .into());
                }
                other => output.push(other),
            }
        }
        Ok(output)
    }

    fn build(&self, kind: Kind, element: ElementNode, body: Vec<Node>) -> Vec<Node> {
        match kind {
            Kind::Extension(extension) => vec![Node::Extension(ExtensionNode {
                element,
                extension,
                body,
            })],
            Kind::Partial(file) => {
                let mut attributes = vec![AttributeNode::new("file", file)];
                attributes.extend(element.attributes);
                let use_file = ElementNode {
                    name: "use".to_string(),
                    namespace: self.context.control_namespace(),
                    attributes,
                    is_empty: element.is_empty,
                    position: element.position,
                };
                vec![Node::Special(SpecialNode::new(use_file, body))]
            }
            Kind::NonContaining => vec![Node::Special(SpecialNode::new(
                ElementNode {
                    is_empty: true,
                    ..element
                },
                body,
            ))],
            Kind::Containing => {
                if self.context.element_is("if", &element) || self.context.element_is("test", &element) {
                    self.split_else(element, body)
                } else {
                    vec![Node::Special(SpecialNode::new(element, body))]
                }
            }
        }
    }

    /// `<if c>a<else/>b</if>` becomes an `if` followed by an `else`
    fn split_else(&self, element: ElementNode, body: Vec<Node>) -> Vec<Node> {
        let mut specials = vec![SpecialNode::new(element, Vec::new())];
        for node in body {
            match node {
                Node::Special(special)
                    if special.element.is_empty
                        && special.body.is_empty()
                        && self.context.element_is("else", &special.element) =>
                {
                    let else_element = ElementNode {
                        is_empty: false,
                        ..special.element
                    };
                    specials.push(SpecialNode::new(else_element, Vec::new()));
                }
                other => {
                    if let Some(current) = specials.last_mut() {
                        current.body.push(other);
                    }
                }
            }
        }
        specials.into_iter().map(Node::Special).collect()
    }
}

/// Turn control tags and their bodies into [`SpecialNode`]s
///
/// Partial names become `<use file="_name">` and extension factories may
/// claim elements.
pub fn pair_special_nodes(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    Pairing { context }.pair(nodes)
}

/// The control tag name of a special node, without any prefix
pub(crate) fn special_name(special: &SpecialNode) -> &str {
    local_name(&special.element.name)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{nodes, show};
    use super::*;
    use crate::config::Settings;

    fn pair(text: &str) -> Result<Vec<Node>, Error> {
        pair_special_nodes(nodes(text), &VisitorContext::default())
    }

    #[test]
    fn test_nested_specials() {
        let result = pair("<for each='x in xs'><if condition='x'><p>${x}</p></if></for>").expect("pair");
        assert_eq!(
            show(&result),
            "[for each=x in xs][if condition=x]<p>${x}</p>[/if][/for]"
        );
    }

    #[test]
    fn test_same_name_nesting() {
        let result = pair("<if condition='a'>1<if condition='b'>2</if>3</if>").expect("pair");
        assert_eq!(
            show(&result),
            "[if condition=a]1[if condition=b]2[/if]3[/if]"
        );
    }

    #[test]
    fn test_non_containing_end_tag_is_dropped() {
        let result = pair("<global x='1'></global><set y='2'/>").expect("pair");
        assert_eq!(show(&result), "[global x=1][/global][set y=2][/set]");
    }

    #[test]
    fn test_self_closing_control_tag() {
        let result = pair("<use content='head'/>").expect("pair");
        assert_eq!(show(&result), "[use content=head][/use]");
    }

    #[test]
    fn test_unmatched_end_tag_fails() {
        assert!(matches!(
            pair("a</if>"),
            Err(Error::Compiler(CompilerError::UnexpectedEndElement { .. }))
        ));
    }

    #[test]
    fn test_unclosed_tag_fails() {
        assert!(matches!(
            pair("<for each='x in xs'>a"),
            Err(Error::Compiler(CompilerError::UnclosedElement { .. }))
        ));
        assert!(matches!(
            pair("<if condition='a'><for each='x in y'></if></for>"),
            Err(Error::Compiler(CompilerError::UnclosedElement { .. }))
        ));
    }

    #[test]
    fn test_else_splits_if_body() {
        let result = pair("<if condition='a'>1<else if='b'/>2<else/>3</if>").expect("pair");
        assert_eq!(
            show(&result),
            "[if condition=a]1[/if][else if=b]2[/else][else]3[/else]"
        );
    }

    #[test]
    fn test_partial_names_become_use_file() {
        let context = VisitorContext::default().with_partial_file_names(vec!["menu".into()]);
        let result = pair_special_nodes(nodes("<menu active='home'>x</menu>"), &context).expect("pair");
        assert_eq!(show(&result), "[use file=_menu active=home]x[/use]");
    }

    #[test]
    fn test_section_only_when_configured() {
        let result = pair("<section>a</section>").expect("pair");
        assert_eq!(show(&result), "<section>a</section>");

        let settings = Settings::default().with_section_as_segment(true);
        let context = VisitorContext::new(Arc::new(settings));
        let result = pair_special_nodes(nodes("<section name='a'>b</section>"), &context).expect("pair");
        assert_eq!(show(&result), "[section name=a]b[/section]");
    }

    #[derive(Debug)]
    struct Shout;

    impl Extension for Shout {
        fn name(&self) -> &str {
            "shout"
        }
    }

    struct ShoutFactory;

    impl crate::parser::ExtensionFactory for ShoutFactory {
        fn create(&self, element: &ElementNode) -> Option<Arc<dyn Extension>> {
            (element.name == "shout").then(|| Arc::new(Shout) as Arc<dyn Extension>)
        }
    }

    #[test]
    fn test_extension_claims_element() {
        let context = VisitorContext::default().with_extension(Arc::new(ShoutFactory));
        let result = pair_special_nodes(nodes("<shout><if condition='x'>a</if></shout>"), &context)
            .expect("pair");
        assert_eq!(show(&result), "[ext shout][if condition=x]a[/if][/ext]");
    }
}
