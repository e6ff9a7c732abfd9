//! Markup grammar: raw template text to a flat list of nodes

use std::sync::Arc;

use chumsky::prelude::*;

use super::ast::*;
use super::combinators::{chars, code, code_until, located, name, until, whitespace, Extra};
use super::position::{Position, SourceContext};
use crate::error::GrammarError;

/// HTML5 elements that never have content and are always written self-closed
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Parse template text into nodes
pub fn parse(text: &str) -> Result<Vec<Node>, GrammarError> {
    parse_nodes(&SourceContext::new(text))
}

/// Parse the content of a [`SourceContext`] into nodes
///
/// Every element, end element and expression hole carries the [`Position`]
/// it was read from.
pub fn parse_nodes(source: &Arc<SourceContext>) -> Result<Vec<Node>, GrammarError> {
    let result = document_parser(source.clone())
        .parse(source.content())
        .into_result();
    match result {
        Ok(nodes) => Ok(nodes),
        Err(errors) => {
            let err = errors
                .into_iter()
                .min_by_key(|e| e.span().start)
                .map(|e| GrammarError::from_rich(e, source));
            Err(err.unwrap_or_else(|| GrammarError::Syntax {
                position: Position::start(source.clone()),
                message: "Unable to parse template".to_string(),
                expected: Vec::new(),
            }))
        }
    }
}

fn hole_start<'a>() -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    choice((just("$!{"), just("${"), just("!{"))).ignored()
}

fn hole<'a>(source: Arc<SourceContext>) -> impl Parser<'a, &'a str, Node, Extra<'a>> + Clone {
    // (raw, silent_nulls)
    let opener = choice((
        just("$!{").to((false, true)),
        just("${").to((false, false)),
        just("!{").to((true, false)),
    ));
    located(opener)
        .then(code())
        .then_ignore(just('}'))
        .map(move |(((raw, silent_nulls), offset), code)| {
            Node::Expression(ExpressionNode {
                code,
                position: Some(Position::new(source.clone(), offset)),
                raw,
                silent_nulls,
            })
        })
        .labelled("expression")
}

/// `<%= code %>`, an expression hole in the older syntax
fn code_hole<'a>(source: Arc<SourceContext>) -> impl Parser<'a, &'a str, Node, Extra<'a>> + Clone {
    located(just("<%="))
        .then(code_until("%>"))
        .then_ignore(just("%>"))
        .map(move |((_, offset), code)| {
            Node::Expression(ExpressionNode::new(code, Some(Position::new(source.clone(), offset))))
        })
        .labelled("expression")
}

/// A line break, indentation, then `#code` up to the end of the line. The
/// break after the statement is left for the following text.
fn line_statement<'a>(source: Arc<SourceContext>) -> impl Parser<'a, &'a str, Node, Extra<'a>> + Clone {
    just('\r')
        .or_not()
        .then(just('\n'))
        .then(one_of(" \t").repeated())
        .ignore_then(located(just('#')))
        .then(none_of("\r\n").repeated().collect::<String>())
        .then_ignore(one_of("\r\n").rewind())
        .map(move |((_, offset), code)| {
            Node::Statement(StatementNode {
                code,
                position: Some(Position::new(source.clone(), offset)),
            })
        })
        .labelled("statement")
}

/// `<% code %>`
fn block_statement<'a>(source: Arc<SourceContext>) -> impl Parser<'a, &'a str, Node, Extra<'a>> + Clone {
    located(just("<%").and_is(just("<%=").not()))
        .then(code_until("%>"))
        .then_ignore(just("%>"))
        .map(move |((_, offset), code)| {
            Node::Statement(StatementNode {
                code,
                position: Some(Position::new(source.clone(), offset)),
            })
        })
        .labelled("statement")
}

fn entity<'a>() -> impl Parser<'a, &'a str, Node, Extra<'a>> + Clone {
    let entity_name = choice((
        just('#')
            .then(chars(|c| c.is_ascii_alphanumeric()))
            .map(|(hash, digits)| format!("{hash}{digits}")),
        name(),
    ));
    let reference = just('&')
        .ignore_then(entity_name)
        .then_ignore(just(';'))
        .map(|name| Node::Entity(EntityNode { name }));
    // a lone ampersand is plain text
    reference.or(just('&').to(Node::Text(TextNode::new("&"))))
}

fn attribute_value<'a>(
    quote: char,
    source: Arc<SourceContext>,
) -> impl Parser<'a, &'a str, (char, Vec<Node>), Extra<'a>> + Clone {
    let text = none_of(['<', '&', quote])
        .and_is(hole_start().not())
        .repeated()
        .at_least(1)
        .collect::<String>()
        .map(|text| Node::Text(TextNode { text }));
    just(quote)
        .ignore_then(
            choice((hole(source), entity(), text))
                .repeated()
                .collect::<Vec<Node>>(),
        )
        .then_ignore(just(quote))
        .map(move |nodes| (quote, nodes))
}

fn attribute<'a>(
    source: Arc<SourceContext>,
) -> impl Parser<'a, &'a str, AttributeNode, Extra<'a>> + Clone {
    name()
        .then_ignore(whitespace().or_not())
        .then_ignore(just('='))
        .then_ignore(whitespace().or_not())
        .then(attribute_value('"', source.clone()).or(attribute_value('\'', source)))
        .map(|(name, (quote, nodes))| AttributeNode {
            name,
            namespace: None,
            quote,
            nodes,
        })
        .labelled("attribute")
}

fn doctype<'a>() -> impl Parser<'a, &'a str, Node, Extra<'a>> + Clone {
    let literal = choice((
        just('"')
            .ignore_then(none_of("\"").repeated().collect::<String>())
            .then_ignore(just('"')),
        just('\'')
            .ignore_then(none_of("'").repeated().collect::<String>())
            .then_ignore(just('\'')),
    ));
    let external_id = choice((
        just("SYSTEM")
            .ignore_then(whitespace())
            .ignore_then(literal.clone())
            .map(|system_id| ExternalId::System { system_id }),
        just("PUBLIC")
            .ignore_then(whitespace())
            .ignore_then(literal.clone())
            .then_ignore(whitespace())
            .then(literal)
            .map(|(public_id, system_id)| ExternalId::Public {
                public_id,
                system_id,
            }),
    ));
    choice((just("<!DOCTYPE"), just("<!doctype")))
        .ignore_then(whitespace())
        .ignore_then(name())
        .then(whitespace().ignore_then(external_id).or_not())
        .then_ignore(whitespace().or_not())
        .then_ignore(just('>'))
        .map(|(name, external_id)| Node::Doctype(DoctypeNode { name, external_id }))
}

fn document_parser<'a>(
    source: Arc<SourceContext>,
) -> impl Parser<'a, &'a str, Vec<Node>, Extra<'a>> + Clone {
    let text = none_of("&<")
        .and_is(hole_start().not())
        .and_is(line_statement(source.clone()).not())
        .repeated()
        .at_least(1)
        .collect::<String>()
        .map(|text| Node::Text(TextNode { text }));

    let comment = just("<!--")
        .ignore_then(until("-->"))
        .then_ignore(just("-->"))
        .map(|text| Node::Comment(CommentNode { text }));

    let element = {
        let source = source.clone();
        located(just('<').ignore_then(name()))
            .then(
                whitespace()
                    .ignore_then(attribute(source.clone()))
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .then_ignore(whitespace().or_not())
            .then(just('/').or_not())
            .then_ignore(just('>'))
            .map(move |(((name, offset), attributes), slash)| {
                let is_empty = slash.is_some() || is_void_element(&name);
                Node::Element(ElementNode {
                    name,
                    namespace: None,
                    attributes,
                    is_empty,
                    position: Some(Position::new(source.clone(), offset)),
                })
            })
            .labelled("element")
    };

    let end_element = {
        let source = source.clone();
        located(just("</").ignore_then(name()))
            .then_ignore(whitespace().or_not())
            .then_ignore(just('>'))
            .map(move |(name, offset)| {
                Node::EndElement(EndElementNode {
                    name,
                    namespace: None,
                    position: Some(Position::new(source.clone(), offset)),
                })
            })
            .labelled("end element")
    };

    choice((
        line_statement(source.clone()),
        text,
        entity(),
        hole(source.clone()),
        code_hole(source.clone()),
        block_statement(source),
        doctype(),
        comment,
        end_element,
        element,
    ))
    .repeated()
    .collect::<Vec<Node>>()
    .then_ignore(end())
}
