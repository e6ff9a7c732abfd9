//! Binding phrase parser using chumsky over the logos token stream

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use super::lexer::{lex, Token};
use super::{BindingNameReference, BindingNode, BindingPhrase, BindingPrefixReference};

/// Parse one phrase of a binding
pub fn parse_phrase(input: &str) -> Result<BindingPhrase, String> {
    let len = input.len();
    let token_iter = lex(input).map(|(tok, span)| (tok, span.into()));
    let token_stream = Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    phrase_parser()
        .parse(token_stream)
        .into_result()
        .map(|nodes| BindingPhrase { nodes })
        .map_err(|errs| {
            errs.into_iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        })
}

fn phrase_parser<'a, I>() -> impl Parser<'a, I, Vec<BindingNode>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let prefix = select! {
        Token::Prefix(prefix) => BindingPrefixReference {
            prefix,
            assume_string_value: false,
            assume_dictionary_syntax: false,
        },
        Token::QuotedPrefix(prefix) => BindingPrefixReference {
            prefix,
            assume_string_value: true,
            assume_dictionary_syntax: false,
        },
    };

    // {{@prefix*}} selects dictionary initializer syntax
    let dictionary = prefix
        .clone()
        .delimited_by(just(Token::DictOpen), just(Token::DictClose))
        .map(|reference| {
            BindingNode::Prefix(BindingPrefixReference {
                assume_dictionary_syntax: true,
                ..reference
            })
        });

    let name = select! {
        Token::Name(name) => BindingNameReference { name, assume_string_value: false, optional: false },
        Token::OptionalName(name) => BindingNameReference { name, assume_string_value: false, optional: true },
        Token::QuotedName(name) => BindingNameReference { name, assume_string_value: true, optional: false },
        Token::QuotedOptionalName(name) => BindingNameReference { name, assume_string_value: true, optional: true },
    };

    let literal = any().map(|token: Token| BindingNode::Literal(token.literal()));

    choice((
        dictionary,
        prefix.map(BindingNode::Prefix),
        name.map(BindingNode::Name),
        just(Token::Child).to(BindingNode::Child),
        literal,
    ))
    .repeated()
    .collect::<Vec<_>>()
    .map(merge_literals)
}

/// Join adjacent literal nodes
fn merge_literals(nodes: Vec<BindingNode>) -> Vec<BindingNode> {
    let mut merged: Vec<BindingNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let BindingNode::Literal(text) = &node {
            if let Some(BindingNode::Literal(existing)) = merged.last_mut() {
                existing.push_str(text);
                continue;
            }
        }
        merged.push(node);
    }
    merged
}
