//! Character-level building blocks shared by the markup grammars

use chumsky::prelude::*;

/// Parser extra state used by every character grammar
pub type Extra<'a> = extra::Err<Rich<'a, char>>;

/// Helper to extract span range from chumsky's MapExtra
pub fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

pub fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

pub fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ':')
}

/// A single character accepted by `predicate`
pub fn ch<'a, F>(predicate: F) -> impl Parser<'a, &'a str, char, Extra<'a>> + Clone
where
    F: Fn(char) -> bool + Clone + 'a,
{
    any().filter(move |c: &char| predicate(*c))
}

/// One or more characters accepted by `predicate`
pub fn chars<'a, F>(predicate: F) -> impl Parser<'a, &'a str, String, Extra<'a>> + Clone
where
    F: Fn(char) -> bool + Clone + 'a,
{
    ch(predicate).repeated().at_least(1).collect::<String>()
}

/// Required whitespace
pub fn whitespace<'a>() -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    ch(char::is_whitespace).repeated().at_least(1).ignored()
}

/// An XML-style name: `(letter | _ | :) (letter | digit | . | - | _ | :)*`
pub fn name<'a>() -> impl Parser<'a, &'a str, String, Extra<'a>> + Clone {
    ch(is_name_start)
        .then(ch(is_name_char).repeated().collect::<String>())
        .map(|(first, rest)| {
            let mut name = String::with_capacity(rest.len() + 1);
            name.push(first);
            name.push_str(&rest);
            name
        })
        .labelled("name")
}

/// Everything up to, but not including, `terminator`
pub fn until<'a>(terminator: &'a str) -> impl Parser<'a, &'a str, String, Extra<'a>> + Clone {
    any()
        .and_is(just(terminator).not())
        .repeated()
        .collect::<String>()
}

/// A string literal in code, kept verbatim including its quotes
pub fn code_string<'a>(quote: char) -> impl Parser<'a, &'a str, String, Extra<'a>> + Clone {
    let escaped = just('\\')
        .then(any())
        .map(|(slash, c): (char, char)| format!("{slash}{c}"));
    let plain = ch(move |c| c != quote && c != '\\').map(String::from);
    just(quote)
        .ignore_then(escaped.or(plain).repeated().collect::<Vec<String>>())
        .then_ignore(just(quote))
        .map(move |parts| {
            let mut literal = String::new();
            literal.push(quote);
            literal.push_str(&parts.concat());
            literal.push(quote);
            literal
        })
}

/// Opaque code with balanced braces, stopping before an unmatched `}`
pub fn code<'a>() -> impl Parser<'a, &'a str, String, Extra<'a>> + Clone {
    recursive(|code| {
        let nested = just('{')
            .ignore_then(code)
            .then_ignore(just('}'))
            .map(|inner: String| format!("{{{inner}}}"));
        choice((
            code_string('"'),
            code_string('\''),
            nested,
            none_of("{}\"'").map(String::from),
        ))
        .repeated()
        .collect::<Vec<String>>()
        .map(|parts| parts.concat())
    })
}

/// Opaque code up to `terminator`, which may appear inside string literals
pub fn code_until<'a>(terminator: &'a str) -> impl Parser<'a, &'a str, String, Extra<'a>> + Clone {
    choice((
        code_string('"'),
        code_string('\''),
        any().and_is(just(terminator).not()).map(String::from),
    ))
    .repeated()
    .collect::<Vec<String>>()
    .map(|parts| parts.concat())
}

/// Wrap a parser so that it also yields the byte offset it started at
pub fn located<'a, O, P>(parser: P) -> impl Parser<'a, &'a str, (O, usize), Extra<'a>> + Clone
where
    P: Parser<'a, &'a str, O, Extra<'a>> + Clone,
{
    parser.map_with(|output, e| (output, span_range(&e.span()).start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<'a, O>(parser: impl Parser<'a, &'a str, O, Extra<'a>>, input: &'a str) -> Option<O> {
        parser.then_ignore(end()).parse(input).into_result().ok()
    }

    #[test]
    fn test_name() {
        assert_eq!(run(name(), "s:content"), Some("s:content".to_string()));
        assert_eq!(run(name(), "data-id.x"), Some("data-id.x".to_string()));
        assert_eq!(run(name(), "1abc"), None);
    }

    #[test]
    fn test_code_balances_braces() {
        assert_eq!(
            run(code(), "new { a = 1 }.a"),
            Some("new { a = 1 }.a".to_string())
        );
        assert_eq!(run(code(), "\"}\" + x"), Some("\"}\" + x".to_string()));
        assert_eq!(run(code(), "a }"), None);
    }

    #[test]
    fn test_code_until_skips_strings() {
        assert_eq!(
            run(code_until("%>").then_ignore(just("%>")), " x = \"%>\"; %>"),
            Some(" x = \"%>\"; ".to_string())
        );
    }

    #[test]
    fn test_until() {
        assert_eq!(
            run(until("-->").then_ignore(just("-->")), " hi -->"),
            Some(" hi ".to_string())
        );
    }

    #[test]
    fn test_located_reports_offset() {
        let parser = just("ab").ignore_then(located(name()));
        assert_eq!(run(parser, "abxy"), Some(("xy".to_string(), 2)));
    }
}
