//! Lexer for binding phrases using logos
//!
//! Everything that is not a reference or a brace pair lexes as literal text,
//! so lexing never fails.

use logos::Logos;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

fn strip(lex: &logos::Lexer<'_, Token>, head: usize, tail: usize) -> String {
    let slice = lex.slice();
    slice[head..slice.len() - tail].to_string()
}

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    #[token("{{")]
    DictOpen,
    #[token("}}")]
    DictClose,

    // Escapes for characters that cannot appear in markup
    #[token("[[")]
    EscapedLt,
    #[token("]]")]
    EscapedGt,

    #[token("child::*")]
    #[token("'child::*'")]
    #[token("\"child::*\"")]
    Child,

    /// `@name`: attribute value as code
    #[regex(r"@[A-Za-z_:][A-Za-z0-9_.:\-]*", |lex| strip(lex, 1, 0))]
    Name(String),

    /// `@@name`: optional attribute value as code
    #[regex(r"@@[A-Za-z_:][A-Za-z0-9_.:\-]*", |lex| strip(lex, 2, 0))]
    OptionalName(String),

    /// `"@name"` or `'@name'`: attribute value as a string
    #[regex(r#""@[A-Za-z_:][A-Za-z0-9_.:\-]*""#, |lex| strip(lex, 2, 1))]
    #[regex(r"'@[A-Za-z_:][A-Za-z0-9_.:\-]*'", |lex| strip(lex, 2, 1))]
    QuotedName(String),

    /// `"@@name"` or `'@@name'`
    #[regex(r#""@@[A-Za-z_:][A-Za-z0-9_.:\-]*""#, |lex| strip(lex, 3, 1))]
    #[regex(r"'@@[A-Za-z_:][A-Za-z0-9_.:\-]*'", |lex| strip(lex, 3, 1))]
    QuotedOptionalName(String),

    /// `@prefix*` or `@*`
    #[regex(r"@([A-Za-z_:][A-Za-z0-9_.:\-]*)?\*", |lex| strip(lex, 1, 1))]
    Prefix(String),

    /// `"@prefix*"` or `'@prefix*'`
    #[regex(r#""@([A-Za-z_:][A-Za-z0-9_.:\-]*)?\*""#, |lex| strip(lex, 2, 2))]
    #[regex(r"'@([A-Za-z_:][A-Za-z0-9_.:\-]*)?\*'", |lex| strip(lex, 2, 2))]
    QuotedPrefix(String),

    #[regex(r#"[^@{}\[\]"'c]+"#, |lex| lex.slice().to_string())]
    Text(String),

    /// A single character that did not start any other token
    #[regex(r#"[@{}\[\]"'c]"#, |lex| lex.slice().to_string())]
    Char(String),
}

impl Token {
    /// The text a token stands for when used literally
    pub fn literal(&self) -> String {
        match self {
            Token::DictOpen => "{{".to_string(),
            Token::DictClose => "}}".to_string(),
            Token::EscapedLt => "<".to_string(),
            Token::EscapedGt => ">".to_string(),
            Token::Child => "child::*".to_string(),
            Token::Name(n) => format!("@{}", n),
            Token::OptionalName(n) => format!("@@{}", n),
            Token::QuotedName(n) => format!("\"@{}\"", n),
            Token::QuotedOptionalName(n) => format!("\"@@{}\"", n),
            Token::Prefix(p) => format!("@{}*", p),
            Token::QuotedPrefix(p) => format!("\"@{}*\"", p),
            Token::Text(s) | Token::Char(s) => s.clone(),
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.literal())
    }
}

/// Lex a binding phrase into tokens with their spans
pub fn lex(input: &str) -> impl Iterator<Item = (Token, Span)> + '_ {
    Token::lexer(input)
        .spanned()
        .filter_map(|(tok, span)| tok.ok().map(|t| (t, span)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).map(|(t, _)| t).collect()
    }

    #[test]
    fn test_name_references() {
        assert_eq!(
            tokens("Html.Link(@text, @@title)"),
            vec![
                Token::Text("Html.Link(".into()),
                Token::Name("text".into()),
                Token::Text(", ".into()),
                Token::OptionalName("title".into()),
                Token::Text(")".into()),
            ]
        );
    }

    #[test]
    fn test_quoted_references() {
        assert_eq!(
            tokens("\"@href\" '@@alt' \"@route.*\""),
            vec![
                Token::QuotedName("href".into()),
                Token::Text(" ".into()),
                Token::QuotedOptionalName("alt".into()),
                Token::Text(" ".into()),
                Token::QuotedPrefix("route.".into()),
            ]
        );
    }

    #[test]
    fn test_prefix_and_dictionary() {
        assert_eq!(
            tokens("{{@*}}"),
            vec![Token::DictOpen, Token::Prefix("".into()), Token::DictClose]
        );
    }

    #[test]
    fn test_child_and_escapes() {
        assert_eq!(
            tokens("[[b]]child::*"),
            vec![
                Token::EscapedLt,
                Token::Text("b".into()),
                Token::EscapedGt,
                Token::Child,
            ]
        );
    }

    #[test]
    fn test_plain_c_is_a_char() {
        assert_eq!(
            tokens("cat"),
            vec![Token::Char("c".into()), Token::Text("at".into())]
        );
    }
}
