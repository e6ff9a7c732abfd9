//! Error types for parsing, compiling and rendering

use std::sync::Arc;

use ariadne::{Color, Label, Report, ReportKind, Source};
use chumsky::error::{Rich, RichPattern, RichReason};
use thiserror::Error;

use crate::parser::position::{Position, SourceContext};

/// Malformed markup
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("Parse error at {position}: {message}")]
    Syntax {
        position: Position,
        message: String,
        expected: Vec<String>,
    },
}

impl GrammarError {
    pub fn position(&self) -> &Position {
        match self {
            GrammarError::Syntax { position, .. } => position,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let GrammarError::Syntax {
            position,
            message,
            expected,
        } = self;
        let expected_str = if expected.is_empty() {
            String::new()
        } else {
            format!("\nExpected: {}", expected.join(", "))
        };

        // ariadne counts characters, chumsky counts bytes
        let start = source
            .get(..position.offset())
            .map(|s| s.chars().count())
            .unwrap_or(0);
        let end = (start + 1).min(source.chars().count().max(start));

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, start)
            .with_message(message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(format!("{}{}", message, expected_str))
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);
        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }

    pub(crate) fn from_rich(err: Rich<'_, char>, source: &Arc<SourceContext>) -> Self {
        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => match found {
                Some(c) => format!("Unexpected '{}'", **c),
                None => "Unexpected end of input".to_string(),
            },
            RichReason::Custom(msg) => msg.to_string(),
        };
        let mut expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(c) => Some(format!("'{}'", **c)),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of input".to_string()),
                #[allow(unreachable_patterns)]
                _ => None,
            })
            .collect();
        expected.sort();
        expected.dedup();

        GrammarError::Syntax {
            position: Position::new(source.clone(), err.span().start),
            message,
            expected,
        }
    }
}

/// Semantic errors found while running the pipeline or building chunks
#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("Unexpected end element </{name}>{}", at(.position))]
    UnexpectedEndElement {
        name: String,
        position: Option<Position>,
    },

    #[error("Element <{name}> is never closed{}", at(.position))]
    UnclosedElement {
        name: String,
        position: Option<Position>,
    },

    #[error("<{name}> must follow an <if> or <elseif>{}", at(.position))]
    ElseWithoutIf {
        name: String,
        position: Option<Position>,
    },

    #[error("<{element}> requires a '{attribute}' attribute{}", at(.position))]
    MissingAttribute {
        element: String,
        attribute: String,
        position: Option<Position>,
    },

    #[error("Unknown or invalid special node <{name}>{}", at(.position))]
    UnknownSpecialNode {
        name: String,
        position: Option<Position>,
    },

    #[error("Conflicting declarations of {kind} '{name}': {first} and {second}")]
    ConflictingDeclaration {
        kind: &'static str,
        name: String,
        first: String,
        second: String,
    },

    #[error("Cyclic partial inclusion: {chain}")]
    CyclicPartial { chain: String },

    #[error("Invalid binding for <{element}>: {message}")]
    InvalidBinding { element: String, message: String },

    #[error("<{name}> is only valid directly inside a partial invocation{}", at(.position))]
    SectionOutsidePartial {
        name: String,
        position: Option<Position>,
    },

    #[error("Unable to include '{href}': {message}{}", at(.position))]
    Include {
        href: String,
        message: String,
        position: Option<Position>,
    },
}

fn at(position: &Option<Position>) -> String {
    match position {
        Some(p) => format!(" at {}", p),
        None => String::new(),
    }
}

/// A view or partial that could not be located
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unable to find view '{path}', tried: {}", .candidates.join(", "))]
pub struct FileNotFoundError {
    pub path: String,
    pub candidates: Vec<String>,
}

/// Failures reported by a view folder
#[derive(Error, Debug)]
pub enum FolderError {
    #[error("View '{path}' does not exist")]
    NotFound { path: String },

    #[error("Failed to read view '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while executing compiled chunks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Error evaluating '{code}': {message}")]
    Expression { code: String, message: String },

    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Partial '{name}' was never resolved")]
    UnresolvedPartial { name: String },

    #[error("end_cached_content called without a matching begin_cached_content")]
    UnbalancedCache,

    #[error("{0}")]
    Custom(String),

    #[error("{position}: {source}")]
    Located {
        position: String,
        source: Box<RenderError>,
    },
}

/// Any error the crate can produce
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Compiler(#[from] CompilerError),

    #[error(transparent)]
    FileNotFound(#[from] FileNotFoundError),

    #[error(transparent)]
    Folder(#[from] FolderError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Settings(#[from] crate::config::SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_error_mentions_position() {
        let source = SourceContext::with_file("<p>\n</if>", "home/index.spark", 0);
        let err = CompilerError::UnexpectedEndElement {
            name: "if".into(),
            position: Some(Position::new(source, 4)),
        };
        assert_eq!(
            err.to_string(),
            "Unexpected end element </if> at home/index.spark:2:1"
        );
    }

    #[test]
    fn test_file_not_found_lists_candidates() {
        let err = FileNotFoundError {
            path: "_menu".into(),
            candidates: vec!["home/_menu.spark".into(), "Shared/_menu.spark".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unable to find view '_menu', tried: home/_menu.spark, Shared/_menu.spark"
        );
    }

    #[test]
    fn test_grammar_error_format_contains_message() {
        let source = SourceContext::new("<p>a < b</p>");
        let err = GrammarError::Syntax {
            position: Position::new(source, 5),
            message: "Unexpected '<'".into(),
            expected: vec![],
        };
        let formatted = err.format("<p>a < b</p>", "test.spark");
        assert!(formatted.contains("Unexpected '<'"));
    }
}
