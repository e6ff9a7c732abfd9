//! Spindle - a compiler and runtime for Spark-style markup view templates
//!
//! Views are parsed into nodes, lowered through a pipeline of node visitors
//! and built into a tree of [`Chunk`]s that a backend pattern-matches over.
//! A reference interpreter renders chunk trees directly, with support for
//! named content, once semantics and output caching.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use spindle::{BasicEvaluator, Engine, InMemoryViewFolder, Settings};
//!
//! let folder = InMemoryViewFolder::new()
//!     .with_view("home/index.spark", "<ul><for each='var x in xs'><li>${x}</li></for></ul>");
//! let engine = Engine::new(Arc::new(folder), Settings::default());
//!
//! let evaluator = BasicEvaluator::new();
//! let mut context = spindle::RenderContext::new().with_view_data("xs", vec![1i64, 2]);
//! engine.render("home/index.spark", &evaluator, &mut context).unwrap();
//! assert_eq!(context.rendered(), "<ul><li>1</li><li>2</li></ul>");
//! ```

pub mod bindings;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod folder;
pub mod parser;
pub mod runtime;
pub mod visitors;

pub use bindings::BindingTable;
pub use compiler::{build_chunks, dump_chunks, Chunk, DetectUsage, FileContext, ViewLoader};
pub use config::Settings;
pub use engine::{CompiledView, Engine};
pub use error::{CompilerError, Error, FileNotFoundError, GrammarError, RenderError};
pub use folder::{FileSystemViewFolder, InMemoryViewFolder, ViewFolder};
pub use parser::{parse, parse_nodes, Node};
pub use runtime::{
    BasicEvaluator, CacheExpires, CacheService, CacheSignal, Evaluator, InMemoryCacheService,
    RenderContext, Value,
};
pub use visitors::{run_pipeline, VisitorContext};

/// Parse, lower and build a single template with no partials or bindings
///
/// ```rust
/// let chunks = spindle::compile_str("<p>${name}</p>").unwrap();
/// assert_eq!(chunks.len(), 3);
/// ```
pub fn compile_str(text: &str) -> Result<Vec<Chunk>, Error> {
    let nodes = parse(text)?;
    let context = VisitorContext::default();
    let nodes = run_pipeline(nodes, &context)?;
    Ok(build_chunks(&nodes, &context)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_str() {
        let chunks = compile_str("<p>${name}</p>").expect("should compile");
        insta::assert_snapshot!(
            dump_chunks(&chunks).replace('\n', "|"),
            @r#"literal "<p>"|expression encoded "name"|literal "</p>"|"#
        );
    }

    #[test]
    fn test_compile_str_reports_grammar_errors() {
        let err = compile_str("<p>a < b</p>").expect_err("should fail");
        assert!(matches!(err, Error::Grammar(_)));
    }
}
