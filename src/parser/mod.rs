//! Markup parsing: positions, combinators, the node grammar and its AST

pub mod ast;
pub mod combinators;
mod markup;
pub mod position;

pub use ast::*;
pub use markup::{is_void_element, parse, parse_nodes, VOID_ELEMENTS};
pub use position::{Position, SourceContext, Span};
