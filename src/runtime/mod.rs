//! Rendering runtime: render contexts, output caching and a reference
//! interpreter for compiled chunk trees

mod cache;
mod context;
mod evaluator;
mod interpreter;
mod value;

pub use cache::{
    CacheExpires, CacheService, CacheSignal, Clock, InMemoryCacheService, ManualClock, SystemClock,
};
pub use context::{cache_identifier, CacheMemento, MementoBaseline, RenderContext, WriterId};
pub use evaluator::{split_arguments, BasicEvaluator, Evaluator, Function, Variables};
pub use interpreter::{Interpreter, Scope};
pub use value::{html_encode, Value};
