//! Per-render state: output writers, named content, the once table and the
//! cache memento mechanism

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use super::cache::{CacheExpires, CacheService, CacheSignal};
use super::value::Value;
use crate::error::RenderError;

/// Handle to a writer owned by a [`RenderContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriterId(usize);

/// Owned record of what a cached region wrote
///
/// Holds copies, never handles, so it can be replayed into any later render.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheMemento {
    /// Text written to the output that was current when the region began
    pub output: String,
    /// Text appended to each named content spool
    pub content: IndexMap<String, String>,
    /// Once keys taken inside the region
    pub once: Vec<String>,
}

/// Lengths of every writer when a memento began
#[derive(Debug, Clone)]
pub struct MementoBaseline {
    output: WriterId,
    output_len: usize,
    content: IndexMap<String, (WriterId, usize)>,
    once_len: usize,
}

#[derive(Debug)]
struct CacheScope {
    identifier: String,
    expires: CacheExpires,
    /// `None` when the region replayed a memento instead of running
    baseline: Option<MementoBaseline>,
}

/// Everything one render writes to
///
/// Writers live in an arena and are addressed by [`WriterId`]. Writers only
/// ever grow, so a length taken at one point stays a valid baseline.
pub struct RenderContext {
    writers: Vec<String>,
    output: WriterId,
    output_stack: Vec<WriterId>,
    content: IndexMap<String, WriterId>,
    once: IndexSet<String>,
    globals: IndexMap<String, Value>,
    view_data: IndexMap<String, Value>,
    cache_service: Option<Arc<dyn CacheService>>,
    cache_scopes: Vec<CacheScope>,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            writers: vec![String::new()],
            output: WriterId(0),
            output_stack: Vec::new(),
            content: IndexMap::new(),
            once: IndexSet::new(),
            globals: IndexMap::new(),
            view_data: IndexMap::new(),
            cache_service: None,
            cache_scopes: Vec::new(),
        }
    }

    pub fn with_cache_service(mut self, service: Arc<dyn CacheService>) -> Self {
        self.cache_service = Some(service);
        self
    }

    pub fn with_view_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.view_data.insert(key.into(), value.into());
        self
    }

    pub fn set_cache_service(&mut self, service: Option<Arc<dyn CacheService>>) {
        self.cache_service = service;
    }

    pub fn has_cache_service(&self) -> bool {
        self.cache_service.is_some()
    }

    // Writers

    pub fn new_writer(&mut self) -> WriterId {
        self.writers.push(String::new());
        WriterId(self.writers.len() - 1)
    }

    pub fn text(&self, writer: WriterId) -> &str {
        self.writers.get(writer.0).map(String::as_str).unwrap_or("")
    }

    pub fn write_to(&mut self, writer: WriterId, text: &str) {
        if let Some(target) = self.writers.get_mut(writer.0) {
            target.push_str(text);
        }
    }

    /// Write to the current output
    pub fn write(&mut self, text: &str) {
        self.write_to(self.output, text);
    }

    pub fn output(&self) -> WriterId {
        self.output
    }

    /// Redirect output to `writer` until the matching [`pop_output`]
    ///
    /// [`pop_output`]: RenderContext::pop_output
    pub fn push_output(&mut self, writer: WriterId) {
        self.output_stack.push(self.output);
        self.output = writer;
    }

    pub fn pop_output(&mut self) {
        if let Some(previous) = self.output_stack.pop() {
            self.output = previous;
        }
    }

    /// What the render produced on its root output
    pub fn rendered(&self) -> &str {
        self.text(WriterId(0))
    }

    pub fn into_output(mut self) -> String {
        self.writers.swap_remove(0)
    }

    // Named content

    pub fn content(&self, name: &str) -> Option<WriterId> {
        self.content.get(name).copied()
    }

    /// The named spool, created empty on first use
    pub fn content_or_create(&mut self, name: &str) -> WriterId {
        if let Some(writer) = self.content.get(name) {
            return *writer;
        }
        let writer = self.new_writer();
        self.content.insert(name.to_string(), writer);
        writer
    }

    pub fn content_names(&self) -> impl Iterator<Item = &str> {
        self.content.keys().map(String::as_str)
    }

    // Once table

    /// Take `key` for this render; false when it was already taken
    pub fn once(&mut self, key: &str) -> bool {
        self.once.insert(key.to_string())
    }

    pub fn is_once_taken(&self, key: &str) -> bool {
        self.once.contains(key)
    }

    // Globals and view data

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Declare a global; an existing global keeps its value
    pub fn declare_global(&mut self, name: &str, value: Value) {
        self.globals.entry(name.to_string()).or_insert(value);
    }

    /// Assign an existing global, returning false when there is none
    pub fn assign_global(&mut self, name: &str, value: Value) -> bool {
        match self.globals.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn view_data(&self, key: &str) -> Option<&Value> {
        self.view_data.get(key)
    }

    // Mementos

    pub fn begin_memento(&self) -> MementoBaseline {
        MementoBaseline {
            output: self.output,
            output_len: self.text(self.output).len(),
            content: self
                .content
                .iter()
                .map(|(name, writer)| (name.clone(), (*writer, self.text(*writer).len())))
                .collect(),
            once_len: self.once.len(),
        }
    }

    /// Copy out everything written since `baseline`
    ///
    /// A content spool that is also the output the region wrote to is
    /// recorded once, as output.
    pub fn end_memento(&self, baseline: &MementoBaseline) -> CacheMemento {
        let output = self
            .text(baseline.output)
            .get(baseline.output_len..)
            .unwrap_or("")
            .to_string();

        let mut content = IndexMap::new();
        for (name, writer) in &self.content {
            if *writer == baseline.output {
                continue;
            }
            let start = match baseline.content.get(name) {
                Some((before, len)) if before == writer => *len,
                _ => 0,
            };
            let delta = self.text(*writer).get(start..).unwrap_or("");
            if !delta.is_empty() || !baseline.content.contains_key(name) {
                content.insert(name.clone(), delta.to_string());
            }
        }

        let once = self.once.iter().skip(baseline.once_len).cloned().collect();
        CacheMemento {
            output,
            content,
            once,
        }
    }

    /// Replay a memento onto this render
    pub fn do_memento(&mut self, memento: &CacheMemento) {
        self.write(&memento.output);
        for (name, text) in &memento.content {
            let writer = self.content_or_create(name);
            self.write_to(writer, text);
        }
        for key in &memento.once {
            self.once.insert(key.clone());
        }
    }

    // Cached content

    /// Start a cached region; false means it was replayed from the cache and
    /// its body must not run
    pub fn begin_cached_content(&mut self, site: &str, expires: CacheExpires, keys: &[String]) -> bool {
        let identifier = cache_identifier(site, keys);
        let Some(service) = self.cache_service.clone() else {
            self.cache_scopes.push(CacheScope {
                identifier,
                expires,
                baseline: None,
            });
            return true;
        };

        if let Some(memento) = service.get(&identifier) {
            debug!(site, "cache hit");
            self.do_memento(&memento);
            return false;
        }
        debug!(site, "cache miss");
        let baseline = self.begin_memento();
        self.cache_scopes.push(CacheScope {
            identifier,
            expires,
            baseline: Some(baseline),
        });
        true
    }

    /// Finish the innermost cached region and store what it wrote
    pub fn end_cached_content(&mut self, signal: Option<Arc<CacheSignal>>) -> Result<(), RenderError> {
        let scope = self.cache_scopes.pop().ok_or(RenderError::UnbalancedCache)?;
        if let (Some(baseline), Some(service)) = (&scope.baseline, &self.cache_service) {
            let memento = self.end_memento(baseline);
            trace!(identifier = %scope.identifier, bytes = memento.output.len(), "storing memento");
            service.store(&scope.identifier, scope.expires, signal, Arc::new(memento));
        }
        Ok(())
    }

    /// Drop the innermost cached region without storing anything
    pub fn abandon_cached_content(&mut self) {
        self.cache_scopes.pop();
    }
}

/// Site id and key parts joined by the unit separator
pub fn cache_identifier(site: &str, keys: &[String]) -> String {
    let mut identifier = site.to_string();
    for key in keys {
        identifier.push('\u{1f}');
        identifier.push_str(key);
    }
    identifier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cache::InMemoryCacheService;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_output_redirection() {
        let mut ctx = RenderContext::new();
        ctx.write("a");
        let head = ctx.content_or_create("head");
        ctx.push_output(head);
        ctx.write("h");
        ctx.pop_output();
        ctx.write("b");
        assert_eq!(ctx.rendered(), "ab");
        assert_eq!(ctx.text(head), "h");
    }

    #[test]
    fn test_once() {
        let mut ctx = RenderContext::new();
        assert!(ctx.once("jquery"));
        assert!(!ctx.once("jquery"));
        assert!(ctx.is_once_taken("jquery"));
    }

    #[test]
    fn test_memento_captures_deltas() {
        let mut ctx = RenderContext::new();
        ctx.write("before");
        let head = ctx.content_or_create("head");
        ctx.write_to(head, "h0");

        let baseline = ctx.begin_memento();
        ctx.write("x");
        ctx.write_to(head, "h1");
        let tail = ctx.content_or_create("tail");
        ctx.write_to(tail, "t");
        ctx.once("k");
        let memento = ctx.end_memento(&baseline);

        assert_eq!(memento.output, "x");
        assert_eq!(memento.content.get("head").map(String::as_str), Some("h1"));
        assert_eq!(memento.content.get("tail").map(String::as_str), Some("t"));
        assert_eq!(memento.once, vec!["k".to_string()]);

        let mut other = RenderContext::new();
        other.do_memento(&memento);
        assert_eq!(other.rendered(), "x");
        let replayed = other.content("head").expect("created");
        assert_eq!(other.text(replayed), "h1");
        assert!(other.is_once_taken("k"));
    }

    #[test]
    fn test_memento_inside_content_is_not_duplicated() {
        let mut ctx = RenderContext::new();
        let head = ctx.content_or_create("head");
        ctx.push_output(head);
        let baseline = ctx.begin_memento();
        ctx.write("inside");
        let memento = ctx.end_memento(&baseline);
        ctx.pop_output();

        assert_eq!(memento.output, "inside");
        assert!(memento.content.is_empty());

        let mut other = RenderContext::new();
        let target = other.content_or_create("head");
        other.push_output(target);
        other.do_memento(&memento);
        other.pop_output();
        assert_eq!(other.text(target), "inside");
        assert_eq!(other.rendered(), "");
    }

    #[test]
    fn test_memento_is_independent_of_live_buffers() {
        let mut ctx = RenderContext::new();
        let baseline = ctx.begin_memento();
        ctx.write("cached");
        let memento = ctx.end_memento(&baseline);
        ctx.write(" more");
        drop(ctx);
        assert_eq!(memento.output, "cached");
    }

    #[test]
    fn test_cached_content_round_trip() {
        let service: Arc<dyn CacheService> = Arc::new(InMemoryCacheService::default());
        let keys = vec!["1".to_string()];

        let mut first = RenderContext::new().with_cache_service(service.clone());
        assert!(first.begin_cached_content("v:1", CacheExpires::Never, &keys));
        first.write("body");
        first.end_cached_content(None).expect("balanced");

        let mut second = RenderContext::new().with_cache_service(service);
        second.write("[");
        assert!(!second.begin_cached_content("v:1", CacheExpires::Never, &keys));
        second.write("]");
        assert_eq!(second.rendered(), "[body]");
    }

    #[test]
    fn test_unbalanced_end() {
        let mut ctx = RenderContext::new();
        assert_eq!(ctx.end_cached_content(None), Err(RenderError::UnbalancedCache));
    }

    #[test]
    fn test_identifier_keeps_tuples_apart() {
        let joined = cache_identifier("s", &["a,b".to_string()]);
        let split = cache_identifier("s", &["a".to_string(), "b".to_string()]);
        assert_ne!(joined, split);
        assert_eq!(split, "s\u{1f}a\u{1f}b");
    }
}
