//! Reference interpreter: renders a chunk tree against a [`RenderContext`]

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::trace;

use super::cache::{CacheExpires, CacheSignal};
use super::context::{RenderContext, WriterId};
use super::evaluator::{split_top_level, Evaluator, Variables};
use super::value::{html_encode, Value};
use crate::compiler::*;
use crate::error::RenderError;

/// Nested local variable frames
#[derive(Debug, Clone)]
pub struct Scope {
    frames: Vec<IndexMap<String, Value>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            frames: vec![IndexMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(IndexMap::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Declare in the innermost frame, shadowing outer declarations
    pub fn declare(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    /// Assign the innermost visible declaration
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.frames.iter_mut().rev().find_map(|f| f.get_mut(name)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }
}

/// Locals, then globals, then view data
struct Env<'s> {
    scope: &'s Scope,
    context: &'s RenderContext,
}

impl Variables for Env<'_> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.scope
            .get(name)
            .or_else(|| self.context.global(name))
            .or_else(|| self.context.view_data(name))
            .cloned()
    }
}

/// Split `name(args)` into its parts when the whole code is one call
fn call_parts(code: &str) -> Option<(&str, &str)> {
    let code = code.trim();
    let open = code.find('(')?;
    let name = code[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let mut depth = 0usize;
    for (index, c) in code[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let close = open + index;
                    return (close == code.len() - 1).then(|| (name, &code[open + 1..close]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Split `[type] name in expression`
fn loop_parts(code: &str) -> Option<(&str, &str)> {
    let (declaration, items) = code.split_once(" in ")?;
    let variable = declaration.split_whitespace().last()?;
    Some((variable, items.trim()))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Split `[type] name = value` into its parts
fn assignment_parts(statement: &str) -> Option<(Option<&str>, &str, &str)> {
    let index = statement.char_indices().find_map(|(index, c)| {
        let prev = statement[..index].chars().last();
        let next = statement[index + 1..].chars().next();
        (c == '=' && next != Some('=') && !matches!(prev, Some('=' | '!' | '<' | '>'))).then_some(index)
    })?;
    let value = statement[index + 1..].trim();
    let mut words = statement[..index].split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(name), None, None) if is_identifier(name) => Some((None, name, value)),
        (Some(ty), Some(name), None) if is_identifier(name) => Some((Some(ty), name, value)),
        _ => None,
    }
}

fn collect_macros<'a>(chunks: &'a [Chunk], macros: &mut HashMap<&'a str, &'a MacroChunk>) {
    for chunk in chunks {
        if let Chunk::Macro(m) = chunk {
            macros.insert(m.name.as_str(), m);
        }
        if !matches!(chunk, Chunk::RenderPartial(_)) {
            for list in chunk.children() {
                collect_macros(list, macros);
            }
        }
    }
}

/// Walks chunks, evaluating their code with an [`Evaluator`]
pub struct Interpreter<'a> {
    evaluator: &'a dyn Evaluator,
    scope: Scope,
    frames: Vec<&'a RenderPartialChunk>,
    macros: HashMap<&'a str, &'a MacroChunk>,
    debug: bool,
}

impl<'a> Interpreter<'a> {
    pub fn new(evaluator: &'a dyn Evaluator) -> Self {
        Self {
            evaluator,
            scope: Scope::new(),
            frames: Vec::new(),
            macros: HashMap::new(),
            debug: false,
        }
    }

    /// Tag render errors with the position of the chunk that raised them
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Render a whole view
    pub fn render(&mut self, chunks: &'a [Chunk], context: &mut RenderContext) -> Result<(), RenderError> {
        collect_macros(chunks, &mut self.macros);
        self.render_list(chunks, context)
    }

    fn evaluate(&self, code: &str, context: &RenderContext) -> Result<Value, RenderError> {
        let env = Env {
            scope: &self.scope,
            context,
        };
        self.evaluator.evaluate(code, &env)
    }

    fn evaluate_optional(&self, code: &str, context: &RenderContext) -> Result<Value, RenderError> {
        if code.trim().is_empty() {
            return Ok(Value::Null);
        }
        self.evaluate(code, context)
    }

    fn is_true(&self, code: &str, context: &RenderContext) -> Result<bool, RenderError> {
        Ok(self.evaluate(code, context)?.is_truthy())
    }

    fn render_list(&mut self, chunks: &'a [Chunk], context: &mut RenderContext) -> Result<(), RenderError> {
        // outcome of the current if/elseif chain: Some(true) once a branch ran
        let mut chain: Option<bool> = None;
        for chunk in chunks {
            self.render_step(chunk, &mut chain, context)
                .map_err(|err| self.locate(chunk, err))?;
        }
        Ok(())
    }

    fn render_step(
        &mut self,
        chunk: &'a Chunk,
        chain: &mut Option<bool>,
        context: &mut RenderContext,
    ) -> Result<(), RenderError> {
        let Chunk::Conditional(c) = chunk else {
            *chain = None;
            return self.render_chunk(chunk, context);
        };
        match c.kind {
            ConditionalType::If => {
                let taken = self.is_true(&c.condition, context)?;
                if taken {
                    self.render_scoped(&c.body, context)?;
                }
                *chain = Some(taken);
            }
            ConditionalType::ElseIf => {
                if *chain == Some(false) {
                    let taken = self.is_true(&c.condition, context)?;
                    if taken {
                        self.render_scoped(&c.body, context)?;
                    }
                    *chain = Some(taken);
                }
            }
            ConditionalType::Else => {
                if *chain == Some(false) {
                    self.render_scoped(&c.body, context)?;
                }
                *chain = None;
            }
            ConditionalType::Unless => {
                if !self.is_true(&c.condition, context)? {
                    self.render_scoped(&c.body, context)?;
                }
                *chain = None;
            }
            ConditionalType::Once => {
                let key = self.evaluate(&c.condition, context)?.to_string();
                if context.once(&key) {
                    self.render_scoped(&c.body, context)?;
                }
                *chain = None;
            }
        }
        Ok(())
    }

    /// In debug mode, tag an error with the innermost chunk that raised it
    fn locate(&self, chunk: &Chunk, err: RenderError) -> RenderError {
        match (self.debug, chunk.position()) {
            (true, Some(position)) if !matches!(err, RenderError::Located { .. }) => RenderError::Located {
                position: position.to_string(),
                source: Box::new(err),
            },
            _ => err,
        }
    }

    fn render_scoped(&mut self, chunks: &'a [Chunk], context: &mut RenderContext) -> Result<(), RenderError> {
        self.scope.push();
        let result = self.render_list(chunks, context);
        self.scope.pop();
        result
    }

    /// Render into `writer`, restoring the output afterwards even on error
    fn render_into(
        &mut self,
        chunks: &'a [Chunk],
        writer: WriterId,
        context: &mut RenderContext,
    ) -> Result<(), RenderError> {
        context.push_output(writer);
        let result = self.render_scoped(chunks, context);
        context.pop_output();
        result
    }

    fn render_chunk(&mut self, chunk: &'a Chunk, context: &mut RenderContext) -> Result<(), RenderError> {
        match chunk {
            Chunk::SendLiteral(c) => context.write(&c.text),
            Chunk::SendExpression(c) => self.send_expression(c, context)?,
            Chunk::CodeStatement(c) => self.execute(&c.code, context)?,
            Chunk::LocalVariable(c) => {
                let value = self.evaluate_optional(&c.value, context)?;
                self.scope.declare(&c.name, value);
            }
            Chunk::GlobalVariable(c) => {
                if context.global(&c.name).is_none() {
                    let value = self.evaluate_optional(&c.value, context)?;
                    context.declare_global(&c.name, value);
                }
            }
            Chunk::DefaultVariable(c) => {
                let visible = Env {
                    scope: &self.scope,
                    context,
                }
                .variable(&c.name)
                .is_some();
                if !visible {
                    let value = self.evaluate_optional(&c.value, context)?;
                    self.scope.declare(&c.name, value);
                }
            }
            Chunk::AssignVariable(c) => {
                let value = self.evaluate(&c.value, context)?;
                self.assign(&c.name, value, context)?;
            }
            Chunk::ViewData(c) => {
                let value = match (context.view_data(&c.key), &c.default) {
                    (Some(value), _) => value.clone(),
                    (None, Some(default)) => self.evaluate(default, context)?,
                    (None, None) => Value::Null,
                };
                self.scope.declare(&c.name, value);
            }
            Chunk::ForEach(c) => self.for_each(c, context)?,
            Chunk::Conditional(_) => self.render_list(std::slice::from_ref(chunk), context)?,
            Chunk::Scope(c) => self.render_scoped(&c.body, context)?,
            Chunk::Content(c) => {
                let writer = context.content_or_create(&c.name);
                self.render_into(&c.body, writer, context)?;
            }
            Chunk::UseContent(c) => match context.content(&c.name) {
                Some(writer) => {
                    let text = context.text(writer).to_string();
                    context.write(&text);
                }
                None => self.render_scoped(&c.default, context)?,
            },
            Chunk::ContentSet(c) => {
                let writer = context.new_writer();
                self.render_into(&c.body, writer, context)?;
                let captured = context.text(writer);
                let existing = Env {
                    scope: &self.scope,
                    context,
                }
                .variable(&c.variable)
                .map(|v| v.to_string())
                .unwrap_or_default();
                let text = match c.add_type {
                    ContentAddType::Replace => captured.to_string(),
                    ContentAddType::InsertBefore => format!("{}{}", captured, existing),
                    ContentAddType::AppendAfter => format!("{}{}", existing, captured),
                };
                let value = Value::Str(text);
                if !self.scope.assign(&c.variable, value.clone()) && !context.assign_global(&c.variable, value.clone()) {
                    self.scope.declare(&c.variable, value);
                }
            }
            Chunk::RenderPartial(c) => self.render_partial(c, context)?,
            Chunk::RenderSection(c) => self.render_section(c, context)?,
            Chunk::Cache(c) => self.cache(c, context)?,
            Chunk::Extension(c) => self.render_scoped(&c.body, context)?,
            Chunk::Macro(_)
            | Chunk::ViewDataModel(_)
            | Chunk::UseNamespace(_)
            | Chunk::UseAssembly(_)
            | Chunk::PageBaseType(_) => {}
        }
        Ok(())
    }

    /// Run `;` separated statements: declarations, assignments and
    /// expressions evaluated for their effect
    fn execute(&mut self, code: &str, context: &mut RenderContext) -> Result<(), RenderError> {
        for statement in split_top_level(code, ';').into_iter().filter(|s| !s.is_empty()) {
            match assignment_parts(statement) {
                Some((Some(_), name, value)) => {
                    let value = self.evaluate(value, context)?;
                    self.scope.declare(name, value);
                }
                Some((None, name, value)) => {
                    let value = self.evaluate(value, context)?;
                    self.assign(name, value, context)?;
                }
                None => {
                    self.evaluate(statement, context)?;
                }
            }
        }
        Ok(())
    }

    fn assign(&mut self, name: &str, value: Value, context: &mut RenderContext) -> Result<(), RenderError> {
        if self.scope.assign(name, value.clone()) || context.assign_global(name, value) {
            Ok(())
        } else {
            Err(RenderError::UnknownVariable { name: name.to_string() })
        }
    }

    fn send_expression(&mut self, chunk: &SendExpressionChunk, context: &mut RenderContext) -> Result<(), RenderError> {
        if let Some((name, args)) = call_parts(&chunk.code) {
            if let Some(m) = self.macros.get(name).copied() {
                return self.call_macro(m, args, context);
            }
        }
        let value = match self.evaluate(&chunk.code, context) {
            Ok(value) => value,
            Err(RenderError::UnknownVariable { name }) if chunk.silent_nulls => {
                trace!(%name, "silent null");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let text = value.to_string();
        if chunk.automatically_encode {
            context.write(&html_encode(&text));
        } else {
            context.write(&text);
        }
        Ok(())
    }

    fn call_macro(&mut self, m: &'a MacroChunk, args: &str, context: &mut RenderContext) -> Result<(), RenderError> {
        let env = Env {
            scope: &self.scope,
            context,
        };
        let values = self.evaluator.evaluate_list(args, &env)?;
        if values.len() != m.parameters.len() {
            return Err(RenderError::Custom(format!(
                "macro '{}' takes {} argument(s), got {}",
                m.name,
                m.parameters.len(),
                values.len()
            )));
        }

        // macros see their parameters and globals, not the caller's locals
        let caller = std::mem::take(&mut self.scope);
        for (parameter, value) in m.parameters.iter().zip(values) {
            self.scope.declare(&parameter.name, value);
        }
        let result = self.render_list(&m.body, context);
        self.scope = caller;
        result
    }

    fn for_each(&mut self, chunk: &'a ForEachChunk, context: &mut RenderContext) -> Result<(), RenderError> {
        let (variable, items) = loop_parts(&chunk.code).ok_or_else(|| RenderError::Expression {
            code: chunk.code.clone(),
            message: "expected '<variable> in <expression>'".to_string(),
        })?;
        let items = match self.evaluate(items, context)? {
            Value::List(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(RenderError::Custom(format!(
                    "cannot iterate over {} in '{}'",
                    other.type_name(),
                    chunk.code
                )))
            }
        };

        let names = ["Index", "Count", "IsFirst", "IsLast"].map(|suffix| format!("{}{}", variable, suffix));
        let mut usage = DetectUsage::new(names.iter().cloned());
        for frame in self.frames.iter().copied() {
            usage = usage.with_partial(frame);
        }
        usage.scan(&chunk.body);
        let used: Vec<bool> = names.iter().map(|n| usage.is_detected(n)).collect();
        trace!(code = %chunk.code, ?used, "loop metadata");

        let count = items.len();
        for (index, item) in items.into_iter().enumerate() {
            self.scope.push();
            self.scope.declare(variable, item);
            let metadata = [
                Value::Int(index as i64),
                Value::Int(count as i64),
                Value::Bool(index == 0),
                Value::Bool(index + 1 == count),
            ];
            for ((name, value), used) in names.iter().zip(metadata).zip(&used) {
                if *used {
                    self.scope.declare(name, value);
                }
            }
            let result = self.render_list(&chunk.body, context);
            self.scope.pop();
            result?;
        }
        Ok(())
    }

    fn render_partial(&mut self, chunk: &'a RenderPartialChunk, context: &mut RenderContext) -> Result<(), RenderError> {
        let file = chunk
            .file_context
            .as_ref()
            .ok_or_else(|| RenderError::UnresolvedPartial { name: chunk.name.clone() })?;
        trace!(partial = %file.view_path, "render partial");
        collect_macros(&file.chunks, &mut self.macros);
        self.frames.push(chunk);
        let result = self.render_scoped(&file.chunks, context);
        self.frames.pop();
        result
    }

    fn render_section(&mut self, chunk: &'a RenderSectionChunk, context: &mut RenderContext) -> Result<(), RenderError> {
        let Some(frame) = self.frames.pop() else {
            return self.render_scoped(&chunk.default, context);
        };
        let supplied = match &chunk.name {
            None => Some(frame.body.as_slice()).filter(|body| !body.is_empty()),
            Some(name) => frame.sections.get(name).map(Vec::as_slice),
        };
        let result = match supplied {
            Some(chunks) => self.render_scoped(chunks, context),
            None => Ok(()),
        };
        self.frames.push(frame);
        result?;
        if supplied.is_none() {
            self.render_scoped(&chunk.default, context)?;
        }
        Ok(())
    }

    fn cache(&mut self, chunk: &'a CacheChunk, context: &mut RenderContext) -> Result<(), RenderError> {
        let keys: Vec<String> = if chunk.key.trim().is_empty() {
            Vec::new()
        } else {
            let env = Env {
                scope: &self.scope,
                context,
            };
            self.evaluator
                .evaluate_list(&chunk.key, &env)?
                .iter()
                .map(Value::to_string)
                .collect()
        };
        let expires = match self.evaluate_optional(&chunk.expires, context)? {
            Value::Null => CacheExpires::Never,
            Value::Int(seconds) if seconds >= 0 => CacheExpires::seconds(seconds as u64),
            other => {
                return Err(RenderError::Custom(format!(
                    "cache expires must be a number of seconds, got {}",
                    other.type_name()
                )))
            }
        };
        let signal: Option<std::sync::Arc<CacheSignal>> = match self.evaluate_optional(&chunk.signal, context)? {
            Value::Null => None,
            Value::Signal(signal) => Some(signal),
            other => {
                return Err(RenderError::Custom(format!(
                    "cache signal must be a signal, got {}",
                    other.type_name()
                )))
            }
        };

        if context.begin_cached_content(&chunk.site_id, expires, &keys) {
            if let Err(e) = self.render_scoped(&chunk.body, context) {
                context.abandon_cached_content();
                return Err(e);
            }
            context.end_cached_content(signal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::folder::InMemoryViewFolder;
    use crate::runtime::BasicEvaluator;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn render_views(views: &[(&str, &str)], context: RenderContext) -> Result<String, RenderError> {
        let folder = views
            .iter()
            .fold(InMemoryViewFolder::new(), |folder, (path, text)| folder.with_view(path, *text));
        let file = ViewLoader::new(Arc::new(folder), Arc::new(Settings::default()))
            .load("home/index.spark")
            .expect("should load");
        let evaluator = BasicEvaluator::new();
        let mut context = context;
        Interpreter::new(&evaluator).render(&file.chunks, &mut context)?;
        Ok(context.into_output())
    }

    fn render(text: &str) -> String {
        render_views(&[("home/index.spark", text)], RenderContext::new()).expect("should render")
    }

    #[test]
    fn test_call_parts() {
        assert_eq!(call_parts("greet('a', b)"), Some(("greet", "'a', b")));
        assert_eq!(call_parts("f(a) + g(b)"), None);
        assert_eq!(call_parts("x"), None);
    }

    #[test]
    fn test_loop_parts() {
        assert_eq!(loop_parts("var x in xs"), Some(("x", "xs")));
        assert_eq!(loop_parts("string name in names"), Some(("name", "names")));
        assert_eq!(loop_parts("nothing"), None);
    }

    #[test]
    fn test_expressions_are_encoded() {
        assert_eq!(render("<var x=\"'[[b]]'\"/><p>${x}!{x}</p>"), "<p>&lt;b&gt;<b></p>");
    }

    #[test]
    fn test_conditionals() {
        let text = "<var n='2'/>\
            <if condition='n == 1'>one</if>\
            <elseif condition='n == 2'>two</elseif>\
            <else>many</else>\
            <unless condition='n == 2'>!</unless>";
        assert_eq!(render(text), "two");
    }

    #[test]
    fn test_loop_metadata() {
        let text = "<var xs='list(1, 2, 3)'/>";
        let folder = InMemoryViewFolder::new().with_view(
            "home/index.spark",
            &format!("{}<for each='var x in xs'>${{x}}<if condition='!xIsLast'>,</if></for>", text),
        );
        let file = ViewLoader::new(Arc::new(folder), Arc::new(Settings::default()))
            .load("home/index.spark")
            .expect("should load");
        let evaluator = BasicEvaluator::new().with_function("list", |args| Ok(Value::List(args.to_vec())));
        let mut context = RenderContext::new();
        Interpreter::new(&evaluator)
            .render(&file.chunks, &mut context)
            .expect("should render");
        assert_eq!(context.rendered(), "1,2,3");
    }

    #[test]
    fn test_loop_over_view_data() {
        let text = "<for each='var x in items'>${x}${xIndex}</for>";
        let context = RenderContext::new().with_view_data("items", vec!["a"]);
        let err = render_views(&[("home/index.spark", "<for each='var x in items'>${x}${y}</for>")], context)
            .expect_err("y is unknown");
        assert_eq!(err, RenderError::UnknownVariable { name: "y".into() });

        let context = RenderContext::new().with_view_data("items", vec!["a", "b"]);
        assert_eq!(render_views(&[("home/index.spark", text)], context), Ok("a0b1".to_string()));
    }

    #[test]
    fn test_assignment_parts() {
        assert_eq!(assignment_parts("var n = 1"), Some((Some("var"), "n", "1")));
        assert_eq!(assignment_parts("n = n + 1"), Some((None, "n", "n + 1")));
        assert_eq!(assignment_parts("a == b"), None);
        assert_eq!(assignment_parts("f(\"a=b\")"), None);
        assert_eq!(assignment_parts("x.y = 1"), None);
    }

    #[test]
    fn test_statements() {
        assert_eq!(render("<% var n = 1; n = n + 1; %>${n}\n# n = n + 40\n${n}"), "2\n42");

        let context = RenderContext::new();
        let err = render_views(&[("home/index.spark", "<% x = 1 %>")], context).expect_err("undeclared");
        assert_eq!(err, RenderError::UnknownVariable { name: "x".into() });
    }

    #[test]
    fn test_once() {
        assert_eq!(render("<test once='x'>a</test><test once='x'>b</test>"), "a");
    }

    #[test]
    fn test_once_keys_are_evaluated_per_iteration() {
        let views = [(
            "home/index.spark",
            "<for each='var id in items'><span once='item-${id}'>${id}</span></for>",
        )];
        let context = RenderContext::new().with_view_data("items", vec!["a", "b", "a"]);
        assert_eq!(
            render_views(&views, context),
            Ok("<span>a</span><span>b</span>".to_string())
        );

        let views = [("home/index.spark", "<for each='var id in items'><test once='${id}'>${id}</test></for>")];
        let context = RenderContext::new().with_view_data("items", vec!["a", "b", "a"]);
        assert_eq!(render_views(&views, context), Ok("ab".to_string()));
    }

    #[test]
    fn test_content_and_use() {
        let text = "<content name='head'>h</content>b<use content='head'/><use content='tail'>t</use>";
        assert_eq!(render(text), "bht");
    }

    #[test]
    fn test_content_set() {
        let text = "<var s='\"x\"'/>\
            <content var='s' add='before'>a</content>\
            <content var='s' add='after'>b</content>${s}";
        assert_eq!(render(text), "axb");
    }

    #[test]
    fn test_globals_and_defaults() {
        let text = "<global title='\"g\"'/><default title='\"d\"' other='\"o\"'/>${title}${other}<set title='\"s\"'/>${title}";
        assert_eq!(render(text), "gos");
    }

    #[test]
    fn test_silent_nulls() {
        assert_eq!(render("a$!{missing}b"), "ab");
        let err = render_views(&[("home/index.spark", "${missing}")], RenderContext::new()).expect_err("unknown");
        assert_eq!(err, RenderError::UnknownVariable { name: "missing".into() });
    }

    #[test]
    fn test_viewdata() {
        let context = RenderContext::new().with_view_data("name", "ann");
        let text = "<viewdata name='string' other='string' default='\"-\"'/>${name}${other}";
        assert_eq!(render_views(&[("home/index.spark", text)], context), Ok("ann-".to_string()));
    }

    #[test]
    fn test_macro() {
        let text = "<macro name='greet' who='string'>hi ${who}</macro>${greet('bob')}";
        assert_eq!(render(text), "hi bob");
    }

    #[test]
    fn test_partial_with_sections() {
        let views = [
            (
                "home/index.spark",
                "<wrap title='\"T\"'>body<segment name='foot'>F</segment></wrap>",
            ),
            (
                "home/_wrap.spark",
                "<h1>${title}</h1><render/>|<render section='foot'/>|<render section='none'>D</render>",
            ),
        ];
        assert_eq!(
            render_views(&views, RenderContext::new()),
            Ok("<h1>T</h1>body|F|D".to_string())
        );
    }

    #[test]
    fn test_cache_without_service_runs_body() {
        assert_eq!(render("<cache key='1'>x</cache><cache>y</cache>"), "xy");
    }
}
