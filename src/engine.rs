//! The view engine: compiles views on first use, keeps them until their
//! files change, and renders them with the reference interpreter

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::bindings::BindingTable;
use crate::compiler::{Chunk, FileContext, ViewLoader};
use crate::config::Settings;
use crate::error::Error;
use crate::folder::{normalize_path, ViewFolder};
use crate::parser::ExtensionFactory;
use crate::runtime::{CacheService, Evaluator, Interpreter, RenderContext};

/// A view compiled together with every partial it reaches
#[derive(Debug)]
pub struct CompiledView {
    pub path: String,
    pub file: Arc<FileContext>,
    /// Every file the view was compiled from, with its timestamp
    pub timestamps: Vec<(String, u64)>,
    pub namespaces: Vec<String>,
    pub assemblies: Vec<String>,
    /// Declared base type, falling back to the settings
    pub page_base_type: Option<String>,
    /// Render errors carry the position of the failing chunk
    pub debug: bool,
}

impl CompiledView {
    pub fn chunks(&self) -> &[Chunk] {
        &self.file.chunks
    }

    /// Whether none of the view's files changed since it was compiled
    pub fn is_current(&self, folder: &dyn ViewFolder) -> bool {
        self.timestamps
            .iter()
            .all(|(path, stamp)| folder.last_modified(path) == Some(*stamp))
    }
}

type ViewSlot = Arc<OnceCell<Arc<CompiledView>>>;

/// Compiles and renders the views of one folder
///
/// Compilation is single-flight per path: concurrent first uses of a view
/// wait for one compile instead of racing.
pub struct Engine {
    folder: Arc<dyn ViewFolder>,
    settings: Arc<Settings>,
    extensions: Vec<Arc<dyn ExtensionFactory>>,
    cache_service: Option<Arc<dyn CacheService>>,
    bindings: OnceCell<Arc<BindingTable>>,
    views: Mutex<HashMap<String, ViewSlot>>,
}

impl Engine {
    pub fn new(folder: Arc<dyn ViewFolder>, settings: Settings) -> Self {
        Self {
            folder,
            settings: Arc::new(settings),
            extensions: Vec::new(),
            cache_service: None,
            bindings: OnceCell::new(),
            views: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_extension(mut self, factory: Arc<dyn ExtensionFactory>) -> Self {
        self.extensions.push(factory);
        self
    }

    /// Cache service handed to render contexts that have none
    pub fn with_cache_service(mut self, service: Arc<dyn CacheService>) -> Self {
        self.cache_service = Some(service);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn folder(&self) -> &Arc<dyn ViewFolder> {
        &self.folder
    }

    /// The binding table, read from the folder on first use
    pub fn bindings(&self) -> Result<Arc<BindingTable>, Error> {
        self.bindings
            .get_or_try_init(|| {
                BindingTable::load(self.folder.as_ref(), &self.settings.bindings_file).map(Arc::new)
            })
            .cloned()
    }

    /// Number of views currently compiled
    pub fn compiled_views(&self) -> usize {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    /// The compiled view for `path`, compiling it when missing or stale
    pub fn compile(&self, path: &str) -> Result<Arc<CompiledView>, Error> {
        let path = normalize_path(path);
        let slot = {
            let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = views.entry(path.clone()).or_default().clone();
            match slot.get() {
                Some(view) if !view.is_current(self.folder.as_ref()) => {
                    debug!(path = %path, "compiled view is stale");
                    let fresh = ViewSlot::default();
                    views.insert(path.clone(), fresh.clone());
                    fresh
                }
                _ => slot,
            }
        };
        slot.get_or_try_init(|| self.compile_uncached(&path)).cloned()
    }

    fn compile_uncached(&self, path: &str) -> Result<Arc<CompiledView>, Error> {
        let loader = ViewLoader::new(self.folder.clone(), self.settings.clone())
            .with_bindings(self.bindings()?)
            .with_extensions(self.extensions.clone());
        let file = loader.load(path)?;
        loader.check_declarations()?;
        let page_base_type = loader.page_base_type(&file);

        let view = CompiledView {
            path: path.to_string(),
            file,
            timestamps: loader.timestamps(),
            namespaces: loader.use_namespaces(),
            assemblies: loader.use_assemblies(),
            page_base_type,
            debug: self.settings.debug,
        };
        info!(path, files = view.timestamps.len(), "compiled view");
        Ok(Arc::new(view))
    }

    /// Render `path` into `context`
    pub fn render(
        &self,
        path: &str,
        evaluator: &dyn Evaluator,
        context: &mut RenderContext,
    ) -> Result<(), Error> {
        let view = self.compile(path)?;
        if !context.has_cache_service() {
            context.set_cache_service(self.cache_service.clone());
        }
        Interpreter::new(evaluator)
            .with_debug(view.debug)
            .render(view.chunks(), context)?;
        Ok(())
    }

    pub fn render_to_string(&self, path: &str, evaluator: &dyn Evaluator) -> Result<String, Error> {
        let mut context = RenderContext::new();
        self.render(path, evaluator, &mut context)?;
        Ok(context.into_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::folder::InMemoryViewFolder;
    use crate::runtime::BasicEvaluator;
    use pretty_assertions::assert_eq;

    fn engine(folder: InMemoryViewFolder) -> (Arc<InMemoryViewFolder>, Engine) {
        let folder = Arc::new(folder);
        let engine = Engine::new(folder.clone(), Settings::default());
        (folder, engine)
    }

    #[test]
    fn test_compile_is_memoized() {
        let (_, engine) = engine(InMemoryViewFolder::new().with_view("home/index.spark", "<p/>"));
        let first = engine.compile("home/index.spark").expect("should compile");
        let second = engine.compile("./home/index.spark").expect("should compile");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.compiled_views(), 1);
    }

    #[test]
    fn test_stale_views_are_recompiled() {
        let (folder, engine) = engine(
            InMemoryViewFolder::new()
                .with_view("home/index.spark", "<menu/>")
                .with_view("home/_menu.spark", "a"),
        );
        let evaluator = BasicEvaluator::new();
        assert_eq!(engine.render_to_string("home/index.spark", &evaluator).expect("render"), "a");

        folder.set_view("home/_menu.spark", "b");
        let view = engine.compile("home/index.spark").expect("should compile");
        assert_eq!(
            view.timestamps.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>(),
            vec!["home/_menu.spark", "home/index.spark"]
        );
        assert_eq!(engine.render_to_string("home/index.spark", &evaluator).expect("render"), "b");
    }

    #[test]
    fn test_concurrent_first_use_compiles_once() {
        let (_, engine) = engine(InMemoryViewFolder::new().with_view("home/index.spark", "<p>${1}</p>"));
        let views: Vec<Arc<CompiledView>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| engine.compile("home/index.spark")))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread").expect("should compile"))
                .collect()
        });
        assert!(views.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_failed_compile_is_retried() {
        let (folder, engine) = engine(InMemoryViewFolder::new().with_view("home/index.spark", "<if>"));
        assert!(engine.compile("home/index.spark").is_err());
        folder.set_view("home/index.spark", "<if condition='true'>x</if>");
        let evaluator = BasicEvaluator::new();
        assert_eq!(engine.render_to_string("home/index.spark", &evaluator).expect("render"), "x");
    }

    #[test]
    fn test_bindings_come_from_the_folder() {
        let (_, engine) = engine(
            InMemoryViewFolder::new()
                .with_view("bindings.xml", "<bindings><element name='hello'>\"world\"</element></bindings>")
                .with_view("home/index.spark", "<hello/>"),
        );
        let evaluator = BasicEvaluator::new();
        assert_eq!(engine.render_to_string("home/index.spark", &evaluator).expect("render"), "world");
        assert_eq!(engine.bindings().expect("bindings").bindings().len(), 1);
    }

    #[test]
    fn test_page_base_type_defaults_to_the_settings() {
        let folder = Arc::new(
            InMemoryViewFolder::new()
                .with_view("home/index.spark", "<p/>")
                .with_view("home/typed.spark", "<use pageBaseType='App.TypedView'/><p/>"),
        );
        let engine = Engine::new(folder, Settings::default().with_page_base_type("App.View"));
        let view = engine.compile("home/index.spark").expect("should compile");
        assert_eq!(view.page_base_type.as_deref(), Some("App.View"));
        let view = engine.compile("home/typed.spark").expect("should compile");
        assert_eq!(view.page_base_type.as_deref(), Some("App.TypedView"));
    }

    #[test]
    fn test_debug_errors_carry_positions() {
        let folder = Arc::new(
            InMemoryViewFolder::new().with_view("home/index.spark", "<p>\n<if condition='true'>${missing}</if></p>"),
        );
        let evaluator = BasicEvaluator::new();

        let engine = Engine::new(folder.clone(), Settings::default());
        let err = engine.render_to_string("home/index.spark", &evaluator).expect_err("missing");
        assert!(matches!(err, Error::Render(RenderError::UnknownVariable { .. })));

        let engine = Engine::new(folder, Settings::default().with_debug(true));
        match engine.render_to_string("home/index.spark", &evaluator).expect_err("missing") {
            Error::Render(RenderError::Located { position, source }) => {
                assert!(position.starts_with("home/index.spark:2:"), "{position}");
                assert_eq!(*source, RenderError::UnknownVariable { name: "missing".into() });
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_view() {
        let (_, engine) = engine(InMemoryViewFolder::new());
        let err = engine.compile("home/none.spark").expect_err("missing");
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
