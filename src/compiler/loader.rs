//! View loading: parse, run the pipeline and build chunks for a view and
//! every partial it reaches

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::builder::{ChunkBuilder, PartialResolver};
use super::chunk::{Chunk, FileContext};
use super::check_declarations;
use crate::bindings::BindingTable;
use crate::config::Settings;
use crate::error::{CompilerError, Error, FileNotFoundError};
use crate::folder::{file_name, join_path, normalize_path, parent_folder, ViewFolder};
use crate::parser::{parse_nodes, ExtensionFactory, SourceContext};
use crate::visitors::{run_pipeline, VisitorContext};

/// Loads and compiles views from one folder
///
/// Every file is compiled at most once per loader. The paths currently being
/// compiled form a stack, so a partial that reaches itself again is reported
/// with the whole chain instead of recursing.
pub struct ViewLoader {
    folder: Arc<dyn ViewFolder>,
    settings: Arc<Settings>,
    bindings: Arc<BindingTable>,
    extensions: Vec<Arc<dyn ExtensionFactory>>,
    entries: RefCell<IndexMap<String, Arc<FileContext>>>,
    in_progress: RefCell<Vec<String>>,
}

impl ViewLoader {
    pub fn new(folder: Arc<dyn ViewFolder>, settings: Arc<Settings>) -> Self {
        Self {
            folder,
            settings,
            bindings: BindingTable::empty(),
            extensions: Vec::new(),
            entries: RefCell::new(IndexMap::new()),
            in_progress: RefCell::new(Vec::new()),
        }
    }

    pub fn with_bindings(mut self, bindings: Arc<BindingTable>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<Arc<dyn ExtensionFactory>>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Compile `path` and every partial it uses
    pub fn load(&self, path: &str) -> Result<Arc<FileContext>, Error> {
        let path = normalize_path(path);
        if let Some(entry) = self.entries.borrow().get(&path) {
            trace!(path = %path, "view already loaded");
            return Ok(entry.clone());
        }
        if self.in_progress.borrow().contains(&path) {
            let mut chain = self.in_progress.borrow().clone();
            chain.push(path);
            return Err(CompilerError::CyclicPartial {
                chain: chain.join(" -> "),
            }
            .into());
        }
        if !self.folder.has_view(&path) {
            return Err(FileNotFoundError {
                candidates: vec![path.clone()],
                path,
            }
            .into());
        }

        self.in_progress.borrow_mut().push(path.clone());
        let result = self.compile(&path);
        self.in_progress.borrow_mut().pop();

        let file = Arc::new(result?);
        self.entries.borrow_mut().insert(path, file.clone());
        Ok(file)
    }

    fn compile(&self, path: &str) -> Result<FileContext, Error> {
        let source = self.folder.open_view(path)?;
        let last_modified = source.last_modified;
        let text = source.read_to_string(path)?;
        debug!(path, last_modified, "loading view");

        let source = SourceContext::with_file(text, path, last_modified);
        let nodes = parse_nodes(&source)?;

        let mut context = VisitorContext::new(self.settings.clone())
            .with_view_path(path)
            .with_view_folder(self.folder.clone())
            .with_partial_file_names(self.partial_file_names(path))
            .with_bindings(self.bindings.clone());
        context.extensions = self.extensions.clone();

        let nodes = run_pipeline(nodes, &context)?;
        let chunks = ChunkBuilder::new(&context).with_resolver(self).build(&nodes)?;
        check_declarations([chunks.as_slice()])?;

        Ok(FileContext {
            view_path: path.to_string(),
            last_modified,
            chunks,
        })
    }

    /// Names of the `_name` partials visible from `path`, without the
    /// underscore or extension
    pub fn partial_file_names(&self, path: &str) -> Vec<String> {
        let extension = self.settings.view_extension.as_str();
        let mut names: Vec<String> = Vec::new();
        for folder in [parent_folder(path), self.settings.shared_folder.as_str()] {
            for view in self.folder.list_views(folder) {
                let Some(name) = file_name(&view)
                    .strip_prefix('_')
                    .and_then(|rest| rest.strip_suffix(extension))
                else {
                    continue;
                };
                if !name.is_empty() && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Where a partial named `name` may live when used from `from`
    pub fn partial_candidates(&self, from: &str, name: &str) -> Vec<String> {
        let extension = self.settings.view_extension.as_str();
        let file = if name.ends_with(extension) {
            name.to_string()
        } else {
            format!("{}{}", name, extension)
        };
        let mut candidates = vec![join_path(parent_folder(from), &file)];
        let shared = join_path(&self.settings.shared_folder, &file);
        if !candidates.contains(&shared) {
            candidates.push(shared);
        }
        candidates
    }

    /// Paths of every file compiled so far, in load order
    pub fn view_paths(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Each compiled file with the timestamp it was read with
    pub fn timestamps(&self) -> Vec<(String, u64)> {
        self.entries
            .borrow()
            .iter()
            .map(|(path, file)| (path.clone(), file.last_modified))
            .collect()
    }

    /// Whether every compiled file still has the timestamp it was read with
    pub fn is_current(&self) -> bool {
        self.entries
            .borrow()
            .iter()
            .all(|(path, file)| self.folder.last_modified(path) == Some(file.last_modified))
    }

    /// Reject globals and view data declared differently by two files
    pub fn check_declarations(&self) -> Result<(), CompilerError> {
        let entries = self.entries.borrow();
        check_declarations(entries.values().map(|file| file.chunks.as_slice()))
    }

    /// Namespaces from the settings and every `<use namespace>` of every
    /// compiled file
    pub fn use_namespaces(&self) -> Vec<String> {
        self.collect(&self.settings.namespaces, |chunk| match chunk {
            Chunk::UseNamespace(c) => Some(&c.namespace),
            _ => None,
        })
    }

    /// Assemblies from the settings and every `<use assembly>` of every
    /// compiled file
    pub fn use_assemblies(&self) -> Vec<String> {
        self.collect(&self.settings.assemblies, |chunk| match chunk {
            Chunk::UseAssembly(c) => Some(&c.assembly),
            _ => None,
        })
    }

    /// The base type `file` declares with `<use pageBaseType>`, else the
    /// settings default
    pub fn page_base_type(&self, file: &FileContext) -> Option<String> {
        fn find(chunks: &[Chunk]) -> Option<&String> {
            chunks.iter().find_map(|chunk| match chunk {
                Chunk::PageBaseType(c) => Some(&c.base_type),
                other => other.children().into_iter().find_map(find),
            })
        }
        find(&file.chunks)
            .cloned()
            .or_else(|| self.settings.page_base_type.clone())
    }

    fn collect(&self, defaults: &[String], pick: fn(&Chunk) -> Option<&String>) -> Vec<String> {
        let mut found: Vec<String> = defaults.to_vec();
        // each file is its own entry, so partial bodies are not followed
        fn walk(chunks: &[Chunk], pick: fn(&Chunk) -> Option<&String>, found: &mut Vec<String>) {
            for chunk in chunks {
                if let Some(value) = pick(chunk) {
                    if !found.contains(value) {
                        found.push(value.clone());
                    }
                }
                for list in chunk.children() {
                    walk(list, pick, found);
                }
            }
        }
        for file in self.entries.borrow().values() {
            walk(&file.chunks, pick, &mut found);
        }
        found
    }
}

impl PartialResolver for ViewLoader {
    fn resolve_partial(&self, name: &str) -> Result<Arc<FileContext>, Error> {
        let from = self.in_progress.borrow().last().cloned().unwrap_or_default();
        let candidates = self.partial_candidates(&from, name);
        match candidates.iter().find(|path| self.folder.has_view(path)) {
            Some(path) => {
                debug!(partial = name, path = %path, from = %from, "resolved partial");
                self.load(path)
            }
            None => Err(FileNotFoundError {
                path: name.to_string(),
                candidates,
            }
            .into()),
        }
    }
}
