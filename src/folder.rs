//! View folders: where template text comes from
//!
//! Paths are always `/`-separated and relative to the folder root, e.g.
//! `home/index.spark`.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::UNIX_EPOCH;

use crate::error::FolderError;

/// An open view: its contents plus the timestamp used for staleness checks
pub struct ViewSource {
    pub last_modified: u64,
    reader: Box<dyn Read + Send>,
}

impl ViewSource {
    pub fn new(last_modified: u64, reader: Box<dyn Read + Send>) -> Self {
        Self {
            last_modified,
            reader,
        }
    }

    pub fn read_to_string(mut self, path: &str) -> Result<String, FolderError> {
        let mut content = String::new();
        self.reader
            .read_to_string(&mut content)
            .map_err(|source| FolderError::Io {
                path: path.to_string(),
                source,
            })?;
        Ok(content)
    }
}

/// Storage abstraction consulted by the view loader
pub trait ViewFolder: Send + Sync {
    fn has_view(&self, path: &str) -> bool;

    /// Full paths of the views directly inside `folder`, sorted
    fn list_views(&self, folder: &str) -> Vec<String>;

    fn open_view(&self, path: &str) -> Result<ViewSource, FolderError>;

    /// Timestamp of a view without reading it
    fn last_modified(&self, path: &str) -> Option<u64> {
        self.open_view(path).ok().map(|source| source.last_modified)
    }
}

/// Normalise separators and strip leading `./` and `/`
pub fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let mut trimmed = replaced.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}

/// The folder part of a view path, empty for views in the root
pub fn parent_folder(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// The file name part of a view path
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

pub fn join_path(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        normalize_path(name)
    } else {
        normalize_path(&format!("{}/{}", folder, name))
    }
}

/// Views held in memory, mainly for tests and embedding
///
/// Every write bumps a counter that serves as the view's timestamp, so
/// replacing a view makes compiled copies stale.
#[derive(Default)]
pub struct InMemoryViewFolder {
    views: RwLock<BTreeMap<String, (String, u64)>>,
    clock: AtomicU64,
}

impl InMemoryViewFolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_view(self, path: &str, content: impl Into<String>) -> Self {
        self.set_view(path, content);
        self
    }

    /// Add or replace a view
    pub fn set_view(&self, path: &str, content: impl Into<String>) {
        let stamp = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut views) = self.views.write() {
            views.insert(normalize_path(path), (content.into(), stamp));
        }
    }

    pub fn remove_view(&self, path: &str) {
        if let Ok(mut views) = self.views.write() {
            views.remove(&normalize_path(path));
        }
    }
}

impl ViewFolder for InMemoryViewFolder {
    fn has_view(&self, path: &str) -> bool {
        self.views
            .read()
            .map(|views| views.contains_key(&normalize_path(path)))
            .unwrap_or(false)
    }

    fn list_views(&self, folder: &str) -> Vec<String> {
        let folder = normalize_path(folder);
        let folder = folder.trim_end_matches('/');
        match self.views.read() {
            Ok(views) => views
                .keys()
                .filter(|path| parent_folder(path) == folder)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn open_view(&self, path: &str) -> Result<ViewSource, FolderError> {
        let normalized = normalize_path(path);
        let entry = self
            .views
            .read()
            .ok()
            .and_then(|views| views.get(&normalized).cloned());
        match entry {
            Some((content, stamp)) => Ok(ViewSource::new(
                stamp,
                Box::new(Cursor::new(content.into_bytes())),
            )),
            None => Err(FolderError::NotFound { path: normalized }),
        }
    }

    fn last_modified(&self, path: &str) -> Option<u64> {
        self.views
            .read()
            .ok()
            .and_then(|views| views.get(&normalize_path(path)).map(|(_, stamp)| *stamp))
    }
}

/// Views read from a directory on disk
pub struct FileSystemViewFolder {
    root: PathBuf,
}

impl FileSystemViewFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in normalize_path(path).split('/').filter(|p| !p.is_empty()) {
            full.push(part);
        }
        full
    }
}

impl ViewFolder for FileSystemViewFolder {
    fn has_view(&self, path: &str) -> bool {
        self.full_path(path).is_file()
    }

    fn list_views(&self, folder: &str) -> Vec<String> {
        let folder = normalize_path(folder);
        let Ok(entries) = std::fs::read_dir(self.full_path(&folder)) else {
            return Vec::new();
        };
        let mut views: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .map(|name| join_path(&folder, &name))
            .collect();
        views.sort();
        views
    }

    fn open_view(&self, path: &str) -> Result<ViewSource, FolderError> {
        let full = self.full_path(path);
        if !full.is_file() {
            return Err(FolderError::NotFound {
                path: normalize_path(path),
            });
        }
        let io_error = |source| FolderError::Io {
            path: normalize_path(path),
            source,
        };
        let last_modified = self.last_modified(path).unwrap_or(0);
        let file = std::fs::File::open(&full).map_err(io_error)?;
        Ok(ViewSource::new(last_modified, Box::new(file)))
    }

    fn last_modified(&self, path: &str) -> Option<u64> {
        let modified = std::fs::metadata(self.full_path(path))
            .and_then(|meta| meta.modified())
            .ok()?;
        let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
        u64::try_from(since_epoch.as_millis()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_helpers() {
        assert_eq!(normalize_path(".\\home\\index.spark"), "home/index.spark");
        assert_eq!(parent_folder("home/index.spark"), "home");
        assert_eq!(parent_folder("index.spark"), "");
        assert_eq!(file_name("home/_menu.spark"), "_menu.spark");
        assert_eq!(join_path("", "Shared/x.spark"), "Shared/x.spark");
    }

    #[test]
    fn test_in_memory_folder() {
        let folder = InMemoryViewFolder::new()
            .with_view("home/index.spark", "<p/>")
            .with_view("home/_menu.spark", "menu")
            .with_view("Shared/_footer.spark", "footer");

        assert!(folder.has_view("home/index.spark"));
        assert!(!folder.has_view("home/missing.spark"));
        assert_eq!(
            folder.list_views("home"),
            vec!["home/_menu.spark".to_string(), "home/index.spark".to_string()]
        );
        let source = folder.open_view("home/_menu.spark").expect("open");
        assert_eq!(source.read_to_string("home/_menu.spark").expect("read"), "menu");
    }

    #[test]
    fn test_in_memory_timestamps_advance() {
        let folder = InMemoryViewFolder::new().with_view("a.spark", "1");
        let first = folder.last_modified("a.spark").expect("stamp");
        folder.set_view("a.spark", "2");
        let second = folder.last_modified("a.spark").expect("stamp");
        assert!(second > first);
    }

    #[test]
    fn test_missing_view_is_not_found() {
        let folder = InMemoryViewFolder::new();
        assert!(matches!(
            folder.open_view("nope.spark"),
            Err(FolderError::NotFound { .. })
        ));
    }
}
