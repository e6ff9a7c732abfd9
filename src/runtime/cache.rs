//! Output cache: expiry policies, change signals and the in-memory cache
//! service

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::trace;

use super::context::CacheMemento;

/// Source of the current time, as a duration since the Unix epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            millis: AtomicU64::new(start.as_millis() as u64),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, now: Duration) {
        self.millis.store(now.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// When a cached fragment stops being valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheExpires {
    #[default]
    Never,
    /// At a fixed time since the Unix epoch
    Absolute(Duration),
    /// A fixed time after it was stored
    Relative(Duration),
    /// A fixed time after it was last used
    Sliding(Duration),
}

impl CacheExpires {
    pub fn seconds(seconds: u64) -> Self {
        CacheExpires::Relative(Duration::from_secs(seconds))
    }
}

type Listener = Box<dyn Fn() + Send + Sync>;

/// Change notification for cached fragments
///
/// Firing bumps the version; entries stored under an older version are
/// evicted the next time they are looked up.
#[derive(Default)]
pub struct CacheSignal {
    version: AtomicU64,
    listeners: Mutex<Vec<Listener>>,
}

impl CacheSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn on_changed(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    pub fn fire(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener();
        }
    }
}

impl fmt::Debug for CacheSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSignal")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Storage for cached fragments, shared across renders
pub trait CacheService: Send + Sync {
    fn get(&self, identifier: &str) -> Option<Arc<CacheMemento>>;

    fn store(
        &self,
        identifier: &str,
        expires: CacheExpires,
        signal: Option<Arc<CacheSignal>>,
        item: Arc<CacheMemento>,
    );
}

struct Entry {
    item: Arc<CacheMemento>,
    expires_at: Option<Duration>,
    sliding: Option<Duration>,
    signal: Option<(Arc<CacheSignal>, u64)>,
}

impl Entry {
    fn is_valid(&self, now: Duration) -> bool {
        let expired = self.expires_at.is_some_and(|at| now >= at);
        let signalled = self
            .signal
            .as_ref()
            .is_some_and(|(signal, version)| signal.version() != *version);
        !expired && !signalled
    }
}

pub struct InMemoryCacheService {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for InMemoryCacheService {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryCacheService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored entries, valid or not
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheService for InMemoryCacheService {
    fn get(&self, identifier: &str) -> Option<Arc<CacheMemento>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get_mut(identifier)?;
        if !entry.is_valid(now) {
            trace!(identifier, "evicting cache entry");
            entries.remove(identifier);
            return None;
        }
        if let Some(sliding) = entry.sliding {
            entry.expires_at = Some(now + sliding);
        }
        Some(entry.item.clone())
    }

    fn store(
        &self,
        identifier: &str,
        expires: CacheExpires,
        signal: Option<Arc<CacheSignal>>,
        item: Arc<CacheMemento>,
    ) {
        let now = self.clock.now();
        let (expires_at, sliding) = match expires {
            CacheExpires::Never => (None, None),
            CacheExpires::Absolute(at) => (Some(at), None),
            CacheExpires::Relative(after) => (Some(now + after), None),
            CacheExpires::Sliding(after) => (Some(now + after), Some(after)),
        };
        let entry = Entry {
            item,
            expires_at,
            sliding,
            signal: signal.map(|s| {
                let version = s.version();
                (s, version)
            }),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identifier.to_string(), entry);
    }
}
