//! Decoded sample cache
//!
//! Entries are keyed by (sound, theme, output profile) and reference counted
//! through [`CacheLease`]s. Loads are deduplicated per key: concurrent
//! requesters of one key share a single `OnceCell` and await the same load,
//! while requesters of other keys never wait on it.
//!
//! Retention follows the entry's [`CacheControl`] mode once its reference
//! count drops to zero:
//! - `never`: evicted immediately
//! - `volatile`: evicted after the idle window, or earlier under byte pressure
//!   (oldest idle first)
//! - `permanent`: kept until [`SampleCache::clear`]
//!
//! Failed loads leave nothing behind, so the next request decodes again.

use crate::audio::DecodedSample;
use chime_common::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

/// Cache-control mode, ordered from weakest to strongest retention
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheControl {
    Never,
    Volatile,
    Permanent,
}

impl CacheControl {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheControl::Never => "never",
            CacheControl::Volatile => "volatile",
            CacheControl::Permanent => "permanent",
        }
    }
}

impl FromStr for CacheControl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "never" => Ok(CacheControl::Never),
            "volatile" => Ok(CacheControl::Volatile),
            "permanent" => Ok(CacheControl::Permanent),
            other => Err(Error::InvalidArgument(format!(
                "Invalid cache-control '{}', expected permanent, volatile or never",
                other
            ))),
        }
    }
}

impl std::fmt::Display for CacheControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key: sound name plus the lookup context that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Event id, or `file:<path>` for direct file playback
    pub sound: String,
    pub theme: String,
    pub profile: String,
}

impl CacheKey {
    pub fn new(sound: impl Into<String>, theme: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            sound: sound.into(),
            theme: theme.into(),
            profile: profile.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}/{}", self.sound, self.theme, self.profile)
    }
}

struct Entry {
    cell: Arc<OnceCell<Arc<DecodedSample>>>,
    mode: CacheControl,
    refs: usize,
    inserted: Instant,
    last_used: Instant,
    bytes: u64,
}

impl Entry {
    fn new(mode: CacheControl) -> Self {
        let now = Instant::now();
        Self {
            cell: Arc::new(OnceCell::new()),
            mode,
            refs: 0,
            inserted: now,
            last_used: now,
            bytes: 0,
        }
    }

    fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

#[derive(Default)]
struct CacheTable {
    entries: HashMap<CacheKey, Entry>,
    bytes: u64,
}

impl CacheTable {
    fn remove(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.bytes = self.bytes.saturating_sub(entry.bytes);
            trace!("Evicted {} ({} bytes, {})", key, entry.bytes, entry.mode);
        }
    }

    fn release(&mut self, key: &CacheKey) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        entry.last_used = Instant::now();

        if entry.refs == 0 && (entry.mode == CacheControl::Never || !entry.is_loaded()) {
            self.remove(key);
        }
    }

    fn evict_stale(&mut self, idle: Duration) -> usize {
        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.mode == CacheControl::Volatile && e.refs == 0 && e.last_used.elapsed() >= idle)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.remove(key);
        }
        stale.len()
    }

    fn evict_over_budget(&mut self, budget: u64) -> usize {
        let mut evicted = 0;
        while self.bytes > budget {
            let victim = self
                .entries
                .iter()
                .filter(|(_, e)| e.mode == CacheControl::Volatile && e.refs == 0 && e.is_loaded())
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match victim {
                Some(key) => {
                    self.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub loaded: usize,
    pub bytes: u64,
    pub permanent: usize,
    pub volatile: usize,
    pub never: usize,
}

struct Shared {
    table: Mutex<CacheTable>,
    budget: u64,
    idle: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CacheTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Reference-counted decoded sample cache
#[derive(Clone)]
pub struct SampleCache {
    shared: Arc<Shared>,
}

impl SampleCache {
    /// Create a cache with a byte budget and volatile idle window
    pub fn new(budget_bytes: u64, volatile_idle: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(CacheTable::default()),
                budget: budget_bytes,
                idle: volatile_idle,
            }),
        }
    }

    /// Fetch a sample, running `loader` only if no load for `key` has
    /// succeeded or is in flight.
    ///
    /// A stronger `mode` upgrades an existing entry. Loader failures are
    /// returned to the caller and not cached.
    pub async fn get_or_load<F, Fut>(&self, key: CacheKey, mode: CacheControl, loader: F) -> Result<CacheLease>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DecodedSample>>,
    {
        let cell = {
            let mut table = self.shared.lock();
            let entry = table.entries.entry(key.clone()).or_insert_with(|| Entry::new(mode));
            entry.refs += 1;
            entry.last_used = Instant::now();
            if mode > entry.mode {
                debug!("Upgrading cache entry {} from {} to {}", key, entry.mode, mode);
                entry.mode = mode;
            }
            Arc::clone(&entry.cell)
        };

        // Releases the reference if this future is dropped or the load fails
        let mut pending = PendingRef {
            shared: Arc::clone(&self.shared),
            key: Some(key),
        };

        let sample = cell
            .get_or_try_init(|| async move { loader().await.map(Arc::new) })
            .await?
            .clone();

        let key = pending.key.take().ok_or_else(|| Error::Internal("cache key taken twice".into()))?;
        {
            let mut table = self.shared.lock();
            let mut added = 0;
            if let Some(entry) = table.entries.get_mut(&key) {
                if entry.bytes == 0 {
                    entry.bytes = sample.byte_size();
                    added = entry.bytes;
                }
            }
            table.bytes += added;
            if added > 0 {
                debug!("Cached {} ({} bytes, total {})", key, added, table.bytes);
                table.evict_over_budget(self.shared.budget);
            }
        }

        Ok(CacheLease {
            shared: Arc::clone(&self.shared),
            key: Some(key),
            sample,
        })
    }

    /// Explicitly release a lease (equivalent to dropping it)
    pub fn release(&self, lease: CacheLease) {
        drop(lease);
    }

    /// True if a decoded sample for `key` is resident
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.shared.lock().entries.get(key).map(Entry::is_loaded).unwrap_or(false)
    }

    /// Retention mode of the entry for `key`, if any
    pub fn mode(&self, key: &CacheKey) -> Option<CacheControl> {
        self.shared.lock().entries.get(key).map(|e| e.mode)
    }

    /// Current reference count of `key`
    pub fn refs(&self, key: &CacheKey) -> usize {
        self.shared.lock().entries.get(key).map(|e| e.refs).unwrap_or(0)
    }

    /// Age of the entry for `key` since it was first requested
    pub fn age(&self, key: &CacheKey) -> Option<Duration> {
        self.shared.lock().entries.get(key).map(|e| e.inserted.elapsed())
    }

    /// Evict unreferenced volatile entries idle longer than the window
    pub fn sweep(&self) -> usize {
        let evicted = self.shared.lock().evict_stale(self.shared.idle);
        if evicted > 0 {
            debug!("Swept {} stale volatile samples", evicted);
        }
        evicted
    }

    /// Evict volatile entries until the byte budget is met
    pub fn relieve_pressure(&self) -> usize {
        self.shared.lock().evict_over_budget(self.shared.budget)
    }

    /// Drop every unreferenced entry, permanent ones included
    pub fn clear(&self) -> usize {
        let mut table = self.shared.lock();
        let idle: Vec<CacheKey> = table
            .entries
            .iter()
            .filter(|(_, e)| e.refs == 0)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &idle {
            table.remove(key);
        }
        debug!("Cleared {} cached samples", idle.len());
        idle.len()
    }

    pub fn stats(&self) -> CacheStats {
        let table = self.shared.lock();
        let mut stats = CacheStats {
            entries: table.entries.len(),
            bytes: table.bytes,
            ..Default::default()
        };
        for entry in table.entries.values() {
            if entry.is_loaded() {
                stats.loaded += 1;
            }
            match entry.mode {
                CacheControl::Permanent => stats.permanent += 1,
                CacheControl::Volatile => stats.volatile += 1,
                CacheControl::Never => stats.never += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct PendingRef {
    shared: Arc<Shared>,
    key: Option<CacheKey>,
}

impl Drop for PendingRef {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.shared.lock().release(&key);
        }
    }
}

/// Shared handle on a cached sample; releases its reference on drop
pub struct CacheLease {
    shared: Arc<Shared>,
    key: Option<CacheKey>,
    sample: Arc<DecodedSample>,
}

impl CacheLease {
    pub fn sample(&self) -> &Arc<DecodedSample> {
        &self.sample
    }

    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }
}

impl std::fmt::Debug for CacheLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLease")
            .field("key", &self.key)
            .field("frames", &self.sample.frames())
            .finish()
    }
}

impl Drop for CacheLease {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.shared.lock().release(&key);
        }
    }
}
