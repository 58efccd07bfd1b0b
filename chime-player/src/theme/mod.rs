//! XDG sound theme resolution
//!
//! Maps an event id to candidate sound files by walking a theme, its
//! `Inherits` chain and finally the `freedesktop` fallback theme. Theme indexes
//! load lazily on first use and stay cached until explicitly invalidated.
//!
//! All methods perform blocking directory I/O; async callers run them under
//! `spawn_blocking`.

pub mod index;

pub use index::{IndexFile, ThemeIndex};

use chime_common::config::DEFAULT_THEME;
use chime_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Ordered, restartable sequence of candidate files for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidates {
    /// Theme that supplied the candidates
    pub theme: String,
    /// Event id that matched (may be a shortened form of the requested id)
    pub event_id: String,
    paths: Vec<PathBuf>,
}

impl Candidates {
    pub fn new(theme: impl Into<String>, event_id: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            theme: theme.into(),
            event_id: event_id.into(),
            paths,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Candidates that exist and can be opened, checked lazily in order
    pub fn readable(&self) -> impl Iterator<Item = &PathBuf> + '_ {
        self.paths.iter().filter(|p| std::fs::File::open(p).is_ok())
    }

    /// First existing, readable candidate
    pub fn first_readable(&self) -> Result<PathBuf> {
        self.readable().next().cloned().ok_or_else(|| {
            Error::NotFound(format!(
                "No readable file for '{}' in theme '{}'",
                self.event_id, self.theme
            ))
        })
    }
}

/// Event id followed by its progressively shortened forms
///
/// `dialog-error-serious` → `dialog-error` → `dialog`
pub fn event_id_fallbacks(event_id: &str) -> Vec<&str> {
    let mut names = vec![event_id];
    let mut current = event_id;
    while let Some((head, _)) = current.rsplit_once('-') {
        if head.is_empty() {
            break;
        }
        names.push(head);
        current = head;
    }
    names
}

/// Lazily loading, caching theme resolver
pub struct ThemeResolver {
    search_dirs: Vec<PathBuf>,
    themes: RwLock<HashMap<String, Arc<ThemeIndex>>>,
}

impl ThemeResolver {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        debug!("Theme resolver search dirs: {:?}", search_dirs);
        Self {
            search_dirs,
            themes: RwLock::new(HashMap::new()),
        }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Index for `name`, loading it on first request
    pub fn index(&self, name: &str) -> Arc<ThemeIndex> {
        if let Some(index) = self.read_themes().get(name) {
            return Arc::clone(index);
        }

        let loaded = Arc::new(ThemeIndex::load(name, &self.search_dirs));
        let mut themes = self.themes.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(themes.entry(name.to_string()).or_insert(loaded))
    }

    /// Drop one cached theme index so the next lookup reloads it
    pub fn invalidate(&self, name: &str) {
        let mut themes = self.themes.write().unwrap_or_else(|e| e.into_inner());
        if themes.remove(name).is_some() {
            debug!("Invalidated sound theme '{}'", name);
        }
    }

    pub fn invalidate_all(&self) {
        self.themes.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Names of themes currently cached
    pub fn loaded_themes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_themes().keys().cloned().collect();
        names.sort();
        names
    }

    fn read_themes(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ThemeIndex>>> {
        self.themes.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve an event id to candidate files.
    ///
    /// # Errors
    /// - `Corrupt` when the inheritance chain loops back onto itself
    /// - `Disabled` when the first theme mentioning the event disables it
    /// - `NotFound` when no theme in the chain (nor the fallback) has it
    pub fn resolve(&self, event_id: &str, theme: &str, profile: &str) -> Result<Candidates> {
        if event_id.is_empty() {
            return Err(Error::InvalidArgument("Empty event id".to_string()));
        }
        let theme = if theme.is_empty() { DEFAULT_THEME } else { theme };

        for name in event_id_fallbacks(event_id) {
            if let Some(found) = self.lookup(name, theme, profile)? {
                if name != event_id {
                    debug!("Event '{}' resolved via fallback id '{}'", event_id, name);
                }
                return Ok(found);
            }
        }

        Err(Error::NotFound(format!(
            "No sound for event '{}' in theme '{}'",
            event_id, theme
        )))
    }

    /// Walk `theme`, its ancestors, then the default theme
    fn lookup(&self, event_id: &str, theme: &str, profile: &str) -> Result<Option<Candidates>> {
        let mut visited = HashSet::new();
        if let Some(found) = self.walk(theme, event_id, profile, &mut visited)? {
            return Ok(Some(found));
        }
        if !visited.contains(DEFAULT_THEME) {
            return self.walk(DEFAULT_THEME, event_id, profile, &mut visited);
        }
        Ok(None)
    }

    /// Depth-first walk of an inheritance chain with an explicit stack.
    ///
    /// A theme met again while it is still on the current path is a cycle; a
    /// theme already finished through another branch is skipped.
    fn walk(
        &self,
        root: &str,
        event_id: &str,
        profile: &str,
        visited: &mut HashSet<String>,
    ) -> Result<Option<Candidates>> {
        let mut path: Vec<(Arc<ThemeIndex>, usize)> = Vec::new();
        let mut pending = Some(root.to_string());

        loop {
            if let Some(name) = pending.take() {
                if path.iter().any(|(index, _)| index.name == name) {
                    let chain: Vec<&str> = path.iter().map(|(i, _)| i.name.as_str()).collect();
                    warn!("Sound theme inheritance cycle: {:?} -> {}", chain, name);
                    return Err(Error::Corrupt(format!(
                        "Theme inheritance cycle through '{}'",
                        name
                    )));
                }
                if visited.insert(name.clone()) {
                    let index = self.index(&name);
                    if index.is_disabled(event_id) {
                        return Err(Error::Disabled(format!(
                            "Event '{}' disabled by theme '{}'",
                            event_id, name
                        )));
                    }
                    let paths = index.candidates(event_id, profile);
                    if !paths.is_empty() {
                        return Ok(Some(Candidates::new(name, event_id, paths)));
                    }
                    path.push((index, 0));
                }
            }

            let Some((index, next)) = path.last_mut() else {
                return Ok(None);
            };
            match index.inherits.get(*next) {
                Some(parent) => {
                    pending = Some(parent.clone());
                    *next += 1;
                }
                None => {
                    path.pop();
                }
            }
        }
    }
}
