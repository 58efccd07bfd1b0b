//! Sound theme index loading
//!
//! A theme lives in `<sound-dir>/<name>/`. Its `index.theme` is an INI-style
//! file:
//!
//! ```text
//! [Sound Theme]
//! Name=Ocean
//! Inherits=freedesktop
//! Directories=stereo,5.1
//!
//! [stereo]
//! OutputProfile=stereo
//!
//! [5.1]
//! OutputProfile=5.1
//! ```
//!
//! Each listed directory is scanned for `<event-id>.<ext>` files; an
//! `<event-id>.disabled` file marks the event as deliberately silent. Themes
//! without an `index.theme` are scanned at their root and in `stereo/`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const INDEX_FILE: &str = "index.theme";

const THEME_SECTION: &str = "Sound Theme";

/// Extension marking an event as disabled
const DISABLED_EXT: &str = "disabled";

/// Preferred formats, best first; anything else sorts after these
const FORMAT_ORDER: [&str; 3] = ["oga", "ogg", "wav"];

/// One sound file offered by a theme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub profile: String,
    pub path: PathBuf,
    /// Position of the sound dir it came from; earlier dirs win
    pub root: usize,
    /// Position of its directory in `Directories`
    pub directory: usize,
}

/// A theme directory declared in `index.theme`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeDirectory {
    pub subdir: String,
    pub profile: String,
}

/// Parsed `index.theme` header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFile {
    pub display_name: Option<String>,
    pub inherits: Vec<String>,
    pub directories: Vec<ThemeDirectory>,
}

impl IndexFile {
    /// Parse the INI-style contents of an `index.theme` file
    pub fn parse(content: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(name.trim().to_string());
                sections.entry(name.trim().to_string()).or_default();
                continue;
            }
            if let (Some(section), Some((key, value))) = (current.as_ref(), line.split_once('=')) {
                sections
                    .entry(section.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let header = sections.get(THEME_SECTION);
        let list = |key: &str| -> Vec<String> {
            header
                .and_then(|h| h.get(key))
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };

        let directories = list("Directories")
            .into_iter()
            .map(|subdir| {
                let profile = sections
                    .get(&subdir)
                    .and_then(|s| s.get("OutputProfile"))
                    .cloned()
                    .unwrap_or_else(|| chime_common::config::DEFAULT_OUTPUT_PROFILE.to_string());
                ThemeDirectory { subdir, profile }
            })
            .collect();

        Self {
            display_name: header.and_then(|h| h.get("Name")).cloned(),
            inherits: list("Inherits"),
            directories,
        }
    }
}

/// Event id → candidate files for one theme, merged across all sound dirs
#[derive(Debug, Clone, Default)]
pub struct ThemeIndex {
    pub name: String,
    pub inherits: Vec<String>,
    entries: HashMap<String, Vec<Candidate>>,
    disabled: HashSet<String>,
}

impl ThemeIndex {
    /// Index with no entries and no parents
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Load a theme from every search dir that contains it.
    ///
    /// Performs blocking directory I/O. A theme found nowhere yields an empty
    /// index rather than an error.
    pub fn load(name: &str, search_dirs: &[PathBuf]) -> Self {
        let roots: Vec<PathBuf> = search_dirs
            .iter()
            .map(|d| d.join(name))
            .filter(|d| d.is_dir())
            .collect();

        if roots.is_empty() {
            debug!("Sound theme '{}' not found in any search dir", name);
            return Self::empty(name);
        }

        let header = roots.iter().find_map(|root| {
            let path = root.join(INDEX_FILE);
            match std::fs::read_to_string(&path) {
                Ok(content) => Some(IndexFile::parse(&content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    warn!("Unreadable theme index {}: {}", path.display(), e);
                    None
                }
            }
        });

        let directories = match &header {
            Some(h) if !h.directories.is_empty() => h.directories.clone(),
            _ => vec![
                ThemeDirectory {
                    subdir: String::new(),
                    profile: chime_common::config::DEFAULT_OUTPUT_PROFILE.to_string(),
                },
                ThemeDirectory {
                    subdir: "stereo".to_string(),
                    profile: chime_common::config::DEFAULT_OUTPUT_PROFILE.to_string(),
                },
            ],
        };

        let mut index = Self {
            name: name.to_string(),
            inherits: header.map(|h| h.inherits).unwrap_or_default(),
            ..Default::default()
        };

        for (root_pos, root) in roots.iter().enumerate() {
            for (dir_pos, dir) in directories.iter().enumerate() {
                let path = if dir.subdir.is_empty() {
                    root.clone()
                } else {
                    root.join(&dir.subdir)
                };
                index.scan_directory(&path, &dir.profile, root_pos, dir_pos);
            }
        }

        // Profile rank is applied per lookup on top of this stable order
        for candidates in index.entries.values_mut() {
            candidates.sort_by(|a, b| {
                a.root
                    .cmp(&b.root)
                    .then_with(|| format_rank(&a.path).cmp(&format_rank(&b.path)))
                    .then_with(|| a.directory.cmp(&b.directory))
                    .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
            });
        }

        debug!(
            "Loaded sound theme '{}': {} events, inherits {:?}",
            name,
            index.entries.len(),
            index.inherits
        );
        index
    }

    fn scan_directory(&mut self, dir: &Path, profile: &str, root: usize, directory: usize) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.file_name().and_then(|n| n.to_str()) == Some(INDEX_FILE) {
                continue;
            }
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|e| e.to_str()),
            ) else {
                continue;
            };

            if ext == DISABLED_EXT {
                self.disabled.insert(stem.to_string());
                continue;
            }

            self.entries.entry(stem.to_string()).or_default().push(Candidate {
                profile: profile.to_string(),
                path: path.clone(),
                root,
                directory,
            });
        }
    }

    pub fn is_disabled(&self, event_id: &str) -> bool {
        self.disabled.contains(event_id)
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.entries.contains_key(event_id)
    }

    pub fn event_count(&self) -> usize {
        self.entries.len()
    }

    /// Candidate paths for an event, best match first
    ///
    /// Tie-break order: exact profile, then `stereo`, then anything else.
    pub fn candidates(&self, event_id: &str, profile: &str) -> Vec<PathBuf> {
        let Some(entries) = self.entries.get(event_id) else {
            return Vec::new();
        };

        let default_profile = chime_common::config::DEFAULT_OUTPUT_PROFILE;
        let rank = |c: &Candidate| {
            if c.profile == profile {
                0
            } else if c.profile == default_profile {
                1
            } else {
                2
            }
        };

        let mut ordered: Vec<&Candidate> = entries.iter().collect();
        ordered.sort_by_key(|c| rank(c));
        ordered.into_iter().map(|c| c.path.clone()).collect()
    }
}

fn format_rank(path: &Path) -> usize {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    FORMAT_ORDER
        .iter()
        .position(|f| *f == ext)
        .unwrap_or(FORMAT_ORDER.len())
}
