//! Sound event properties
//!
//! A [`PropertySet`] describes one sound event: what to play (`event.id`,
//! `media.filename`), who asked for it (`application.*`, `window.*`), and how
//! the engine should treat it (the `canberra.*` control keys). Sets are
//! immutable; every "with extra property" operation returns a new set.
//!
//! Keys outside the well-known enumeration are kept as [`PropKey::Custom`] and
//! passed through untouched to backends and cache.

use crate::{Error, Result};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

macro_rules! well_known_props {
    ($( $(#[$meta:meta])* $variant:ident => $name:literal $(, $flag:ident)* ;)*) => {
        /// Well-known property names
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Prop {
            $( $(#[$meta])* $variant, )*
        }

        impl Prop {
            /// Every well-known property, in declaration order
            pub const ALL: &'static [Prop] = &[ $( Prop::$variant, )* ];

            /// Canonical dotted name, e.g. `event.id`
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Prop::$variant => $name, )*
                }
            }

            fn flags(self) -> &'static [PropFlag] {
                match self {
                    $( Prop::$variant => &[ $( PropFlag::$flag, )* ], )*
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropFlag {
    /// Value is binary (PNG icon data)
    Binary,
    /// Value must not be empty
    Required,
    /// Engine control key, stripped before reaching a sound server
    Control,
}

well_known_props! {
    /// Name describing the media being played
    MediaName => "media.name";
    MediaTitle => "media.title";
    MediaArtist => "media.artist";
    /// POSIX locale string such as `de_DE`
    MediaLanguage => "media.language";
    /// File the media can be loaded from
    MediaFilename => "media.filename", Required;
    /// Icon in binary PNG format
    MediaIcon => "media.icon", Binary;
    MediaIconName => "media.icon_name";
    /// `event` for event sounds; `music`, `video`, `game`, ... otherwise
    MediaRole => "media.role";
    /// Textual id as mandated by the XDG sound naming scheme
    EventId => "event.id", Required;
    EventDescription => "event.description";
    EventMouseX => "event.mouse.x";
    EventMouseY => "event.mouse.y";
    EventMouseHpos => "event.mouse.hpos";
    EventMouseVpos => "event.mouse.vpos";
    EventMouseButton => "event.mouse.button";
    WindowName => "window.name";
    WindowId => "window.id";
    WindowIcon => "window.icon", Binary;
    WindowIconName => "window.icon_name";
    WindowX => "window.x";
    WindowY => "window.y";
    WindowWidth => "window.width";
    WindowHeight => "window.height";
    WindowHpos => "window.hpos";
    WindowVpos => "window.vpos";
    /// Comma separated desktop indexes; empty means sticky
    WindowDesktop => "window.desktop";
    WindowX11Display => "window.x11.display";
    WindowX11Screen => "window.x11.screen";
    WindowX11Monitor => "window.x11.monitor";
    WindowX11Xid => "window.x11.xid";
    ApplicationName => "application.name";
    ApplicationId => "application.id";
    ApplicationVersion => "application.version";
    ApplicationIcon => "application.icon", Binary;
    ApplicationIconName => "application.icon_name";
    ApplicationLanguage => "application.language";
    ApplicationProcessId => "application.process.id";
    ApplicationProcessBinary => "application.process.binary";
    ApplicationProcessUser => "application.process.user";
    ApplicationProcessHost => "application.process.host";
    /// `permanent`, `volatile` or `never`
    CacheControl => "canberra.cache-control", Required, Control;
    /// Decibel adjustment, 0 dB being the default volume
    Volume => "canberra.volume", Required, Control;
    XdgThemeName => "canberra.xdg-theme.name", Required, Control;
    XdgThemeOutputProfile => "canberra.xdg-theme.output-profile", Required, Control;
    /// `1` or unset plays sounds, `0` disables every play call
    Enable => "canberra.enable", Required, Control;
    /// Channel position to force the sound onto
    ForceChannel => "canberra.force_channel", Required, Control;
}

impl Prop {
    /// Binary-only property (icon data)
    pub fn is_binary(self) -> bool {
        self.flags().contains(&PropFlag::Binary)
    }

    /// Engine control property (`canberra.*`)
    pub fn is_control(self) -> bool {
        self.flags().contains(&PropFlag::Control)
    }

    /// Empty values are rejected for this property
    pub fn requires_value(self) -> bool {
        self.flags().contains(&PropFlag::Required)
    }
}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Prop {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Prop::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown property '{}'", s)))
    }
}

/// Property key: well-known name or an opaque extension
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropKey {
    Known(Prop),
    Custom(String),
}

impl PropKey {
    /// Parse a dotted name, falling back to a custom key for unknown names
    pub fn parse(name: &str) -> Self {
        match Prop::from_str(name) {
            Ok(prop) => PropKey::Known(prop),
            Err(_) => PropKey::Custom(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PropKey::Known(p) => p.as_str(),
            PropKey::Custom(s) => s.as_str(),
        }
    }

    pub fn known(&self) -> Option<Prop> {
        match self {
            PropKey::Known(p) => Some(*p),
            PropKey::Custom(_) => None,
        }
    }

    fn is_control(&self) -> bool {
        self.known().map(Prop::is_control).unwrap_or(false)
    }
}

impl From<Prop> for PropKey {
    fn from(p: Prop) -> Self {
        PropKey::Known(p)
    }
}

impl From<&str> for PropKey {
    fn from(s: &str) -> Self {
        PropKey::parse(s)
    }
}

impl From<String> for PropKey {
    fn from(s: String) -> Self {
        PropKey::parse(&s)
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Property value: UTF-8 text or a binary blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropValue {
    Text(String),
    Binary(Vec<u8>),
}

impl PropValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(s) => Some(s.as_str()),
            PropValue::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PropValue::Text(s) => s.as_bytes(),
            PropValue::Binary(b) => b.as_slice(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Text(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Text(s)
    }
}

impl From<&String> for PropValue {
    fn from(s: &String) -> Self {
        PropValue::Text(s.clone())
    }
}

impl From<Vec<u8>> for PropValue {
    fn from(b: Vec<u8>) -> Self {
        PropValue::Binary(b)
    }
}

impl From<&[u8]> for PropValue {
    fn from(b: &[u8]) -> Self {
        PropValue::Binary(b.to_vec())
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(s) => write!(f, "\"{}\"", s.escape_default()),
            PropValue::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Check a single key/value pair
///
/// Text keys accept binary values only when they are valid UTF-8; such values
/// are normalized to text on insertion.
pub fn validate(key: &PropKey, value: &PropValue) -> Result<()> {
    match key {
        PropKey::Custom(name) => {
            if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(Error::InvalidArgument(format!(
                    "Invalid property name '{}'",
                    name.escape_default()
                )));
            }
        }
        PropKey::Known(prop) => {
            if prop.is_binary() && matches!(value, PropValue::Text(_)) {
                return Err(Error::InvalidArgument(format!(
                    "Property '{}' takes binary data",
                    prop
                )));
            }
            if !prop.is_binary() {
                if let PropValue::Binary(b) = value {
                    if std::str::from_utf8(b).is_err() {
                        return Err(Error::InvalidArgument(format!(
                            "Property '{}' takes UTF-8 text",
                            prop
                        )));
                    }
                }
            }
            if prop.requires_value() && value.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "Property '{}' must not be empty",
                    prop
                )));
            }
        }
    }
    Ok(())
}

fn normalize(key: &PropKey, value: PropValue) -> PropValue {
    match (key.known(), value) {
        (Some(prop), PropValue::Binary(bytes)) if !prop.is_binary() => match String::from_utf8(bytes) {
            Ok(text) => PropValue::Text(text),
            Err(e) => PropValue::Binary(e.into_bytes()),
        },
        (_, value) => value,
    }
}

/// Immutable, insertion-ordered property mapping
///
/// Lookup ignores order; equality compares contents only. Order is kept for
/// diagnostics ([`fmt::Display`] and JSON serialization).
#[derive(Debug, Clone, Default)]
pub struct PropertySet {
    entries: Vec<(PropKey, PropValue)>,
}

impl PropertySet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> PropertySetBuilder {
        PropertySetBuilder::default()
    }

    /// Build a set from key/value pairs; later duplicates win
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<PropKey>,
        V: Into<PropValue>,
    {
        pairs
            .into_iter()
            .fold(Self::builder(), |b, (k, v)| b.set(k, v))
            .build()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: impl Into<PropKey>) -> Option<&PropValue> {
        let key = key.into();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Text value of a property, if present and textual
    pub fn text(&self, key: impl Into<PropKey>) -> Option<&str> {
        self.get(key).and_then(PropValue::as_text)
    }

    pub fn contains(&self, key: impl Into<PropKey>) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropKey, &PropValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// New set with `key` set to `value`
    pub fn with(&self, key: impl Into<PropKey>, value: impl Into<PropValue>) -> Result<Self> {
        let key = key.into();
        let value = value.into();
        validate(&key, &value)?;
        let value = normalize(&key, value);

        let mut entries = self.entries.clone();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => entries.push((key, value)),
        }
        Ok(Self { entries })
    }

    /// New set without `key`
    pub fn without(&self, key: impl Into<PropKey>) -> Self {
        let key = key.into();
        Self {
            entries: self.entries.iter().filter(|(k, _)| *k != key).cloned().collect(),
        }
    }

    /// Combine `base` with `overrides`; overrides win on collision
    ///
    /// Keys of `base` keep their position, new keys from `overrides` are
    /// appended in their own order.
    pub fn merge(base: &PropertySet, overrides: &PropertySet) -> PropertySet {
        let mut entries = base.entries.clone();
        for (key, value) in &overrides.entries {
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value.clone(),
                None => entries.push((key.clone(), value.clone())),
            }
        }
        PropertySet { entries }
    }

    /// Properties suitable for handing to a sound server (control keys removed)
    pub fn for_backend(&self) -> PropertySet {
        PropertySet {
            entries: self.entries.iter().filter(|(k, _)| !k.is_control()).cloned().collect(),
        }
    }
}

impl PartialEq for PropertySet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k.clone()) == Some(v))
    }
}

impl Eq for PropertySet {}

impl fmt::Display for PropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{} = {}", key, value)?;
        }
        Ok(())
    }
}

impl Serialize for PropertySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            match value {
                PropValue::Text(s) => map.serialize_entry(key.as_str(), s)?,
                PropValue::Binary(b) => map.serialize_entry(key.as_str(), b)?,
            }
        }
        map.end()
    }
}

/// Accumulates properties and validates them once in [`PropertySetBuilder::build`]
#[derive(Debug, Default)]
pub struct PropertySetBuilder {
    entries: Vec<(PropKey, PropValue)>,
}

impl PropertySetBuilder {
    pub fn set(mut self, key: impl Into<PropKey>, value: impl Into<PropValue>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn build(self) -> Result<PropertySet> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (key, value) in self.entries {
            validate(&key, &value)?;
            let value = normalize(&key, value);
            entries.push((key, value));
        }
        Ok(PropertySet { entries })
    }
}
