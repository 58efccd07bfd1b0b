//! Derivation of a [`SoundEvent`] from the properties of a play call

use super::sample_cache::{CacheControl, CacheKey};
use crate::audio::ChannelPosition;
use chime_common::props::Prop;
use chime_common::{EngineConfig, Error, PropertySet, Result};
use std::path::PathBuf;

/// Where the sound comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundSource {
    /// Theme lookup by event id; `fallback` is used when the lookup finds nothing
    Event { id: String, fallback: Option<PathBuf> },
    /// Direct file playback
    File(PathBuf),
}

/// Everything the engine needs to know about one play call
#[derive(Debug, Clone, PartialEq)]
pub struct SoundEvent {
    pub source: SoundSource,
    pub cache_control: CacheControl,
    pub volume_db: f32,
    pub force_channel: Option<ChannelPosition>,
    pub theme: String,
    pub profile: String,
}

impl SoundEvent {
    /// Derive the event from merged properties
    ///
    /// `default_cache` applies when `canberra.cache-control` is absent.
    pub fn from_properties(props: &PropertySet, default_cache: CacheControl, config: &EngineConfig) -> Result<Self> {
        if !is_enabled(props)? {
            return Err(Error::Disabled("canberra.enable is off".to_string()));
        }

        let filename = props.text(Prop::MediaFilename).map(PathBuf::from);
        let source = match (props.text(Prop::EventId), filename) {
            (Some(id), fallback) => SoundSource::Event {
                id: id.to_string(),
                fallback,
            },
            (None, Some(path)) => SoundSource::File(path),
            (None, None) => {
                return Err(Error::InvalidArgument(
                    "Either event.id or media.filename is required".to_string(),
                ))
            }
        };

        let cache_control = match props.text(Prop::CacheControl) {
            Some(value) => value.parse()?,
            None => default_cache,
        };

        let volume_db = match props.text(Prop::Volume) {
            Some(value) => parse_volume(value)?,
            None => 0.0,
        };

        let force_channel = props.text(Prop::ForceChannel).map(str::parse).transpose()?;

        let theme = props
            .text(Prop::XdgThemeName)
            .map(String::from)
            .unwrap_or_else(|| config.theme.clone());
        let profile = props
            .text(Prop::XdgThemeOutputProfile)
            .map(String::from)
            .unwrap_or_else(|| config.output_profile.clone());

        Ok(Self {
            source,
            cache_control,
            volume_db,
            force_channel,
            theme,
            profile,
        })
    }

    /// Cache key; file playback does not depend on theme or profile
    pub fn cache_key(&self) -> CacheKey {
        match &self.source {
            SoundSource::Event { id, .. } => CacheKey::new(id.as_str(), self.theme.as_str(), self.profile.as_str()),
            SoundSource::File(path) => CacheKey::new(format!("file:{}", path.display()), "", ""),
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match &self.source {
            SoundSource::Event { id, .. } => format!("event '{}'", id),
            SoundSource::File(path) => format!("file {}", path.display()),
        }
    }
}

/// Value of `canberra.enable`; absent means enabled
pub fn is_enabled(props: &PropertySet) -> Result<bool> {
    match props.text(Prop::Enable) {
        None => Ok(true),
        Some(value) => parse_enable(value),
    }
}

pub fn parse_enable(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(Error::InvalidArgument(format!("Invalid canberra.enable '{}'", other))),
    }
}

fn parse_volume(value: &str) -> Result<f32> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::InvalidArgument(format!("Invalid canberra.volume '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_common::ErrorKind;

    fn derive(pairs: &[(&str, &str)]) -> Result<SoundEvent> {
        let props = PropertySet::from_pairs(pairs.iter().copied())?;
        SoundEvent::from_properties(&props, CacheControl::Never, &EngineConfig::default())
    }

    #[test]
    fn test_event_defaults() {
        let event = derive(&[("event.id", "bell")]).unwrap();
        assert_eq!(
            event.source,
            SoundSource::Event {
                id: "bell".into(),
                fallback: None
            }
        );
        assert_eq!(event.cache_control, CacheControl::Never);
        assert_eq!(event.volume_db, 0.0);
        assert_eq!(event.force_channel, None);
        assert_eq!(event.theme, "freedesktop");
        assert_eq!(event.profile, "stereo");
    }

    #[test]
    fn test_controls_parsed() {
        let event = derive(&[
            ("event.id", "bell"),
            ("media.filename", "/tmp/bell.wav"),
            ("canberra.cache-control", "permanent"),
            ("canberra.volume", "-6.5"),
            ("canberra.force_channel", "front-left"),
            ("canberra.xdg-theme.name", "ocean"),
            ("canberra.xdg-theme.output-profile", "5.1"),
        ])
        .unwrap();
        assert_eq!(
            event.source,
            SoundSource::Event {
                id: "bell".into(),
                fallback: Some(PathBuf::from("/tmp/bell.wav"))
            }
        );
        assert_eq!(event.cache_control, CacheControl::Permanent);
        assert_eq!(event.volume_db, -6.5);
        assert_eq!(event.force_channel, Some(ChannelPosition::FrontLeft));
        assert_eq!(event.cache_key(), CacheKey::new("bell", "ocean", "5.1"));
    }

    #[test]
    fn test_file_only() {
        let event = derive(&[("media.filename", "/tmp/click.wav")]).unwrap();
        assert_eq!(event.source, SoundSource::File(PathBuf::from("/tmp/click.wav")));
        assert_eq!(event.cache_key().sound, "file:/tmp/click.wav");
    }

    #[test]
    fn test_missing_source_is_invalid() {
        let err = derive(&[("media.name", "Bell")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_malformed_controls_are_invalid() {
        for (key, value) in [
            ("canberra.cache-control", "sometimes"),
            ("canberra.volume", "loud"),
            ("canberra.volume", "inf"),
            ("canberra.force_channel", "behind"),
            ("canberra.enable", "maybe"),
        ] {
            let err = derive(&[("event.id", "bell"), (key, value)]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}={}", key, value);
        }
    }

    #[test]
    fn test_disabled() {
        let err = derive(&[("event.id", "bell"), ("canberra.enable", "0")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disabled);
        assert!(derive(&[("event.id", "bell"), ("canberra.enable", "yes")]).is_ok());
    }
}
