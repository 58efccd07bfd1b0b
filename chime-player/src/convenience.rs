//! One-shot playback helpers
//!
//! Each call creates a context from the default configuration (config file
//! and environment), submits one sound and hands both back so the caller can
//! wait on or cancel it. Dropping the context cancels the sound.

use crate::playback::{Context, PlaybackHandle};
use chime_common::props::Prop;
use chime_common::{EngineConfig, PropertySet, Result};
use std::path::Path;

/// Play a sound event with a fresh default context
pub fn play(properties: &PropertySet) -> Result<(Context, PlaybackHandle)> {
    let context = Context::new(EngineConfig::load(None)?)?;
    let handle = context.play(properties)?;
    Ok((context, handle))
}

/// Play a sound file
///
/// An `event.id` in `properties` is kept and still takes precedence; the file
/// plays when there is no id or the theme has no sound for it.
pub fn play_file(path: impl AsRef<Path>, properties: &PropertySet) -> Result<(Context, PlaybackHandle)> {
    let filename = path.as_ref().to_string_lossy().into_owned();
    play(&properties.with(Prop::MediaFilename, filename)?)
}
