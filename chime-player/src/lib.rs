//! # Chime Player
//!
//! Context-scoped sound-event playback engine.
//!
//! **Architecture:**
//! - `theme`: XDG sound theme resolution with inheritance and fallbacks
//! - `audio`: decoding (symphonia), resampling (rubato) and output rendering
//! - `playback`: contexts, handles, sound-event derivation and sample cache
//! - `backend`: PulseAudio, ALSA, GStreamer, OSS and null output drivers
//!
//! ```no_run
//! # async fn demo() -> chime_common::Result<()> {
//! use chime_common::{EngineConfig, Prop, PropertySet};
//! use chime_player::Context;
//!
//! let ctx = Context::new(EngineConfig::load(None)?)?;
//! let props = PropertySet::builder()
//!     .set(Prop::EventId, "bell")
//!     .set(Prop::EventDescription, "Bell rung")
//!     .build()?;
//! let handle = ctx.play(&props)?;
//! println!("{}", handle.wait().await);
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod backend;
pub mod convenience;
pub mod playback;
pub mod theme;

pub use chime_common::{Error, ErrorKind, EventBus, PlaybackEvent, PlaybackState, Prop, PropertySet, Result};
pub use convenience::{play, play_file};
pub use playback::{CacheControl, Context, PlaybackHandle};
pub use theme::ThemeResolver;
