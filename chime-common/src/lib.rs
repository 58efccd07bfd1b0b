//! # Chime Common Library
//!
//! Shared vocabulary for the Chime sound-event engine and its clients:
//! - Error taxonomy with libcanberra-compatible codes
//! - Sound event properties (`PropertySet`)
//! - Engine configuration loading
//! - Playback state and event types

pub mod config;
pub mod error;
pub mod events;
pub mod props;

pub use config::{BackendKind, EngineConfig};
pub use error::{Error, ErrorKind, Result};
pub use events::{EventBus, PlaybackEvent, PlaybackState};
pub use props::{Prop, PropKey, PropValue, PropertySet};
