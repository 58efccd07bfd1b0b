//! Playback engine: contexts, handles, sound-event derivation and the
//! decoded-sample cache

pub mod context;
pub mod handle;
pub mod request;
pub mod sample_cache;

pub use context::Context;
pub use handle::PlaybackHandle;
pub use request::{SoundEvent, SoundSource};
pub use sample_cache::{CacheControl, CacheKey, CacheLease, CacheStats, SampleCache};
