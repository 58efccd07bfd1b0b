//! Audio sample handling: decoding, resampling and output rendering

pub mod decoder;
pub mod render;
pub mod resampler;
pub mod types;

pub use decoder::SampleDecoder;
pub use resampler::Resampler;
pub use types::{ChannelPosition, DecodedSample};
