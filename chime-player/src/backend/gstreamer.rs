//! GStreamer backend: raw PCM piped through a `gst-launch-1.0` pipeline

use super::process::{probe, spawn_pcm_player};
use super::{f32le_bytes, Backend, Driver, PlayRequest, Voice};
use crate::audio::render::{render, RenderParams};
use crate::audio::DecodedSample;
use async_trait::async_trait;
use chime_common::{EngineConfig, PropertySet, Result};
use std::sync::Arc;

const GST_LAUNCH: &str = "gst-launch-1.0";

pub struct GstreamerBackend;

#[async_trait]
impl Backend for GstreamerBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    async fn connect(&self, _config: &EngineConfig, _properties: &PropertySet) -> Result<Box<dyn Driver>> {
        probe(GST_LAUNCH, &["--version"]).await?;
        Ok(Box::new(GstreamerDriver))
    }
}

struct GstreamerDriver;

fn pipeline(sample_rate: u32, channels: u16, gain: f32) -> Vec<String> {
    vec![
        "-q".to_string(),
        "fdsrc".to_string(),
        "fd=0".to_string(),
        "!".to_string(),
        "rawaudioparse".to_string(),
        "format=pcm".to_string(),
        "pcm-format=f32le".to_string(),
        format!("sample-rate={}", sample_rate),
        format!("num-channels={}", channels),
        "!".to_string(),
        "audioconvert".to_string(),
        "!".to_string(),
        "audioresample".to_string(),
        "!".to_string(),
        "volume".to_string(),
        format!("volume={:.4}", gain),
        "!".to_string(),
        "autoaudiosink".to_string(),
    ]
}

impl Driver for GstreamerDriver {
    fn play(&self, sample: Arc<DecodedSample>, request: PlayRequest) -> Result<Voice> {
        // The pipeline has no channel-position control; render the forced
        // channel into a stereo frame instead.
        let (pcm, channels) = match request.force_channel {
            Some(position) => {
                let params = RenderParams {
                    channels: 2,
                    gain: 1.0,
                    force_channel: Some(position),
                };
                (render(&sample, params), 2)
            }
            None => (sample.samples.clone(), sample.channels),
        };

        let args = pipeline(sample.sample_rate, channels, request.gain());
        spawn_pcm_player(GST_LAUNCH, args, f32le_bytes(&pcm))
    }

    fn close(&self) {}
}
