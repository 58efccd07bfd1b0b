//! PulseAudio backend
//!
//! Streams decoded PCM to `pacat`. Sound-server properties travel as
//! `--property` arguments, so the server sees the same event metadata a native
//! client would send. Binary properties cannot be expressed on a command line
//! and are dropped.

use super::process::{probe, spawn_pcm_player};
use super::{f32le_bytes, Backend, Driver, PlayRequest, Voice};
use crate::audio::DecodedSample;
use async_trait::async_trait;
use chime_common::props::{Prop, PropValue};
use chime_common::{EngineConfig, PropertySet, Result};
use std::sync::Arc;
use tracing::debug;

const PACAT: &str = "pacat";
const PACTL: &str = "pactl";

/// PulseAudio's `PA_VOLUME_NORM`
const VOLUME_NORM: f64 = 65536.0;

/// Upper bound accepted by the server (`PA_VOLUME_MAX`)
const VOLUME_MAX: f64 = (u32::MAX / 2) as f64;

pub struct PulseBackend;

#[async_trait]
impl Backend for PulseBackend {
    fn name(&self) -> &str {
        "pulse"
    }

    async fn connect(&self, config: &EngineConfig, properties: &PropertySet) -> Result<Box<dyn Driver>> {
        probe(PACTL, &["info"]).await?;

        let client_name = properties
            .text(Prop::ApplicationName)
            .map(String::from)
            .or_else(|| config.application_name.clone())
            .unwrap_or_else(|| "chime".to_string());
        debug!("PulseAudio server reachable, client name '{}'", client_name);

        Ok(Box::new(PulseDriver { client_name }))
    }
}

struct PulseDriver {
    client_name: String,
}

impl PulseDriver {
    fn arguments(&self, sample: &DecodedSample, channels: u16, request: &PlayRequest) -> Vec<String> {
        let mut args = vec![
            "--playback".to_string(),
            "--raw".to_string(),
            "--format=float32le".to_string(),
            format!("--rate={}", sample.sample_rate),
            format!("--channels={}", channels),
            format!("--client-name={}", self.client_name),
            format!("--volume={}", volume_from_db(request.volume_db)),
        ];

        if let Some(position) = request.force_channel {
            args.push(format!("--channel-map={}", position.as_str()));
        }

        let stream_name = request
            .properties
            .text(Prop::MediaName)
            .or_else(|| request.properties.text(Prop::EventId))
            .unwrap_or("chime");
        args.push(format!("--stream-name={}", stream_name));

        for (key, value) in request.properties.iter() {
            if let PropValue::Text(text) = value {
                args.push(format!("--property={}={}", key, text));
            }
        }
        args
    }
}

impl Driver for PulseDriver {
    fn play(&self, sample: Arc<DecodedSample>, request: PlayRequest) -> Result<Voice> {
        // A forced channel plays the mono downmix on that single position
        let (pcm, channels) = match request.force_channel {
            Some(_) => (sample.to_mono(), 1),
            None => (sample.samples.clone(), sample.channels),
        };
        let args = self.arguments(&sample, channels, &request);
        spawn_pcm_player(PACAT, args, f32le_bytes(&pcm))
    }

    fn close(&self) {
        debug!("PulseAudio client '{}' closed", self.client_name);
    }
}

/// Software volume for a dB adjustment, using PulseAudio's cubic mapping
fn volume_from_db(db: f32) -> u32 {
    if db.is_infinite() && db < 0.0 {
        return 0;
    }
    let linear = 10f64.powf(db as f64 / 20.0);
    (linear.cbrt() * VOLUME_NORM).round().clamp(0.0, VOLUME_MAX) as u32
}
