//! ALSA backend using cpal
//!
//! Uses cpal's ALSA host where it exists and the platform default host
//! elsewhere. cpal streams are not `Send`, so every voice gets a dedicated
//! output thread that owns its stream for the voice's lifetime.

use super::{Backend, Driver, PlayRequest, Voice, VoiceStop};
use crate::audio::render::{render, RenderParams};
use crate::audio::{DecodedSample, Resampler};
use async_trait::async_trait;
use chime_common::{EngineConfig, Error, PropertySet, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Host, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Output thread poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Extra time after the last sample so the device drains its buffer
const DRAIN_TIME: Duration = Duration::from_millis(50);

pub struct AlsaBackend;

#[cfg(any(target_os = "linux", target_os = "dragonfly", target_os = "freebsd", target_os = "netbsd"))]
fn host() -> Result<Host> {
    cpal::host_from_id(cpal::HostId::Alsa).map_err(|e| Error::NoDriver(format!("ALSA host unavailable: {}", e)))
}

#[cfg(not(any(target_os = "linux", target_os = "dragonfly", target_os = "freebsd", target_os = "netbsd")))]
fn host() -> Result<Host> {
    Ok(cpal::default_host())
}

fn open_device() -> Result<(Device, StreamConfig, SampleFormat)> {
    let device = host()?
        .default_output_device()
        .ok_or_else(|| Error::NoDriver("No default output device found".to_string()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| Error::System(format!("Failed to get default config: {}", e)))?;

    Ok((device, supported.config(), supported.sample_format()))
}

#[async_trait]
impl Backend for AlsaBackend {
    fn name(&self) -> &str {
        "alsa"
    }

    async fn connect(&self, _config: &EngineConfig, _properties: &PropertySet) -> Result<Box<dyn Driver>> {
        let (name, config, format) = tokio::task::spawn_blocking(|| {
            let (device, config, format) = open_device()?;
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            Ok::<_, Error>((name, config, format))
        })
        .await
        .map_err(|e| Error::Internal(format!("ALSA probe task failed: {}", e)))??;

        info!(
            "Using audio device {}: {} Hz, {} channels, {:?}",
            name, config.sample_rate.0, config.channels, format
        );
        Ok(Box::new(AlsaDriver))
    }
}

struct AlsaDriver;

impl Driver for AlsaDriver {
    fn play(&self, sample: Arc<DecodedSample>, request: PlayRequest) -> Result<Voice> {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let stop_token = token.clone();

        std::thread::Builder::new()
            .name(format!("chime-alsa-{}", request.id))
            .spawn(move || {
                let result = run_voice(&sample, &request, &token);
                let _ = tx.send(result);
            })
            .map_err(|e| Error::System(format!("Failed to start output thread: {}", e)))?;

        Ok(Voice::new(VoiceStop::new(move || stop_token.cancel()), rx))
    }

    fn close(&self) {}
}

/// Shared cursor over the rendered voice
struct Playhead {
    samples: Vec<f32>,
    position: AtomicUsize,
    finished: AtomicBool,
    failed: AtomicBool,
}

impl Playhead {
    fn fill<T: SizedSample + FromSample<f32>>(&self, data: &mut [T]) {
        let start = self.position.fetch_add(data.len(), Ordering::Relaxed);
        for (i, slot) in data.iter_mut().enumerate() {
            let value = self.samples.get(start + i).copied().unwrap_or(0.0);
            *slot = T::from_sample(value);
        }
        if start + data.len() >= self.samples.len() {
            self.finished.store(true, Ordering::SeqCst);
        }
    }
}

fn run_voice(sample: &DecodedSample, request: &PlayRequest, token: &CancellationToken) -> Result<()> {
    let (device, config, format) = open_device()?;

    let device_rate = config.sample_rate.0;
    let resampled = Resampler::resample(&sample.samples, sample.sample_rate, device_rate, sample.channels)?;
    let converted = DecodedSample::new(&sample.source, resampled, device_rate, sample.channels);
    let params = RenderParams {
        channels: config.channels,
        gain: request.gain(),
        force_channel: request.force_channel,
    };

    let playhead = Arc::new(Playhead {
        samples: render(&converted, params),
        position: AtomicUsize::new(0),
        finished: AtomicBool::new(false),
        failed: AtomicBool::new(false),
    });

    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, &playhead)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, &playhead)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, &playhead)?,
        other => {
            return Err(Error::System(format!("Unsupported sample format: {:?}", other)));
        }
    };

    stream
        .play()
        .map_err(|e| Error::System(format!("Failed to start stream: {}", e)))?;
    debug!("Voice {} started on output thread", request.id);

    loop {
        if token.is_cancelled() {
            return Err(Error::Canceled);
        }
        if playhead.failed.load(Ordering::SeqCst) {
            return Err(Error::System("Audio stream error".to_string()));
        }
        if playhead.finished.load(Ordering::SeqCst) {
            std::thread::sleep(DRAIN_TIME);
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn build_stream<T: SizedSample + FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    playhead: &Arc<Playhead>,
) -> Result<Stream> {
    let data_head = Arc::clone(playhead);
    let error_head = Arc::clone(playhead);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| data_head.fill(data),
            move |err| {
                error!("Audio stream error: {}", err);
                error_head.failed.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::System(format!("Failed to build stream: {}", e)))
}
