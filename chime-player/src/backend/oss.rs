//! OSS backend
//!
//! Writes unsigned 8-bit mono PCM at 8 kHz, the format an OSS device starts in
//! after open, so no ioctl configuration is needed.

use super::{Backend, Driver, PlayRequest, Voice, VoiceStop};
use crate::audio::{DecodedSample, Resampler};
use async_trait::async_trait;
use chime_common::{EngineConfig, Error, PropertySet, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_DEVICE: &str = "/dev/dsp";

const DEVICE_RATE: u32 = 8000;

/// Bytes written between cancellation checks (1/16 s)
const CHUNK: usize = 512;

pub struct OssBackend {
    device: PathBuf,
}

impl OssBackend {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self { device: device.into() }
    }
}

impl Default for OssBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}

fn open_device(device: &Path) -> Result<std::fs::File> {
    OpenOptions::new().write(true).open(device).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NoDriver(format!("{} not present", device.display())),
        _ => Error::System(format!("Cannot open {}: {}", device.display(), e)),
    })
}

#[async_trait]
impl Backend for OssBackend {
    fn name(&self) -> &str {
        "oss"
    }

    async fn connect(&self, _config: &EngineConfig, _properties: &PropertySet) -> Result<Box<dyn Driver>> {
        let device = self.device.clone();
        tokio::task::spawn_blocking(move || open_device(&device).map(drop))
            .await
            .map_err(|e| Error::Internal(format!("OSS probe task failed: {}", e)))??;

        debug!("OSS device {} writable", self.device.display());
        Ok(Box::new(OssDriver {
            device: self.device.clone(),
        }))
    }
}

struct OssDriver {
    device: PathBuf,
}

/// Mono u8 PCM at the device rate
fn to_device_format(sample: &DecodedSample, gain: f32) -> Result<Vec<u8>> {
    let mono = sample.to_mono();
    let resampled = Resampler::resample(&mono, sample.sample_rate, DEVICE_RATE, 1)?;
    Ok(resampled
        .iter()
        .map(|v| (((v * gain).clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8)
        .collect())
}

impl Driver for OssDriver {
    fn play(&self, sample: Arc<DecodedSample>, request: PlayRequest) -> Result<Voice> {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let stop_token = token.clone();
        let device = self.device.clone();
        let gain = request.gain();

        tokio::task::spawn_blocking(move || {
            let result = (|| {
                let pcm = to_device_format(&sample, gain)?;
                let mut file = open_device(&device)?;
                for chunk in pcm.chunks(CHUNK) {
                    if token.is_cancelled() {
                        return Err(Error::Canceled);
                    }
                    file.write_all(chunk)
                        .map_err(|e| Error::System(format!("Write to {} failed: {}", device.display(), e)))?;
                }
                Ok(())
            })();
            let _ = tx.send(result);
        });

        Ok(Voice::new(VoiceStop::new(move || stop_token.cancel()), rx))
    }

    fn close(&self) {}
}
