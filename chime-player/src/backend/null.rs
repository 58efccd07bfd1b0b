//! Null backend: discards audio, completes after the sample's duration

use super::{Backend, Driver, PlayRequest, Voice, VoiceStop};
use crate::audio::DecodedSample;
use async_trait::async_trait;
use chime_common::{EngineConfig, Error, PropertySet, Result};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub struct NullBackend;

#[async_trait]
impl Backend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    async fn connect(&self, _config: &EngineConfig, _properties: &PropertySet) -> Result<Box<dyn Driver>> {
        Ok(Box::new(NullDriver))
    }
}

struct NullDriver;

impl Driver for NullDriver {
    fn play(&self, sample: Arc<DecodedSample>, request: PlayRequest) -> Result<Voice> {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let duration = sample.duration();
        let stop_token = token.clone();

        trace!("Null voice {} for {:?}", request.id, duration);
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = tokio::time::sleep(duration) => Ok(()),
                _ = token.cancelled() => Err(Error::Canceled),
            };
            let _ = tx.send(result);
        });

        Ok(Voice::new(VoiceStop::new(move || stop_token.cancel()), rx))
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request() -> PlayRequest {
        PlayRequest {
            id: 7,
            properties: PropertySet::new(),
            volume_db: 0.0,
            force_channel: None,
        }
    }

    #[tokio::test]
    async fn test_completes_after_duration() {
        let driver = NullBackend
            .connect(&EngineConfig::default(), &PropertySet::new())
            .await
            .unwrap();
        // 10ms at 8kHz
        let sample = Arc::new(DecodedSample::new("/tmp/x.wav", vec![0.0; 80], 8000, 1));
        let voice = driver.play(sample, request()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), voice.finished).await.unwrap();
        assert_eq!(result.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_stop_cancels() {
        let driver = NullBackend
            .connect(&EngineConfig::default(), &PropertySet::new())
            .await
            .unwrap();
        let sample = Arc::new(DecodedSample::new("/tmp/x.wav", vec![0.0; 80_000], 8000, 1));
        let voice = driver.play(sample, request()).unwrap();
        voice.stop.stop();
        let result = tokio::time::timeout(Duration::from_secs(2), voice.finished).await.unwrap();
        assert_eq!(result.unwrap(), Err(Error::Canceled));
    }
}
