//! Output backends
//!
//! A [`Backend`] knows how to reach one audio subsystem. Connecting yields a
//! [`Driver`], wrapped in a [`Connection`] guard that closes it on every exit
//! path. [`connect_first`] walks the configured priority order and falls
//! through backends that report `NoDriver` or `System`.
//!
//! Drivers never block the caller: `play` only submits the sample and returns
//! a [`Voice`] whose `finished` channel resolves when output ends.

pub mod alsa;
pub mod gstreamer;
pub mod null;
pub mod oss;
mod process;
pub mod pulse;

use crate::audio::{ChannelPosition, DecodedSample};
use async_trait::async_trait;
use chime_common::config::BackendKind;
use chime_common::{EngineConfig, Error, PropertySet, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub use alsa::AlsaBackend;
pub use gstreamer::GstreamerBackend;
pub use null::NullBackend;
pub use oss::OssBackend;
pub use pulse::PulseBackend;

/// Per-voice output parameters handed to a driver
#[derive(Debug, Clone)]
pub struct PlayRequest {
    /// Playback handle id
    pub id: u32,
    /// Properties for the sound server, control keys removed
    pub properties: PropertySet,
    pub volume_db: f32,
    pub force_channel: Option<ChannelPosition>,
}

impl PlayRequest {
    /// Linear gain for `volume_db`
    pub fn gain(&self) -> f32 {
        crate::audio::render::db_to_linear(self.volume_db)
    }
}

/// Idempotent stop trigger for a running voice
#[derive(Clone)]
pub struct VoiceStop {
    stopped: Arc<AtomicBool>,
    action: Arc<dyn Fn() + Send + Sync>,
}

impl VoiceStop {
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            action: Arc::new(action),
        }
    }

    /// Stop the voice; later calls do nothing
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            (self.action)();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for VoiceStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceStop").field("stopped", &self.is_stopped()).finish()
    }
}

/// A sample submitted to a driver
#[derive(Debug)]
pub struct Voice {
    pub stop: VoiceStop,
    /// Resolves with `Ok` on natural end, an error otherwise
    pub finished: oneshot::Receiver<Result<()>>,
}

impl Voice {
    pub fn new(stop: VoiceStop, finished: oneshot::Receiver<Result<()>>) -> Self {
        Self { stop, finished }
    }
}

/// Entry point to one audio subsystem
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Open a driver
    ///
    /// # Errors
    /// - `NoDriver` when the subsystem is not present
    /// - `System` when it is present but refuses the connection
    async fn connect(&self, config: &EngineConfig, properties: &PropertySet) -> Result<Box<dyn Driver>>;
}

/// Open connection to an audio subsystem
pub trait Driver: Send + Sync {
    /// Begin output of `sample`. Only submission happens on the caller.
    fn play(&self, sample: Arc<DecodedSample>, request: PlayRequest) -> Result<Voice>;

    /// Release the connection; called exactly once by [`Connection`]
    fn close(&self);
}

/// Scoped driver connection, closed on drop
pub struct Connection {
    backend: String,
    driver: Box<dyn Driver>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(backend: impl Into<String>, driver: Box<dyn Driver>) -> Self {
        Self {
            backend: backend.into(),
            driver,
            closed: AtomicBool::new(false),
        }
    }

    /// Name of the backend that produced this connection
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn play(&self, sample: Arc<DecodedSample>, request: PlayRequest) -> Result<Voice> {
        if self.is_closed() {
            return Err(Error::Disconnected(format!("{} connection closed", self.backend)));
        }
        self.driver.play(sample, request)
    }

    /// Close the driver; idempotent
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing {} connection", self.backend);
            self.driver.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.backend)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Built-in backend for `kind`
pub fn create(kind: BackendKind) -> Arc<dyn Backend> {
    match kind {
        BackendKind::Pulse => Arc::new(PulseBackend),
        BackendKind::Alsa => Arc::new(AlsaBackend),
        BackendKind::Gstreamer => Arc::new(GstreamerBackend),
        BackendKind::Oss => Arc::new(OssBackend::default()),
        BackendKind::Null => Arc::new(NullBackend),
    }
}

/// Built-in backends in the configured priority order
pub fn from_config(config: &EngineConfig) -> Vec<Arc<dyn Backend>> {
    config.backend_order().into_iter().map(create).collect()
}

/// Connect to the first backend that accepts
///
/// Unavailable backends (`NoDriver`, `System`) are skipped; any other error
/// aborts the search. Running out of backends yields `NoDriver`.
pub async fn connect_first(
    backends: &[Arc<dyn Backend>],
    config: &EngineConfig,
    properties: &PropertySet,
) -> Result<Connection> {
    let mut tried = Vec::with_capacity(backends.len());

    for backend in backends {
        match backend.connect(config, properties).await {
            Ok(driver) => {
                info!("Connected to {} backend", backend.name());
                return Ok(Connection::new(backend.name(), driver));
            }
            Err(e) if e.is_driver_unavailable() => {
                debug!("Backend {} unavailable: {}", backend.name(), e);
                tried.push(format!("{} ({})", backend.name(), e));
            }
            Err(e) => {
                warn!("Backend {} failed: {}", backend.name(), e);
                return Err(e);
            }
        }
    }

    Err(Error::NoDriver(if tried.is_empty() {
        "No backends configured".to_string()
    } else {
        format!("No usable backend: {}", tried.join(", "))
    }))
}

/// Interleaved f32 samples as little-endian bytes
pub(crate) fn f32le_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Refusing(&'static str, Error);

    #[async_trait]
    impl Backend for Refusing {
        fn name(&self) -> &str {
            self.0
        }

        async fn connect(&self, _: &EngineConfig, _: &PropertySet) -> Result<Box<dyn Driver>> {
            Err(self.1.clone())
        }
    }

    struct CountingDriver(Arc<AtomicUsize>);

    impl Driver for CountingDriver {
        fn play(&self, _: Arc<DecodedSample>, _: PlayRequest) -> Result<Voice> {
            Err(Error::NotSupported("test driver".into()))
        }

        fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_fallback_skips_unavailable() {
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::new(Refusing("a", Error::NoDriver("missing".into()))),
            Arc::new(Refusing("b", Error::System("refused".into()))),
            Arc::new(NullBackend),
        ];
        let conn = connect_first(&backends, &EngineConfig::default(), &PropertySet::new())
            .await
            .unwrap();
        assert_eq!(conn.backend(), "null");
    }

    #[tokio::test]
    async fn test_fallback_exhausted_is_no_driver() {
        let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(Refusing("a", Error::System("refused".into())))];
        let err = connect_first(&backends, &EngineConfig::default(), &PropertySet::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), chime_common::ErrorKind::NoDriver);
    }

    #[tokio::test]
    async fn test_other_errors_abort_fallback() {
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::new(Refusing("a", Error::Access("denied".into()))),
            Arc::new(NullBackend),
        ];
        let err = connect_first(&backends, &EngineConfig::default(), &PropertySet::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), chime_common::ErrorKind::Access);
    }

    #[test]
    fn test_connection_closes_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let conn = Connection::new("test", Box::new(CountingDriver(Arc::clone(&closes))));
        conn.close();
        conn.close();
        drop(conn);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_connection_refuses_play() {
        let closes = Arc::new(AtomicUsize::new(0));
        let conn = Connection::new("test", Box::new(CountingDriver(closes)));
        conn.close();
        let sample = Arc::new(DecodedSample::new("/tmp/x.wav", vec![0.0; 8], 8000, 1));
        let request = PlayRequest {
            id: 1,
            properties: PropertySet::new(),
            volume_db: 0.0,
            force_channel: None,
        };
        let err = conn.play(sample, request).unwrap_err();
        assert_eq!(err.kind(), chime_common::ErrorKind::Disconnected);
    }

    #[test]
    fn test_voice_stop_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stop = VoiceStop::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        stop.clone().stop();
        stop.stop();
        assert!(stop.is_stopped());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_config_order() {
        let config = EngineConfig {
            driver: Some(BackendKind::Null),
            ..Default::default()
        };
        let names: Vec<String> = from_config(&config).iter().map(|b| b.name().to_string()).collect();
        assert_eq!(names, vec!["null", "pulse", "alsa", "gstreamer", "oss"]);
    }
}
