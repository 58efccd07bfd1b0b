//! Backend double for context tests
//!
//! Records connects, plays, stops and closes. Voices either complete right
//! away or, when held, run until stopped.

use async_trait::async_trait;
use chime_common::{EngineConfig, Error, PropertySet, Result};
use chime_player::audio::DecodedSample;
use chime_player::backend::{Backend, Driver, PlayRequest, Voice, VoiceStop};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Shared call log and behaviour switches
#[derive(Default)]
pub struct BackendScript {
    pub connects: AtomicUsize,
    pub plays: AtomicUsize,
    pub stops: AtomicUsize,
    pub closes: AtomicUsize,
    /// Voices run until stopped instead of completing
    pub hold: AtomicBool,
    /// Voices never report back, even when stopped
    pub hang: AtomicBool,
    pub connect_error: Mutex<Option<Error>>,
    pub connect_delay: Mutex<Option<Duration>>,
    pub last_request: Mutex<Option<PlayRequest>>,
}

impl BackendScript {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct ScriptedBackend {
    name: String,
    pub script: Arc<BackendScript>,
}

impl ScriptedBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Arc::new(BackendScript::default()),
        }
    }

    /// Backend whose voices run until stopped
    pub fn holding(name: &str) -> Self {
        let backend = Self::new(name);
        backend.script.hold.store(true, Ordering::SeqCst);
        backend
    }

    /// Backend that refuses to connect with `error`
    pub fn failing(name: &str, error: Error) -> Self {
        let backend = Self::new(name);
        *backend.script.connect_error.lock().unwrap() = Some(error);
        backend
    }

    /// Backend whose connect takes `delay`
    pub fn slow(name: &str, delay: Duration) -> Self {
        let backend = Self::new(name);
        *backend.script.connect_delay.lock().unwrap() = Some(delay);
        backend
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, _config: &EngineConfig, _properties: &PropertySet) -> Result<Box<dyn Driver>> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.script.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let error = self.script.connect_error.lock().unwrap().clone();
        if let Some(error) = error {
            return Err(error);
        }
        Ok(Box::new(ScriptedDriver {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedDriver {
    script: Arc<BackendScript>,
}

impl Driver for ScriptedDriver {
    fn play(&self, _sample: Arc<DecodedSample>, request: PlayRequest) -> Result<Voice> {
        self.script.plays.fetch_add(1, Ordering::SeqCst);
        *self.script.last_request.lock().unwrap() = Some(request);

        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let stop_token = token.clone();
        let script = Arc::clone(&self.script);

        if self.script.hang.load(Ordering::SeqCst) {
            // Keep the sender alive forever without answering
            tokio::spawn(async move {
                let _tx = tx;
                std::future::pending::<()>().await;
            });
        } else if self.script.hold.load(Ordering::SeqCst) {
            tokio::spawn(async move {
                token.cancelled().await;
                let _ = tx.send(Err(Error::Canceled));
            });
        } else {
            let _ = tx.send(Ok(()));
        }

        Ok(Voice::new(
            VoiceStop::new(move || {
                script.stops.fetch_add(1, Ordering::SeqCst);
                stop_token.cancel();
            }),
            rx,
        ))
    }

    fn close(&self) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}
