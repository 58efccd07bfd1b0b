//! Playback handles
//!
//! A [`Slot`] is the engine-side record of one play request: its state
//! channel, cancellation token and the stop trigger of its backend voice.
//! [`PlaybackHandle`] is the caller's view of a slot.

use crate::backend::{Voice, VoiceStop};
use chime_common::{Error, EventBus, PlaybackEvent, PlaybackState, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub(crate) struct Slot {
    id: u32,
    state: watch::Sender<PlaybackState>,
    token: CancellationToken,
    voice: Mutex<Option<VoiceStop>>,
    events: Option<EventBus>,
}

impl Slot {
    pub(crate) fn new(id: u32, events: Option<EventBus>) -> Arc<Self> {
        let (state, _) = watch::channel(PlaybackState::Queued);
        if let Some(bus) = &events {
            bus.emit(PlaybackEvent::new(id, PlaybackState::Queued));
        }
        Arc::new(Self {
            id,
            state,
            token: CancellationToken::new(),
            voice: Mutex::new(None),
            events,
        })
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    /// Move to `next` if it is a legal successor; true if the state changed
    pub(crate) fn transition(&self, next: PlaybackState) -> bool {
        // Emit under the watch lock so bus order matches state order
        self.state.send_if_modified(|current| {
            if !current.can_transition_to(&next) {
                return false;
            }
            trace!("Playback {} -> {}", self.id, next);
            *current = next.clone();
            if let Some(bus) = &self.events {
                bus.emit(PlaybackEvent::new(self.id, next.clone()));
            }
            true
        })
    }

    /// Submit to the backend unless cancellation already won the voice lock
    pub(crate) fn start_voice<F>(&self, start: F) -> Result<Voice>
    where
        F: FnOnce() -> Result<Voice>,
    {
        let mut guard = self.voice.lock().unwrap_or_else(|e| e.into_inner());
        if self.token.is_cancelled() {
            return Err(Error::Canceled);
        }
        let voice = start()?;
        *guard = Some(voice.stop.clone());
        Ok(voice)
    }

    pub(crate) fn clear_voice(&self) {
        self.voice.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Cancel; false if the request had already finished
    pub(crate) fn cancel(&self) -> bool {
        if self.state.borrow().is_terminal() {
            return false;
        }
        self.token.cancel();
        if let Some(stop) = self.voice.lock().unwrap_or_else(|e| e.into_inner()).take() {
            stop.stop();
        }
        let canceled = self.transition(PlaybackState::Canceled);
        if canceled {
            debug!("Playback {} canceled", self.id);
        }
        canceled
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }
}

/// Caller-side handle on one play request
///
/// Cloning yields another handle on the same request.
#[derive(Clone)]
pub struct PlaybackHandle {
    slot: Arc<Slot>,
}

impl PlaybackHandle {
    pub(crate) fn new(slot: Arc<Slot>) -> Self {
        Self { slot }
    }

    /// Id, unique within the owning context
    pub fn id(&self) -> u32 {
        self.slot.id()
    }

    /// Current state
    pub fn state(&self) -> PlaybackState {
        self.slot.state()
    }

    pub fn is_finished(&self) -> bool {
        self.slot.state().is_terminal()
    }

    /// Cancel playback; a no-op once the request has finished
    pub fn cancel(&self) {
        self.slot.cancel();
    }

    /// Watch state changes
    pub fn watch(&self) -> watch::Receiver<PlaybackState> {
        self.slot.subscribe()
    }

    /// Wait for the terminal state
    pub async fn wait(&self) -> PlaybackState {
        let mut rx = self.slot.subscribe();
        let result = rx.wait_for(PlaybackState::is_terminal).await.map(|s| s.clone());
        // The slot owns the sender, so the channel cannot close while we hold it
        result.unwrap_or_else(|_| PlaybackState::Failed(Error::Internal("state channel closed".into())))
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
