//! Playback state and event types
//!
//! Every play request owns one [`PlaybackState`] that only moves forward:
//!
//! ```text
//! Queued → Resolving → Loading → Playing → { Completed | Canceled | Failed }
//! ```
//!
//! Cancellation and failure may happen from any non-terminal state. Observers
//! learn about transitions through the [`EventBus`].

use crate::Error;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tokio::sync::broadcast;

/// Lifecycle state of one play request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    /// Accepted, waiting for the engine task
    Queued,
    /// Theme lookup in progress
    Resolving,
    /// Decoding or waiting on an in-flight load of the same sound
    Loading,
    /// Submitted to the backend
    Playing,
    Completed,
    Canceled,
    Failed(Error),
}

impl PlaybackState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackState::Completed | PlaybackState::Canceled | PlaybackState::Failed(_)
        )
    }

    /// Lowercase state name
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Queued => "queued",
            PlaybackState::Resolving => "resolving",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Completed => "completed",
            PlaybackState::Canceled => "canceled",
            PlaybackState::Failed(_) => "failed",
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            PlaybackState::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PlaybackState::Queued => 0,
            PlaybackState::Resolving => 1,
            PlaybackState::Loading => 2,
            PlaybackState::Playing => 3,
            _ => 4,
        }
    }

    /// Whether `next` is a legal successor of `self`
    ///
    /// Terminal states have no successors. Non-terminal states may skip ahead
    /// (a cache hit skips `Resolving`) but never move back.
    pub fn can_transition_to(&self, next: &PlaybackState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            PlaybackState::Canceled | PlaybackState::Failed(_) => true,
            PlaybackState::Completed => matches!(self, PlaybackState::Playing),
            _ => next.rank() > self.rank(),
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Failed(e) => write!(f, "failed ({})", e),
            other => f.write_str(other.name()),
        }
    }
}

impl Serialize for PlaybackState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let error = self.error();
        let len = if error.is_some() { 3 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("state", self.name())?;
        if let Some(e) = error {
            map.serialize_entry("error", &e.kind())?;
            map.serialize_entry("detail", &e.detail())?;
        }
        map.end()
    }
}

/// State transition notification for one play request
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackEvent {
    /// Handle id, unique within its context
    pub id: u32,
    #[serde(flatten)]
    pub state: PlaybackState,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PlaybackEvent {
    pub fn new(id: u32, state: PlaybackState) -> Self {
        Self {
            id,
            state,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Fan-out of playback events to any number of subscribers
///
/// Publishing never blocks; subscribers that fall behind observe
/// `RecvError::Lagged` and skip ahead.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlaybackEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: PlaybackEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
