//! Playback context
//!
//! A [`Context`] owns one backend connection, the decoded-sample cache, the
//! table of live playback handles and the properties merged into every play
//! call. Each accepted play request runs as one task on the context's Tokio
//! runtime:
//!
//! 1. connect the backend if no connection is open
//! 2. fetch the sample from the cache, resolving and decoding on a miss
//! 3. submit it to the driver
//! 4. wait for the natural end, cancellation or the watchdog
//!
//! Only pre-flight validation fails synchronously; everything after that is
//! reported through the handle's terminal state.

use super::handle::{PlaybackHandle, Slot};
use super::request::{is_enabled, SoundEvent, SoundSource};
use super::sample_cache::{CacheControl, CacheLease, CacheStats, SampleCache};
use crate::audio::{DecodedSample, SampleDecoder};
use crate::backend::{self, Backend, Connection, PlayRequest};
use crate::theme::ThemeResolver;
use chime_common::config::BackendKind;
use chime_common::props::Prop;
use chime_common::{EngineConfig, Error, EventBus, PlaybackEvent, PlaybackState, PropertySet, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Playback event channel depth
const EVENT_CAPACITY: usize = 256;

/// Floor for the volatile-cache sweep interval
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(100);

/// Sound-event playback context
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: Handle,
    config: EngineConfig,
    resolver: Arc<ThemeResolver>,
    cache: SampleCache,
    events: EventBus,
    globals: RwLock<PropertySet>,
    backends: RwLock<Vec<Arc<dyn Backend>>>,
    connection: Mutex<Option<Arc<Connection>>>,
    handles: RwLock<HashMap<u32, Arc<Slot>>>,
    next_id: AtomicU32,
    destroyed: AtomicBool,
}

impl Context {
    /// Create a context with the built-in backends in configured order
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let backends = backend::from_config(&config);
        Self::with_backends(config, backends)
    }

    /// Create a context that tries `backends` in order
    pub fn with_backends(config: EngineConfig, backends: Vec<Arc<dyn Backend>>) -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|_| Error::State("A Tokio runtime is required".to_string()))?;

        let globals = PropertySet::merge(&process_properties(), &config.global_properties()?);
        let resolver = Arc::new(ThemeResolver::new(config.sound_search_dirs()));
        let cache = SampleCache::new(config.cache_budget_bytes, config.volatile_idle());

        debug!(
            "Context created: theme '{}', backends {:?}",
            config.theme,
            backends.iter().map(|b| b.name().to_string()).collect::<Vec<_>>()
        );

        let inner = Arc::new(Inner {
            runtime,
            config,
            resolver,
            cache,
            events: EventBus::new(EVENT_CAPACITY),
            globals: RwLock::new(globals),
            backends: RwLock::new(backends),
            connection: Mutex::new(None),
            handles: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            destroyed: AtomicBool::new(false),
        });
        spawn_cache_sweeper(&inner);

        Ok(Self { inner })
    }

    /// Play a sound event
    ///
    /// Returns as soon as the request is accepted.
    ///
    /// # Errors
    /// - `Destroyed` after [`Context::destroy`]
    /// - `Disabled` when sound is turned off by configuration or `canberra.enable`
    /// - `InvalidArgument` when neither `event.id` nor `media.filename` is
    ///   present, or a control property is malformed
    pub fn play(&self, properties: &PropertySet) -> Result<PlaybackHandle> {
        self.inner.ensure_alive()?;
        let (event, merged) = self.inner.prepare(properties, CacheControl::Never)?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let slot = Slot::new(id, Some(self.inner.events.clone()));
        self.inner
            .handles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&slot));

        debug!("Playback {} accepted: {}", id, event.describe());

        let inner = Arc::clone(&self.inner);
        let task_slot = Arc::clone(&slot);
        self.inner.runtime.spawn(async move {
            inner.run(&task_slot, event, merged).await;
        });

        Ok(PlaybackHandle::new(slot))
    }

    /// Play and invoke `callback` once with the terminal state
    ///
    /// The callback runs on the context's runtime, never on the caller.
    pub fn play_with_callback<F>(&self, properties: &PropertySet, callback: F) -> Result<PlaybackHandle>
    where
        F: FnOnce(u32, PlaybackState) + Send + 'static,
    {
        let handle = self.play(properties)?;
        let watcher = handle.clone();
        self.inner.runtime.spawn(async move {
            let state = watcher.wait().await;
            callback(watcher.id(), state);
        });
        Ok(handle)
    }

    /// Decode and cache a sound permanently without playing it
    pub async fn cache(&self, properties: &PropertySet) -> Result<()> {
        self.inner.ensure_alive()?;
        let (event, _) = self.inner.prepare(properties, CacheControl::Permanent)?;
        let key = event.cache_key();
        let lease = self
            .inner
            .cache
            .get_or_load(key, event.cache_control, || self.inner.load(None, &event))
            .await?;
        debug!("Cached {}", event.describe());
        drop(lease);
        Ok(())
    }

    /// Cancel a playback; no-op once it has finished
    pub fn cancel(&self, handle: &PlaybackHandle) {
        handle.cancel();
    }

    /// Cancel a live playback by id; false if no such playback is running
    pub fn cancel_id(&self, id: u32) -> bool {
        match self.inner.slot(id) {
            Some(slot) => slot.cancel(),
            None => false,
        }
    }

    /// State of a live playback; `None` once finished or unknown
    pub fn state(&self, id: u32) -> Option<PlaybackState> {
        self.inner.slot(id).map(|slot| slot.state())
    }

    /// True while the playback is submitted to the backend
    pub fn playing(&self, id: u32) -> bool {
        matches!(self.state(id), Some(PlaybackState::Playing))
    }

    /// Receive every state transition of every playback
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// Connect the backend now instead of on first play
    pub async fn open(&self) -> Result<()> {
        self.inner.ensure_alive()?;
        self.inner.connection().await.map(|_| ())
    }

    /// Name of the connected backend, if any
    pub async fn backend(&self) -> Option<String> {
        self.inner
            .connection
            .lock()
            .await
            .as_ref()
            .map(|c| c.backend().to_string())
    }

    /// Prefer the backend called `name`
    ///
    /// # Errors
    /// - `State` once a connection is open (or being opened)
    /// - `NoDriver` for an unknown backend name
    pub fn set_driver(&self, name: &str) -> Result<()> {
        self.inner.ensure_alive()?;
        let connection = self
            .inner
            .connection
            .try_lock()
            .map_err(|_| Error::State("Backend connection in progress".to_string()))?;
        if connection.is_some() {
            return Err(Error::State("Driver cannot change after open".to_string()));
        }

        let mut backends = self.inner.backends.write().unwrap_or_else(|e| e.into_inner());
        let chosen = match backends.iter().position(|b| b.name() == name) {
            Some(index) => backends.remove(index),
            None => backend::create(name.parse::<BackendKind>()?),
        };
        info!("Preferred driver set to {}", chosen.name());
        backends.insert(0, chosen);
        Ok(())
    }

    /// Merge `properties` into the context's global properties
    ///
    /// Changing `canberra.xdg-theme.name` drops every loaded theme index.
    pub fn change_props(&self, properties: &PropertySet) -> Result<()> {
        self.inner.ensure_alive()?;
        is_enabled(properties)?;

        let mut globals = self.inner.globals.write().unwrap_or_else(|e| e.into_inner());
        let old_theme = globals.text(Prop::XdgThemeName).map(String::from);
        let merged = PropertySet::merge(&globals, properties);
        let new_theme = merged.text(Prop::XdgThemeName).map(String::from);
        *globals = merged;

        if old_theme != new_theme {
            info!("Sound theme changed to {:?}", new_theme);
            self.inner.resolver.invalidate_all();
        }
        Ok(())
    }

    /// Snapshot of the global properties
    pub fn properties(&self) -> PropertySet {
        self.inner.globals.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drop every unreferenced cached sample; returns how many went
    pub fn clear_cache(&self) -> usize {
        self.inner.cache.clear()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Evict stale volatile samples
    pub fn sweep_cache(&self) -> usize {
        self.inner.cache.sweep()
    }

    pub fn resolver(&self) -> &ThemeResolver {
        &self.inner.resolver
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Cancel every live playback and close the connection
    ///
    /// Idempotent. Later calls to `play`, `cache` and `open` fail with
    /// `Destroyed`.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let canceled = self.inner.cancel_all();
        if let Some(connection) = self.inner.connection.lock().await.take() {
            connection.close();
        }
        info!("Context destroyed ({} playbacks canceled)", canceled);
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let canceled = self.inner.cancel_all();
        // A connection still being opened closes when its last reference drops
        if let Ok(mut connection) = self.inner.connection.try_lock() {
            if let Some(connection) = connection.take() {
                connection.close();
            }
        }
        debug!("Context dropped ({} playbacks canceled)", canceled);
    }
}

impl Inner {
    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(Error::Destroyed)
        } else {
            Ok(())
        }
    }

    fn prepare(&self, properties: &PropertySet, default_cache: CacheControl) -> Result<(SoundEvent, PropertySet)> {
        if !self.config.enable {
            return Err(Error::Disabled("Sound disabled by configuration".to_string()));
        }
        let merged = {
            let globals = self.globals.read().unwrap_or_else(|e| e.into_inner());
            PropertySet::merge(&globals, properties)
        };
        let event = SoundEvent::from_properties(&merged, default_cache, &self.config)?;
        Ok((event, merged))
    }

    fn slot(&self, id: u32) -> Option<Arc<Slot>> {
        self.handles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    fn cancel_all(&self) -> usize {
        let slots: Vec<Arc<Slot>> = self
            .handles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        slots.iter().filter(|slot| slot.cancel()).count()
    }

    async fn connection(&self) -> Result<Arc<Connection>> {
        let mut guard = self.connection.lock().await;
        self.ensure_alive()?;

        if let Some(connection) = guard.as_ref() {
            if !connection.is_closed() {
                return Ok(Arc::clone(connection));
            }
        }

        let backends = self.backends.read().unwrap_or_else(|e| e.into_inner()).clone();
        let globals = self.globals.read().unwrap_or_else(|e| e.into_inner()).clone();
        let connection = Arc::new(backend::connect_first(&backends, &self.config, &globals).await?);
        *guard = Some(Arc::clone(&connection));
        Ok(connection)
    }

    async fn run(&self, slot: &Arc<Slot>, event: SoundEvent, properties: PropertySet) {
        let outcome = self.drive(slot, &event, &properties).await;
        slot.clear_voice();

        let terminal = match outcome {
            Ok(()) => PlaybackState::Completed,
            Err(_) if slot.token().is_cancelled() => PlaybackState::Canceled,
            Err(Error::Canceled) => PlaybackState::Canceled,
            Err(e) => {
                warn!("Playback {} of {} failed: {}", slot.id(), event.describe(), e);
                PlaybackState::Failed(e)
            }
        };
        slot.transition(terminal);

        self.handles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&slot.id());
    }

    async fn drive(&self, slot: &Slot, event: &SoundEvent, properties: &PropertySet) -> Result<()> {
        let token = slot.token().clone();

        let connection = tokio::select! {
            connection = self.connection() => connection?,
            _ = token.cancelled() => return Err(Error::Canceled),
        };

        let key = event.cache_key();
        if self.cache.contains(&key) {
            slot.transition(PlaybackState::Loading);
        }

        let lease: CacheLease = tokio::select! {
            lease = self.cache.get_or_load(key, event.cache_control, || self.load(Some(slot), event)) => lease?,
            _ = token.cancelled() => return Err(Error::Canceled),
        };
        slot.transition(PlaybackState::Loading);

        let request = PlayRequest {
            id: slot.id(),
            properties: properties.for_backend(),
            volume_db: event.volume_db,
            force_channel: event.force_channel,
        };
        let sample = Arc::clone(lease.sample());
        let duration = sample.duration();

        let voice = slot.start_voice(|| connection.play(sample, request))?;
        slot.transition(PlaybackState::Playing);
        debug!("Playback {} on {} ({:?})", slot.id(), connection.backend(), duration);

        let grace = self.config.playback_grace();
        let watchdog = async {
            match grace {
                Some(grace) => tokio::time::sleep(duration + grace).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            finished = voice.finished => {
                finished.unwrap_or_else(|_| Err(Error::System("Backend dropped the voice".to_string())))
            }
            _ = token.cancelled() => Err(Error::Canceled),
            _ = watchdog => {
                voice.stop.stop();
                Err(Error::System(format!(
                    "Playback overran its {:?} duration by more than {:?}",
                    duration,
                    grace.unwrap_or_default()
                )))
            }
        }
    }

    /// Resolve and decode; runs only on a cache miss
    async fn load(&self, slot: Option<&Slot>, event: &SoundEvent) -> Result<DecodedSample> {
        let advance = |state: PlaybackState| {
            if let Some(slot) = slot {
                slot.transition(state);
            }
        };

        advance(PlaybackState::Resolving);
        let path = match &event.source {
            SoundSource::Event { id, fallback } => match self.resolve(id, &event.theme, &event.profile).await {
                Ok(path) => path,
                Err(Error::NotFound(reason)) => match fallback {
                    Some(file) => {
                        debug!("{}; using media.filename {}", reason, file.display());
                        file.clone()
                    }
                    None => return Err(Error::NotFound(reason)),
                },
                Err(e) => return Err(e),
            },
            SoundSource::File(path) => path.clone(),
        };

        advance(PlaybackState::Loading);
        self.decode(path).await
    }

    async fn resolve(&self, event_id: &str, theme: &str, profile: &str) -> Result<PathBuf> {
        let resolver = Arc::clone(&self.resolver);
        let (event_id, theme, profile) = (event_id.to_string(), theme.to_string(), profile.to_string());
        let label = event_id.clone();

        let task = tokio::task::spawn_blocking(move || {
            resolver.resolve(&event_id, &theme, &profile)?.first_readable()
        });
        self.bounded(task, self.config.resolve_timeout(), &format!("theme lookup of '{}'", label))
            .await
    }

    async fn decode(&self, path: PathBuf) -> Result<DecodedSample> {
        let label = format!("decoding {}", path.display());
        let task = tokio::task::spawn_blocking(move || SampleDecoder::decode_file(&path));
        self.bounded(task, self.config.decode_timeout(), &label).await
    }

    async fn bounded<T>(
        &self,
        task: tokio::task::JoinHandle<Result<T>>,
        limit: Duration,
        what: &str,
    ) -> Result<T> {
        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Internal(format!("{} panicked: {}", what, e))),
            Err(_) => Err(Error::System(format!("{} timed out after {:?}", what, limit))),
        }
    }
}

/// Periodically evict stale volatile samples until the context goes away
fn spawn_cache_sweeper(inner: &Arc<Inner>) {
    let period = (inner.config.volatile_idle() / 2).max(MIN_SWEEP_PERIOD);
    let weak: Weak<Inner> = Arc::downgrade(inner);

    inner.runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            if inner.destroyed.load(Ordering::SeqCst) {
                break;
            }
            inner.cache.sweep();
        }
        trace!("Cache sweeper stopped");
    });
}

/// Properties describing the running process
fn process_properties() -> PropertySet {
    let mut builder = PropertySet::builder().set(Prop::ApplicationProcessId, std::process::id().to_string());

    if let Some(binary) = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
    {
        builder = builder.set(Prop::ApplicationProcessBinary, binary);
    }
    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            builder = builder.set(Prop::ApplicationProcessUser, user);
        }
    }

    builder.build().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn null_backend() -> Vec<Arc<dyn Backend>> {
        vec![Arc::new(crate::backend::NullBackend)]
    }

    #[test]
    fn test_process_properties() {
        let props = process_properties();
        assert_eq!(
            props.text(Prop::ApplicationProcessId),
            Some(std::process::id().to_string().as_str())
        );
    }

    #[test]
    fn test_requires_runtime() {
        let err = Context::new(EngineConfig::default()).err().unwrap();
        assert_eq!(err.kind(), chime_common::ErrorKind::State);
    }

    #[tokio::test]
    async fn test_disabled_by_config() {
        let config = EngineConfig {
            enable: false,
            ..Default::default()
        };
        let ctx = Context::with_backends(config, null_backend()).unwrap();
        let props = PropertySet::from_pairs([("event.id", "bell")]).unwrap();
        let err = ctx.play(&props).unwrap_err();
        assert_eq!(err.kind(), chime_common::ErrorKind::Disabled);
    }

    #[tokio::test]
    async fn test_set_driver_after_open_is_state_error() {
        let ctx = Context::with_backends(EngineConfig::default(), null_backend()).unwrap();
        ctx.set_driver("null").unwrap();
        ctx.open().await.unwrap();
        assert_eq!(ctx.backend().await.as_deref(), Some("null"));
        let err = ctx.set_driver("null").unwrap_err();
        assert_eq!(err.kind(), chime_common::ErrorKind::State);
    }

    #[tokio::test]
    async fn test_set_driver_unknown_name() {
        let ctx = Context::with_backends(EngineConfig::default(), Vec::new()).unwrap();
        let err = ctx.set_driver("jack").unwrap_err();
        assert_eq!(err.kind(), chime_common::ErrorKind::NoDriver);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let ctx = Context::with_backends(EngineConfig::default(), null_backend()).unwrap();
        ctx.destroy().await;
        ctx.destroy().await;
        assert!(ctx.is_destroyed());
        let props = PropertySet::from_pairs([("event.id", "bell")]).unwrap();
        assert_eq!(ctx.play(&props).unwrap_err(), Error::Destroyed);
        assert_eq!(ctx.open().await.unwrap_err(), Error::Destroyed);
    }
}
