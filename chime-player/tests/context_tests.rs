//! End-to-end context behaviour with a scripted backend

mod helpers;

use chime_common::{EngineConfig, Error, ErrorKind, PlaybackState, Prop, PropertySet};
use chime_player::backend::Backend;
use chime_player::Context;
use helpers::{ScriptedBackend, ThemeTree};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn bell_tree() -> ThemeTree {
    let tree = ThemeTree::new();
    tree.theme("freedesktop", &[]);
    tree.sound("freedesktop", "bell");
    tree
}

fn props(pairs: &[(&str, &str)]) -> PropertySet {
    PropertySet::from_pairs(pairs.iter().copied()).unwrap()
}

fn context(config: EngineConfig, backends: Vec<Arc<ScriptedBackend>>) -> Context {
    let backends = backends
        .into_iter()
        .map(|b| b as Arc<dyn Backend>)
        .collect();
    Context::with_backends(config, backends).unwrap()
}

async fn wait_for_state(ctx: &Context, id: u32, state: PlaybackState) {
    tokio::time::timeout(WAIT, async {
        while ctx.state(id) != Some(state.clone()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("playback {} never reached {}", id, state));
}

#[tokio::test]
async fn test_plays_event_to_completion() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::new("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);

    let handle = ctx.play(&props(&[("event.id", "bell")])).unwrap();
    let state = tokio::time::timeout(WAIT, handle.wait()).await.unwrap();

    assert_eq!(state, PlaybackState::Completed);
    assert_eq!(backend.script.plays(), 1);
    assert_eq!(backend.script.connects(), 1);
    // `never` is the play default, so nothing stays cached
    assert_eq!(ctx.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_state_sequence_on_miss_then_hit() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::new("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);
    let bell = props(&[("event.id", "bell"), ("canberra.cache-control", "permanent")]);

    let mut events = ctx.subscribe();
    let first = ctx.play(&bell).unwrap();
    assert_eq!(tokio::time::timeout(WAIT, first.wait()).await.unwrap(), PlaybackState::Completed);

    let mut miss = Vec::new();
    while let Ok(event) = events.try_recv() {
        miss.push(event.state.name());
    }
    assert_eq!(miss, vec!["queued", "resolving", "loading", "playing", "completed"]);

    let second = ctx.play(&bell).unwrap();
    assert_eq!(tokio::time::timeout(WAIT, second.wait()).await.unwrap(), PlaybackState::Completed);

    let mut hit = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.id, second.id());
        hit.push(event.state.name());
    }
    assert_eq!(hit, vec!["queued", "loading", "playing", "completed"]);
    assert_eq!(backend.script.plays(), 2);
    assert_eq!(ctx.cache_stats().permanent, 1);
}

#[tokio::test]
async fn test_nonexistent_event_fails_not_found() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::new("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);

    let handle = ctx.play(&props(&[("event.id", "nonexistent-event")])).unwrap();
    let state = tokio::time::timeout(WAIT, handle.wait()).await.unwrap();

    assert_eq!(state.error().map(Error::kind), Some(ErrorKind::NotFound));
    assert_eq!(backend.script.plays(), 0);
}

#[tokio::test]
async fn test_filename_used_when_event_missing() {
    let tree = bell_tree();
    let click = tree.sound_in("elsewhere", "", "click", "wav");
    let backend = Arc::new(ScriptedBackend::new("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);

    let handle = ctx
        .play(&props(&[
            ("event.id", "nonexistent-event"),
            ("media.filename", click.to_str().unwrap()),
        ]))
        .unwrap();
    assert_eq!(tokio::time::timeout(WAIT, handle.wait()).await.unwrap(), PlaybackState::Completed);
    assert_eq!(backend.script.plays(), 1);
}

#[tokio::test]
async fn test_corrupt_file_fails() {
    let tree = ThemeTree::new();
    tree.theme("freedesktop", &[]);
    tree.raw("freedesktop", "stereo", "bell.wav", b"this is not a wave file");
    let backend = Arc::new(ScriptedBackend::new("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);

    let handle = ctx.play(&props(&[("event.id", "bell")])).unwrap();
    let state = tokio::time::timeout(WAIT, handle.wait()).await.unwrap();
    assert_eq!(state.error().map(Error::kind), Some(ErrorKind::Corrupt));
    assert_eq!(backend.script.plays(), 0);
}

#[tokio::test]
async fn test_cancel_while_queued_never_plays() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::slow("scripted", Duration::from_millis(200)));
    let ctx = context(tree.config(), vec![backend.clone()]);

    let handle = ctx.play(&props(&[("event.id", "bell")])).unwrap();
    assert_eq!(handle.state(), PlaybackState::Queued);
    ctx.cancel(&handle);
    assert_eq!(handle.state(), PlaybackState::Canceled);

    assert_eq!(tokio::time::timeout(WAIT, handle.wait()).await.unwrap(), PlaybackState::Canceled);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.script.plays(), 0);
}

#[tokio::test]
async fn test_double_cancel_is_noop() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::holding("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);

    let handle = ctx.play(&props(&[("event.id", "bell")])).unwrap();
    wait_for_state(&ctx, handle.id(), PlaybackState::Playing).await;

    let mut events = ctx.subscribe();
    assert!(ctx.cancel_id(handle.id()));
    handle.cancel();
    ctx.cancel(&handle);

    assert_eq!(handle.wait().await, PlaybackState::Canceled);
    assert_eq!(backend.script.stops(), 1);
    assert_eq!(events.recv().await.unwrap().state, PlaybackState::Canceled);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err(), "no notification after the terminal state");
    assert!(!ctx.cancel_id(handle.id()));
}

#[tokio::test]
async fn test_destroy_cancels_playing_handles() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::holding("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);
    let bell = props(&[("event.id", "bell")]);

    let first = ctx.play(&bell).unwrap();
    let second = ctx.play(&bell).unwrap();
    wait_for_state(&ctx, first.id(), PlaybackState::Playing).await;
    wait_for_state(&ctx, second.id(), PlaybackState::Playing).await;
    assert!(ctx.playing(first.id()));

    let mut events = ctx.subscribe();
    ctx.destroy().await;

    assert_eq!(first.state(), PlaybackState::Canceled);
    assert_eq!(second.state(), PlaybackState::Canceled);
    assert_eq!(backend.script.closes(), 1);
    assert_eq!(backend.script.stops(), 2);

    let mut terminal = 0;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.state, PlaybackState::Canceled);
        terminal += 1;
    }
    assert_eq!(terminal, 2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());

    assert_eq!(ctx.play(&bell).unwrap_err(), Error::Destroyed);
    ctx.destroy().await;
    assert_eq!(backend.script.closes(), 1);
}

#[tokio::test]
async fn test_drop_tears_down() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::holding("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);

    let handle = ctx.play(&props(&[("event.id", "bell")])).unwrap();
    wait_for_state(&ctx, handle.id(), PlaybackState::Playing).await;
    drop(ctx);

    assert_eq!(handle.state(), PlaybackState::Canceled);
    assert_eq!(backend.script.closes(), 1);
}

#[tokio::test]
async fn test_backend_fallback_order() {
    let tree = bell_tree();
    let broken = Arc::new(ScriptedBackend::failing("broken", Error::System("refused".into())));
    let missing = Arc::new(ScriptedBackend::failing("missing", Error::NoDriver("absent".into())));
    let working = Arc::new(ScriptedBackend::new("working"));
    let ctx = context(tree.config(), vec![broken.clone(), missing.clone(), working.clone()]);

    ctx.open().await.unwrap();
    assert_eq!(ctx.backend().await.as_deref(), Some("working"));
    assert_eq!(broken.script.connects(), 1);
    assert_eq!(missing.script.connects(), 1);
}

#[tokio::test]
async fn test_preferred_driver_tried_first() {
    let tree = bell_tree();
    let first = Arc::new(ScriptedBackend::new("first"));
    let preferred = Arc::new(ScriptedBackend::new("preferred"));
    let ctx = context(tree.config(), vec![first.clone(), preferred.clone()]);

    ctx.set_driver("preferred").unwrap();
    ctx.open().await.unwrap();
    assert_eq!(ctx.backend().await.as_deref(), Some("preferred"));
    assert_eq!(first.script.connects(), 0);
}

#[tokio::test]
async fn test_all_backends_failing_is_no_driver() {
    let tree = bell_tree();
    let ctx = context(
        tree.config(),
        vec![
            Arc::new(ScriptedBackend::failing("a", Error::System("refused".into()))),
            Arc::new(ScriptedBackend::failing("b", Error::NoDriver("absent".into()))),
        ],
    );

    let handle = ctx.play(&props(&[("event.id", "bell")])).unwrap();
    let state = tokio::time::timeout(WAIT, handle.wait()).await.unwrap();
    assert_eq!(state.error().map(Error::kind), Some(ErrorKind::NoDriver));
}

#[tokio::test]
async fn test_preflight_errors() {
    let tree = bell_tree();
    let ctx = context(tree.config(), vec![Arc::new(ScriptedBackend::new("scripted"))]);

    let err = ctx.play(&props(&[("media.name", "nothing to play")])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = ctx
        .play(&props(&[("event.id", "bell"), ("canberra.volume", "loud")]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = ctx
        .play(&props(&[("event.id", "bell"), ("canberra.enable", "0")]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Disabled);
}

#[tokio::test]
async fn test_cache_preloads_permanently() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::new("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);

    ctx.cache(&props(&[("event.id", "bell")])).await.unwrap();
    assert_eq!(ctx.cache_stats().permanent, 1);
    assert_eq!(backend.script.plays(), 0);

    let err = ctx.cache(&props(&[("event.id", "nonexistent-event")])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(ctx.clear_cache(), 1);
    assert_eq!(ctx.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_callback_receives_terminal_state() {
    let tree = bell_tree();
    let ctx = context(tree.config(), vec![Arc::new(ScriptedBackend::new("scripted"))]);
    let (tx, rx) = tokio::sync::oneshot::channel();

    let handle = ctx
        .play_with_callback(&props(&[("event.id", "bell")]), move |id, state| {
            let _ = tx.send((id, state));
        })
        .unwrap();

    let (id, state) = tokio::time::timeout(WAIT, rx).await.unwrap().unwrap();
    assert_eq!(id, handle.id());
    assert_eq!(state, PlaybackState::Completed);
}

#[tokio::test]
async fn test_controls_reach_backend() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::new("scripted"));
    let ctx = context(tree.config(), vec![backend.clone()]);

    let handle = ctx
        .play(&props(&[
            ("event.id", "bell"),
            ("event.description", "Bell rung"),
            ("canberra.volume", "-12"),
            ("canberra.force_channel", "rear-left"),
        ]))
        .unwrap();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap();

    let request = backend.script.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.id, handle.id());
    assert_eq!(request.volume_db, -12.0);
    assert_eq!(request.force_channel.map(|c| c.as_str()), Some("rear-left"));
    assert_eq!(request.properties.text(Prop::EventDescription), Some("Bell rung"));
    assert!(!request.properties.contains(Prop::Volume), "control keys stay in the engine");
    assert!(request.properties.contains(Prop::ApplicationProcessId));
}

#[tokio::test]
async fn test_theme_change_invalidates_resolver() {
    let tree = bell_tree();
    tree.theme("ocean", &[]);
    let ctx = context(tree.config(), vec![Arc::new(ScriptedBackend::new("scripted"))]);

    let handle = ctx.play(&props(&[("event.id", "bell")])).unwrap();
    tokio::time::timeout(WAIT, handle.wait()).await.unwrap();
    assert!(!ctx.resolver().loaded_themes().is_empty());

    ctx.change_props(&props(&[("canberra.xdg-theme.name", "ocean")])).unwrap();
    assert!(ctx.resolver().loaded_themes().is_empty());
    assert_eq!(ctx.properties().text(Prop::XdgThemeName), Some("ocean"));
}

#[tokio::test]
async fn test_watchdog_fails_stuck_voice() {
    let tree = bell_tree();
    let backend = Arc::new(ScriptedBackend::new("scripted"));
    backend.script.hang.store(true, Ordering::SeqCst);
    let config = EngineConfig {
        playback_grace_ms: Some(100),
        ..tree.config()
    };
    let ctx = context(config, vec![backend.clone()]);

    let handle = ctx.play(&props(&[("event.id", "bell")])).unwrap();
    let state = tokio::time::timeout(WAIT, handle.wait()).await.unwrap();
    assert_eq!(state.error().map(Error::kind), Some(ErrorKind::System));
    assert_eq!(backend.script.stops(), 1);
}

#[tokio::test]
async fn test_handle_ids_are_unique() {
    let tree = bell_tree();
    let ctx = context(tree.config(), vec![Arc::new(ScriptedBackend::new("scripted"))]);
    let bell = props(&[("event.id", "bell")]);

    let ids: Vec<u32> = (0..5).map(|_| ctx.play(&bell).unwrap().id()).collect();
    let mut sorted = ids.clone();
    sorted.dedup();
    assert_eq!(sorted.len(), 5);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_idle_volatile_sample_expires() {
    let tree = bell_tree();
    let config = EngineConfig {
        volatile_idle_secs: 1,
        ..tree.config()
    };
    let ctx = context(config, vec![Arc::new(ScriptedBackend::new("scripted"))]);

    let handle = ctx
        .play(&props(&[("event.id", "bell"), ("canberra.cache-control", "volatile")]))
        .unwrap();
    assert_eq!(tokio::time::timeout(WAIT, handle.wait()).await.unwrap(), PlaybackState::Completed);
    assert_eq!(ctx.cache_stats().volatile, 1);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(ctx.cache_stats().entries, 0, "idle volatile sample outlived its window");
}

#[tokio::test]
async fn test_permanent_sample_survives_idle_window() {
    let tree = bell_tree();
    let config = EngineConfig {
        volatile_idle_secs: 0,
        ..tree.config()
    };
    let ctx = context(config, vec![Arc::new(ScriptedBackend::new("scripted"))]);

    ctx.cache(&props(&[("event.id", "bell")])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(ctx.cache_stats().permanent, 1);
}
