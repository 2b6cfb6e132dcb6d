//! Integration tests for the scene-set lifecycle
//!
//! These tests drive a [`SceneSet`] end to end against two backends:
//! 1. `RecordingBackend` - synchronous, counts every backend call, can inject failures
//! 2. `SceneHost` - the threaded in-process host

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use slotmap::SlotMap;

use sceneset_core::{
    BackendError, DestructionChannel, Finished, IsolationMode, LoadMode, SceneBackend, SceneConfig,
    SceneConfigMap, SceneEntry, SceneHandle, SceneHost, SceneHostConfig, SceneSet, SceneSetDefinition,
    SceneSetError, SceneSetStatus,
};

// ==================== Test backend ====================

#[derive(Default)]
struct Recorded {
    scenes: SlotMap<SceneHandle, String>,
    order: Vec<SceneHandle>,
    loads: HashMap<String, usize>,
    unloaded: Vec<SceneHandle>,
}

/// Synchronous backend that records every call
struct RecordingBackend {
    state: Mutex<Recorded>,
    channel: Arc<DestructionChannel>,
    fail_loads: Mutex<HashSet<String>>,
    fail_unloads: Mutex<HashSet<String>>,
    /// Unloading the key also destroys the mapped scene
    linked: Mutex<HashMap<SceneHandle, SceneHandle>>,
}

impl RecordingBackend {
    fn new(channel: Arc<DestructionChannel>) -> Self {
        Self {
            state: Mutex::new(Recorded::default()),
            channel,
            fail_loads: Mutex::default(),
            fail_unloads: Mutex::default(),
            linked: Mutex::default(),
        }
    }

    fn total_loads(&self) -> usize {
        self.state.lock().loads.values().sum()
    }

    fn loads_of(&self, path: &str) -> usize {
        self.state.lock().loads.get(path).copied().unwrap_or(0)
    }

    fn unloaded(&self) -> Vec<SceneHandle> {
        self.state.lock().unloaded.clone()
    }

    fn live_scene_count(&self) -> usize {
        self.state.lock().scenes.len()
    }

    fn path_of(&self, handle: SceneHandle) -> Option<String> {
        self.state.lock().scenes.get(handle).cloned()
    }

    /// Destroy a scene outside of any unload request
    fn destroy_externally(&self, handle: SceneHandle) {
        let removed = {
            let mut state = self.state.lock();
            state.order.retain(|h| *h != handle);
            state.scenes.remove(handle).is_some()
        };
        if removed {
            self.channel.notify_destroyed(handle);
        }
    }
}

impl SceneBackend for RecordingBackend {
    type Operation = Finished<Result<(), BackendError>>;

    fn scene_count(&self) -> usize {
        self.state.lock().order.len()
    }

    fn scene_at(&self, index: usize) -> SceneHandle {
        self.state.lock().order.get(index).copied().unwrap_or_default()
    }

    fn load_additive(&self, path: &str, _: IsolationMode) -> Result<Self::Operation, BackendError> {
        let mut state = self.state.lock();
        *state.loads.entry(path.to_string()).or_default() += 1;
        if self.fail_loads.lock().contains(path) {
            return Ok(Finished::new(Err(BackendError::Failed(format!("cannot load {}", path)))));
        }
        let handle = state.scenes.insert(path.to_string());
        state.order.push(handle);
        Ok(Finished::new(Ok(())))
    }

    fn unload(&self, handle: SceneHandle) -> Result<Self::Operation, BackendError> {
        let path = self.path_of(handle);
        if let Some(path) = &path {
            if self.fail_unloads.lock().contains(path) {
                return Ok(Finished::new(Err(BackendError::Failed(format!("cannot unload {}", path)))));
            }
        }
        self.state.lock().unloaded.push(handle);
        self.destroy_externally(handle);
        let linked = self.linked.lock().get(&handle).copied();
        if let Some(other) = linked {
            self.destroy_externally(other);
        }
        Ok(Finished::new(Ok(())))
    }

    fn is_valid(&self, handle: SceneHandle) -> bool {
        self.state.lock().scenes.contains_key(handle)
    }

    fn is_loaded(&self, handle: SceneHandle) -> bool {
        self.is_valid(handle)
    }
}

// ==================== Helpers ====================

/// Two singletons ("hub", "hud") and two templates ("enemy", "pickup")
fn level_configs() -> SceneConfigMap {
    SceneConfigMap::new()
        .with("hub", SceneConfig::singleton("levels/hub").with_isolation(IsolationMode::Physics3D)).unwrap()
        .with("enemy", SceneConfig::template("actors/enemy")).unwrap()
        .with("hud", SceneConfig::singleton("ui/hud")).unwrap()
        .with("pickup", SceneConfig::template("props/pickup")).unwrap()
}

fn recording_set() -> SceneSet<RecordingBackend> {
    let channel = DestructionChannel::new();
    let backend = Arc::new(RecordingBackend::new(channel.clone()));
    SceneSet::new(backend, channel, level_configs()).with_name("test level")
}

fn block<F: std::future::Future>(future: F) -> F::Output {
    pollster::block_on(future)
}

fn assert_state_violation<T: std::fmt::Debug>(
    result: Result<T, SceneSetError>,
    expected: SceneSetStatus,
    actual: SceneSetStatus,
) {
    match result {
        Err(SceneSetError::StateViolation { expected: e, actual: a }) => {
            assert_eq!(e, expected, "wrong expected status");
            assert_eq!(a, actual, "wrong actual status");
        }
        other => panic!("Expected StateViolation, got {:?}", other),
    }
}

// ==================== State machine ====================

#[test]
fn test_load_and_teardown_require_loaded() {
    let set = recording_set();

    assert_state_violation(block(set.load("hub")), SceneSetStatus::Loaded, SceneSetStatus::Unloaded);
    assert_state_violation(block(set.teardown()), SceneSetStatus::Loaded, SceneSetStatus::Unloaded);

    // No partial mutation
    assert_eq!(set.status(), SceneSetStatus::Unloaded);
    assert_eq!(set.backend().total_loads(), 0);
}

#[test]
fn test_initialize_requires_unloaded() {
    let set = recording_set();
    block(set.initialize()).unwrap();

    assert_state_violation(block(set.initialize()), SceneSetStatus::Unloaded, SceneSetStatus::Loaded);
    assert_eq!(set.backend().total_loads(), 2);
}

#[test]
fn test_concurrent_call_is_rejected_not_blocked() {
    let channel = DestructionChannel::new();
    let config = SceneHostConfig {
        load_delay: Duration::from_millis(150),
        ..Default::default()
    };
    let host = Arc::new(SceneHost::with_config(channel.clone(), config));
    let set = SceneSet::new(host, channel, level_configs());

    thread::scope(|scope| {
        let init = scope.spawn(|| block(set.initialize()));

        while set.status() != SceneSetStatus::Loading {
            thread::yield_now();
        }
        assert_state_violation(block(set.initialize()), SceneSetStatus::Unloaded, SceneSetStatus::Loading);
        assert_state_violation(block(set.load("hub")), SceneSetStatus::Loaded, SceneSetStatus::Loading);

        init.join().unwrap().unwrap();
    });
    assert_eq!(set.status(), SceneSetStatus::Loaded);
}

// ==================== Initialize ====================

#[test]
fn test_initialize_loads_only_singletons() {
    let set = recording_set();
    block(set.initialize()).unwrap();

    assert_eq!(set.status(), SceneSetStatus::Loaded);
    assert_eq!(set.backend().total_loads(), 2);
    assert_eq!(set.backend().loads_of("levels/hub"), 1);
    assert_eq!(set.backend().loads_of("ui/hud"), 1);
    assert_eq!(set.backend().loads_of("actors/enemy"), 0);
    assert_eq!(set.backend().loads_of("props/pickup"), 0);
    assert_eq!(set.live_instance_count(), 0);
}

#[test]
fn test_initialize_failure_restores_unloaded() {
    let set = recording_set();
    set.backend().fail_loads.lock().insert("ui/hud".to_string());

    let result = block(set.initialize());
    assert!(matches!(result, Err(SceneSetError::Backend(BackendError::Failed(_)))));
    assert_eq!(set.status(), SceneSetStatus::Unloaded);
    // The hub singleton loaded before the failure was rolled back
    assert_eq!(set.backend().live_scene_count(), 0);

    set.backend().fail_loads.lock().clear();
    block(set.initialize()).unwrap();
    assert_eq!(set.status(), SceneSetStatus::Loaded);
}

// ==================== Load ====================

#[test]
fn test_singleton_load_is_idempotent() {
    let set = recording_set();
    block(set.initialize()).unwrap();

    let first = block(set.load("hub")).unwrap();
    let second = block(set.load("hub")).unwrap();

    assert_eq!(first, second);
    assert_eq!(set.backend().loads_of("levels/hub"), 1);
    assert_eq!(set.config("hub").unwrap().cached_handle(), Some(first));
    assert!(!set.contains_live(first));
}

#[test]
fn test_singleton_destroyed_externally_is_reloaded() {
    let set = recording_set();
    block(set.initialize()).unwrap();

    let first = block(set.load("hub")).unwrap();
    set.backend().destroy_externally(first);
    let second = block(set.load("hub")).unwrap();

    assert_ne!(first, second);
    assert_eq!(set.backend().loads_of("levels/hub"), 2);
}

#[test]
fn test_template_load_creates_distinct_instances() {
    let set = recording_set();
    block(set.initialize()).unwrap();

    let a = block(set.load("enemy")).unwrap();
    let b = block(set.load("enemy")).unwrap();

    assert_ne!(a, b);
    assert!(set.contains_live(a));
    assert!(set.contains_live(b));
    assert_eq!(set.live_instance_count(), 2);
    assert_eq!(set.backend().loads_of("actors/enemy"), 2);
}

#[test]
fn test_missing_key_leaves_set_loaded() {
    let set = recording_set();
    block(set.initialize()).unwrap();

    match block(set.load("missing-key")) {
        Err(SceneSetError::KeyNotFound(key)) => assert_eq!(key, "missing-key"),
        other => panic!("Expected KeyNotFound, got {:?}", other),
    }
    assert_eq!(set.status(), SceneSetStatus::Loaded);

    block(set.teardown()).unwrap();
    assert_eq!(set.status(), SceneSetStatus::Unloaded);
}

#[test]
fn test_backend_failure_during_load_leaves_set_loaded() {
    let set = recording_set();
    block(set.initialize()).unwrap();
    set.backend().fail_loads.lock().insert("actors/enemy".to_string());

    let result = block(set.load("enemy"));
    assert!(matches!(result, Err(SceneSetError::Backend(_))));
    assert_eq!(set.status(), SceneSetStatus::Loaded);
    assert_eq!(set.live_instance_count(), 0);
}

#[test]
fn test_empty_template_path_is_not_tracked() {
    let channel = DestructionChannel::new();
    let backend = Arc::new(RecordingBackend::new(channel.clone()));
    let configs = SceneConfigMap::new().with("blank", SceneConfig::template("")).unwrap();
    let set = SceneSet::new(backend, channel, configs);
    block(set.initialize()).unwrap();

    let handle = block(set.load("blank")).unwrap();
    assert!(handle.is_null());
    assert_eq!(set.live_instance_count(), 0);
    assert_eq!(set.backend().total_loads(), 0);
}

// ==================== Destruction notifications ====================

#[test]
fn test_destruction_prunes_only_that_instance() {
    let set = recording_set();
    block(set.initialize()).unwrap();

    let a = block(set.load("enemy")).unwrap();
    let b = block(set.load("enemy")).unwrap();
    let c = block(set.load("pickup")).unwrap();

    set.backend().destroy_externally(b);

    assert!(set.contains_live(a));
    assert!(!set.contains_live(b));
    assert!(set.contains_live(c));

    block(set.teardown()).unwrap();
    let unloaded = set.backend().unloaded();
    assert!(!unloaded.contains(&b), "destroyed instance must not be unloaded again");
    assert!(unloaded.contains(&a));
    assert!(unloaded.contains(&c));
}

#[test]
fn test_unrelated_sets_do_not_prune_each_other() {
    let channel = DestructionChannel::new();
    let backend = Arc::new(RecordingBackend::new(channel.clone()));
    let first = SceneSet::new(backend.clone(), channel.clone(), level_configs());
    let second = SceneSet::new(backend.clone(), channel.clone(), level_configs());
    block(first.initialize()).unwrap();
    block(second.initialize()).unwrap();

    let mine = block(first.load("enemy")).unwrap();
    let theirs = block(second.load("enemy")).unwrap();
    backend.destroy_externally(theirs);

    assert!(first.contains_live(mine));
    assert_eq!(first.live_instance_count(), 1);
    assert_eq!(second.live_instance_count(), 0);
}

// ==================== Teardown ====================

#[test]
fn test_teardown_unloads_everything_once() {
    let set = recording_set();
    block(set.initialize()).unwrap();
    let hub = set.config("hub").unwrap().cached_handle().unwrap();
    let hud = set.config("hud").unwrap().cached_handle().unwrap();
    let instances = [
        block(set.load("enemy")).unwrap(),
        block(set.load("enemy")).unwrap(),
        block(set.load("pickup")).unwrap(),
    ];

    block(set.teardown()).unwrap();

    let unloaded = set.backend().unloaded();
    assert_eq!(unloaded.len(), 5);
    for handle in [hub, hud].iter().chain(instances.iter()) {
        assert_eq!(unloaded.iter().filter(|h| *h == handle).count(), 1);
    }
    // Singletons first, in definition order
    assert_eq!(&unloaded[..2], &[hub, hud]);

    assert_eq!(set.status(), SceneSetStatus::Unloaded);
    assert_eq!(set.live_instance_count(), 0);
    assert_eq!(set.backend().live_scene_count(), 0);

    assert_state_violation(block(set.teardown()), SceneSetStatus::Loaded, SceneSetStatus::Unloaded);
}

#[test]
fn test_teardown_failure_restores_loaded_and_retry_finishes() {
    let set = recording_set();
    block(set.initialize()).unwrap();
    let enemy = block(set.load("enemy")).unwrap();
    set.backend().fail_unloads.lock().insert("ui/hud".to_string());

    let result = block(set.teardown());
    assert!(matches!(result, Err(SceneSetError::Backend(BackendError::Failed(_)))));
    assert_eq!(set.status(), SceneSetStatus::Loaded);
    assert!(set.contains_live(enemy));

    set.backend().fail_unloads.lock().clear();
    block(set.teardown()).unwrap();
    assert_eq!(set.status(), SceneSetStatus::Unloaded);
    assert_eq!(set.backend().live_scene_count(), 0);
}

#[test]
fn test_teardown_skips_instance_destroyed_by_earlier_unload() {
    let set = recording_set();
    block(set.initialize()).unwrap();
    let a = block(set.load("enemy")).unwrap();
    let b = block(set.load("enemy")).unwrap();
    {
        // Whichever instance teardown reaches first takes the other down with it
        let mut linked = set.backend().linked.lock();
        linked.insert(a, b);
        linked.insert(b, a);
    }

    block(set.teardown()).unwrap();

    let unloaded = set.backend().unloaded();
    let a_unloads = unloaded.iter().filter(|h| **h == a).count();
    let b_unloads = unloaded.iter().filter(|h| **h == b).count();
    assert_eq!(a_unloads + b_unloads, 1, "only the first instance gets an unload request");

    assert_eq!(set.status(), SceneSetStatus::Unloaded);
    assert_eq!(set.live_instance_count(), 0);
    assert_eq!(set.backend().live_scene_count(), 0);
}

// ==================== Full cycle ====================

#[test]
fn test_round_trip_has_no_residual_state() {
    let set = recording_set();

    for cycle in 1..=2 {
        block(set.initialize()).unwrap();
        assert_eq!(set.backend().loads_of("levels/hub"), cycle);
        assert_eq!(set.backend().loads_of("ui/hud"), cycle);
        assert_eq!(set.live_instance_count(), 0);

        for key in ["enemy", "pickup"] {
            block(set.load(key)).unwrap();
            block(set.load(key)).unwrap();
        }
        assert_eq!(set.live_instance_count(), 4);

        block(set.teardown()).unwrap();
        assert_eq!(set.status(), SceneSetStatus::Unloaded);
        assert_eq!(set.live_instance_count(), 0);
        assert_eq!(set.backend().live_scene_count(), 0);
    }
}

#[test]
fn test_close_tears_down_and_unsubscribes() {
    let set = recording_set();
    let backend = set.backend().clone();
    block(set.initialize()).unwrap();
    block(set.load("enemy")).unwrap();

    let channel = backend.channel.clone();
    assert_eq!(channel.subscriber_count(), 1);

    block(set.close()).unwrap();
    assert_eq!(channel.subscriber_count(), 0);
    assert_eq!(backend.live_scene_count(), 0);
}

// ==================== Threaded host ====================

#[test]
fn test_scene_host_full_cycle() {
    let channel = DestructionChannel::new();
    let config = SceneHostConfig {
        load_delay: Duration::from_millis(2),
        unload_delay: Duration::from_millis(2),
        ..Default::default()
    };
    let host = Arc::new(SceneHost::with_config(channel.clone(), config));

    let definition = SceneSetDefinition::new("Arena")
        .with_scene(SceneEntry::new("arena", "levels/arena", LoadMode::Singleton)
            .with_isolation(IsolationMode::Physics3D))
        .with_scene(SceneEntry::new("bot", "actors/bot", LoadMode::Template));
    let set = SceneSet::from_definition(&definition, host.clone(), channel.clone()).unwrap();
    assert_eq!(set.name(), "Arena");

    block(set.initialize()).unwrap();
    let arena = block(set.load("arena")).unwrap();
    assert_eq!(host.scene(arena).unwrap().isolation, IsolationMode::Physics3D);

    let bots: Vec<SceneHandle> = (0..3).map(|_| block(set.load("bot")).unwrap()).collect();
    assert_eq!(set.live_instance_count(), 3);

    // Destroyed directly on the host, outside the scene set
    assert!(host.destroy(bots[0]));
    assert!(!set.contains_live(bots[0]));

    block(set.teardown()).unwrap();
    assert!(host.handles().is_empty());
    assert_eq!(set.live_instance_count(), 0);

    block(set.close()).unwrap();
    assert_eq!(channel.subscriber_count(), 0);
}
