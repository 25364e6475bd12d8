//! The mod instance: lifecycle, background workers and operator actions.
//!
//! A [`SplitScreenMod`] is a cheap cloneable handle. The host glue creates
//! one at attach time and hands clones to every callback it registers;
//! worker threads hold their own clone until they are joined.

mod collaborators;
mod frame;
#[cfg(test)]
mod mock;
mod shutdown;
mod workers;

pub use collaborators::{Collaborators, Environment, HookInstaller};
pub use shutdown::ShutdownSignal;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hook::HookManager;
use crate::hotkey::{HotkeyAction, KeySource};
use crate::identity::GameIdentity;
use crate::input::{InputSource, PlayerSlot, new_slots};
use crate::memory::MemoryAccess;
use crate::offset::{OffsetName, OffsetRegistry, RegistryCell, export_registry, scan};
use crate::render::Compositor;
use crate::signature::OffsetSignatureSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum ModState {
    Unattached,
    /// Offsets resolved, hooks still being installed.
    Attaching,
    Active,
    Detaching,
}

/// Game-side feature values as last read from memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureState {
    pub player_count: i32,
    pub split_screen_enabled: bool,
}

impl FeatureState {
    /// Whether split rendering should happen for this state.
    pub fn should_render(&self) -> bool {
        self.split_screen_enabled && self.player_count > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OffsetTestReport {
    pub before: FeatureState,
    pub after: FeatureState,
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModStatus {
    pub state: ModState,
    pub feature_active: bool,
    pub hooks_installed: bool,
    pub install_failed: bool,
    pub registry_valid: bool,
    pub frames: u64,
    pub skipped_frames: u64,
}

struct Shared {
    config: Config,
    signatures: OffsetSignatureSet,
    memory: Arc<dyn MemoryAccess>,
    environment: Arc<dyn Environment>,
    input: Arc<dyn InputSource>,
    keys: Arc<dyn KeySource>,
    compositor: Arc<dyn Compositor>,
    installer: Arc<dyn HookInstaller>,
    hooks: Mutex<HookManager>,
    registry: RegistryCell,
    slots: Mutex<Vec<PlayerSlot>>,
    lifecycle: Mutex<ModState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Replaced on every initialize so a cleaned-up instance can start again.
    shutdown: Mutex<Arc<ShutdownSignal>>,
    rendering: AtomicBool,
    feature_active: AtomicBool,
    hooks_installed: AtomicBool,
    install_failed: AtomicBool,
    frames: AtomicU64,
    skipped_frames: AtomicU64,
    /// Seconds between the last two frames, as `f32` bits.
    delta_time: AtomicU32,
    last_frame: Mutex<Option<Instant>>,
    last_report: Mutex<Option<(Instant, u64)>>,
}

#[derive(Clone)]
pub struct SplitScreenMod {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// How long `detach` waits for a hook manager held by an install attempt.
pub const DETACH_HOOK_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll `try_lock` until `timeout` passes.
fn lock_within<T>(mutex: &Mutex<T>, timeout: Duration) -> Option<MutexGuard<'_, T>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(guard) = try_lock(mutex) {
            return Some(guard);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Non-blocking lock for host callbacks; `None` only on contention.
fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

impl SplitScreenMod {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let signatures = config.signatures();
        let Collaborators {
            memory,
            environment,
            input,
            keys,
            compositor,
            installer,
            hook_backend,
        } = collaborators;

        let shared = Shared {
            signatures,
            memory,
            environment,
            input,
            keys,
            compositor,
            installer,
            hooks: Mutex::new(HookManager::new(hook_backend)),
            registry: RegistryCell::new(OffsetRegistry::empty(GameIdentity::default())),
            slots: Mutex::new(new_slots()),
            lifecycle: Mutex::new(ModState::Unattached),
            workers: Mutex::new(Vec::new()),
            shutdown: Mutex::new(Arc::new(ShutdownSignal::new())),
            rendering: AtomicBool::new(false),
            feature_active: AtomicBool::new(false),
            hooks_installed: AtomicBool::new(false),
            install_failed: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            skipped_frames: AtomicU64::new(0),
            delta_time: AtomicU32::new(0f32.to_bits()),
            last_frame: Mutex::new(None),
            last_report: Mutex::new(None),
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn state(&self) -> ModState {
        *lock(&self.shared.lifecycle)
    }

    /// Resolve offsets, initialize the hook subsystem and start the
    /// background workers.
    ///
    /// Calling this on an attaching or active instance is a no-op.
    pub fn initialize(&self) -> Result<()> {
        // Workers signalled by a detach may still be winding down.
        if self.shutdown_signal().is_shutdown() {
            self.stop_workers();
        }

        let mut state = lock(&self.shared.lifecycle);
        match *state {
            ModState::Attaching | ModState::Active => {
                debug!("Initialize called while {}, ignoring", *state);
                return Ok(());
            }
            ModState::Detaching => {
                return Err(Error::InvalidState("cleanup in progress".to_string()));
            }
            ModState::Unattached => {}
        }
        info!("=== Split screen mod initializing ===");
        *state = ModState::Attaching;
        self.shared.install_failed.store(false, Ordering::SeqCst);
        self.shared.hooks_installed.store(false, Ordering::SeqCst);

        let registry = self.shared.registry.replace(self.resolve_offsets());
        self.log_feature_state(&registry);

        if let Err(e) = lock(&self.shared.hooks).initialize() {
            error!("Failed to initialize hook subsystem: {}", e);
            *state = ModState::Unattached;
            return Err(e);
        }

        let shutdown = Arc::new(ShutdownSignal::new());
        *lock(&self.shared.shutdown) = Arc::clone(&shutdown);

        match workers::spawn_all(self, &shutdown) {
            Ok(()) => {
                info!("Background workers started");
                Ok(())
            }
            Err(e) => {
                error!("Failed to start background workers: {}", e);
                // Tear down whatever did start, without the lifecycle lock.
                *state = ModState::Detaching;
                drop(state);
                self.stop_workers();
                lock(&self.shared.hooks).uninstall_all();
                *lock(&self.shared.lifecycle) = ModState::Unattached;
                Err(e)
            }
        }
    }

    /// Stop every worker, remove every hook and return to `Unattached`.
    ///
    /// Safe to call at any point, including before or during initialize.
    pub fn cleanup(&self) {
        {
            let mut state = lock(&self.shared.lifecycle);
            if *state == ModState::Detaching {
                debug!("Cleanup already in progress");
                return;
            }
            info!("=== Split screen mod cleaning up (was {}) ===", *state);
            *state = ModState::Detaching;
        }

        // Workers may hold hook trampolines; join before removing hooks.
        self.stop_workers();

        lock(&self.shared.hooks).uninstall_all();
        self.shared.hooks_installed.store(false, Ordering::SeqCst);
        self.shared.feature_active.store(false, Ordering::SeqCst);
        self.shared.compositor.release();

        *lock(&self.shared.lifecycle) = ModState::Unattached;
        info!("Cleanup complete");
    }

    /// Teardown for contexts that must not block on other threads.
    ///
    /// Signals the workers and removes hooks, waiting at most
    /// [`DETACH_HOOK_LOCK_TIMEOUT`] for the hook manager, then returns to
    /// `Unattached`. Workers are not joined here; they exit at their next
    /// wait boundary and are joined by the next `cleanup` or `initialize`.
    pub fn detach(&self) {
        {
            let mut state = lock(&self.shared.lifecycle);
            if *state == ModState::Detaching {
                debug!("Cleanup in progress, detach leaves teardown to it");
                return;
            }
            info!("=== Split screen mod detaching (was {}) ===", *state);
            *state = ModState::Detaching;
        }
        self.shutdown_signal().trigger();

        match lock_within(&self.shared.hooks, DETACH_HOOK_LOCK_TIMEOUT) {
            Some(mut hooks) => hooks.uninstall_all(),
            None => warn!(
                "Hook manager still busy after {:?}, hooks left in place",
                DETACH_HOOK_LOCK_TIMEOUT
            ),
        }
        self.shared.hooks_installed.store(false, Ordering::SeqCst);
        self.shared.feature_active.store(false, Ordering::SeqCst);
        self.shared.compositor.release();

        *lock(&self.shared.lifecycle) = ModState::Unattached;
        info!("Detach complete");
    }

    fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&lock(&self.shared.shutdown))
    }

    fn stop_workers(&self) {
        self.shutdown_signal().trigger();
        let handles: Vec<_> = lock(&self.shared.workers).drain(..).collect();
        let count = handles.len();
        for handle in handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!("Worker {} panicked", name);
            }
        }
        if count > 0 {
            debug!("Joined {} workers", count);
        }
    }

    /// Scan the game module, falling back to the recorded table.
    fn resolve_offsets(&self) -> OffsetRegistry {
        let shared = &self.shared;
        let title = shared.environment.window_title();
        let module = match shared.environment.game_module() {
            Ok(module) => module,
            Err(e) => {
                error!("Game module unavailable: {}", e);
                return OffsetRegistry::empty(GameIdentity::detect(title.as_deref(), ""));
            }
        };
        let identity = GameIdentity::detect(title.as_deref(), &module.name);
        info!(
            "Detected {} in {} at 0x{:X} (0x{:X} bytes)",
            identity, module.name, module.base, module.size
        );

        let layout = shared.config.camera_layout.or_else(|| {
            shared
                .config
                .fallback
                .lookup(identity)
                .and_then(|entry| entry.camera_layout)
        });

        let scanned = scan(shared.memory.as_ref(), &module, &shared.signatures, identity)
            .with_camera_layout(layout);
        if scanned.is_valid() {
            return scanned;
        }

        warn!("Signature scan incomplete, trying fallback offsets");
        let fallback = shared
            .config
            .fallback
            .get_fallback_for_module(identity, &module);
        if fallback.is_valid() {
            let layout = fallback.camera_layout().or(layout);
            return fallback.with_camera_layout(layout);
        }

        error!(
            "No valid offsets for {}; memory features disabled",
            identity
        );
        scanned
    }

    fn read_feature_state(&self, registry: &OffsetRegistry) -> Option<FeatureState> {
        if !registry.is_valid() {
            return None;
        }
        let memory = self.shared.memory.as_ref();
        let player_count = registry
            .address(OffsetName::PlayerCount)
            .map_or(1, |address| match memory.read_i32(address) {
                Ok(count) => count,
                Err(e) => {
                    debug!("Player count read failed: {}", e);
                    1
                }
            });
        let split_screen_enabled = registry
            .address(OffsetName::SplitScreenFlag)
            .is_some_and(|address| match memory.read_i32(address) {
                Ok(flag) => flag > 1,
                Err(e) => {
                    debug!("Split screen flag read failed: {}", e);
                    false
                }
            });
        Some(FeatureState {
            player_count,
            split_screen_enabled,
        })
    }

    fn log_feature_state(&self, registry: &OffsetRegistry) {
        match self.read_feature_state(registry) {
            Some(state) => info!(
                "Offset read test: player count = {}, split screen = {}",
                state.player_count, state.split_screen_enabled
            ),
            None => warn!("Offset read test skipped: registry invalid"),
        }
    }

    /// Current feature state, or `None` when the registry is invalid.
    pub fn feature_state(&self) -> Option<FeatureState> {
        self.read_feature_state(&self.shared.registry.snapshot())
    }

    pub fn is_feature_enabled(&self) -> bool {
        self.feature_state()
            .is_some_and(|state| state.split_screen_enabled)
    }

    pub fn player_count(&self) -> i32 {
        self.feature_state().map_or(1, |state| state.player_count)
    }

    pub fn registry(&self) -> Arc<OffsetRegistry> {
        self.shared.registry.snapshot()
    }

    pub fn slots(&self) -> Vec<PlayerSlot> {
        lock(&self.shared.slots).clone()
    }

    /// Flip the game's split screen flag and player count.
    ///
    /// Writes `2/2` to enable or `1/1` to disable, then reads back after the
    /// settle delay.
    pub fn toggle_feature(&self) -> Result<FeatureState> {
        let registry = self.shared.registry.snapshot();
        let Some(current) = self.read_feature_state(&registry) else {
            warn!("Cannot toggle split screen: offsets not resolved");
            return Err(Error::RegistryInvalid);
        };
        let (flag_address, count_address) = match (
            registry.address(OffsetName::SplitScreenFlag),
            registry.address(OffsetName::PlayerCount),
        ) {
            (Some(flag), Some(count)) => (flag, count),
            _ => return Err(Error::RegistryInvalid),
        };

        let enable = !(current.split_screen_enabled || current.player_count > 1);
        let value = if enable { 2 } else { 1 };
        info!(
            "{} split screen",
            if enable { "Enabling" } else { "Disabling" }
        );

        let memory = self.shared.memory.as_ref();
        memory.write_i32(flag_address, value).inspect_err(|e| {
            warn!("Failed to write split screen flag at 0x{:X}: {}", flag_address, e)
        })?;
        memory.write_i32(count_address, value).inspect_err(|e| {
            warn!("Failed to write player count at 0x{:X}: {}", count_address, e)
        })?;

        self.shutdown_signal()
            .wait(self.shared.config.timing.toggle_settle());

        let after = self
            .read_feature_state(&registry)
            .ok_or(Error::RegistryInvalid)?;
        info!(
            "After toggle: player count = {}, split screen = {}",
            after.player_count, after.split_screen_enabled
        );
        Ok(after)
    }

    /// Toggle once and report whether the game-side values visibly changed.
    pub fn test_offsets(&self) -> Result<OffsetTestReport> {
        info!("=== Testing offsets ===");
        let registry = self.shared.registry.snapshot();
        let Some(before) = self.read_feature_state(&registry) else {
            warn!("Offset test refused: registry invalid");
            return Err(Error::RegistryInvalid);
        };
        info!(
            "Before: player count = {}, split screen = {}",
            before.player_count, before.split_screen_enabled
        );

        self.toggle_feature()?;
        self.shutdown_signal()
            .wait(self.shared.config.timing.test_settle());

        let after = self
            .read_feature_state(&registry)
            .ok_or(Error::RegistryInvalid)?;
        let changed = before != after;
        if changed {
            info!(
                "Offsets working: player count {} -> {}, split screen {} -> {}",
                before.player_count,
                after.player_count,
                before.split_screen_enabled,
                after.split_screen_enabled
            );
        } else {
            warn!(
                "No observable change; offsets may be stale, the game may be overwriting them, or another step is required"
            );
        }
        Ok(OffsetTestReport {
            before,
            after,
            changed,
        })
    }

    pub fn export_offsets(&self) -> Result<PathBuf> {
        let registry = self.shared.registry.snapshot();
        export_registry(&registry, &self.shared.config.export.directory)
            .inspect_err(|e| warn!("Offset export failed: {}", e))
    }

    /// Re-run offset resolution and swap the result in. Returns validity.
    pub fn rescan_offsets(&self) -> bool {
        info!("=== Rescanning offsets ===");
        let registry = self.shared.registry.rescan(|| self.resolve_offsets());
        self.log_feature_state(&registry);
        registry.is_valid()
    }

    /// Dispatch an operator action, logging its outcome.
    pub fn trigger(&self, action: HotkeyAction) {
        debug!("Hotkey action: {}", action);
        match action {
            HotkeyAction::ToggleFeature => {
                if let Err(e) = self.toggle_feature() {
                    warn!("Toggle failed: {}", e);
                }
            }
            HotkeyAction::TestOffsets => {
                if let Err(e) = self.test_offsets() {
                    warn!("Offset test failed: {}", e);
                }
            }
            HotkeyAction::ExportOffsets => {
                // Failures are logged by export_offsets itself.
                if let Ok(path) = self.export_offsets() {
                    debug!("Export hotkey wrote {}", path.display());
                }
            }
            HotkeyAction::RescanOffsets => {
                if !self.rescan_offsets() {
                    warn!("Rescan did not produce valid offsets");
                }
            }
        }
    }

    pub fn status(&self) -> ModStatus {
        let shared = &self.shared;
        ModStatus {
            state: self.state(),
            feature_active: shared.feature_active.load(Ordering::SeqCst),
            hooks_installed: shared.hooks_installed.load(Ordering::SeqCst),
            install_failed: shared.install_failed.load(Ordering::SeqCst),
            registry_valid: shared.registry.snapshot().is_valid(),
            frames: shared.frames.load(Ordering::SeqCst),
            skipped_frames: shared.skipped_frames.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{Harness, MockEnvironment, MockInstaller};
    use super::*;
    use crate::memory::{Address, BufferMemory, ModuleRegion};
    use crate::offset::OffsetSource;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    pub(super) const BASE: Address = 0x1_4000_0000;
    pub(super) const FLAG: Address = BASE + 0x800;
    pub(super) const COUNT: Address = BASE + 0x804;
    pub(super) const PRESENT: Address = 0x7FF0_0000_1000;
    pub(super) const INPUT: Address = 0x7FF0_0000_2000;

    /// Image holding both required patterns, pointing at `FLAG` and `COUNT`.
    pub(super) fn game_image() -> BufferMemory {
        let mut flag = vec![0x83, 0x3D];
        flag.extend_from_slice(&((FLAG - (BASE + 0x100 + 7)) as i32).to_le_bytes());
        flag.extend_from_slice(&[0x01, 0x0F, 0x84, 0x10, 0x00, 0x00, 0x00]);

        let mut count = vec![0x8B, 0x05];
        count.extend_from_slice(&((COUNT - (BASE + 0x300 + 6)) as i32).to_le_bytes());
        count.extend_from_slice(&[0x83, 0xF8, 0x01, 0x7E, 0x05]);

        BufferMemory::builder(BASE)
            .zeroed(0x1000)
            .write_at(BASE + 0x100, &flag)
            .write_at(BASE + 0x300, &count)
            .write_i32(FLAG, 1)
            .write_i32(COUNT, 1)
            .build()
    }

    pub(super) fn module() -> ModuleRegion {
        ModuleRegion::new("MCC-Win64-Shipping.exe", BASE, 0x1000)
    }

    /// Timings short enough for tests, with a 5-attempt install budget.
    pub(super) fn fast_config() -> Config {
        let mut config = Config::default();
        config.timing.install_attempts = 5;
        config.timing.startup_delay_ms = 0;
        config.timing.not_ready_delay_ms = 5;
        config.timing.install_retry_delay_ms = 5;
        config.timing.device_poll_ms = 5;
        config.timing.camera_tick_ms = 5;
        config.timing.hotkey_poll_ms = 5;
        config.timing.toggle_settle_ms = 1;
        config.timing.test_settle_ms = 1;
        config
    }

    pub(super) fn harness(memory: BufferMemory) -> Harness {
        Harness::new(
            memory,
            MockEnvironment::new("Halo: Combat Evolved Anniversary", Some(module())),
            MockInstaller::new(&[("Present", PRESENT), ("XInputGetState", INPUT)]),
        )
    }

    pub(super) fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_initialize_reaches_active_and_cleanup_removes_hooks() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.initialize().unwrap();
        assert!(wait_until(|| instance.state() == ModState::Active));
        assert_eq!(harness.backend.enabled_targets(), vec![PRESENT, INPUT]);
        assert!(instance.status().hooks_installed);
        assert!(instance.status().registry_valid);

        instance.cleanup();
        assert_eq!(instance.state(), ModState::Unattached);
        assert!(harness.backend.enabled_targets().is_empty());
        assert!(!harness.backend.is_created(PRESENT));
        assert!(!instance.status().hooks_installed);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.initialize().unwrap();
        let generation = instance.registry().generation();
        instance.initialize().unwrap();

        assert_eq!(instance.registry().generation(), generation);
        assert!(wait_until(|| instance.state() == ModState::Active));
        instance.initialize().unwrap();
        assert_eq!(harness.backend.create_calls(PRESENT), 1);

        instance.cleanup();
    }

    #[test]
    fn test_cleanup_before_initialize_is_safe() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.cleanup();
        instance.cleanup();

        assert_eq!(instance.state(), ModState::Unattached);
        assert!(harness.backend.events().is_empty());
    }

    #[test]
    fn test_cleanup_during_install_leaves_no_enabled_hook() {
        let gate = Arc::new(Barrier::new(2));
        let harness = Harness::new(
            game_image(),
            MockEnvironment::new("Halo: Combat Evolved Anniversary", Some(module())),
            MockInstaller::new(&[("Present", PRESENT)]).gated(Arc::clone(&gate)),
        );
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());
        instance.initialize().unwrap();

        // Installer thread is now inside its first attempt.
        gate.wait();
        let cleaner = {
            let instance = instance.clone();
            thread::spawn(move || instance.cleanup())
        };
        assert!(wait_until(|| instance.state() == ModState::Detaching));
        gate.wait();

        cleaner.join().unwrap();
        assert_eq!(instance.state(), ModState::Unattached);
        assert!(harness.backend.enabled_targets().is_empty());
    }

    #[test]
    fn test_detach_then_cleanup_then_reinitialize() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.initialize().unwrap();
        assert!(wait_until(|| instance.state() == ModState::Active));

        instance.detach();
        assert_eq!(instance.state(), ModState::Unattached);
        assert!(harness.backend.enabled_targets().is_empty());
        assert!(!instance.status().hooks_installed);
        assert_eq!(harness.compositor.releases.load(Ordering::SeqCst), 1);

        instance.cleanup();
        assert_eq!(instance.state(), ModState::Unattached);
        assert!(lock(&instance.shared.workers).is_empty());

        instance.initialize().unwrap();
        assert!(wait_until(|| instance.state() == ModState::Active));
        assert_eq!(harness.backend.enabled_targets(), vec![PRESENT, INPUT]);
        instance.cleanup();
    }

    #[test]
    fn test_reinitialize_directly_after_detach() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.initialize().unwrap();
        assert!(wait_until(|| instance.state() == ModState::Active));
        instance.detach();

        instance.initialize().unwrap();
        assert!(wait_until(|| instance.state() == ModState::Active));
        assert_eq!(harness.backend.enabled_targets(), vec![PRESENT, INPUT]);
        instance.cleanup();
        assert!(harness.backend.enabled_targets().is_empty());
    }

    #[test]
    fn test_detach_before_initialize_is_safe() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.detach();
        assert_eq!(instance.state(), ModState::Unattached);
        assert!(harness.backend.events().is_empty());
    }

    #[test]
    fn test_lock_within_gives_up_after_timeout() {
        let mutex = Mutex::new(0);
        let held = mutex.lock().unwrap();
        let start = Instant::now();

        assert!(lock_within(&mutex, Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
        drop(held);
        assert!(lock_within(&mutex, Duration::from_millis(20)).is_some());
    }

    #[test]
    fn test_reinitialize_after_cleanup() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.initialize().unwrap();
        assert!(wait_until(|| instance.state() == ModState::Active));
        instance.cleanup();
        instance.initialize().unwrap();

        assert!(wait_until(|| instance.state() == ModState::Active));
        assert_eq!(harness.backend.enabled_targets(), vec![PRESENT, INPUT]);
        instance.cleanup();
    }

    #[test]
    fn test_install_budget_exhaustion_marks_failure() {
        let harness = Harness::new(
            game_image(),
            MockEnvironment::new("Halo: Combat Evolved Anniversary", Some(module())),
            MockInstaller::new(&[("Present", PRESENT)]).failing(usize::MAX),
        );
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.initialize().unwrap();
        assert!(wait_until(|| instance.status().install_failed));

        assert_eq!(harness.installer.attempts.load(Ordering::SeqCst), 5);
        assert_eq!(instance.state(), ModState::Attaching);
        assert!(!instance.status().hooks_installed);
        instance.cleanup();
    }

    #[test]
    fn test_install_retries_until_success() {
        let harness = Harness::new(
            game_image(),
            MockEnvironment::new("Halo: Combat Evolved Anniversary", Some(module())),
            MockInstaller::new(&[("Present", PRESENT)]).failing(2),
        );
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.initialize().unwrap();
        assert!(wait_until(|| instance.state() == ModState::Active));

        assert_eq!(harness.installer.attempts.load(Ordering::SeqCst), 3);
        assert!(!instance.status().install_failed);
        instance.cleanup();
    }

    #[test]
    fn test_install_waits_for_readiness() {
        let harness = harness(game_image());
        harness.environment.ready.store(false, Ordering::SeqCst);
        let mut config = fast_config();
        config.timing.install_attempts = 1000;
        let instance = SplitScreenMod::new(config, harness.collaborators());

        instance.initialize().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(harness.installer.attempts.load(Ordering::SeqCst), 0);
        assert_eq!(instance.state(), ModState::Attaching);

        harness.environment.ready.store(true, Ordering::SeqCst);
        assert!(wait_until(|| instance.state() == ModState::Active));
        instance.cleanup();
    }

    #[test]
    fn test_scan_failure_uses_fallback_table() {
        let mut config = fast_config();
        config.fallback = crate::offset::FallbackTable::new(vec![crate::offset::FallbackEntry {
            game: crate::identity::GameTitle::HaloCombatEvolved,
            platform: crate::identity::Platform::Steam,
            split_screen_flag: Some(0x800),
            player_count: Some(0x804),
            camera_base: None,
            camera_layout: None,
        }]);
        let memory = BufferMemory::builder(BASE)
            .zeroed(0x1000)
            .write_i32(FLAG, 2)
            .write_i32(COUNT, 2)
            .build();
        let harness = harness(memory);
        let instance = SplitScreenMod::new(config, harness.collaborators());

        assert!(instance.rescan_offsets());

        let registry = instance.registry();
        assert_eq!(registry.address(OffsetName::SplitScreenFlag), Some(FLAG));
        assert_eq!(
            registry.entry(OffsetName::PlayerCount).source,
            OffsetSource::FallbackTable
        );
        assert!(instance.is_feature_enabled());
        assert_eq!(instance.player_count(), 2);
    }

    #[test]
    fn test_unknown_game_without_patterns_is_invalid() {
        let harness = Harness::new(
            BufferMemory::new(BASE, vec![0; 0x1000]),
            MockEnvironment::new("Notepad", Some(module())),
            MockInstaller::new(&[]),
        );
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        assert!(!instance.rescan_offsets());
        assert!(!instance.is_feature_enabled());
        assert_eq!(instance.player_count(), 1);
        assert!(matches!(instance.toggle_feature(), Err(Error::RegistryInvalid)));
        assert!(matches!(instance.test_offsets(), Err(Error::RegistryInvalid)));
        assert_eq!(harness.memory.write_count(), 0);
    }

    #[test]
    fn test_missing_module_yields_invalid_registry() {
        let harness = Harness::new(
            game_image(),
            MockEnvironment::new("Halo 3", None),
            MockInstaller::new(&[]),
        );
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        assert!(!instance.rescan_offsets());
        assert!(instance.registry().module().is_none());
    }

    #[test]
    fn test_toggle_flips_flag_and_count() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());
        instance.rescan_offsets();

        let enabled = instance.toggle_feature().unwrap();
        assert_eq!(
            enabled,
            FeatureState {
                player_count: 2,
                split_screen_enabled: true
            }
        );
        assert_eq!(harness.memory.read_i32(FLAG).unwrap(), 2);

        let disabled = instance.toggle_feature().unwrap();
        assert_eq!(disabled.player_count, 1);
        assert!(!disabled.split_screen_enabled);
        assert_eq!(harness.memory.read_i32(COUNT).unwrap(), 1);
    }

    #[test]
    fn test_offsets_report_change() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());
        instance.rescan_offsets();

        let report = instance.test_offsets().unwrap();

        assert!(report.changed);
        assert!(!report.before.split_screen_enabled);
        assert!(report.after.split_screen_enabled);
    }

    #[test]
    fn test_offsets_fail_when_flag_is_write_protected() {
        let memory = game_image();
        let harness = Harness::new(
            BufferMemory::builder(BASE)
                .bytes(memory.read(BASE, memory.len()).unwrap())
                .protected(FLAG..FLAG + 8)
                .build(),
            MockEnvironment::new("Halo: Combat Evolved Anniversary", Some(module())),
            MockInstaller::new(&[]),
        );
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());
        instance.rescan_offsets();

        assert!(matches!(
            instance.test_offsets(),
            Err(Error::ProtectionChangeFailed { .. })
        ));
        assert_eq!(harness.memory.read_i32(FLAG).unwrap(), 1);
    }

    #[test]
    fn test_export_offsets_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.export.directory = dir.path().to_path_buf();
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(config, harness.collaborators());

        assert!(instance.export_offsets().is_err());

        instance.rescan_offsets();
        let path = instance.export_offsets().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("splitScreenFlag"));
    }

    #[test]
    fn test_rescan_bumps_generation() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());

        instance.rescan_offsets();
        let first = instance.registry().generation();
        instance.rescan_offsets();

        assert!(instance.registry().generation() > first);
    }

    #[test]
    fn test_trigger_dispatches_toggle() {
        let harness = harness(game_image());
        let instance = SplitScreenMod::new(fast_config(), harness.collaborators());
        instance.rescan_offsets();

        instance.trigger(HotkeyAction::ToggleFeature);

        assert!(instance.is_feature_enabled());
    }
}
