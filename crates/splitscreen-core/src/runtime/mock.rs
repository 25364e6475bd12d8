//! In-process stand-ins for the host services.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use super::collaborators::{Collaborators, Environment, HookInstaller};
use crate::error::{Error, Result};
use crate::hook::HookManager;
use crate::hook::mock::MockBackend;
use crate::hotkey::KeySource;
use crate::input::{GamepadState, InputSource};
use crate::memory::{Address, BufferMemory, ModuleRegion};
use crate::render::{Compositor, Viewport};

pub struct MockEnvironment {
    pub ready: AtomicBool,
    pub title: Mutex<Option<String>>,
    pub module: Mutex<Option<ModuleRegion>>,
}

impl MockEnvironment {
    pub fn new(title: &str, module: Option<ModuleRegion>) -> Self {
        Self {
            ready: AtomicBool::new(true),
            title: Mutex::new(Some(title.to_string())),
            module: Mutex::new(module),
        }
    }
}

impl Environment for MockEnvironment {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn window_title(&self) -> Option<String> {
        self.title.lock().unwrap().clone()
    }

    fn game_module(&self) -> Result<ModuleRegion> {
        self.module
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::ModuleNotFound("mock".to_string()))
    }
}

/// Installs one hook per target; fails the first `failures` attempts.
pub struct MockInstaller {
    pub targets: Vec<(String, Address)>,
    pub failures: AtomicUsize,
    pub attempts: AtomicUsize,
    /// When set, every attempt rendezvous on this barrier twice: once on
    /// entry and once before returning.
    pub gate: Option<Arc<Barrier>>,
}

impl MockInstaller {
    pub fn new(targets: &[(&str, Address)]) -> Self {
        Self {
            targets: targets
                .iter()
                .map(|(name, target)| (name.to_string(), *target))
                .collect(),
            failures: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn failing(self, failures: usize) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn gated(mut self, gate: Arc<Barrier>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl HookInstaller for MockInstaller {
    fn install(&self, hooks: &mut HookManager) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        let result = if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            Err(Error::HookBackend("scripted failure".to_string()))
        } else {
            self.targets.iter().try_for_each(|(name, target)| {
                hooks.install(name, *target, *target + 0x10).map(|_| ())
            })
        };
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        result
    }
}

#[derive(Default)]
pub struct MockInput {
    pub devices: Mutex<HashMap<u32, GamepadState>>,
}

impl MockInput {
    pub fn connect(&self, index: u32) {
        self.devices
            .lock()
            .unwrap()
            .insert(index, GamepadState::default());
    }
}

impl InputSource for MockInput {
    fn query(&self, index: u32) -> Option<GamepadState> {
        self.devices.lock().unwrap().get(&index).copied()
    }
}

#[derive(Default)]
pub struct MockKeys {
    pub down: Mutex<HashSet<u32>>,
}

impl KeySource for MockKeys {
    fn is_down(&self, key: u32) -> bool {
        self.down.lock().unwrap().contains(&key)
    }
}

pub struct MockCompositor {
    pub size: Option<(u32, u32)>,
    pub composed: Mutex<Vec<Vec<Viewport>>>,
    pub releases: AtomicUsize,
    /// When set, `surface_size` rendezvous here twice so a test can hold a
    /// frame in flight.
    pub gate: Mutex<Option<Arc<Barrier>>>,
}

impl MockCompositor {
    pub fn new(size: Option<(u32, u32)>) -> Self {
        Self {
            size,
            composed: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
            gate: Mutex::new(None),
        }
    }

    pub fn compose_count(&self) -> usize {
        self.composed.lock().unwrap().len()
    }
}

impl Compositor for MockCompositor {
    fn surface_size(&self, _surface: Address) -> Option<(u32, u32)> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
        self.size
    }

    fn compose(&self, _surface: Address, viewports: &[Viewport]) {
        self.composed.lock().unwrap().push(viewports.to_vec());
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handles kept by a test after the collaborators move into the coordinator.
pub struct Harness {
    pub memory: Arc<BufferMemory>,
    pub environment: Arc<MockEnvironment>,
    pub input: Arc<MockInput>,
    pub keys: Arc<MockKeys>,
    pub compositor: Arc<MockCompositor>,
    pub installer: Arc<MockInstaller>,
    pub backend: MockBackend,
}

impl Harness {
    pub fn new(memory: BufferMemory, environment: MockEnvironment, installer: MockInstaller) -> Self {
        Self {
            memory: Arc::new(memory),
            environment: Arc::new(environment),
            input: Arc::new(MockInput::default()),
            keys: Arc::new(MockKeys::default()),
            compositor: Arc::new(MockCompositor::new(Some((1920, 1080)))),
            installer: Arc::new(installer),
            backend: MockBackend::new(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            memory: self.memory.clone(),
            environment: self.environment.clone(),
            input: self.input.clone(),
            keys: self.keys.clone(),
            compositor: self.compositor.clone(),
            installer: self.installer.clone(),
            hook_backend: Box::new(self.backend.clone()),
        }
    }
}
