//! Scriptable detour backend for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BackendError, HookBackend};
use crate::memory::Address;

#[derive(Default)]
struct MockState {
    initialized: bool,
    hooks: HashMap<Address, bool>,
    create_calls: HashMap<Address, usize>,
    enable_all_calls: usize,
    fail_create: HashSet<Address>,
    fail_enable: HashSet<Address>,
    fail_enable_all: bool,
    events: Vec<String>,
}

/// Cloneable handle; every clone observes the same backend state.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trampoline_for(target: Address) -> Address {
        target + 0x100_0000
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Pretend another agent already created a hook on `target`.
    pub fn preexisting(&self, target: Address) {
        self.lock().hooks.insert(target, false);
    }

    pub fn fail_create(&self, target: Address) {
        self.lock().fail_create.insert(target);
    }

    pub fn fail_enable(&self, target: Address) {
        self.lock().fail_enable.insert(target);
    }

    pub fn fail_enable_all(&self) {
        self.lock().fail_enable_all = true;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_create.clear();
        state.fail_enable.clear();
        state.fail_enable_all = false;
    }

    pub fn is_created(&self, target: Address) -> bool {
        self.lock().hooks.contains_key(&target)
    }

    pub fn is_enabled(&self, target: Address) -> bool {
        self.lock().hooks.get(&target).copied().unwrap_or(false)
    }

    pub fn enabled_targets(&self) -> Vec<Address> {
        let mut targets: Vec<Address> = self
            .lock()
            .hooks
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(target, _)| *target)
            .collect();
        targets.sort_unstable();
        targets
    }

    pub fn create_calls(&self, target: Address) -> usize {
        self.lock().create_calls.get(&target).copied().unwrap_or(0)
    }

    pub fn enable_all_calls(&self) -> usize {
        self.lock().enable_all_calls
    }

    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }
}

impl HookBackend for MockBackend {
    fn initialize(&mut self) -> Result<(), BackendError> {
        let mut state = self.lock();
        if state.initialized {
            return Err(BackendError::AlreadyInitialized);
        }
        state.initialized = true;
        state.events.push("init".to_string());
        Ok(())
    }

    fn uninitialize(&mut self) -> Result<(), BackendError> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(BackendError::NotInitialized);
        }
        state.initialized = false;
        state.hooks.clear();
        state.events.push("uninit".to_string());
        Ok(())
    }

    fn create(&mut self, target: Address, _detour: Address) -> Result<Address, BackendError> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(BackendError::NotInitialized);
        }
        *state.create_calls.entry(target).or_default() += 1;
        if state.fail_create.contains(&target) {
            return Err(BackendError::NotExecutable);
        }
        if state.hooks.contains_key(&target) {
            return Err(BackendError::AlreadyCreated);
        }
        state.hooks.insert(target, false);
        state.events.push(format!("create {:X}", target));
        Ok(Self::trampoline_for(target))
    }

    fn trampoline(&self, target: Address) -> Option<Address> {
        self.is_created(target).then(|| Self::trampoline_for(target))
    }

    fn enable(&mut self, target: Address) -> Result<(), BackendError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.fail_enable.contains(&target) {
            return Err(BackendError::MemoryProtect);
        }
        match state.hooks.get_mut(&target) {
            Some(true) => Err(BackendError::AlreadyEnabled),
            Some(enabled) => {
                *enabled = true;
                state.events.push(format!("enable {:X}", target));
                Ok(())
            }
            None => Err(BackendError::NotCreated),
        }
    }

    fn enable_all(&mut self) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.enable_all_calls += 1;
        if state.fail_enable_all {
            return Err(BackendError::MemoryProtect);
        }
        state.hooks.values_mut().for_each(|enabled| *enabled = true);
        state.events.push("enable_all".to_string());
        Ok(())
    }

    fn disable(&mut self, target: Address) -> Result<(), BackendError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.hooks.get_mut(&target) {
            Some(enabled) if *enabled => {
                *enabled = false;
                state.events.push(format!("disable {:X}", target));
                Ok(())
            }
            Some(_) => Err(BackendError::NotEnabled),
            None => Err(BackendError::NotCreated),
        }
    }

    fn disable_all(&mut self) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.hooks.values_mut().for_each(|enabled| *enabled = false);
        state.events.push("disable_all".to_string());
        Ok(())
    }

    fn remove(&mut self, target: Address) -> Result<(), BackendError> {
        let mut state = self.lock();
        if state.hooks.remove(&target).is_none() {
            return Err(BackendError::NotCreated);
        }
        state.events.push(format!("remove {:X}", target));
        Ok(())
    }
}
