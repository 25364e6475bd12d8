//! `retour` detours behind the core's hook backend trait.

use std::collections::HashMap;

use retour::RawDetour;
use splitscreen_core::{Address, BackendError, HookBackend};
use tracing::debug;

use crate::detours;

struct Installed {
    raw: RawDetour,
    detour: Address,
}

#[derive(Default)]
pub struct RetourBackend {
    initialized: bool,
    hooks: HashMap<Address, Installed>,
}

impl RetourBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_initialized(&self) -> Result<(), BackendError> {
        if self.initialized {
            Ok(())
        } else {
            Err(BackendError::NotInitialized)
        }
    }

    fn installed(&self, target: Address) -> Result<&Installed, BackendError> {
        self.ensure_initialized()?;
        self.hooks.get(&target).ok_or(BackendError::NotCreated)
    }
}

fn map_error(error: retour::Error) -> BackendError {
    match error {
        retour::Error::NotExecutable => BackendError::NotExecutable,
        retour::Error::OutOfMemory => BackendError::MemoryAlloc,
        retour::Error::RegionFailure(_) => BackendError::MemoryProtect,
        retour::Error::UnsupportedInstruction => BackendError::UnsupportedFunction,
        other => BackendError::Other(other.to_string()),
    }
}

impl HookBackend for RetourBackend {
    fn initialize(&mut self) -> Result<(), BackendError> {
        if self.initialized {
            return Err(BackendError::AlreadyInitialized);
        }
        self.initialized = true;
        Ok(())
    }

    fn uninitialize(&mut self) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        for target in self.hooks.keys().copied().collect::<Vec<_>>() {
            self.remove(target)?;
        }
        self.initialized = false;
        Ok(())
    }

    fn create(&mut self, target: Address, detour: Address) -> Result<Address, BackendError> {
        self.ensure_initialized()?;
        if self.hooks.contains_key(&target) {
            return Err(BackendError::AlreadyCreated);
        }

        // SAFETY: `target` is the entry of a function in this process and
        // `detour` has the same signature; the hook stays disabled until
        // `enable` is called.
        let raw = unsafe { RawDetour::new(target as *const (), detour as *const ()) }
            .map_err(map_error)?;
        let trampoline = raw.trampoline() as *const () as Address;

        // Publish before the hook can be enabled, so the detour never runs
        // without somewhere to forward to.
        detours::publish(detour, target, trampoline);
        debug!("Detour 0x{:X} -> 0x{:X} (trampoline 0x{:X})", target, detour, trampoline);

        self.hooks.insert(target, Installed { raw, detour });
        Ok(trampoline)
    }

    fn trampoline(&self, target: Address) -> Option<Address> {
        self.hooks
            .get(&target)
            .map(|installed| installed.raw.trampoline() as *const () as Address)
    }

    fn enable(&mut self, target: Address) -> Result<(), BackendError> {
        let installed = self.installed(target)?;
        if installed.raw.is_enabled() {
            return Err(BackendError::AlreadyEnabled);
        }
        // SAFETY: the detour was created against a live function in `create`.
        unsafe { installed.raw.enable() }.map_err(map_error)
    }

    fn enable_all(&mut self) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        let mut result = Ok(());
        for installed in self.hooks.values().filter(|i| !i.raw.is_enabled()) {
            // SAFETY: as in `enable`.
            if let Err(e) = unsafe { installed.raw.enable() } {
                result = Err(map_error(e));
            }
        }
        result
    }

    fn disable(&mut self, target: Address) -> Result<(), BackendError> {
        let installed = self.installed(target)?;
        if !installed.raw.is_enabled() {
            return Err(BackendError::NotEnabled);
        }
        // SAFETY: restores the original prologue saved by `create`.
        unsafe { installed.raw.disable() }.map_err(map_error)
    }

    fn disable_all(&mut self) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        let mut result = Ok(());
        for installed in self.hooks.values().filter(|i| i.raw.is_enabled()) {
            // SAFETY: as in `disable`.
            if let Err(e) = unsafe { installed.raw.disable() } {
                result = Err(map_error(e));
            }
        }
        result
    }

    fn remove(&mut self, target: Address) -> Result<(), BackendError> {
        self.ensure_initialized()?;
        let installed = self.hooks.remove(&target).ok_or(BackendError::NotCreated)?;
        if installed.raw.is_enabled() {
            // SAFETY: as in `disable`.
            unsafe { installed.raw.disable() }.map_err(map_error)?;
        }
        detours::retract(installed.detour);
        Ok(())
    }
}
