use tracing::{debug, info, warn};

use super::{BackendError, HookBackend, HookRecord, HookState};
use crate::error::{Error, Result};
use crate::memory::Address;

/// Owns every hook the mod installs and drives each through
/// `Uncreated -> Created -> Enabled (-> Disabled)`.
pub struct HookManager {
    backend: Box<dyn HookBackend>,
    records: Vec<HookRecord>,
    initialized: bool,
}

impl HookManager {
    pub fn new(backend: Box<dyn HookBackend>) -> Self {
        Self {
            backend,
            records: Vec::new(),
            initialized: false,
        }
    }

    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        match self.backend.initialize() {
            Ok(()) | Err(BackendError::AlreadyInitialized) => {
                self.initialized = true;
                debug!("Hook subsystem initialized");
                Ok(())
            }
            Err(e) => Err(Error::HookBackend(e.to_string())),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn records(&self) -> &[HookRecord] {
        &self.records
    }

    pub fn record(&self, target: Address) -> Option<&HookRecord> {
        self.records.iter().find(|r| r.target == target)
    }

    pub fn enabled_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_enabled()).count()
    }

    /// Install a hook on `target` and enable it.
    ///
    /// Installing again over an enabled hook with the same detour returns the
    /// existing record. A backend that reports the target as already created
    /// is treated as a soft success. A failed per-hook enable is retried once
    /// through a bulk enable; if that fails too, the hook created by this call
    /// is removed again and no record is kept.
    pub fn install(&mut self, name: &str, target: Address, detour: Address) -> Result<HookRecord> {
        if target == 0 {
            return Err(Error::HookCreateFailed {
                address: target,
                reason: "null target".to_string(),
            });
        }
        self.initialize()?;

        let index = match self.records.iter().position(|r| r.target == target) {
            Some(index) => {
                let existing = &self.records[index];
                if existing.detour != detour {
                    return Err(Error::AlreadyHooked { address: target });
                }
                if existing.is_enabled() {
                    debug!("{} already enabled at 0x{:X}", name, target);
                    return Ok(existing.clone());
                }
                index
            }
            None => {
                self.records.push(HookRecord::new(name, target, detour));
                self.records.len() - 1
            }
        };

        let mut created_here = false;
        if self.records[index].state == HookState::Uncreated {
            let trampoline = match self.backend.create(target, detour) {
                Ok(trampoline) => {
                    created_here = true;
                    Some(trampoline)
                }
                Err(BackendError::AlreadyCreated) => {
                    warn!(
                        "{} at 0x{:X} is already hooked, continuing with existing hook",
                        name, target
                    );
                    self.backend.trampoline(target)
                }
                Err(e) => {
                    self.records.remove(index);
                    return Err(Error::HookCreateFailed {
                        address: target,
                        reason: e.to_string(),
                    });
                }
            };
            let record = &mut self.records[index];
            record.trampoline = trampoline;
            record.state = HookState::Created;
            debug!(
                "{} created at 0x{:X} (trampoline: 0x{:X})",
                name,
                target,
                record.entry_point()
            );
        }

        match self.backend.enable(target) {
            Ok(()) | Err(BackendError::AlreadyEnabled) => {}
            Err(e) => {
                warn!(
                    "Enabling {} at 0x{:X} failed ({}), retrying with bulk enable",
                    name, target, e
                );
                if let Err(e) = self.backend.enable_all() {
                    self.roll_back(index, created_here);
                    return Err(Error::HookEnableFailed {
                        address: target,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let record = &mut self.records[index];
        record.state = HookState::Enabled;
        info!("{} hook enabled at 0x{:X}", name, target);
        Ok(record.clone())
    }

    fn roll_back(&mut self, index: usize, created_here: bool) {
        let record = self.records.remove(index);
        if created_here && let Err(e) = self.backend.remove(record.target) {
            debug!("Rolling back {} at 0x{:X}: {}", record.name, record.target, e);
        }
        warn!("{} at 0x{:X} rolled back", record.name, record.target);
    }

    /// Disable and remove the hook on `target`.
    pub fn uninstall(&mut self, target: Address) -> Result<()> {
        let Some(index) = self.records.iter().position(|r| r.target == target) else {
            return Ok(());
        };

        if self.records[index].state == HookState::Enabled {
            match self.backend.disable(target) {
                Ok(()) | Err(BackendError::NotEnabled) => {}
                Err(e) => return Err(Error::HookBackend(e.to_string())),
            }
            self.records[index].state = HookState::Disabled;
        }

        match self.backend.remove(target) {
            Ok(()) | Err(BackendError::NotCreated) => {}
            Err(e) => return Err(Error::HookBackend(e.to_string())),
        }
        let record = self.records.remove(index);
        info!("{} hook removed from 0x{:X}", record.name, target);
        Ok(())
    }

    /// Disable every hook, remove them and shut the backend down.
    ///
    /// Safe to call when nothing was ever installed, and more than once.
    pub fn uninstall_all(&mut self) {
        if !self.initialized {
            self.records.clear();
            return;
        }

        if let Err(e) = self.backend.disable_all() {
            warn!("Bulk disable failed: {}", e);
        }
        for record in &mut self.records {
            if record.state == HookState::Enabled {
                record.state = HookState::Disabled;
            }
        }

        // Newest first, so a hook layered on an earlier one comes off before it.
        for record in self.records.drain(..).rev() {
            if let Err(e) = self.backend.remove(record.target) {
                debug!("Removing {} at 0x{:X}: {}", record.name, record.target, e);
            }
        }

        if let Err(e) = self.backend.uninitialize() {
            warn!("Hook subsystem shutdown failed: {}", e);
        }
        self.initialized = false;
        info!("All hooks removed");
    }
}
