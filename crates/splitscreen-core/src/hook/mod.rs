//! Inline hook bookkeeping on top of a pluggable detour backend.

mod forward;
mod manager;
#[cfg(test)]
pub mod mock;
mod vtable;

pub use forward::ForwardSlot;
pub use manager::HookManager;
pub use vtable::{InterfaceProbe, ProbeInstance, SlotRequest, read_vtable_slot, resolve_vtable_slots};

use thiserror::Error;

use crate::memory::Address;

/// Status codes reported by a detour backend.
///
/// Modelled on the MinHook status set so a MinHook or `retour` backend can
/// map onto it directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("hook subsystem already initialized")]
    AlreadyInitialized,
    #[error("hook subsystem not initialized")]
    NotInitialized,
    #[error("hook already created")]
    AlreadyCreated,
    #[error("hook not created")]
    NotCreated,
    #[error("hook already enabled")]
    AlreadyEnabled,
    #[error("hook not enabled")]
    NotEnabled,
    #[error("target is not executable")]
    NotExecutable,
    #[error("target function cannot be hooked")]
    UnsupportedFunction,
    #[error("failed to allocate trampoline memory")]
    MemoryAlloc,
    #[error("failed to change memory protection")]
    MemoryProtect,
    #[error("{0}")]
    Other(String),
}

/// A detour engine able to patch function prologues in this process.
pub trait HookBackend: Send {
    fn initialize(&mut self) -> Result<(), BackendError>;

    fn uninitialize(&mut self) -> Result<(), BackendError>;

    /// Create a disabled hook redirecting `target` to `detour`.
    ///
    /// Returns the trampoline that runs the original function.
    fn create(&mut self, target: Address, detour: Address) -> Result<Address, BackendError>;

    /// Trampoline of an existing hook on `target`.
    fn trampoline(&self, target: Address) -> Option<Address>;

    fn enable(&mut self, target: Address) -> Result<(), BackendError>;

    /// Enable every created hook.
    fn enable_all(&mut self) -> Result<(), BackendError>;

    fn disable(&mut self, target: Address) -> Result<(), BackendError>;

    fn disable_all(&mut self) -> Result<(), BackendError>;

    fn remove(&mut self, target: Address) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum HookState {
    Uncreated,
    Created,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRecord {
    pub name: String,
    pub target: Address,
    pub detour: Address,
    pub trampoline: Option<Address>,
    pub state: HookState,
}

impl HookRecord {
    pub fn new(name: &str, target: Address, detour: Address) -> Self {
        Self {
            name: name.to_string(),
            target,
            detour,
            trampoline: None,
            state: HookState::Uncreated,
        }
    }

    /// Where forwarded calls should go: the trampoline once it exists,
    /// otherwise the unhooked target itself.
    pub fn entry_point(&self) -> Address {
        self.trampoline.unwrap_or(self.target)
    }

    pub fn is_enabled(&self) -> bool {
        self.state == HookState::Enabled
    }
}
