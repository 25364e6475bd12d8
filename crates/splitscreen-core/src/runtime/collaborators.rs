//! Host-side services the coordinator is built from.

use std::sync::Arc;

use crate::error::Result;
use crate::hook::{HookBackend, HookManager};
use crate::hotkey::KeySource;
use crate::input::InputSource;
use crate::memory::{MemoryAccess, ModuleRegion};
use crate::render::Compositor;

/// Coarse checks on the host process.
pub trait Environment: Send + Sync {
    /// Game window visible and required graphics libraries loaded.
    fn is_ready(&self) -> bool;

    /// Title of the game window, used to tell the games apart.
    fn window_title(&self) -> Option<String>;

    /// The executable image to scan.
    fn game_module(&self) -> Result<ModuleRegion>;
}

/// Installs the mod's interceptors.
///
/// Called once per installation attempt with the shared hook manager.
/// Hooks enabled by an earlier, partially failed attempt are still in the
/// manager, so installing them again converges instead of duplicating.
pub trait HookInstaller: Send + Sync {
    fn install(&self, hooks: &mut HookManager) -> Result<()>;
}

pub struct Collaborators {
    pub memory: Arc<dyn MemoryAccess>,
    pub environment: Arc<dyn Environment>,
    pub input: Arc<dyn InputSource>,
    pub keys: Arc<dyn KeySource>,
    pub compositor: Arc<dyn Compositor>,
    pub installer: Arc<dyn HookInstaller>,
    pub hook_backend: Box<dyn HookBackend>,
}
