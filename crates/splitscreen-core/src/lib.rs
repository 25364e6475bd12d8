//! # splitscreen-core
//!
//! Core library for the Halo MCC split screen mod.
//!
//! This crate provides:
//! - Fault-tolerant access to the memory of the host process
//! - Signature scanning with RIP-relative displacement decoding
//! - The offset registry, with a recorded fallback table per game and platform
//! - Hook bookkeeping over a pluggable detour backend
//! - The runtime coordinator driving installation, input, camera and rendering
//!
//! Nothing here talks to Direct3D or XInput directly; the DLL crate supplies
//! those through the traits in [`runtime`], [`input`], [`hotkey`] and [`render`].

pub mod camera;
pub mod config;
pub mod error;
pub mod hook;
pub mod hotkey;
pub mod identity;
pub mod input;
pub mod logging;
pub mod memory;
pub mod offset;
pub mod render;
pub mod runtime;
pub mod scanner;
pub mod signature;

pub use camera::{CameraState, CameraTuning};
pub use config::{CONFIG_FILE, Config};
pub use error::{Error, Result};
pub use hook::{BackendError, ForwardSlot, HookBackend, HookManager, HookRecord, HookState};
pub use hotkey::{HotkeyAction, HotkeyBindings, KeySource};
pub use identity::{GameIdentity, GameTitle, Platform};
pub use input::{GamepadState, InputSource, PlayerSlot};
pub use memory::{
    Address, BufferMemory, LocalMemory, MemoryAccess, MemoryAccessExt, ModuleRegion,
    find_game_module,
};
pub use offset::{
    CameraLayout, FallbackEntry, FallbackTable, OffsetEntry, OffsetName, OffsetRegistry,
    OffsetSource, export_registry, scan,
};
pub use render::{Compositor, Viewport, split_viewports};
pub use runtime::{
    Collaborators, Environment, FeatureState, HookInstaller, ModState, ModStatus,
    OffsetTestReport, SplitScreenMod,
};
pub use scanner::ModuleScanner;
pub use signature::{
    CodeSignature, OffsetSignatureEntry, OffsetSignatureSet, SignaturePattern,
    builtin_signatures, load_signatures, save_signatures,
};
