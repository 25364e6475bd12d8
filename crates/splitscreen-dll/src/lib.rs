//! Injected DLL for the Halo MCC split screen mod.
//!
//! `DllMain` only starts a thread; the work happens in
//! [`splitscreen_core::SplitScreenMod`]. The exported functions drive the
//! same operations as the hotkeys, for loaders and debugging consoles.

#![cfg(target_os = "windows")]

mod backend;
mod detours;
mod installer;
mod platform;

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;

use splitscreen_core::logging::init_file_logging;
use splitscreen_core::{CONFIG_FILE, Collaborators, Config, LocalMemory, SplitScreenMod};
use tracing::{error, info, warn};
use windows::Win32::Foundation::{BOOL, FALSE, HINSTANCE, HMODULE, TRUE};
use windows::Win32::System::LibraryLoader::DisableThreadLibraryCalls;
use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

use crate::backend::RetourBackend;
use crate::installer::GameHookInstaller;
use crate::platform::{AsyncKeySource, D3d11Compositor, WindowEnvironment, XInputSource};

/// The one mod instance of this process, created on first use.
static INSTANCE: OnceLock<SplitScreenMod> = OnceLock::new();

pub(crate) fn instance() -> Option<&'static SplitScreenMod> {
    INSTANCE.get()
}

fn instance_or_create() -> &'static SplitScreenMod {
    INSTANCE.get_or_init(|| {
        let config = Config::load_or_default(CONFIG_FILE);
        match init_file_logging(&config.logging.file, &config.logging.level) {
            Ok(true) => {}
            Ok(false) => warn!("Logging already initialized"),
            Err(e) => eprintln!("Failed to open log file: {}", e),
        }
        info!(
            "splitscreen {} loaded (install budget {:?})",
            env!("CARGO_PKG_VERSION"),
            config.timing.worst_case_install_time()
        );

        let collaborators = Collaborators {
            memory: Arc::new(LocalMemory::new()),
            environment: Arc::new(WindowEnvironment::new(&config)),
            input: Arc::new(XInputSource),
            keys: Arc::new(AsyncKeySource),
            compositor: Arc::new(D3d11Compositor),
            installer: Arc::new(GameHookInstaller),
            hook_backend: Box::new(RetourBackend::new()),
        };
        SplitScreenMod::new(config, collaborators)
    })
}

/// Run `f`, turning a panic into `default` so it never unwinds into the host.
fn guarded<R>(default: R, f: impl FnOnce() -> R) -> R {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or(default)
}

fn attach() {
    guarded((), || {
        if let Err(e) = instance_or_create().initialize() {
            error!("Initialization failed: {}", e);
        }
    });
}

#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "system" fn DllMain(module: HINSTANCE, reason: u32, reserved: *mut c_void) -> BOOL {
    match reason {
        DLL_PROCESS_ATTACH => {
            // SAFETY: `module` is the handle the loader passed for this DLL.
            unsafe {
                let _ = DisableThreadLibraryCalls(HMODULE(module.0));
            }
            // The loader lock is held here; everything else runs on a thread.
            let _ = thread::Builder::new()
                .name("splitscreen-attach".to_string())
                .spawn(attach);
        }
        DLL_PROCESS_DETACH => {
            // A non-null `reserved` means the process is exiting and other
            // threads are already gone.
            if reserved.is_null()
                && let Some(instance) = instance()
            {
                guarded((), || instance.detach());
            }
        }
        _ => {}
    }
    TRUE
}

fn to_bool(value: bool) -> BOOL {
    if value { TRUE } else { FALSE }
}

#[unsafe(no_mangle)]
pub extern "system" fn InitializeMod() -> BOOL {
    guarded(FALSE, || to_bool(instance_or_create().initialize().is_ok()))
}

#[unsafe(no_mangle)]
pub extern "system" fn CleanupMod() {
    guarded((), || {
        if let Some(instance) = instance() {
            instance.cleanup();
        }
    });
}

#[unsafe(no_mangle)]
pub extern "system" fn ToggleSplitScreen() -> BOOL {
    guarded(FALSE, || {
        to_bool(instance().is_some_and(|instance| instance.toggle_feature().is_ok()))
    })
}

/// Returns TRUE when toggling produced an observable change.
#[unsafe(no_mangle)]
pub extern "system" fn TestOffsets() -> BOOL {
    guarded(FALSE, || {
        to_bool(instance().is_some_and(|instance| {
            instance
                .test_offsets()
                .is_ok_and(|report| report.changed)
        }))
    })
}

#[unsafe(no_mangle)]
pub extern "system" fn ExportOffsets() -> BOOL {
    guarded(FALSE, || {
        to_bool(instance().is_some_and(|instance| instance.export_offsets().is_ok()))
    })
}

#[unsafe(no_mangle)]
pub extern "system" fn RescanOffsets() -> BOOL {
    guarded(FALSE, || {
        to_bool(instance().is_some_and(|instance| instance.rescan_offsets()))
    })
}

#[unsafe(no_mangle)]
pub extern "system" fn IsSplitScreenEnabled() -> BOOL {
    guarded(FALSE, || {
        to_bool(instance().is_some_and(|instance| instance.is_feature_enabled()))
    })
}

#[unsafe(no_mangle)]
pub extern "system" fn GetPlayerCount() -> i32 {
    guarded(1, || instance().map_or(1, |instance| instance.player_count()))
}
