//! Windows implementations of the host-side services.

use std::cell::RefCell;
use std::ffi::c_void;

use splitscreen_core::config::WindowConfig;
use splitscreen_core::{
    Address, Compositor, Config, Environment, GamepadState, InputSource, KeySource, ModuleRegion,
    Result, Viewport, find_game_module,
};
use tracing::debug;
use windows::Win32::Foundation::{BOOL, FALSE, HWND, LPARAM, TRUE};
use windows::Win32::Graphics::Direct3D11::{D3D11_VIEWPORT, ID3D11Device};
use windows::Win32::Graphics::Dxgi::IDXGISwapChain;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentProcessId;
use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
};
use windows::core::HSTRING;

use crate::detours;

pub struct WindowEnvironment {
    window: WindowConfig,
    module_names: Vec<String>,
}

impl WindowEnvironment {
    pub fn new(config: &Config) -> Self {
        Self {
            window: config.window.clone(),
            module_names: config.module.names.clone(),
        }
    }

    fn libraries_loaded(&self) -> bool {
        self.window.required_libraries.iter().all(|name| {
            // SAFETY: plain module lookup by name.
            unsafe { GetModuleHandleW(&HSTRING::from(name.as_str())) }.is_ok()
        })
    }
}

impl Environment for WindowEnvironment {
    fn is_ready(&self) -> bool {
        find_game_window(&self.window).is_some() && self.libraries_loaded()
    }

    fn window_title(&self) -> Option<String> {
        find_game_window(&self.window)
    }

    fn game_module(&self) -> Result<ModuleRegion> {
        find_game_module(&self.module_names)
    }
}

thread_local! {
    static FOUND_TITLE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Title of the first visible window of this process matching the keywords.
fn find_game_window(window: &WindowConfig) -> Option<String> {
    FOUND_TITLE.with(|cell| cell.borrow_mut().take());
    // SAFETY: the callback only dereferences `window`, which outlives the
    // enumeration.
    unsafe {
        let _ = EnumWindows(
            Some(enum_callback),
            LPARAM(window as *const WindowConfig as isize),
        );
    }
    FOUND_TITLE.with(|cell| cell.borrow_mut().take())
}

unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: `lparam` is the `&WindowConfig` passed by `find_game_window`.
    let window = unsafe { &*(lparam.0 as *const WindowConfig) };

    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
    if pid != unsafe { GetCurrentProcessId() } || !unsafe { IsWindowVisible(hwnd) }.as_bool() {
        return TRUE;
    }

    let mut buf = [0u16; 512];
    let len = unsafe { GetWindowTextW(hwnd, &mut buf) };
    if len <= 0 {
        return TRUE;
    }
    let title = String::from_utf16_lossy(&buf[..len as usize]);
    if window.matches_title(&title) {
        FOUND_TITLE.with(|cell| *cell.borrow_mut() = Some(title));
        return FALSE;
    }
    TRUE
}

pub struct XInputSource;

impl InputSource for XInputSource {
    fn query(&self, index: u32) -> Option<GamepadState> {
        detours::query_gamepad(index)
    }
}

pub struct AsyncKeySource;

impl KeySource for AsyncKeySource {
    fn is_down(&self, key: u32) -> bool {
        // SAFETY: GetAsyncKeyState accepts any virtual-key code.
        let state = unsafe { GetAsyncKeyState(key as i32) };
        (state as u16 & 0x8000) != 0
    }
}

/// Sets per-player viewports on the swapchain's immediate context.
pub struct D3d11Compositor;

fn borrow_swapchain(surface: Address) -> Option<IDXGISwapChain> {
    let raw = surface as *mut c_void;
    // SAFETY: `surface` is the swapchain the host passed to Present, alive
    // for the duration of the call.
    unsafe { IDXGISwapChain::from_raw_borrowed(&raw) }.cloned()
}

impl Compositor for D3d11Compositor {
    fn surface_size(&self, surface: Address) -> Option<(u32, u32)> {
        let swapchain = borrow_swapchain(surface)?;
        // SAFETY: valid swapchain obtained above.
        let desc = unsafe { swapchain.GetDesc() }.ok()?;
        Some((desc.BufferDesc.Width, desc.BufferDesc.Height))
    }

    fn compose(&self, surface: Address, viewports: &[Viewport]) {
        let Some(swapchain) = borrow_swapchain(surface) else {
            return;
        };
        // SAFETY: COM calls on objects owned by the host's live swapchain.
        let context = unsafe { swapchain.GetDevice::<ID3D11Device>() }
            .and_then(|device| unsafe { device.GetImmediateContext() });
        let context = match context {
            Ok(context) => context,
            Err(e) => {
                debug!("No immediate context: {}", e);
                return;
            }
        };

        let rects: Vec<D3D11_VIEWPORT> = viewports
            .iter()
            .map(|v| D3D11_VIEWPORT {
                TopLeftX: v.x,
                TopLeftY: v.y,
                Width: v.width,
                Height: v.height,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            })
            .collect();
        unsafe { context.RSSetViewports(Some(&rects)) };
    }

    fn release(&self) {
        // Nothing is cached across frames; COM references drop with each call.
        debug!("Compositor released");
    }
}
