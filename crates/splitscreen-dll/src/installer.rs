//! Hook installation for the swapchain and XInput entry points.

use splitscreen_core::hook::{InterfaceProbe, ProbeInstance, SlotRequest, resolve_vtable_slots};
use splitscreen_core::{Address, Error, HookInstaller, HookManager, LocalMemory, Result};
use tracing::{debug, info, warn};
use windows::Win32::Foundation::{HMODULE, TRUE};
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CREATE_DEVICE_FLAG, D3D11_SDK_VERSION, D3D11CreateDeviceAndSwapChain, ID3D11Device,
    ID3D11DeviceContext,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_MODE_DESC, DXGI_RATIONAL, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    DXGI_SWAP_CHAIN_DESC, DXGI_SWAP_EFFECT_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT, IDXGIAdapter,
    IDXGISwapChain,
};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress, LoadLibraryW};
use windows::Win32::UI::WindowsAndMessaging::GetDesktopWindow;
use windows::core::{HSTRING, Interface, s};

use crate::detours;

const PRESENT_SLOT: usize = 8;
const RESIZE_BUFFERS_SLOT: usize = 13;

const XINPUT_MODULES: [&str; 3] = ["xinput1_4.dll", "xinput1_3.dll", "xinput9_1_0.dll"];

/// Installs the Present, ResizeBuffers and XInputGetState hooks.
pub struct GameHookInstaller;

impl HookInstaller for GameHookInstaller {
    fn install(&self, hooks: &mut HookManager) -> Result<()> {
        install_xinput(hooks)?;
        install_swapchain(hooks)
    }
}

/// A device and swapchain created against the desktop window.
struct SwapChainInstance {
    swapchain: IDXGISwapChain,
    _device: ID3D11Device,
    _context: ID3D11DeviceContext,
}

impl ProbeInstance for SwapChainInstance {
    fn objects(&self) -> Vec<Address> {
        vec![self.swapchain.as_raw() as Address]
    }
}

struct SwapChainProbe;

impl InterfaceProbe for SwapChainProbe {
    type Instance = SwapChainInstance;

    fn create(&self) -> Result<SwapChainInstance> {
        let desc = DXGI_SWAP_CHAIN_DESC {
            BufferDesc: DXGI_MODE_DESC {
                Width: 800,
                Height: 600,
                RefreshRate: DXGI_RATIONAL {
                    Numerator: 60,
                    Denominator: 1,
                },
                Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                ..Default::default()
            },
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: 1,
            // SAFETY: GetDesktopWindow has no preconditions.
            OutputWindow: unsafe { GetDesktopWindow() },
            Windowed: TRUE,
            SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
            Flags: 0,
        };

        let mut swapchain = None;
        let mut device = None;
        let mut context = None;
        // SAFETY: all out-parameters point at live locals.
        unsafe {
            D3D11CreateDeviceAndSwapChain(
                None::<&IDXGIAdapter>,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_FLAG(0),
                None,
                D3D11_SDK_VERSION,
                Some(&desc),
                Some(&mut swapchain),
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|e| Error::HookBackend(format!("temporary D3D11 device: {}", e)))?;

        match (swapchain, device, context) {
            (Some(swapchain), Some(device), Some(context)) => Ok(SwapChainInstance {
                swapchain,
                _device: device,
                _context: context,
            }),
            _ => Err(Error::HookBackend(
                "temporary D3D11 device returned no objects".to_string(),
            )),
        }
    }
}

fn install_swapchain(hooks: &mut HookManager) -> Result<()> {
    let memory = LocalMemory::new();
    let requests = [
        SlotRequest {
            object: 0,
            slot: PRESENT_SLOT,
        },
        SlotRequest {
            object: 0,
            slot: RESIZE_BUFFERS_SLOT,
        },
    ];
    let addresses = resolve_vtable_slots(&memory, &SwapChainProbe, &requests)?;
    let &[present, resize_buffers] = addresses.as_slice() else {
        return Err(Error::InvalidState("vtable probe returned too few slots".to_string()));
    };

    hooks.install("IDXGISwapChain::Present", present, detours::present_address())?;
    // Without this hook resizing only leaks compositor state, so it is optional.
    if let Err(e) = hooks.install(
        "IDXGISwapChain::ResizeBuffers",
        resize_buffers,
        detours::resize_buffers_address(),
    ) {
        warn!("ResizeBuffers hook unavailable: {}", e);
    }
    Ok(())
}

fn install_xinput(hooks: &mut HookManager) -> Result<()> {
    for name in XINPUT_MODULES {
        let library = HSTRING::from(name);
        // SAFETY: plain module lookups by name.
        let module = match unsafe { GetModuleHandleW(&library) }
            .or_else(|_| unsafe { LoadLibraryW(&library) })
        {
            Ok(module) => module,
            Err(e) => {
                debug!("{} unavailable: {}", name, e);
                continue;
            }
        };

        // SAFETY: `module` is loaded and the name is a valid C string.
        let Some(proc) = (unsafe { GetProcAddress(module, s!("XInputGetState")) }) else {
            debug!("{} has no XInputGetState", name);
            continue;
        };

        match hooks.install(
            "XInputGetState",
            proc as usize as Address,
            detours::xinput_get_state_address(),
        ) {
            Ok(_) => {
                info!("XInputGetState hooked in {}", name);
                return Ok(());
            }
            Err(e) => warn!("Failed to hook XInputGetState in {}: {}", name, e),
        }
    }
    Err(Error::ModuleNotFound("XInputGetState".to_string()))
}
