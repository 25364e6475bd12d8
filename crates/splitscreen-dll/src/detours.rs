//! Replacement entry points for the hooked functions.
//!
//! Each detour loads the forwarding address published by the backend and
//! hands the call to the mod instance, which forwards exactly once. Before a
//! trampoline exists, or after the hook is removed, that address is the
//! unhooked target itself.

use std::ffi::c_void;
use splitscreen_core::{Address, ForwardSlot, GamepadState};
use windows::Win32::Foundation::{ERROR_SUCCESS, S_OK};
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT;
use windows::Win32::UI::Input::XboxController::{XINPUT_GAMEPAD, XINPUT_STATE, XInputGetState};
use windows::core::HRESULT;

type PresentFn = unsafe extern "system" fn(*mut c_void, u32, u32) -> HRESULT;
type ResizeBuffersFn =
    unsafe extern "system" fn(*mut c_void, u32, u32, u32, DXGI_FORMAT, u32) -> HRESULT;
type XInputGetStateFn = unsafe extern "system" fn(u32, *mut XINPUT_STATE) -> u32;

static PRESENT: ForwardSlot = ForwardSlot::new();
static RESIZE_BUFFERS: ForwardSlot = ForwardSlot::new();
static XINPUT_GET_STATE: ForwardSlot = ForwardSlot::new();

pub fn present_address() -> Address {
    present as usize as Address
}

pub fn resize_buffers_address() -> Address {
    resize_buffers as usize as Address
}

pub fn xinput_get_state_address() -> Address {
    xinput_get_state as usize as Address
}

fn slot_for(detour: Address) -> Option<&'static ForwardSlot> {
    [
        (present_address(), &PRESENT),
        (resize_buffers_address(), &RESIZE_BUFFERS),
        (xinput_get_state_address(), &XINPUT_GET_STATE),
    ]
    .into_iter()
    .find(|(address, _)| *address == detour)
    .map(|(_, slot)| slot)
}

/// Record where `detour` forwards to: `trampoline`, or `target` once retracted.
pub fn publish(detour: Address, target: Address, trampoline: Address) {
    if let Some(slot) = slot_for(detour) {
        slot.publish(target, trampoline);
    }
}

pub fn retract(detour: Address) {
    if let Some(slot) = slot_for(detour) {
        slot.retract();
    }
}

fn original<F: Copy>(slot: &ForwardSlot) -> Option<F> {
    let address = slot.entry_point()? as usize;
    // SAFETY: each slot only ever holds the target and trampoline of the
    // function whose signature `F` names, and `F` is a function pointer type.
    Some(unsafe { std::mem::transmute_copy::<usize, F>(&address) })
}

unsafe extern "system" fn present(swapchain: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT {
    // Only reachable if the detour runs without ever being created.
    let Some(original) = original::<PresentFn>(&PRESENT) else {
        return S_OK;
    };
    // SAFETY: forwards the host's own arguments to the original function.
    let forward = || unsafe { original(swapchain, sync_interval, flags) };
    match crate::instance() {
        Some(instance) => instance.on_present(swapchain as Address, forward),
        None => forward(),
    }
}

unsafe extern "system" fn resize_buffers(
    swapchain: *mut c_void,
    buffer_count: u32,
    width: u32,
    height: u32,
    format: DXGI_FORMAT,
    flags: u32,
) -> HRESULT {
    // As in `present`.
    let Some(original) = original::<ResizeBuffersFn>(&RESIZE_BUFFERS) else {
        return S_OK;
    };
    // SAFETY: as in `present`.
    let forward = || unsafe { original(swapchain, buffer_count, width, height, format, flags) };
    match crate::instance() {
        Some(instance) => instance.on_resize(forward),
        None => forward(),
    }
}

unsafe extern "system" fn xinput_get_state(index: u32, state: *mut XINPUT_STATE) -> u32 {
    let original = original::<XInputGetStateFn>(&XINPUT_GET_STATE)
        .unwrap_or(linked_xinput_get_state);
    let forward = || {
        // SAFETY: as in `present`; `state` is the caller's out-parameter.
        let code = unsafe { original(index, state) };
        let gamepad = (code == ERROR_SUCCESS.0 && !state.is_null())
            .then(|| gamepad_from(unsafe { &(*state).Gamepad }));
        (code, gamepad)
    };
    match crate::instance() {
        Some(instance) => instance.on_input_query(index, forward),
        None => forward().0,
    }
}

/// The import this DLL links against; used only while no hook is published.
unsafe extern "system" fn linked_xinput_get_state(index: u32, state: *mut XINPUT_STATE) -> u32 {
    // SAFETY: the caller passes a valid out-parameter.
    unsafe { XInputGetState(index, state) }
}

fn gamepad_from(pad: &XINPUT_GAMEPAD) -> GamepadState {
    GamepadState {
        buttons: pad.wButtons.0,
        left_trigger: pad.bLeftTrigger,
        right_trigger: pad.bRightTrigger,
        thumb_lx: pad.sThumbLX,
        thumb_ly: pad.sThumbLY,
        thumb_rx: pad.sThumbRX,
        thumb_ry: pad.sThumbRY,
    }
}

/// Query a controller without passing through our own detour.
pub fn query_gamepad(index: u32) -> Option<GamepadState> {
    let mut state = XINPUT_STATE::default();
    let original = original::<XInputGetStateFn>(&XINPUT_GET_STATE)
        .unwrap_or(linked_xinput_get_state);
    // SAFETY: `state` is a valid out-parameter for the call.
    let code = unsafe { original(index, &mut state) };
    (code == ERROR_SUCCESS.0).then(|| gamepad_from(&state.Gamepad))
}
