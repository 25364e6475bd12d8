//! Gamepads and the logical player slots they drive.

use bytemuck::{Pod, Zeroable};
use tracing::info;

use crate::camera::CameraState;

/// Number of gamepads the input API can report.
pub const MAX_DEVICES: u32 = 4;

/// Number of split-screen players.
pub const MAX_PLAYERS: usize = 2;

/// Gamepad snapshot, laid out like `XINPUT_GAMEPAD`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GamepadState {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

impl GamepadState {
    fn axis(value: i16) -> f32 {
        value as f32 / 32768.0
    }

    pub fn left_stick(&self) -> (f32, f32) {
        (Self::axis(self.thumb_lx), Self::axis(self.thumb_ly))
    }

    pub fn right_stick(&self) -> (f32, f32) {
        (Self::axis(self.thumb_rx), Self::axis(self.thumb_ry))
    }
}

/// Polls gamepads by device index.
pub trait InputSource: Send + Sync {
    /// Current state of device `index`, or `None` if it is not connected.
    fn query(&self, index: u32) -> Option<GamepadState>;
}

/// Indices of connected devices, in enumeration order.
pub fn connected_devices(source: &dyn InputSource) -> Vec<u32> {
    (0..MAX_DEVICES)
        .filter(|&index| source.query(index).is_some())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSlot {
    pub index: usize,
    /// Bound device index, or -1.
    pub controller_index: i32,
    pub active: bool,
    pub last_input: GamepadState,
    pub camera: CameraState,
}

impl PlayerSlot {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            controller_index: -1,
            active: false,
            last_input: GamepadState::default(),
            camera: CameraState::for_slot(index),
        }
    }
}

pub fn new_slots() -> Vec<PlayerSlot> {
    (0..MAX_PLAYERS).map(PlayerSlot::new).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    Mapped { slot: usize, controller: u32 },
    Disconnected { slot: usize },
}

/// Bind slot `i` to the `i`-th connected device.
///
/// Slots without a device are unbound and deactivated. Only slots whose
/// binding changed are reported; camera state is never touched.
pub fn assign_controllers(slots: &mut [PlayerSlot], connected: &[u32]) -> Vec<SlotChange> {
    let mut changes = Vec::new();
    for slot in slots.iter_mut() {
        let previous = slot.controller_index;
        match connected.get(slot.index) {
            Some(&controller) => {
                slot.controller_index = controller as i32;
                slot.active = true;
                if previous != controller as i32 {
                    info!("Player {} mapped to controller {}", slot.index, controller);
                    changes.push(SlotChange::Mapped {
                        slot: slot.index,
                        controller,
                    });
                }
            }
            None => {
                slot.controller_index = -1;
                slot.active = false;
                if previous != -1 {
                    info!("Player {} controller disconnected", slot.index);
                    changes.push(SlotChange::Disconnected { slot: slot.index });
                }
            }
        }
    }
    changes
}

/// Store `state` in every slot bound to device `index`.
pub fn record_input(slots: &mut [PlayerSlot], index: u32, state: GamepadState) -> bool {
    let mut stored = false;
    for slot in slots
        .iter_mut()
        .filter(|s| s.controller_index == index as i32)
    {
        slot.last_input = state;
        stored = true;
    }
    stored
}
