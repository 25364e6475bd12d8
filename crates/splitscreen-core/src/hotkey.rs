//! Edge-triggered operator hotkeys.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum HotkeyAction {
    ToggleFeature,
    TestOffsets,
    ExportOffsets,
    RescanOffsets,
}

/// Virtual-key codes bound to each action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyBindings {
    pub toggle: u32,
    pub test: u32,
    pub export: u32,
    pub rescan: u32,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        // F9 - F12
        Self {
            toggle: 0x78,
            test: 0x79,
            export: 0x7A,
            rescan: 0x7B,
        }
    }
}

impl HotkeyBindings {
    pub fn key_for(&self, action: HotkeyAction) -> u32 {
        match action {
            HotkeyAction::ToggleFeature => self.toggle,
            HotkeyAction::TestOffsets => self.test,
            HotkeyAction::ExportOffsets => self.export,
            HotkeyAction::RescanOffsets => self.rescan,
        }
    }
}

/// Reports whether a key is currently held.
pub trait KeySource: Send + Sync {
    fn is_down(&self, key: u32) -> bool;
}

/// Fires once per press, on the up-to-down transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeTrigger {
    was_down: bool,
}

impl EdgeTrigger {
    pub fn update(&mut self, down: bool) -> bool {
        let fired = down && !self.was_down;
        self.was_down = down;
        fired
    }
}

/// Edge detection for every action.
#[derive(Debug, Default)]
pub struct HotkeyPoller {
    triggers: [EdgeTrigger; 4],
}

impl HotkeyPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample every binding once and return the actions pressed since the last poll.
    pub fn poll(&mut self, keys: &dyn KeySource, bindings: &HotkeyBindings) -> Vec<HotkeyAction> {
        HotkeyAction::iter()
            .zip(self.triggers.iter_mut())
            .filter_map(|(action, trigger)| {
                trigger
                    .update(keys.is_down(bindings.key_for(action)))
                    .then_some(action)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Keys(Mutex<HashSet<u32>>);

    impl Keys {
        fn set(&self, key: u32, down: bool) {
            let mut keys = self.0.lock().unwrap();
            if down {
                keys.insert(key);
            } else {
                keys.remove(&key);
            }
        }
    }

    impl KeySource for Keys {
        fn is_down(&self, key: u32) -> bool {
            self.0.lock().unwrap().contains(&key)
        }
    }

    #[test]
    fn test_edge_trigger_fires_once_per_press() {
        let mut trigger = EdgeTrigger::default();
        assert!(!trigger.update(false));
        assert!(trigger.update(true));
        assert!(!trigger.update(true));
        assert!(!trigger.update(false));
        assert!(trigger.update(true));
    }

    #[test]
    fn test_poller_maps_keys_to_actions() {
        let keys = Keys::default();
        let bindings = HotkeyBindings::default();
        let mut poller = HotkeyPoller::new();

        keys.set(0x78, true);
        keys.set(0x7B, true);
        assert_eq!(
            poller.poll(&keys, &bindings),
            vec![HotkeyAction::ToggleFeature, HotkeyAction::RescanOffsets]
        );
        assert!(poller.poll(&keys, &bindings).is_empty());

        keys.set(0x78, false);
        poller.poll(&keys, &bindings);
        keys.set(0x78, true);
        assert_eq!(
            poller.poll(&keys, &bindings),
            vec![HotkeyAction::ToggleFeature]
        );
    }
}
