use std::sync::atomic::{AtomicU64, Ordering};

use crate::memory::Address;

/// Where a detour forwards to, readable from any thread without locking.
///
/// Mirrors [`HookRecord::entry_point`](super::HookRecord::entry_point): the
/// trampoline while the hook exists, otherwise the target itself. The target
/// is recorded before the trampoline and kept after the hook is removed, so a
/// call already inside the detour during removal still reaches the original
/// function.
pub struct ForwardSlot {
    target: AtomicU64,
    trampoline: AtomicU64,
}

impl ForwardSlot {
    pub const fn new() -> Self {
        Self {
            target: AtomicU64::new(0),
            trampoline: AtomicU64::new(0),
        }
    }

    /// Record `target` and its `trampoline`; called before the hook is enabled.
    pub fn publish(&self, target: Address, trampoline: Address) {
        self.target.store(target, Ordering::Release);
        self.trampoline.store(trampoline, Ordering::Release);
    }

    /// Drop the trampoline once the hook is disabled; the target stays.
    pub fn retract(&self) {
        self.trampoline.store(0, Ordering::Release);
    }

    /// `None` only if nothing was ever published.
    pub fn entry_point(&self) -> Option<Address> {
        match self.trampoline.load(Ordering::Acquire) {
            0 => Some(self.target.load(Ordering::Acquire)).filter(|&target| target != 0),
            trampoline => Some(trampoline),
        }
    }
}

impl Default for ForwardSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::HookRecord;

    #[test]
    fn test_unpublished_slot_has_no_entry_point() {
        assert_eq!(ForwardSlot::new().entry_point(), None);
    }

    #[test]
    fn test_published_slot_forwards_to_trampoline() {
        let slot = ForwardSlot::new();
        slot.publish(0x7FF0_1000, 0x2_0000);
        assert_eq!(slot.entry_point(), Some(0x2_0000));
    }

    #[test]
    fn test_retracted_slot_forwards_to_target() {
        let slot = ForwardSlot::new();
        slot.publish(0x7FF0_1000, 0x2_0000);
        slot.retract();
        assert_eq!(slot.entry_point(), Some(0x7FF0_1000));

        let record = HookRecord::new("Present", 0x7FF0_1000, 0x9000);
        assert_eq!(slot.entry_point(), Some(record.entry_point()));
    }

    #[test]
    fn test_republish_after_retract() {
        let slot = ForwardSlot::new();
        slot.publish(0x7FF0_1000, 0x2_0000);
        slot.retract();
        slot.publish(0x7FF0_1000, 0x3_0000);
        assert_eq!(slot.entry_point(), Some(0x3_0000));
    }
}
