//! Vtable slot discovery through a throwaway interface instance.
//!
//! The only reliable way to learn where a COM method lives is to read it out
//! of a live object's vtable. A probe creates a temporary instance, the slot
//! addresses are read, and the instance is released before any hook is
//! created against those addresses.

use tracing::debug;

use crate::error::Result;
use crate::memory::{Address, MemoryAccess};

const POINTER_SIZE: u64 = std::mem::size_of::<u64>() as u64;

/// A temporary interface instance. Dropping it releases the underlying objects.
pub trait ProbeInstance {
    /// Object pointers exposed by the instance, in a probe-specific order.
    fn objects(&self) -> Vec<Address>;
}

/// Constructs temporary instances of an interface through its normal path.
pub trait InterfaceProbe {
    type Instance: ProbeInstance;

    fn create(&self) -> Result<Self::Instance>;
}

/// One slot to read: the `slot`-th vtable entry of the `object`-th object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRequest {
    pub object: usize,
    pub slot: usize,
}

/// Read the function pointer in `slot` of the vtable of `object`.
pub fn read_vtable_slot<M: MemoryAccess + ?Sized>(
    memory: &M,
    object: Address,
    slot: usize,
) -> Result<Address> {
    let vtable = memory.read_u64(object)?;
    let entry = memory.read_u64(vtable + slot as u64 * POINTER_SIZE)?;
    debug!(
        "vtable 0x{:X} slot {} of object 0x{:X} -> 0x{:X}",
        vtable, slot, object, entry
    );
    Ok(entry)
}

/// Resolve several vtable slots from a single temporary instance.
///
/// The instance lives only for the duration of the reads.
pub fn resolve_vtable_slots<M, P>(
    memory: &M,
    probe: &P,
    requests: &[SlotRequest],
) -> Result<Vec<Address>>
where
    M: MemoryAccess + ?Sized,
    P: InterfaceProbe,
{
    let instance = probe.create()?;
    let objects = instance.objects();

    let addresses = requests
        .iter()
        .map(|request| {
            let object = objects.get(request.object).copied().ok_or_else(|| {
                crate::error::Error::InvalidState(format!(
                    "probe exposes {} objects, requested #{}",
                    objects.len(),
                    request.object
                ))
            })?;
            read_vtable_slot(memory, object, request.slot)
        })
        .collect::<Result<Vec<_>>>();

    drop(instance);
    addresses
}
