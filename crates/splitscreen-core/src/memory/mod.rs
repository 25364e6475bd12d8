//! Fault-tolerant access to the memory of the current process.
//!
//! Every read, write and masked compare goes through [`MemoryAccess`], which
//! turns access violations into [`Error::InvalidAddress`] instead of letting
//! them take the host process down.

mod buffer;
mod local;
pub mod module;

pub use buffer::{BufferMemory, BufferMemoryBuilder};
pub use local::LocalMemory;
pub use module::{ModuleRegion, find_game_module};

use bytemuck::Pod;

use crate::error::{Error, Result};
use crate::signature::SignaturePattern;

/// Absolute address inside the current process.
pub type Address = u64;

/// Fallible access to process memory.
///
/// Implementations must never fault: an address the OS refuses to honor is
/// reported as an error and the caller decides how to recover.
pub trait MemoryAccess: Send + Sync {
    /// Fill `buf` with the bytes starting at `address`.
    fn read_into(&self, address: Address, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at `address`, lifting page protection for the duration of the write.
    fn write(&self, address: Address, data: &[u8]) -> Result<()>;

    fn read(&self, address: Address, size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        self.read_into(address, &mut buf)?;
        Ok(buf)
    }

    /// Compare memory at `address` against a masked pattern.
    ///
    /// Returns `false` on any access fault.
    fn compare_masked(&self, address: Address, pattern: &SignaturePattern) -> bool {
        let mut buf = vec![0u8; pattern.len()];
        match self.read_into(address, &mut buf) {
            Ok(()) => pattern.matches(&buf),
            Err(_) => false,
        }
    }

    fn read_i32(&self, address: Address) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_into(address, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u64(&self, address: Address) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(address, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write_i32(&self, address: Address, value: i32) -> Result<()> {
        self.write(address, &value.to_le_bytes())
    }
}

/// Typed reads and writes with an explicit `Pod` layout.
pub trait MemoryAccessExt: MemoryAccess {
    fn read_pod<T: Pod>(&self, address: Address) -> Result<T> {
        let mut value = T::zeroed();
        self.read_into(address, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    fn write_pod<T: Pod>(&self, address: Address, value: &T) -> Result<()> {
        self.write(address, bytemuck::bytes_of(value))
    }
}

impl<M: MemoryAccess + ?Sized> MemoryAccessExt for M {}

/// Offset an address, rejecting results that wrap around the address space.
pub fn offset_address(base: Address, offset: u64) -> Result<Address> {
    base.checked_add(offset)
        .ok_or(Error::InvalidAddress { address: base })
}
