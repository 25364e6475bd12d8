//! Accessor for the memory of the process this code is loaded into.
//!
//! Reads and writes go through the OS debug interfaces against our own
//! process so that an invalid address surfaces as an error code rather than
//! an access violation. Writes lift page protection first and restore it on
//! every path through a drop guard.

use tracing::{debug, warn};

use super::{Address, MemoryAccess};
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMemory;

impl LocalMemory {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryAccess for LocalMemory {
    fn read_into(&self, address: Address, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        imp::read(address, buf)
    }

    fn write(&self, address: Address, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let _restore = imp::unprotect(address, data.len())?;
        let result = imp::write(address, data);
        if let Err(e) = &result {
            warn!("Write of {} bytes at 0x{:X} failed: {}", data.len(), address, e);
            describe_address(address);
        }
        result
    }
}

#[cfg(target_os = "windows")]
mod imp {
    use std::ffi::c_void;

    use tracing::debug;
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE_READWRITE, PAGE_GUARD, PAGE_NOACCESS,
        PAGE_PROTECTION_FLAGS, VirtualProtect, VirtualQuery,
    };
    use windows::Win32::System::Threading::GetCurrentProcess;

    use crate::error::{Error, Result};
    use crate::memory::Address;

    pub fn read(address: Address, buf: &mut [u8]) -> Result<()> {
        let mut read = 0usize;
        // SAFETY: ReadProcessMemory validates the source range and fails
        // instead of faulting; the destination is a live slice of `buf.len()` bytes.
        unsafe {
            ReadProcessMemory(
                GetCurrentProcess(),
                address as *const c_void,
                buf.as_mut_ptr().cast(),
                buf.len(),
                Some(&mut read),
            )
        }
        .map_err(|_| Error::InvalidAddress { address })?;

        if read != buf.len() {
            return Err(Error::InvalidAddress { address });
        }
        Ok(())
    }

    pub fn write(address: Address, data: &[u8]) -> Result<()> {
        let mut written = 0usize;
        // SAFETY: WriteProcessMemory validates the target range and fails
        // instead of faulting.
        unsafe {
            WriteProcessMemory(
                GetCurrentProcess(),
                address as *const c_void,
                data.as_ptr().cast(),
                data.len(),
                Some(&mut written),
            )
        }
        .map_err(|_| Error::InvalidAddress { address })?;

        if written != data.len() {
            return Err(Error::InvalidAddress { address });
        }
        Ok(())
    }

    pub struct ProtectionGuard {
        address: Address,
        len: usize,
        original: PAGE_PROTECTION_FLAGS,
    }

    impl Drop for ProtectionGuard {
        fn drop(&mut self) {
            let mut previous = PAGE_PROTECTION_FLAGS(0);
            // SAFETY: restores the protection captured when the guard was created
            // for the same range.
            let restored = unsafe {
                VirtualProtect(
                    self.address as *const c_void,
                    self.len,
                    self.original,
                    &mut previous,
                )
            };
            if let Err(e) = restored {
                debug!("Failed to restore protection at 0x{:X}: {}", self.address, e);
            }
        }
    }

    pub fn unprotect(address: Address, len: usize) -> Result<ProtectionGuard> {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        // SAFETY: VirtualQuery only inspects the address space.
        let filled = unsafe {
            VirtualQuery(
                Some(address as *const c_void),
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if filled == 0
            || info.State != MEM_COMMIT
            || (info.Protect & PAGE_NOACCESS).0 != 0
            || (info.Protect & PAGE_GUARD).0 != 0
        {
            return Err(Error::InvalidAddress { address });
        }

        let mut original = PAGE_PROTECTION_FLAGS(0);
        // SAFETY: the range is committed; VirtualProtect reports failure
        // through its return value.
        unsafe {
            VirtualProtect(
                address as *const c_void,
                len,
                PAGE_EXECUTE_READWRITE,
                &mut original,
            )
        }
        .map_err(|e| Error::ProtectionChangeFailed {
            address,
            message: e.to_string(),
        })?;

        Ok(ProtectionGuard {
            address,
            len,
            original,
        })
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use std::ffi::c_void;
    use std::fs;

    use tracing::debug;

    use crate::error::{Error, Result};
    use crate::memory::Address;

    pub fn read(address: Address, buf: &mut [u8]) -> Result<()> {
        let local = libc::iovec {
            iov_base: buf.as_mut_ptr().cast::<c_void>(),
            iov_len: buf.len(),
        };
        let remote = libc::iovec {
            iov_base: address as usize as *mut c_void,
            iov_len: buf.len(),
        };
        // SAFETY: process_vm_readv on our own pid copies through the kernel and
        // reports EFAULT for unmapped source pages instead of raising SIGSEGV.
        let copied = unsafe { libc::process_vm_readv(libc::getpid(), &local, 1, &remote, 1, 0) };
        if copied < 0 || copied as usize != buf.len() {
            return Err(Error::InvalidAddress { address });
        }
        Ok(())
    }

    pub fn write(address: Address, data: &[u8]) -> Result<()> {
        let local = libc::iovec {
            iov_base: data.as_ptr() as *mut c_void,
            iov_len: data.len(),
        };
        let remote = libc::iovec {
            iov_base: address as usize as *mut c_void,
            iov_len: data.len(),
        };
        // SAFETY: same as `read`, in the other direction.
        let copied = unsafe { libc::process_vm_writev(libc::getpid(), &local, 1, &remote, 1, 0) };
        if copied < 0 || copied as usize != data.len() {
            return Err(Error::InvalidAddress { address });
        }
        Ok(())
    }

    /// One line of `/proc/self/maps`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Mapping {
        pub start: Address,
        pub end: Address,
        pub prot: i32,
        pub path: Option<String>,
    }

    pub fn parse_maps_line(line: &str) -> Option<Mapping> {
        let mut fields = line.split_whitespace();
        let range = fields.next()?;
        let perms = fields.next()?;
        let path = fields.nth(3).map(str::to_string);

        let (start, end) = range.split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;

        let perms = perms.as_bytes();
        let mut prot = libc::PROT_NONE;
        if perms.first() == Some(&b'r') {
            prot |= libc::PROT_READ;
        }
        if perms.get(1) == Some(&b'w') {
            prot |= libc::PROT_WRITE;
        }
        if perms.get(2) == Some(&b'x') {
            prot |= libc::PROT_EXEC;
        }

        Some(Mapping {
            start,
            end,
            prot,
            path,
        })
    }

    pub fn mappings() -> Result<Vec<Mapping>> {
        let content = fs::read_to_string("/proc/self/maps")?;
        Ok(content.lines().filter_map(parse_maps_line).collect())
    }

    pub fn mapping_containing(address: Address) -> Option<Mapping> {
        mappings()
            .ok()?
            .into_iter()
            .find(|m| m.start <= address && address < m.end)
    }

    fn page_size() -> u64 {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as u64 } else { 4096 }
    }

    pub struct ProtectionGuard {
        restore: Option<(Address, usize, i32)>,
    }

    impl Drop for ProtectionGuard {
        fn drop(&mut self) {
            if let Some((start, len, prot)) = self.restore {
                // SAFETY: restores the protection recorded for this page range.
                let rc = unsafe { libc::mprotect(start as usize as *mut c_void, len, prot) };
                if rc != 0 {
                    debug!("Failed to restore protection at 0x{:X}", start);
                }
            }
        }
    }

    pub fn unprotect(address: Address, len: usize) -> Result<ProtectionGuard> {
        let mapping = mapping_containing(address).ok_or(Error::InvalidAddress { address })?;
        let end = address.saturating_add(len as u64);
        if end > mapping.end {
            return Err(Error::ProtectionChangeFailed {
                address,
                message: "write spans more than one mapping".to_string(),
            });
        }
        if mapping.prot & libc::PROT_WRITE != 0 {
            return Ok(ProtectionGuard { restore: None });
        }

        let page = page_size();
        let page_start = address & !(page - 1);
        let page_end = (end + page - 1) & !(page - 1);
        let page_len = (page_end - page_start) as usize;

        // SAFETY: the range lies inside an existing mapping; mprotect reports
        // failure through its return value.
        let rc = unsafe {
            libc::mprotect(
                page_start as usize as *mut c_void,
                page_len,
                mapping.prot | libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if rc != 0 {
            return Err(Error::ProtectionChangeFailed {
                address,
                message: std::io::Error::last_os_error().to_string(),
            });
        }

        Ok(ProtectionGuard {
            restore: Some((page_start, page_len, mapping.prot)),
        })
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
mod imp {
    use crate::error::{Error, Result};
    use crate::memory::Address;

    pub struct ProtectionGuard;

    pub fn read(_address: Address, _buf: &mut [u8]) -> Result<()> {
        Err(Error::Unsupported("process-local memory access".to_string()))
    }

    pub fn write(_address: Address, _data: &[u8]) -> Result<()> {
        Err(Error::Unsupported("process-local memory access".to_string()))
    }

    pub fn unprotect(_address: Address, _len: usize) -> Result<ProtectionGuard> {
        Err(Error::Unsupported("page protection".to_string()))
    }
}

#[cfg(target_os = "linux")]
pub(crate) use imp::{mapping_containing, mappings};

/// Log the protection state of the page holding `address`, for diagnostics.
fn describe_address(address: Address) {
    #[cfg(target_os = "linux")]
    match mapping_containing(address) {
        Some(m) => debug!(
            "0x{:X} lies in 0x{:X}-0x{:X} (prot {:#x}) {}",
            address,
            m.start,
            m.end,
            m.prot,
            m.path.as_deref().unwrap_or("[anonymous]")
        ),
        None => debug!("0x{:X} is not mapped", address),
    }
    #[cfg(not(target_os = "linux"))]
    debug!("0x{:X}", address);
}
