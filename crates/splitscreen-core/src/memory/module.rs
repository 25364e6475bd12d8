//! Discovery of the loaded game module.

use tracing::{debug, info};

use super::Address;
use crate::error::Result;

/// A binary image mapped into the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRegion {
    pub name: String,
    pub base: Address,
    pub size: u64,
}

impl ModuleRegion {
    pub fn new(name: impl Into<String>, base: Address, size: u64) -> Self {
        Self {
            name: name.into(),
            base,
            size,
        }
    }

    pub fn end(&self) -> Address {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, address: Address) -> bool {
        self.base <= address && address < self.end()
    }
}

/// Return the first loaded module matching `names`, in order.
///
/// Falls back to the primary module of the process when none of the names
/// is loaded.
pub fn find_game_module(names: &[String]) -> Result<ModuleRegion> {
    for name in names {
        match imp::find_module(name) {
            Ok(region) => {
                info!(
                    "Found module {} (base: 0x{:X}, size: 0x{:X})",
                    region.name, region.base, region.size
                );
                return Ok(region);
            }
            Err(e) => debug!("Module {} not loaded: {}", name, e),
        }
    }

    let region = imp::primary_module()?;
    info!(
        "No known game module loaded, using primary module {} (base: 0x{:X})",
        region.name, region.base
    );
    Ok(region)
}

#[cfg(target_os = "windows")]
mod imp {
    use windows::Win32::Foundation::HMODULE;
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::System::ProcessStatus::{
        GetModuleBaseNameW, GetModuleInformation, MODULEINFO,
    };
    use windows::Win32::System::Threading::GetCurrentProcess;
    use windows::core::{HSTRING, PCWSTR};

    use super::ModuleRegion;
    use crate::error::{Error, Result};

    fn region_of(module: HMODULE, fallback_name: &str) -> Result<ModuleRegion> {
        let mut info = MODULEINFO::default();
        // SAFETY: `module` is a handle of a module loaded in this process and
        // `info` is a properly sized out-parameter.
        unsafe {
            GetModuleInformation(
                GetCurrentProcess(),
                module,
                &mut info,
                std::mem::size_of::<MODULEINFO>() as u32,
            )
        }
        .map_err(|e| Error::ModuleNotFound(format!("{}: {}", fallback_name, e)))?;

        let mut name_buf = [0u16; 260];
        // SAFETY: writes at most `name_buf.len()` UTF-16 units.
        let len = unsafe { GetModuleBaseNameW(GetCurrentProcess(), module, &mut name_buf) };
        let name = if len > 0 {
            String::from_utf16_lossy(&name_buf[..len as usize])
        } else {
            fallback_name.to_string()
        };

        Ok(ModuleRegion::new(
            name,
            info.lpBaseOfDll as u64,
            info.SizeOfImage as u64,
        ))
    }

    pub fn find_module(name: &str) -> Result<ModuleRegion> {
        let wide = HSTRING::from(name);
        // SAFETY: GetModuleHandleW does not take a reference on the module and
        // only reads the name.
        let module = unsafe { GetModuleHandleW(&wide) }
            .map_err(|_| Error::ModuleNotFound(name.to_string()))?;
        region_of(module, name)
    }

    pub fn primary_module() -> Result<ModuleRegion> {
        // SAFETY: a null name returns the handle of the process executable.
        let module = unsafe { GetModuleHandleW(PCWSTR::null()) }
            .map_err(|e| Error::ModuleNotFound(format!("primary module: {}", e)))?;
        region_of(module, "primary module")
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use std::path::Path;

    use super::ModuleRegion;
    use crate::error::{Error, Result};
    use crate::memory::local::mappings;

    fn file_name(path: &str) -> Option<&str> {
        Path::new(path).file_name().and_then(|n| n.to_str())
    }

    fn region_for(matches: impl Fn(&str) -> bool, name: &str) -> Result<ModuleRegion> {
        let mut base = u64::MAX;
        let mut end = 0u64;
        for mapping in mappings()? {
            if let Some(path) = mapping.path.as_deref()
                && matches(path)
            {
                base = base.min(mapping.start);
                end = end.max(mapping.end);
            }
        }
        if end == 0 {
            return Err(Error::ModuleNotFound(name.to_string()));
        }
        Ok(ModuleRegion::new(name, base, end - base))
    }

    pub fn find_module(name: &str) -> Result<ModuleRegion> {
        region_for(
            |path| file_name(path).is_some_and(|f| f.eq_ignore_ascii_case(name)),
            name,
        )
    }

    pub fn primary_module() -> Result<ModuleRegion> {
        let exe = std::fs::read_link("/proc/self/exe")?;
        let exe = exe.to_string_lossy().into_owned();
        let name = file_name(&exe).unwrap_or(&exe).to_string();
        region_for(|path| path == exe, &name)
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
mod imp {
    use super::ModuleRegion;
    use crate::error::{Error, Result};

    pub fn find_module(name: &str) -> Result<ModuleRegion> {
        Err(Error::ModuleNotFound(name.to_string()))
    }

    pub fn primary_module() -> Result<ModuleRegion> {
        Err(Error::Unsupported("module discovery".to_string()))
    }
}
