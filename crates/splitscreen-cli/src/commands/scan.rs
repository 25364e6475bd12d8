//! Scan command: resolve offsets in a dumped module image.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use splitscreen_core::{
    BufferMemory, GameIdentity, ModuleRegion, OffsetRegistry, OffsetSignatureSet,
    builtin_signatures, export_registry, load_signatures, scan,
};

use super::hex_utils::parse_hex_address;
use super::print_registry;

/// Scan `bytes` as if the module were mapped at `base`.
pub fn scan_image(
    bytes: Vec<u8>,
    base: u64,
    module_name: &str,
    signatures: &OffsetSignatureSet,
    title: Option<&str>,
) -> OffsetRegistry {
    let module = ModuleRegion::new(module_name, base, bytes.len() as u64);
    let memory = BufferMemory::new(base, bytes);
    let identity = GameIdentity::detect(title, module_name);
    scan(&memory, &module, signatures, identity)
}

pub fn run(
    dump: &Path,
    base: &str,
    signatures: Option<&Path>,
    title: Option<&str>,
    export: Option<&Path>,
) -> Result<()> {
    let base = parse_hex_address(base)?;
    let bytes = fs::read(dump).with_context(|| format!("Failed to read {}", dump.display()))?;
    let signatures = match signatures {
        Some(path) => load_signatures(path)
            .with_context(|| format!("Failed to load signatures from {}", path.display()))?,
        None => builtin_signatures(),
    };
    let module_name = dump
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    eprintln!(
        "Scanning {} (0x{:X} bytes at 0x{:X}) with signatures {}",
        module_name,
        bytes.len(),
        base,
        signatures.version
    );
    let registry = scan_image(bytes, base, &module_name, &signatures, title);
    print_registry(&registry);

    if let Some(directory) = export {
        let path = export_registry(&registry, directory)?;
        eprintln!("Exported to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitscreen_core::OffsetName;

    const BASE: u64 = 0x1_4000_0000;

    fn image() -> Vec<u8> {
        let mut bytes = vec![0u8; 0x800];
        let flag = [0x83, 0x3D, 0x00, 0x04, 0x00, 0x00, 0x01, 0x0F, 0x84, 0, 0, 0, 0];
        let count = [0x8B, 0x05, 0xFA, 0x03, 0x00, 0x00, 0x83, 0xF8, 0x01, 0x7E, 0x02];
        bytes[0x40..0x40 + flag.len()].copy_from_slice(&flag);
        bytes[0x80..0x80 + count.len()].copy_from_slice(&count);
        bytes
    }

    #[test]
    fn test_scan_image_resolves_required_offsets() {
        let registry = scan_image(
            image(),
            BASE,
            "MCC-Win64-Shipping.exe",
            &builtin_signatures(),
            Some("Halo 3"),
        );

        assert!(registry.is_valid());
        assert_eq!(
            registry.address(OffsetName::SplitScreenFlag),
            Some(BASE + 0x40 + 7 + 0x400)
        );
        assert_eq!(
            registry.address(OffsetName::PlayerCount),
            Some(BASE + 0x80 + 6 + 0x3FA)
        );
        assert_eq!(registry.identity().to_string(), "Halo 3 (Steam)");
    }

    #[test]
    fn test_run_exports_valid_registry() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("MCC-Win64-Shipping.bin");
        fs::write(&dump, image()).unwrap();

        run(&dump, "0x140000000", None, Some("Halo 3"), Some(dir.path())).unwrap();

        assert!(dir.path().join("HaloMCC_Offsets_Halo_3.txt").exists());
    }

    #[test]
    fn test_run_rejects_bad_base() {
        assert!(run(Path::new("missing.bin"), "xyz", None, None, None).is_err());
    }
}
