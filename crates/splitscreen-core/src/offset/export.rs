//! Human-readable dump of the current registry.
//!
//! The file is a diagnostic artifact for users filling in fallback tables;
//! nothing reads it back.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use super::OffsetRegistry;
use crate::error::{Error, Result};

/// `HaloMCC_Offsets_<game>.txt` with spaces and colons replaced by `_`.
pub fn export_file_name(registry: &OffsetRegistry) -> String {
    let game: String = registry
        .identity()
        .title
        .to_string()
        .chars()
        .map(|c| if c == ' ' || c == ':' { '_' } else { c })
        .collect();
    format!("HaloMCC_Offsets_{}.txt", game)
}

pub fn format_export(registry: &OffsetRegistry, generated_at: DateTime<Local>) -> String {
    let identity = registry.identity();
    let mut out = String::new();

    let _ = writeln!(out, "// Halo MCC split-screen offsets");
    let _ = writeln!(out, "// Game: {}", identity.title);
    let _ = writeln!(out, "// Platform: {}", identity.platform);
    let _ = writeln!(out, "// Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "// Valid: {}", registry.is_valid());
    let _ = writeln!(out);

    let _ = writeln!(out, "// Absolute addresses");
    for entry in registry.entries().iter().filter(|e| e.is_resolved()) {
        let _ = writeln!(
            out,
            "{} = 0x{:X}; // {}",
            entry.name, entry.address, entry.source
        );
    }

    if let Some(layout) = registry.camera_layout() {
        let _ = writeln!(out);
        let _ = writeln!(out, "// Camera layout (relative to cameraBase)");
        let _ = writeln!(out, "viewMatrix = 0x{:X};", layout.view_matrix);
        let _ = writeln!(out, "projectionMatrix = 0x{:X};", layout.projection_matrix);
        let _ = writeln!(out, "position = 0x{:X};", layout.position);
        let _ = writeln!(out, "rotation = 0x{:X};", layout.rotation);
    }

    if let Some(module) = registry.module() {
        let _ = writeln!(out);
        let _ = writeln!(out, "// Module-relative (Cheat Engine)");
        for entry in registry.entries().iter().filter(|e| e.is_resolved()) {
            match entry.address.checked_sub(module.base) {
                Some(displacement) => {
                    let _ = writeln!(
                        out,
                        "{}+{:X} = {}",
                        module.name, displacement, entry.name
                    );
                }
                None => {
                    let _ = writeln!(out, "// {} lies below the module base", entry.name);
                }
            }
        }
    }

    out
}

/// Write the registry to `directory`, returning the file path.
///
/// Refuses to export an invalid registry.
pub fn export_registry(registry: &OffsetRegistry, directory: &Path) -> Result<PathBuf> {
    if !registry.is_valid() {
        return Err(Error::RegistryInvalid);
    }

    let path = directory.join(export_file_name(registry));
    fs::write(&path, format_export(registry, Local::now()))?;
    info!("Offsets exported to {}", path.display());
    Ok(path)
}
