//! CLI command implementations.

pub mod fallback;
pub mod hex_utils;
pub mod scan;
pub mod signatures;

use owo_colors::OwoColorize;
use splitscreen_core::{OffsetRegistry, OffsetSource};

/// Print every entry of `registry`, resolved ones with their displacement.
pub fn print_registry(registry: &OffsetRegistry) {
    let identity = registry.identity();
    println!("{} ({})", identity.title.bold(), identity.platform);
    if let Some(module) = registry.module() {
        println!("Module: {} at 0x{:X}", module.name, module.base);
    }
    println!();

    for entry in registry.entries() {
        let source = match entry.source {
            OffsetSource::ScannedFresh => entry.source.green().to_string(),
            OffsetSource::FallbackTable => entry.source.yellow().to_string(),
            OffsetSource::Unresolved => entry.source.red().to_string(),
        };
        if entry.is_resolved() {
            let displacement = registry
                .module()
                .and_then(|module| entry.address.checked_sub(module.base))
                .map(|disp| format!(" (+0x{:X})", disp))
                .unwrap_or_default();
            println!(
                "  {:<16} 0x{:X}{} [{}]",
                entry.name.to_string(),
                entry.address,
                displacement,
                source
            );
        } else {
            println!("  {:<16} {} [{}]", entry.name.to_string(), "-".dimmed(), source);
        }
    }

    println!();
    if registry.is_valid() {
        println!("{}", "Registry valid".green());
    } else {
        println!("{}", "Registry invalid: required offsets missing".red());
    }
}
