//! Fallback command: show recorded offsets for a game and platform.

use std::path::Path;

use anyhow::{Context, Result};
use splitscreen_core::{Config, FallbackTable, GameIdentity, GameTitle, Platform};

use super::hex_utils::parse_hex_address;
use super::print_registry;

pub fn parse_identity(game: &str, platform: &str) -> Result<GameIdentity> {
    let title: GameTitle = game
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown game: {}", game))?;
    let platform: Platform = platform
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown platform: {}", platform))?;
    Ok(GameIdentity::new(title, platform))
}

pub fn run(game: &str, platform: &str, base: Option<&str>, config: Option<&Path>) -> Result<()> {
    let identity = parse_identity(game, platform)?;
    let base = base.map(parse_hex_address).transpose()?.unwrap_or(0);
    let table = match config {
        Some(path) => {
            Config::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?
                .fallback
        }
        None => FallbackTable::builtin(),
    };

    let registry = table.get_fallback(identity, base);
    print_registry(&registry);
    if let Some(layout) = registry.camera_layout() {
        println!(
            "Camera layout: view +0x{:X}, projection +0x{:X}, position +0x{:X}, rotation +0x{:X}",
            layout.view_matrix, layout.projection_matrix, layout.position, layout.rotation
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity_aliases() {
        let identity = parse_identity("h2a", "store").unwrap();
        assert_eq!(identity.title, GameTitle::Halo2Anniversary);
        assert_eq!(identity.platform, Platform::MicrosoftStore);

        let identity = parse_identity("Halo: Reach", "Steam").unwrap();
        assert_eq!(identity.title, GameTitle::HaloReach);
    }

    #[test]
    fn test_parse_identity_rejects_unknown() {
        assert!(parse_identity("Halo 5", "steam").is_err());
        assert!(parse_identity("ce", "origin").is_err());
    }

    #[test]
    fn test_run_with_config_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splitscreen.toml");
        std::fs::write(
            &path,
            r#"
[[fallback]]
game = "Halo3"
platform = "Steam"
split_screen_flag = 0x1000
player_count = 0x1004
"#,
        )
        .unwrap();

        run("h3", "steam", Some("0x140000000"), Some(&path)).unwrap();
        assert!(run("h3", "steam", Some("nothex"), Some(&path)).is_err());
    }
}
