//! Mod configuration, read from `splitscreen.toml` beside the DLL.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::camera::CameraTuning;
use crate::error::Result;
use crate::hotkey::HotkeyBindings;
use crate::offset::{CameraLayout, FallbackTable};
use crate::signature::{OffsetSignatureSet, builtin_signatures, load_signatures};

pub const CONFIG_FILE: &str = "splitscreen.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Executable names tried in order.
    pub names: Vec<String>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            names: vec![
                "MCCWinStore-Win64-Shipping.exe".to_string(),
                "MCC-Win64-Shipping.exe".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title_keywords: Vec<String>,
    /// Libraries that must be loaded before hooks are installed.
    pub required_libraries: Vec<String>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title_keywords: vec![
                "Halo".to_string(),
                "MCC".to_string(),
                "Master Chief Collection".to_string(),
            ],
            required_libraries: vec!["d3d11.dll".to_string(), "dxgi.dll".to_string()],
        }
    }
}

impl WindowConfig {
    /// Whether a window with this title belongs to the game.
    pub fn matches_title(&self, title: &str) -> bool {
        self.title_keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && title.contains(keyword.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub install_attempts: u32,
    pub startup_delay_ms: u64,
    pub not_ready_delay_ms: u64,
    pub install_retry_delay_ms: u64,
    pub device_poll_ms: u64,
    pub camera_tick_ms: u64,
    pub hotkey_poll_ms: u64,
    pub toggle_settle_ms: u64,
    pub test_settle_ms: u64,
    pub frame_log_interval: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            install_attempts: 30,
            startup_delay_ms: 1000,
            not_ready_delay_ms: 2000,
            install_retry_delay_ms: 3000,
            device_poll_ms: 1000,
            camera_tick_ms: 16,
            hotkey_poll_ms: 50,
            toggle_settle_ms: 100,
            test_settle_ms: 500,
            frame_log_interval: 300,
        }
    }
}

impl TimingConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn not_ready_delay(&self) -> Duration {
        Duration::from_millis(self.not_ready_delay_ms)
    }

    pub fn install_retry_delay(&self) -> Duration {
        Duration::from_millis(self.install_retry_delay_ms)
    }

    pub fn device_poll(&self) -> Duration {
        Duration::from_millis(self.device_poll_ms)
    }

    pub fn camera_tick(&self) -> Duration {
        Duration::from_millis(self.camera_tick_ms)
    }

    pub fn hotkey_poll(&self) -> Duration {
        Duration::from_millis(self.hotkey_poll_ms)
    }

    pub fn toggle_settle(&self) -> Duration {
        Duration::from_millis(self.toggle_settle_ms)
    }

    pub fn test_settle(&self) -> Duration {
        Duration::from_millis(self.test_settle_ms)
    }

    /// Upper bound on time spent in the installation loop before giving up.
    pub fn worst_case_install_time(&self) -> Duration {
        self.startup_delay()
            + self.not_ready_delay().max(self.install_retry_delay()) * self.install_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: PathBuf,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("UWPSplitScreen.log"),
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub directory: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub module: ModuleConfig,
    pub window: WindowConfig,
    pub timing: TimingConfig,
    pub hotkeys: HotkeyBindings,
    pub logging: LoggingConfig,
    pub export: ExportConfig,
    pub camera: CameraTuning,
    /// Camera field offsets; unverified, so absent unless configured.
    pub camera_layout: Option<CameraLayout>,
    /// JSON file overriding the built-in signature set.
    pub signatures_file: Option<PathBuf>,
    pub fallback: FallbackTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            module: ModuleConfig::default(),
            window: WindowConfig::default(),
            timing: TimingConfig::default(),
            hotkeys: HotkeyBindings::default(),
            logging: LoggingConfig::default(),
            export: ExportConfig::default(),
            camera: CameraTuning::default(),
            camera_layout: None,
            signatures_file: None,
            fallback: FallbackTable::builtin(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `path`, falling back to defaults when it is missing or malformed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) if e.is_not_found() => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Signature set to scan with: the configured file, or the built-in set.
    pub fn signatures(&self) -> OffsetSignatureSet {
        let Some(path) = &self.signatures_file else {
            return builtin_signatures();
        };
        match load_signatures(path) {
            Ok(set) => {
                info!("Loaded signatures {} from {}", set.version, path.display());
                set
            }
            Err(e) => {
                warn!(
                    "Failed to load signatures from {}: {}, using built-in set",
                    path.display(),
                    e
                );
                builtin_signatures()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{GameTitle, Platform};
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timing.install_attempts, 30);
        assert_eq!(config.timing.frame_log_interval, 300);
        assert_eq!(config.hotkeys.toggle, 0x78);
        assert_eq!(config.module.names[0], "MCCWinStore-Win64-Shipping.exe");
        assert!(config.camera_layout.is_none());
        assert_eq!(
            config.timing.worst_case_install_time(),
            Duration::from_millis(1000 + 3000 * 30)
        );
    }

    #[test]
    fn test_window_title_matching() {
        let window = WindowConfig::default();
        assert!(window.matches_title("Halo: The Master Chief Collection"));
        assert!(!window.matches_title("Untitled - Notepad"));

        let empty = WindowConfig {
            title_keywords: vec![String::new()],
            required_libraries: Vec::new(),
        };
        assert!(!empty.matches_title("anything"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [timing]
            install_attempts = 5

            [hotkeys]
            toggle = 0x70

            [camera_layout]
            view_matrix = 0x40
            projection_matrix = 0x80
            position = 0x10
            rotation = 0x1C

            [[fallback]]
            game = "HaloReach"
            platform = "MicrosoftStore"
            split_screen_flag = 0x2000
            player_count = 0x2004
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.install_attempts, 5);
        assert_eq!(config.timing.not_ready_delay_ms, 2000);
        assert_eq!(config.hotkeys.toggle, 0x70);
        assert_eq!(config.hotkeys.test, 0x79);
        assert_eq!(config.camera_layout, Some(CameraLayout::COMBAT_EVOLVED));
        let entry = &config.fallback.entries()[0];
        assert_eq!(entry.game, GameTitle::HaloReach);
        assert_eq!(entry.platform, Platform::MicrosoftStore);
    }

    #[test]
    fn test_load_or_default_on_missing_and_malformed() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert_eq!(Config::load_or_default(&missing), Config::default());

        let malformed = dir.path().join("bad.toml");
        fs::write(&malformed, "timing = 12").unwrap();
        assert_eq!(Config::load_or_default(&malformed), Config::default());
    }

    #[test]
    fn test_signatures_fall_back_to_builtin() {
        let config = Config {
            signatures_file: Some(PathBuf::from("does-not-exist.json")),
            ..Config::default()
        };
        assert_eq!(config.signatures(), builtin_signatures());
    }
}
