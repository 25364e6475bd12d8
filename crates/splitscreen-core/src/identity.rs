//! Which game of the collection is running, and from which store.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum GameTitle {
    #[strum(to_string = "Halo: Combat Evolved", serialize = "HaloCombatEvolved", serialize = "ce")]
    HaloCombatEvolved,
    #[strum(to_string = "Halo 2", serialize = "Halo2", serialize = "h2")]
    Halo2,
    #[strum(to_string = "Halo 2 Anniversary", serialize = "Halo2Anniversary", serialize = "h2a")]
    Halo2Anniversary,
    #[strum(to_string = "Halo 3", serialize = "Halo3", serialize = "h3")]
    Halo3,
    #[strum(to_string = "Halo: Reach", serialize = "HaloReach", serialize = "reach")]
    HaloReach,
    #[strum(to_string = "Halo 4", serialize = "Halo4", serialize = "h4")]
    Halo4,
    #[default]
    #[strum(to_string = "Unknown", serialize = "unknown")]
    Unknown,
}

impl GameTitle {
    /// Detect the running game from a window title.
    ///
    /// Longer titles are checked before their prefixes so "Halo 2 Anniversary"
    /// is not reported as "Halo 2".
    pub fn from_window_title(title: &str) -> Self {
        const MARKERS: [(&str, GameTitle); 6] = [
            ("Halo: Combat Evolved", GameTitle::HaloCombatEvolved),
            ("Halo 2 Anniversary", GameTitle::Halo2Anniversary),
            ("Halo 2", GameTitle::Halo2),
            ("Halo: Reach", GameTitle::HaloReach),
            ("Halo 3", GameTitle::Halo3),
            ("Halo 4", GameTitle::Halo4),
        ];

        MARKERS
            .iter()
            .find(|(marker, _)| title.contains(marker))
            .map(|(_, game)| *game)
            .unwrap_or(GameTitle::Unknown)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Platform {
    #[strum(to_string = "Steam", serialize = "steam")]
    Steam,
    #[strum(to_string = "Microsoft Store", serialize = "MicrosoftStore", serialize = "store")]
    MicrosoftStore,
    #[default]
    #[strum(to_string = "Unknown", serialize = "unknown")]
    Unknown,
}

impl Platform {
    /// Derive the storefront from the name of the matched executable.
    pub fn from_module_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.starts_with("mccwinstore") {
            Platform::MicrosoftStore
        } else if name.starts_with("mcc-win64") {
            Platform::Steam
        } else {
            Platform::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GameIdentity {
    pub title: GameTitle,
    pub platform: Platform,
}

impl GameIdentity {
    pub fn new(title: GameTitle, platform: Platform) -> Self {
        Self { title, platform }
    }

    pub fn detect(window_title: Option<&str>, module_name: &str) -> Self {
        Self {
            title: window_title
                .map(GameTitle::from_window_title)
                .unwrap_or_default(),
            platform: Platform::from_module_name(module_name),
        }
    }
}

impl std::fmt::Display for GameIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.title, self.platform)
    }
}
