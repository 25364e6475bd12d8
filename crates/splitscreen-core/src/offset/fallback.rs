//! Pre-recorded offsets keyed by game and storefront.
//!
//! Entries hold module-relative displacements ("module+RVA" as shown by
//! Cheat Engine) and are resolved against the module base at lookup time.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::{info, warn};

use super::{CameraLayout, OffsetName, OffsetRegistry, OffsetSource};
use crate::identity::{GameIdentity, GameTitle, Platform};
use crate::memory::{Address, ModuleRegion};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackEntry {
    pub game: GameTitle,
    pub platform: Platform,
    #[serde(default)]
    pub split_screen_flag: Option<u64>,
    #[serde(default)]
    pub player_count: Option<u64>,
    #[serde(default)]
    pub camera_base: Option<u64>,
    #[serde(default)]
    pub camera_layout: Option<CameraLayout>,
}

impl FallbackEntry {
    fn rva(&self, name: OffsetName) -> Option<u64> {
        match name {
            OffsetName::SplitScreenFlag => self.split_screen_flag,
            OffsetName::PlayerCount => self.player_count,
            OffsetName::CameraBase => self.camera_base,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackTable {
    entries: Vec<FallbackEntry>,
}

impl FallbackTable {
    pub fn new(entries: Vec<FallbackEntry>) -> Self {
        Self { entries }
    }

    /// Table shipped with the mod.
    ///
    /// Only the Combat Evolved camera layout is known; no flag or player-count
    /// displacements have been recorded for any build yet.
    pub fn builtin() -> Self {
        Self::new(
            [Platform::Steam, Platform::MicrosoftStore]
                .into_iter()
                .map(|platform| FallbackEntry {
                    game: GameTitle::HaloCombatEvolved,
                    platform,
                    split_screen_flag: None,
                    player_count: None,
                    camera_base: None,
                    camera_layout: Some(CameraLayout::COMBAT_EVOLVED),
                })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[FallbackEntry] {
        &self.entries
    }

    pub fn lookup(&self, identity: GameIdentity) -> Option<&FallbackEntry> {
        self.entries
            .iter()
            .find(|e| e.game == identity.title && e.platform == identity.platform)
    }

    /// Build a registry from the recorded entry for `identity`.
    ///
    /// Displacements are added to `module_base`. Without a matching entry the
    /// registry is returned with nothing resolved, and therefore invalid.
    pub fn get_fallback(&self, identity: GameIdentity, module_base: Address) -> OffsetRegistry {
        let mut registry = OffsetRegistry::empty(identity);
        let Some(entry) = self.lookup(identity) else {
            warn!("No fallback offsets recorded for {}", identity);
            return registry;
        };

        for name in OffsetName::iter() {
            if let Some(rva) = entry.rva(name) {
                registry = registry.with_entry(
                    name,
                    module_base.wrapping_add(rva),
                    OffsetSource::FallbackTable,
                );
            }
        }
        registry = registry.with_camera_layout(entry.camera_layout);

        info!(
            "Fallback offsets for {}: {} resolved (valid: {})",
            identity,
            registry.resolved_count(),
            registry.is_valid()
        );
        registry
    }

    /// Like [`get_fallback`](Self::get_fallback), attaching the module the
    /// displacements were resolved against.
    pub fn get_fallback_for_module(
        &self,
        identity: GameIdentity,
        module: &ModuleRegion,
    ) -> OffsetRegistry {
        self.get_fallback(identity, module.base)
            .with_module(module.clone())
    }
}
