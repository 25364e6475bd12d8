//! Named target addresses resolved for the running game.

mod export;
mod fallback;
mod registry;

pub use export::{export_file_name, export_registry, format_export};
pub use fallback::{FallbackEntry, FallbackTable};
pub use registry::{OffsetRegistry, RegistryCell, scan};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::memory::Address;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum OffsetName {
    SplitScreenFlag,
    PlayerCount,
    CameraBase,
}

impl OffsetName {
    /// Entries that must resolve for the registry to be usable.
    pub fn is_required(self) -> bool {
        matches!(self, OffsetName::SplitScreenFlag | OffsetName::PlayerCount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum OffsetSource {
    /// Validated by a pattern match in this process.
    #[strum(to_string = "scanned")]
    ScannedFresh,
    /// Pre-recorded and unverified; may be stale for this build.
    #[strum(to_string = "fallback")]
    FallbackTable,
    #[strum(to_string = "unresolved")]
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetEntry {
    pub name: OffsetName,
    /// Absolute address, or 0 when unresolved.
    pub address: Address,
    pub source: OffsetSource,
}

impl OffsetEntry {
    pub fn unresolved(name: OffsetName) -> Self {
        Self {
            name,
            address: 0,
            source: OffsetSource::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.address != 0
    }
}

/// Byte offsets of camera fields relative to the camera base.
///
/// These values come from manual reverse engineering and are unverified for
/// any particular build, so they are configuration rather than constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraLayout {
    pub view_matrix: u64,
    pub projection_matrix: u64,
    pub position: u64,
    pub rotation: u64,
}

impl CameraLayout {
    /// Layout observed for Halo: Combat Evolved.
    pub const COMBAT_EVOLVED: CameraLayout = CameraLayout {
        view_matrix: 0x40,
        projection_matrix: 0x80,
        position: 0x10,
        rotation: 0x1C,
    };
}
