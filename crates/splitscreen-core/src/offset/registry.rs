use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use super::{CameraLayout, OffsetEntry, OffsetName, OffsetSource};
use crate::identity::GameIdentity;
use crate::memory::{Address, MemoryAccess, ModuleRegion};
use crate::scanner::ModuleScanner;
use crate::signature::OffsetSignatureSet;

/// Resolved addresses for one scan or fallback pass.
///
/// A registry is never mutated after construction; rescans build a new one
/// and swap it into a [`RegistryCell`].
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetRegistry {
    entries: Vec<OffsetEntry>,
    module: Option<ModuleRegion>,
    identity: GameIdentity,
    camera_layout: Option<CameraLayout>,
    generation: u64,
}

impl OffsetRegistry {
    /// A registry with every entry unresolved.
    pub fn empty(identity: GameIdentity) -> Self {
        Self {
            entries: OffsetName::iter().map(OffsetEntry::unresolved).collect(),
            module: None,
            identity,
            camera_layout: None,
            generation: 0,
        }
    }

    pub fn with_module(mut self, module: ModuleRegion) -> Self {
        self.module = Some(module);
        self
    }

    pub fn with_camera_layout(mut self, layout: Option<CameraLayout>) -> Self {
        self.camera_layout = layout;
        self
    }

    pub fn with_entry(mut self, name: OffsetName, address: Address, source: OffsetSource) -> Self {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            *entry = if address == 0 {
                OffsetEntry::unresolved(name)
            } else {
                OffsetEntry {
                    name,
                    address,
                    source,
                }
            };
        }
        self
    }

    pub fn entries(&self) -> &[OffsetEntry] {
        &self.entries
    }

    pub fn entry(&self, name: OffsetName) -> OffsetEntry {
        self.entries
            .iter()
            .copied()
            .find(|e| e.name == name)
            .unwrap_or_else(|| OffsetEntry::unresolved(name))
    }

    /// Resolved address of `name`, if any.
    pub fn address(&self, name: OffsetName) -> Option<Address> {
        let entry = self.entry(name);
        entry.is_resolved().then_some(entry.address)
    }

    /// True when every required entry resolved.
    pub fn is_valid(&self) -> bool {
        OffsetName::iter()
            .filter(|n| n.is_required())
            .all(|n| self.address(n).is_some())
    }

    pub fn module(&self) -> Option<&ModuleRegion> {
        self.module.as_ref()
    }

    pub fn identity(&self) -> GameIdentity {
        self.identity
    }

    pub fn camera_layout(&self) -> Option<CameraLayout> {
        self.camera_layout
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn resolved_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_resolved()).count()
    }
}

/// Scan `module` for every named signature.
///
/// Each name is resolved independently; candidates within a name are tried
/// in order and the first that resolves wins. Unresolved names are left at 0.
pub fn scan<M: MemoryAccess + ?Sized>(
    memory: &M,
    module: &ModuleRegion,
    signatures: &OffsetSignatureSet,
    identity: GameIdentity,
) -> OffsetRegistry {
    debug!(
        "Scanning {} (0x{:X}, 0x{:X} bytes) with signature set {}",
        module.name, module.base, module.size, signatures.version
    );
    let scanner = ModuleScanner::new(memory, module);
    let mut registry = OffsetRegistry::empty(identity).with_module(module.clone());

    for name in OffsetName::iter() {
        let Some(entry) = signatures.entry(name.as_ref()) else {
            warn!("No signatures for {}", name);
            continue;
        };

        for (index, signature) in entry.signatures.iter().enumerate() {
            let pattern = match signature.compile() {
                Ok(pattern) => pattern,
                Err(e) => {
                    warn!("Skipping {} signature #{}: {}", name, index, e);
                    continue;
                }
            };

            match scanner.find_pattern(&pattern) {
                Ok(address) => {
                    info!("{} found at 0x{:X}", name, address);
                    registry = registry.with_entry(name, address, OffsetSource::ScannedFresh);
                    break;
                }
                Err(e) => debug!("{} signature #{} failed: {}", name, index, e),
            }
        }

        if registry.address(name).is_none() {
            warn!("{} not found by any signature", name);
        }
    }

    info!(
        "Scan resolved {}/{} offsets (valid: {})",
        registry.resolved_count(),
        registry.entries().len(),
        registry.is_valid()
    );
    registry
}

/// Shared slot holding the current registry.
///
/// Readers take an `Arc` snapshot under a short lock; a replacement swaps the
/// whole `Arc`, so a snapshot never mixes entries from two passes.
pub struct RegistryCell {
    current: Mutex<Arc<OffsetRegistry>>,
    rescan_lock: Mutex<()>,
    next_generation: AtomicU64,
}

impl RegistryCell {
    pub fn new(initial: OffsetRegistry) -> Self {
        Self {
            current: Mutex::new(Arc::new(initial)),
            rescan_lock: Mutex::new(()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn snapshot(&self) -> Arc<OffsetRegistry> {
        let guard = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Non-blocking snapshot for hot paths; `None` if the slot is momentarily locked.
    pub fn try_snapshot(&self) -> Option<Arc<OffsetRegistry>> {
        self.current.try_lock().ok().map(|guard| Arc::clone(&guard))
    }

    /// Install `registry` as current, stamping it with a fresh generation.
    ///
    /// The generation is taken under the slot lock, so the installed registry
    /// always carries the highest generation handed out.
    pub fn replace(&self, mut registry: OffsetRegistry) -> Arc<OffsetRegistry> {
        let mut guard = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        registry.generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let registry = Arc::new(registry);
        *guard = Arc::clone(&registry);
        registry
    }

    /// Build a new registry with `build` and swap it in.
    ///
    /// Concurrent rescans are serialized; readers are never blocked by the
    /// build itself.
    pub fn rescan<F>(&self, build: F) -> Arc<OffsetRegistry>
    where
        F: FnOnce() -> OffsetRegistry,
    {
        let _serial = self
            .rescan_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.replace(build())
    }
}
