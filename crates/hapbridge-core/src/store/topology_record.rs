// ── Persisted topology ──
//
// Snapshot of the live accessories of one bridge and where each was placed.
// Loaded at build time to seed the provisional cache and the external
// placement of the previous run.

use serde::{Deserialize, Serialize};

use crate::model::{Accessory, AccessoryId, Username};

/// An accessory recalled from a previous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAccessory {
    pub accessory: Accessory,
    /// Whether it was published as an external endpoint.
    #[serde(default)]
    pub external: bool,
}

impl CachedAccessory {
    pub fn new(accessory: Accessory, external: bool) -> Self {
        Self { accessory, external }
    }

    pub fn uuid(&self) -> &AccessoryId {
        &self.accessory.uuid
    }
}

/// Persisted topology record (`topology.*.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyRecord {
    pub bridge: Username,
    #[serde(default)]
    pub accessories: Vec<CachedAccessory>,
}

impl TopologyRecord {
    pub fn new(bridge: Username) -> Self {
        Self {
            bridge,
            accessories: Vec::new(),
        }
    }

    pub fn external_uuids(&self) -> impl Iterator<Item = &AccessoryId> {
        self.accessories
            .iter()
            .filter(|cached| cached.external)
            .map(CachedAccessory::uuid)
    }
}
