// ── Topology state ──
//
// Everything guarded by the bridge's topology lock: the three accessory
// collections and the per-endpoint index of credentials, identifier caches
// and servers. Every map is keyed by accessory UUID.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::endpoint::{Advertisement, EndpointId, EndpointServer};
use crate::model::{Accessory, AccessoryId, Username};
use crate::placement::{Placement, PlacementContext};
use crate::serialize::AttributeDatabase;
use crate::store::{AccessoryInfo, CachedAccessory, IdentifierCache, TopologyRecord};

/// Identity and server of one published endpoint.
pub(crate) struct EndpointSlot {
    pub username: Username,
    pub credentials: AccessoryInfo,
    pub identifiers: IdentifierCache,
    pub server: Arc<dyn EndpointServer>,
    pub running: bool,
}

impl EndpointSlot {
    pub fn advertisement(&self, endpoint: &EndpointId, database: AttributeDatabase) -> Advertisement {
        Advertisement {
            endpoint: endpoint.clone(),
            username: self.username.clone(),
            display_name: self.credentials.display_name.clone(),
            category: self.credentials.category,
            setup_id: self.credentials.setup_id.clone(),
            config_version: self.credentials.config_version,
            paired: self.credentials.is_paired(),
            database,
        }
    }
}

pub(crate) struct Topology {
    /// The bridge's own accessory, primary of the primary endpoint.
    pub bridge: Accessory,
    pub bridged: IndexMap<AccessoryId, Accessory>,
    pub external: IndexMap<AccessoryId, Accessory>,
    pub cached: IndexMap<AccessoryId, CachedAccessory>,
    /// External placements recorded by the previous run.
    pub persisted_external: BTreeSet<AccessoryId>,
    /// Recorded accessories not yet moved into `cached`.
    pub restorable: Vec<CachedAccessory>,
    pub primary: Option<EndpointSlot>,
    pub endpoints: HashMap<AccessoryId, EndpointSlot>,
    pub published: bool,
}

impl Topology {
    pub fn new(bridge: Accessory, record: Option<TopologyRecord>) -> Self {
        let (persisted_external, restorable) = match record {
            Some(record) => {
                let external: BTreeSet<AccessoryId> = record.external_uuids().cloned().collect();
                (external, record.accessories)
            }
            None => (BTreeSet::new(), Vec::new()),
        };
        Self {
            bridge,
            bridged: IndexMap::new(),
            external: IndexMap::new(),
            cached: IndexMap::new(),
            persisted_external,
            restorable,
            primary: None,
            endpoints: HashMap::new(),
            published: false,
        }
    }

    /// Live collection holding `uuid`, if any.
    pub fn live_collection(&self, uuid: &AccessoryId) -> Option<Placement> {
        if self.bridged.contains_key(uuid) {
            Some(Placement::Bridged)
        } else if self.external.contains_key(uuid) {
            Some(Placement::External)
        } else {
            None
        }
    }

    pub fn placement_context(&self) -> PlacementContext<'_> {
        let live = self.external.values();
        let cached = self
            .cached
            .values()
            .filter(|cached| cached.external)
            .map(|cached| &cached.accessory);
        let external_groups = live
            .chain(cached)
            .flat_map(|accessory| accessory.groups.iter().map(String::as_str))
            .collect();
        PlacementContext {
            persisted_external: Some(&self.persisted_external),
            external_groups,
        }
    }

    pub fn slot(&self, endpoint: &EndpointId) -> Option<&EndpointSlot> {
        match endpoint {
            EndpointId::Primary => self.primary.as_ref(),
            EndpointId::External(uuid) => self.endpoints.get(uuid),
        }
    }

    pub fn slot_mut(&mut self, endpoint: &EndpointId) -> Option<&mut EndpointSlot> {
        match endpoint {
            EndpointId::Primary => self.primary.as_mut(),
            EndpointId::External(uuid) => self.endpoints.get_mut(uuid),
        }
    }

    /// Endpoint serving a live accessory.
    pub fn owner_of(&self, uuid: &AccessoryId) -> Option<EndpointId> {
        match self.live_collection(uuid)? {
            Placement::Bridged => Some(EndpointId::Primary),
            Placement::External => Some(EndpointId::External(uuid.clone())),
        }
    }

    pub fn live_mut(&mut self, uuid: &AccessoryId) -> Option<&mut Accessory> {
        match self.bridged.get_mut(uuid) {
            Some(accessory) => Some(accessory),
            None => self.external.get_mut(uuid),
        }
    }

    /// Slot of `endpoint` together with the accessory graph it publishes,
    /// primary accessory first. With `include_cached`, the primary graph
    /// also covers cached accessories that were bridged.
    pub fn slot_and_graph(
        &mut self,
        endpoint: &EndpointId,
        include_cached: bool,
    ) -> Option<(&mut EndpointSlot, Vec<&Accessory>)> {
        let Self {
            bridge,
            bridged,
            external,
            cached,
            primary,
            endpoints,
            ..
        } = self;

        match endpoint {
            EndpointId::Primary => {
                let slot = primary.as_mut()?;
                let mut graph: Vec<&Accessory> = Vec::with_capacity(1 + bridged.len());
                graph.push(&*bridge);
                graph.extend(bridged.values());
                if include_cached {
                    graph.extend(
                        cached
                            .values()
                            .filter(|cached| !cached.external)
                            .map(|cached| &cached.accessory),
                    );
                }
                Some((slot, graph))
            }
            EndpointId::External(uuid) => {
                let slot = endpoints.get_mut(uuid)?;
                let accessory = external.get(uuid)?;
                Some((slot, vec![accessory]))
            }
        }
    }

    /// Every known accessory with its placement, for persistence.
    pub fn to_record(&self, bridge: &Username) -> TopologyRecord {
        let mut record = TopologyRecord::new(bridge.clone());
        record.accessories.extend(
            self.bridged
                .values()
                .map(|accessory| CachedAccessory::new(accessory.clone(), false)),
        );
        record.accessories.extend(
            self.external
                .values()
                .map(|accessory| CachedAccessory::new(accessory.clone(), true)),
        );
        record.accessories.extend(self.cached.values().cloned());
        record
    }
}
