// ── Bridge topology manager ──
//
// Owns the bridged, external and cached accessory collections, enforces
// their uniqueness invariants, keeps the per-endpoint identity records in
// step with membership, and drives endpoint servers and the update
// coalescer. All topology mutations run under one lock per bridge.

mod builder;
mod events;
mod topology;

use std::sync::Arc;

use serde_json::Value;
use strum::Display;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use builder::BridgeBuilder;
pub use events::AccessoryEvent;

use self::topology::{EndpointSlot, Topology};
use crate::coalescer::{Enqueued, UpdateCoalescer};
use crate::config::BridgeConfig;
use crate::endpoint::{
    Advertisement, CharacteristicChange, EndpointEvent, EndpointEventSender, EndpointId,
    EndpointServerFactory,
};
use crate::error::CoreError;
use crate::identity::derive_username;
use crate::model::{Accessory, AccessoryId, Username};
use crate::placement::{Placement, classify, external_category};
use crate::store::{AccessoryInfo, CachedAccessory, EndpointProfile, IdentifierCache, IdentityStore};

// ── PublishState ────────────────────────────────────────────────────

/// Lifecycle of the primary endpoint, observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Unpublished,
    /// Endpoint servers started, waiting for the primary to advertise.
    Publishing,
    /// The primary endpoint is announced; configuration updates flow.
    Advertising,
}

// ── Batch results ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PatchOperation {
    Add,
    Remove,
}

/// One failed item of a batch.
#[derive(Debug)]
pub struct PatchFailure {
    pub uuid: AccessoryId,
    pub operation: PatchOperation,
    pub error: CoreError,
}

/// Result of [`Bridge::patch_accessories`]. Items are applied best-effort.
#[derive(Debug, Default)]
pub struct PatchOutcome {
    pub added: Vec<(AccessoryId, Placement)>,
    /// UUIDs that were registered and are now gone.
    pub removed: Vec<AccessoryId>,
    pub failures: Vec<PatchFailure>,
}

impl PatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// ── Bridge ──────────────────────────────────────────────────────────

/// Handle to a running bridge.
///
/// Cheaply cloneable via `Arc<BridgeInner>`. Built with
/// [`BridgeBuilder`]; every further mutation goes through the topology
/// operations below.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

pub(crate) struct BridgeInner {
    config: BridgeConfig,
    store: IdentityStore,
    factory: Arc<dyn EndpointServerFactory>,
    topology: Mutex<Topology>,
    coalescer: UpdateCoalescer,
    publish_state: watch::Sender<PublishState>,
    endpoint_tx: EndpointEventSender,
    accessory_tx: mpsc::UnboundedSender<AccessoryEvent>,
    cancel: CancellationToken,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.inner.config.display_name)
            .field("username", &self.inner.config.username)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    pub fn builder(config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder::new(config)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &IdentityStore {
        &self.inner.store
    }

    pub fn username(&self) -> &Username {
        &self.inner.config.username
    }

    // ── Admission and removal ────────────────────────────────────────

    /// Admit a live accessory and return where it was placed.
    ///
    /// External accessories get a derived identity, their own credential
    /// record, identifier cache and endpoint server; the endpoint is
    /// started right away when the bridge is already published. Any cached
    /// entry with the same UUID is superseded.
    pub async fn add_accessory(&self, accessory: Accessory) -> Result<Placement, CoreError> {
        let placement = {
            let mut topo = self.inner.topology.lock().await;
            self.admit(&mut topo, accessory).await?
        };
        if placement == Placement::Bridged {
            self.enqueue_update(EndpointId::Primary).await;
        }
        Ok(placement)
    }

    /// Remove an accessory from whichever live collection holds it.
    /// Absence is not an error; `Ok(None)` means nothing was registered.
    pub async fn remove_accessory(&self, uuid: &AccessoryId) -> Result<Option<Placement>, CoreError> {
        let removed = {
            let mut topo = self.inner.topology.lock().await;
            self.remove_live(&mut topo, uuid).await?
        };
        if removed == Some(Placement::Bridged) {
            self.enqueue_update(EndpointId::Primary).await;
        }
        Ok(removed)
    }

    /// Remove a bridged accessory. Fails with `NotFound` when it is not
    /// bridged.
    pub async fn remove_bridged_accessory(&self, uuid: &AccessoryId) -> Result<(), CoreError> {
        {
            let mut topo = self.inner.topology.lock().await;
            self.remove_bridged(&mut topo, uuid).await?;
        }
        self.enqueue_update(EndpointId::Primary).await;
        Ok(())
    }

    /// Stop and deregister an external accessory's endpoint. Fails with
    /// `NotFound` when it is not external.
    pub async fn remove_external_accessory(&self, uuid: &AccessoryId) -> Result<(), CoreError> {
        let mut topo = self.inner.topology.lock().await;
        self.remove_external(&mut topo, uuid).await
    }

    /// Apply a batch of removals, then additions. Item failures are
    /// collected rather than aborting the batch; exactly one update is
    /// enqueued for the whole batch.
    pub async fn patch_accessories(
        &self,
        to_add: Vec<Accessory>,
        to_remove: Vec<AccessoryId>,
    ) -> PatchOutcome {
        let mut outcome = PatchOutcome::default();
        {
            let mut topo = self.inner.topology.lock().await;

            for uuid in to_remove {
                match self.remove_live(&mut topo, &uuid).await {
                    Ok(Some(_)) => outcome.removed.push(uuid),
                    Ok(None) => debug!(%uuid, "batch removal of unregistered accessory"),
                    Err(error) => {
                        warn!(%uuid, error = %error, "batch removal failed");
                        outcome.failures.push(PatchFailure {
                            uuid,
                            operation: PatchOperation::Remove,
                            error,
                        });
                    }
                }
            }

            for accessory in to_add {
                let uuid = accessory.uuid.clone();
                match self.admit(&mut topo, accessory).await {
                    Ok(placement) => outcome.added.push((uuid, placement)),
                    Err(error) => {
                        warn!(%uuid, error = %error, "batch admission failed");
                        outcome.failures.push(PatchFailure {
                            uuid,
                            operation: PatchOperation::Add,
                            error,
                        });
                    }
                }
            }
        }

        self.enqueue_update(EndpointId::Primary).await;
        info!(
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            failed = outcome.failures.len(),
            "applied accessory batch"
        );
        outcome
    }

    // ── Provisional cache ────────────────────────────────────────────

    /// Hold a previously known accessory until its live counterpart
    /// arrives. Replaces an existing cached entry with the same UUID.
    pub async fn add_cached_accessory(&self, accessory: Accessory) -> Result<(), CoreError> {
        let mut topo = self.inner.topology.lock().await;
        if accessory.uuid == topo.bridge.uuid {
            return Err(CoreError::UniquenessViolation {
                uuid: accessory.uuid.to_string(),
                collection: "bridge",
            });
        }
        if let Some(placement) = topo.live_collection(&accessory.uuid) {
            return Err(CoreError::UniquenessViolation {
                uuid: accessory.uuid.to_string(),
                collection: collection_name(placement),
            });
        }
        let external = accessory.external || topo.persisted_external.contains(&accessory.uuid);
        debug!(uuid = %accessory.uuid, external, "caching accessory");
        topo.cached
            .insert(accessory.uuid.clone(), CachedAccessory::new(accessory, external));
        Ok(())
    }

    /// Drop a cached accessory. Returns whether one was cached. Emptying
    /// the cache expires unused identifiers of the primary endpoint.
    pub async fn remove_cached_accessory(&self, uuid: &AccessoryId) -> Result<bool, CoreError> {
        let mut topo = self.inner.topology.lock().await;
        if topo.cached.shift_remove(uuid).is_none() {
            return Ok(false);
        }
        if topo.cached.is_empty() {
            self.expire_locked(&mut topo, &EndpointId::Primary).await?;
        }
        Ok(true)
    }

    /// Clear the cache and expire unused identifiers of the primary
    /// endpoint. Returns the number of dropped entries.
    pub async fn remove_all_cached_accessories(&self) -> Result<usize, CoreError> {
        let mut topo = self.inner.topology.lock().await;
        let dropped = topo.cached.len();
        topo.cached.clear();
        self.expire_locked(&mut topo, &EndpointId::Primary).await?;
        debug!(dropped, "cleared accessory cache");
        Ok(dropped)
    }

    /// Move the accessories recorded by the previous run into the cache.
    /// Entries already live are skipped. Returns the number restored.
    pub async fn restore_cached(&self) -> usize {
        let mut topo = self.inner.topology.lock().await;
        let restorable = std::mem::take(&mut topo.restorable);
        let mut restored = 0;
        for cached in restorable {
            let uuid = cached.uuid().clone();
            if topo.live_collection(&uuid).is_some() {
                continue;
            }
            topo.cached.insert(uuid, cached);
            restored += 1;
        }
        info!(restored, "restored cached accessories");
        restored
    }

    // ── Publishing ───────────────────────────────────────────────────

    /// Start the primary endpoint and every registered external endpoint.
    pub async fn publish(&self) -> Result<(), CoreError> {
        let mut topo = self.inner.topology.lock().await;
        if topo.published {
            return Ok(());
        }
        self.inner.publish_state.send_replace(PublishState::Publishing);

        if let Err(e) = self.start_primary(&mut topo).await {
            self.inner.publish_state.send_replace(PublishState::Unpublished);
            return Err(e);
        }
        topo.published = true;

        let mut first_error = None;
        let externals: Vec<AccessoryId> = topo.external.keys().cloned().collect();
        for uuid in externals {
            if let Err(e) = self.start_endpoint(&mut topo, &EndpointId::External(uuid)).await {
                warn!(error = %e, "external endpoint failed to start");
                first_error.get_or_insert(e);
            }
        }

        info!(
            username = %self.inner.config.username,
            bridged = topo.bridged.len(),
            external = topo.external.len(),
            "bridge published"
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Stop every endpoint, gate updates again and persist the topology.
    /// Every endpoint is stopped even if one fails; the first error is
    /// returned.
    pub async fn unpublish(&self) -> Result<(), CoreError> {
        let mut topo = self.inner.topology.lock().await;
        self.inner.coalescer.disable().await;

        let mut first_error = None;
        let mut running: Vec<EndpointId> = topo
            .endpoints
            .iter()
            .filter(|(_, slot)| slot.running)
            .map(|(uuid, _)| EndpointId::External(uuid.clone()))
            .collect();
        running.sort();
        running.push(EndpointId::Primary);
        for endpoint in running {
            if let Err(e) = self.stop_endpoint(&mut topo, &endpoint).await {
                warn!(error = %e, "endpoint failed to stop");
                first_error.get_or_insert(e);
            }
        }

        topo.published = false;
        self.inner.publish_state.send_replace(PublishState::Unpublished);

        let record = topo.to_record(&self.inner.config.username);
        if let Err(e) = self.inner.store.save_topology(&record).await {
            first_error.get_or_insert(e);
        }

        info!(username = %self.inner.config.username, "bridge unpublished");
        first_error.map_or(Ok(()), Err)
    }

    /// Persist the current topology record.
    pub async fn persist_cache(&self) -> Result<(), CoreError> {
        let topo = self.inner.topology.lock().await;
        let record = topo.to_record(&self.inner.config.username);
        self.inner.store.save_topology(&record).await
    }

    // ── Identifiers and updates ──────────────────────────────────────

    /// Drop identifiers no longer used by the endpoint's live graph.
    /// A no-op returning `false` until the endpoint has been materialized.
    pub async fn expire_unused(&self, endpoint: &EndpointId) -> Result<bool, CoreError> {
        let mut topo = self.inner.topology.lock().await;
        self.expire_locked(&mut topo, endpoint).await
    }

    /// Request a re-advertisement of `endpoint` after the quiescent window.
    pub async fn enqueue_update(&self, endpoint: EndpointId) -> Enqueued {
        self.inner.coalescer.enqueue(endpoint).await
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Sender for accessory change events.
    pub fn accessory_events(&self) -> mpsc::UnboundedSender<AccessoryEvent> {
        self.inner.accessory_tx.clone()
    }

    /// Subscribe to publish state changes.
    pub fn publish_state(&self) -> watch::Receiver<PublishState> {
        self.inner.publish_state.subscribe()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn bridged(&self) -> Vec<Accessory> {
        self.inner.topology.lock().await.bridged.values().cloned().collect()
    }

    pub async fn external(&self) -> Vec<Accessory> {
        self.inner.topology.lock().await.external.values().cloned().collect()
    }

    pub async fn cached(&self) -> Vec<CachedAccessory> {
        self.inner.topology.lock().await.cached.values().cloned().collect()
    }

    pub async fn placement_of(&self, uuid: &AccessoryId) -> Option<Placement> {
        self.inner.topology.lock().await.live_collection(uuid)
    }

    pub async fn credentials(&self, endpoint: &EndpointId) -> Option<AccessoryInfo> {
        let topo = self.inner.topology.lock().await;
        topo.slot(endpoint).map(|slot| slot.credentials.clone())
    }

    pub async fn identifier_cache(&self, endpoint: &EndpointId) -> Option<IdentifierCache> {
        let topo = self.inner.topology.lock().await;
        topo.slot(endpoint).map(|slot| slot.identifiers.clone())
    }

    pub async fn endpoint_username(&self, endpoint: &EndpointId) -> Option<Username> {
        let topo = self.inner.topology.lock().await;
        topo.slot(endpoint).map(|slot| slot.username.clone())
    }

    pub async fn is_published(&self) -> bool {
        self.inner.topology.lock().await.published
    }

    // ── Internals: admission ─────────────────────────────────────────

    async fn admit(&self, topo: &mut Topology, mut accessory: Accessory) -> Result<Placement, CoreError> {
        let uuid = accessory.uuid.clone();
        if uuid == topo.bridge.uuid {
            return Err(CoreError::UniquenessViolation {
                uuid: uuid.to_string(),
                collection: "bridge",
            });
        }
        if let Some(existing) = topo.live_collection(&uuid) {
            return Err(CoreError::UniquenessViolation {
                uuid: uuid.to_string(),
                collection: collection_name(existing),
            });
        }

        let placement = classify(&accessory, &topo.placement_context())?;
        debug!(%uuid, %placement, "classified accessory");

        match placement {
            Placement::Bridged => {
                accessory.bridged = true;
                topo.bridged.insert(uuid.clone(), accessory);
            }
            Placement::External => {
                let slot = self.materialize_external(topo, &accessory).await?;
                accessory.bridged = false;
                topo.endpoints.insert(uuid.clone(), slot);
                topo.external.insert(uuid.clone(), accessory);
            }
        }
        info!(%uuid, %placement, "accessory admitted");

        if topo.cached.shift_remove(&uuid).is_some() {
            debug!(%uuid, "superseded cached accessory");
            if topo.cached.is_empty() {
                self.expire_locked(topo, &EndpointId::Primary).await?;
            }
        }

        let primary_running = topo.primary.as_ref().is_some_and(|slot| slot.running);
        if placement == Placement::External && primary_running {
            self.start_endpoint(topo, &EndpointId::External(uuid)).await?;
        }

        Ok(placement)
    }

    /// Credential record, identifier cache and server for an external
    /// accessory. Nothing is registered until the caller inserts the slot.
    async fn materialize_external(&self, topo: &Topology, accessory: &Accessory) -> Result<EndpointSlot, CoreError> {
        let username = derive_username(&self.inner.config.username, &accessory.uuid);
        let collides = username == self.inner.config.username
            || topo.endpoints.values().any(|slot| slot.username == username);
        if collides {
            return Err(CoreError::InvalidTopology {
                uuid: accessory.uuid.to_string(),
                reason: format!("derived username {username} is already in use"),
            });
        }

        let profile = EndpointProfile {
            display_name: accessory.display_name.clone(),
            category: external_category(accessory),
            pincode: self.inner.config.pincode.clone(),
        };
        let credentials = self.inner.store.open_credentials(&username, &profile).await?;
        let identifiers = self.inner.store.open_identifier_cache(&username).await?;
        let endpoint = EndpointId::External(accessory.uuid.clone());
        let server = self.inner.factory.create(&endpoint, &username);
        debug!(%endpoint, %username, category = %profile.category, "materialized external endpoint");

        Ok(EndpointSlot {
            username,
            credentials,
            identifiers,
            server,
            running: false,
        })
    }

    async fn materialize_primary(&self, topo: &mut Topology) -> Result<(), CoreError> {
        if topo.primary.is_some() {
            return Ok(());
        }
        let username = self.inner.config.username.clone();
        let credentials = self
            .inner
            .store
            .open_credentials(&username, &self.inner.config.endpoint_profile())
            .await?;
        let identifiers = self.inner.store.open_identifier_cache(&username).await?;
        let server = self.inner.factory.create(&EndpointId::Primary, &username);
        topo.primary = Some(EndpointSlot {
            username,
            credentials,
            identifiers,
            server,
            running: false,
        });
        Ok(())
    }

    // ── Internals: removal ───────────────────────────────────────────

    /// Try external, then bridged. `NotFound` from either attempt is
    /// expected and swallowed.
    async fn remove_live(&self, topo: &mut Topology, uuid: &AccessoryId) -> Result<Option<Placement>, CoreError> {
        match self.remove_external(topo, uuid).await {
            Ok(()) => return Ok(Some(Placement::External)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        match self.remove_bridged(topo, uuid).await {
            Ok(()) => Ok(Some(Placement::Bridged)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn remove_bridged(&self, topo: &mut Topology, uuid: &AccessoryId) -> Result<(), CoreError> {
        if topo.bridged.shift_remove(uuid).is_none() {
            return Err(CoreError::NotFound {
                entity: "bridged accessory",
                identifier: uuid.to_string(),
            });
        }
        if let Some(primary) = topo.primary.as_ref() {
            primary.server.unsubscribe_all_events(uuid).await;
        }
        info!(%uuid, "bridged accessory removed");
        Ok(())
    }

    /// Persisted records of the endpoint are kept, so re-adding the same
    /// accessory recovers its pairing.
    async fn remove_external(&self, topo: &mut Topology, uuid: &AccessoryId) -> Result<(), CoreError> {
        if topo.external.shift_remove(uuid).is_none() {
            return Err(CoreError::NotFound {
                entity: "external accessory",
                identifier: uuid.to_string(),
            });
        }
        let Some(slot) = topo.endpoints.remove(uuid) else {
            return Ok(());
        };
        slot.server.unsubscribe_all_events(uuid).await;
        if slot.running {
            slot.server
                .stop()
                .await
                .map_err(|source| CoreError::network(&EndpointId::External(uuid.clone()), source))?;
        }
        info!(%uuid, username = %slot.username, "external accessory removed");
        Ok(())
    }

    // ── Internals: endpoints ─────────────────────────────────────────

    async fn start_primary(&self, topo: &mut Topology) -> Result<(), CoreError> {
        self.materialize_primary(topo).await?;
        self.start_endpoint(topo, &EndpointId::Primary).await
    }

    async fn start_endpoint(&self, topo: &mut Topology, endpoint: &EndpointId) -> Result<(), CoreError> {
        if topo.slot(endpoint).is_some_and(|slot| slot.running) {
            return Ok(());
        }
        let Some((advertisement, _)) = self.refresh_advertisement(topo, endpoint).await? else {
            return Err(CoreError::NotFound {
                entity: "endpoint",
                identifier: endpoint.to_string(),
            });
        };
        let Some(slot) = topo.slot_mut(endpoint) else {
            return Ok(());
        };
        slot.server
            .start(advertisement, self.inner.endpoint_tx.clone())
            .await
            .map_err(|source| CoreError::network(endpoint, source))?;
        slot.running = true;
        info!(%endpoint, username = %slot.username, "endpoint started");
        Ok(())
    }

    async fn stop_endpoint(&self, topo: &mut Topology, endpoint: &EndpointId) -> Result<(), CoreError> {
        let Some(slot) = topo.slot_mut(endpoint) else {
            return Ok(());
        };
        if !slot.running {
            return Ok(());
        }
        slot.running = false;
        slot.server
            .stop()
            .await
            .map_err(|source| CoreError::network(endpoint, source))?;
        info!(%endpoint, "endpoint stopped");
        Ok(())
    }

    /// Serialize the endpoint's graph and record its fingerprint. Returns
    /// the advertisement and whether the configuration changed, or `None`
    /// when the endpoint is not materialized.
    async fn refresh_advertisement(
        &self,
        topo: &mut Topology,
        endpoint: &EndpointId,
    ) -> Result<Option<(Advertisement, bool)>, CoreError> {
        let Some((slot, graph)) = topo.slot_and_graph(endpoint, false) else {
            return Ok(None);
        };
        let database = slot.server.serialize(&graph, &mut slot.identifiers);
        let changed = slot.credentials.record_configuration(&database.fingerprint());
        if changed {
            debug!(%endpoint, config_version = slot.credentials.config_version, "configuration changed");
            self.inner.store.save_credentials(&slot.credentials).await?;
        }
        self.inner
            .store
            .save_identifier_cache(&slot.username, &mut slot.identifiers)
            .await?;
        Ok(Some((slot.advertisement(endpoint, database), changed)))
    }

    async fn expire_locked(&self, topo: &mut Topology, endpoint: &EndpointId) -> Result<bool, CoreError> {
        let Some((slot, graph)) = topo.slot_and_graph(endpoint, true) else {
            debug!(%endpoint, "endpoint not materialized, nothing to expire");
            return Ok(false);
        };
        slot.identifiers.start_tracking_usage();
        slot.server.serialize(&graph, &mut slot.identifiers);
        let expired = slot.identifiers.stop_tracking_usage_and_expire_unused();
        debug!(%endpoint, expired, "identifier expiration pass");
        self.inner
            .store
            .save_identifier_cache(&slot.username, &mut slot.identifiers)
            .await?;
        Ok(true)
    }

    /// Re-advertise every pending endpoint whose configuration changed.
    pub(crate) async fn flush_updates(&self) {
        let pending = self.inner.coalescer.take_pending().await;
        if pending.is_empty() {
            return;
        }
        let mut topo = self.inner.topology.lock().await;
        for endpoint in pending {
            if !topo.slot(&endpoint).is_some_and(|slot| slot.running) {
                debug!(%endpoint, "skipping update for stopped endpoint");
                continue;
            }
            match self.refresh_advertisement(&mut topo, &endpoint).await {
                Ok(Some((advertisement, true))) => {
                    let Some(slot) = topo.slot(&endpoint) else { continue };
                    let version = advertisement.config_version;
                    match slot.server.update_advertisement(advertisement).await {
                        Ok(()) => info!(%endpoint, config_version = version, "configuration update advertised"),
                        Err(e) => warn!(%endpoint, error = %e, "re-advertisement failed"),
                    }
                }
                Ok(Some((_, false))) => debug!(%endpoint, "configuration unchanged, not re-advertising"),
                Ok(None) => {}
                Err(e) => warn!(%endpoint, error = %e, "configuration update failed"),
            }
        }
    }

    // ── Internals: event handling ────────────────────────────────────

    pub(crate) async fn handle_endpoint_event(&self, event: EndpointEvent) {
        match event {
            EndpointEvent::Advertising { endpoint } => {
                if endpoint != EndpointId::Primary {
                    debug!(%endpoint, "external endpoint advertising");
                    return;
                }
                if !self.inner.topology.lock().await.published {
                    debug!("advertising signal after unpublish, ignored");
                    return;
                }
                self.inner.coalescer.enable().await;
                self.inner.publish_state.send_replace(PublishState::Advertising);
                info!(username = %self.inner.config.username, "primary endpoint advertising");
            }
            EndpointEvent::Paired {
                endpoint,
                client,
                public_key,
                admin,
            } => {
                self.update_pairing(&endpoint, |info| {
                    info.add_paired_client(client, public_key, admin);
                })
                .await;
            }
            EndpointEvent::Unpaired { endpoint, client } => {
                self.update_pairing(&endpoint, |info| {
                    info.remove_paired_client(&client);
                })
                .await;
            }
        }
    }

    async fn update_pairing(&self, endpoint: &EndpointId, apply: impl FnOnce(&mut AccessoryInfo)) {
        let mut topo = self.inner.topology.lock().await;
        let Some(slot) = topo.slot_mut(endpoint) else {
            warn!(%endpoint, "pairing event for unknown endpoint");
            return;
        };
        let was_paired = slot.credentials.is_paired();
        apply(&mut slot.credentials);
        let paired = slot.credentials.is_paired();
        if let Err(e) = self.inner.store.save_credentials(&slot.credentials).await {
            warn!(%endpoint, error = %e, "failed to save pairing");
        }
        info!(%endpoint, paired, "pairing changed");

        if was_paired == paired || !slot.running {
            return;
        }
        // Pairing status is part of the announcement.
        match self.refresh_advertisement(&mut topo, endpoint).await {
            Ok(Some((advertisement, _))) => {
                if let Some(slot) = topo.slot(endpoint) {
                    if let Err(e) = slot.server.update_advertisement(advertisement).await {
                        warn!(%endpoint, error = %e, "re-advertisement failed");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!(%endpoint, error = %e, "failed to refresh advertisement"),
        }
    }

    pub(crate) async fn handle_accessory_event(&self, event: AccessoryEvent) {
        match event {
            AccessoryEvent::Updated(accessory) => {
                let uuid = accessory.uuid.clone();
                let owner = {
                    let mut topo = self.inner.topology.lock().await;
                    let Some(owner) = topo.owner_of(&uuid) else {
                        debug!(%uuid, "update for unregistered accessory dropped");
                        return;
                    };
                    if let Some(current) = topo.live_mut(&uuid) {
                        let bridged = current.bridged;
                        let external = current.external;
                        *current = accessory;
                        current.bridged = bridged;
                        current.external = external;
                    }
                    owner
                };
                self.enqueue_update(owner).await;
            }
            AccessoryEvent::CharacteristicChanged {
                uuid,
                service,
                subtype,
                characteristic,
                value,
            } => {
                let mut topo = self.inner.topology.lock().await;
                let Some(owner) = topo.owner_of(&uuid) else {
                    debug!(%uuid, "change for unregistered accessory dropped");
                    return;
                };
                if let Some(accessory) = topo.live_mut(&uuid) {
                    store_value(accessory, &service, subtype.as_deref(), &characteristic, &value);
                }
                if let Some(slot) = topo.slot(&owner) {
                    slot.server
                        .notify_change(CharacteristicChange {
                            uuid,
                            service,
                            subtype,
                            characteristic,
                            value,
                        })
                        .await;
                }
            }
        }
    }
}

fn store_value(
    accessory: &mut Accessory,
    service: &str,
    subtype: Option<&str>,
    characteristic: &str,
    value: &Value,
) {
    let target = accessory
        .services
        .iter_mut()
        .filter(|s| s.kind.as_str() == service && s.subtype.as_deref() == subtype)
        .flat_map(|s| s.characteristics.iter_mut())
        .find(|c| c.kind == characteristic);
    if let Some(target) = target {
        target.value = value.clone();
    }
}

fn collection_name(placement: Placement) -> &'static str {
    match placement {
        Placement::Bridged => "bridged",
        Placement::External => "external",
    }
}
