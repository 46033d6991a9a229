// ── Identity store ──
//
// Per-endpoint persistence: credential records, identifier caches and the
// per-bridge topology record. Pure load/create/save, no topology logic.

mod backend;
mod credentials;
mod identifier_cache;
mod topology_record;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use tracing::{debug, trace};

pub use backend::{FileBackend, IdentityBackend, MemoryBackend};
pub use credentials::{AccessoryInfo, EndpointProfile, PairedClient};
pub use identifier_cache::{IdentifierCache, PRIMARY_AID};
pub use topology_record::{CachedAccessory, TopologyRecord};

use crate::error::CoreError;
use crate::model::Username;

/// Shared handle to the persistence backend of a bridge.
#[derive(Clone)]
pub struct IdentityStore {
    backend: Arc<dyn IdentityBackend>,
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore").finish_non_exhaustive()
    }
}

impl IdentityStore {
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by one JSON file per record under `root`.
    pub fn file(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileBackend::new(root)))
    }

    /// Volatile store.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    // ── Keys ─────────────────────────────────────────────────────────

    pub fn credentials_key(username: &Username) -> String {
        format!("accessory-info.{}.json", username.storage_key())
    }

    pub fn identifier_cache_key(username: &Username) -> String {
        format!("identifier-cache.{}.json", username.storage_key())
    }

    pub fn topology_key(bridge: &Username) -> String {
        format!("topology.{}.json", bridge.storage_key())
    }

    // ── Credentials ──────────────────────────────────────────────────

    pub async fn load_credentials(&self, username: &Username) -> Result<Option<AccessoryInfo>, CoreError> {
        self.read_json(&Self::credentials_key(username)).await
    }

    pub fn create_credentials(&self, username: &Username, profile: &EndpointProfile) -> AccessoryInfo {
        debug!(%username, "creating credential record");
        AccessoryInfo::create(username.clone(), profile)
    }

    pub async fn save_credentials(&self, info: &AccessoryInfo) -> Result<(), CoreError> {
        let key = Self::credentials_key(&info.username);
        let bytes = to_json(&key, info)?;
        self.backend.write(&key, &bytes).await
    }

    /// Load or create the record for `username`, refresh it from `profile`
    /// and save it.
    pub async fn open_credentials(
        &self,
        username: &Username,
        profile: &EndpointProfile,
    ) -> Result<AccessoryInfo, CoreError> {
        let mut info = match self.load_credentials(username).await? {
            Some(info) => info,
            None => self.create_credentials(username, profile),
        };
        info.refresh(profile);
        self.save_credentials(&info).await?;
        Ok(info)
    }

    // ── Identifier caches ────────────────────────────────────────────

    pub async fn load_identifier_cache(&self, username: &Username) -> Result<Option<IdentifierCache>, CoreError> {
        let key = Self::identifier_cache_key(username);
        let Some(bytes) = self.backend.read(&key).await? else {
            return Ok(None);
        };
        let mut cache: IdentifierCache =
            serde_json::from_slice(&bytes).map_err(|e| CoreError::persistence(&key, e))?;
        cache.saved_hash = Some(content_hash(&bytes));
        Ok(Some(cache))
    }

    pub fn create_identifier_cache(&self, username: &Username) -> IdentifierCache {
        debug!(%username, "creating identifier cache");
        IdentifierCache::new()
    }

    pub async fn open_identifier_cache(&self, username: &Username) -> Result<IdentifierCache, CoreError> {
        match self.load_identifier_cache(username).await? {
            Some(cache) => Ok(cache),
            None => Ok(self.create_identifier_cache(username)),
        }
    }

    /// Persist `cache` unless its content is unchanged since the last load
    /// or save. Returns whether a write happened.
    pub async fn save_identifier_cache(
        &self,
        username: &Username,
        cache: &mut IdentifierCache,
    ) -> Result<bool, CoreError> {
        let key = Self::identifier_cache_key(username);
        let bytes = to_json(&key, cache)?;
        let hash = content_hash(&bytes);
        if cache.saved_hash.as_deref() == Some(hash.as_str()) {
            trace!(%username, "identifier cache unchanged, skipping save");
            return Ok(false);
        }
        self.backend.write(&key, &bytes).await?;
        cache.saved_hash = Some(hash);
        Ok(true)
    }

    // ── Topology ─────────────────────────────────────────────────────

    pub async fn load_topology(&self, bridge: &Username) -> Result<Option<TopologyRecord>, CoreError> {
        self.read_json(&Self::topology_key(bridge)).await
    }

    pub async fn save_topology(&self, record: &TopologyRecord) -> Result<(), CoreError> {
        let key = Self::topology_key(&record.bridge);
        let bytes = to_json(&key, record)?;
        self.backend.write(&key, &bytes).await
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CoreError> {
        match self.backend.read(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CoreError::persistence(key, e)),
            None => Ok(None),
        }
    }
}

fn to_json<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec_pretty(value).map_err(|e| CoreError::persistence(key, e))
}

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AccessoryId, Category};

    fn username() -> Username {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    fn profile(name: &str) -> EndpointProfile {
        EndpointProfile {
            display_name: name.into(),
            category: Category::Bridge,
            pincode: "031-45-154".into(),
        }
    }

    fn memory() -> (IdentityStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (IdentityStore::new(backend.clone()), backend)
    }

    #[test]
    fn keys_use_colon_free_username() {
        assert_eq!(
            IdentityStore::credentials_key(&username()),
            "accessory-info.AABBCCDDEEFF.json"
        );
        assert_eq!(
            IdentityStore::identifier_cache_key(&username()),
            "identifier-cache.AABBCCDDEEFF.json"
        );
    }

    #[tokio::test]
    async fn open_credentials_creates_then_reuses_setup_id() {
        let (store, _) = memory();
        let first = store.open_credentials(&username(), &profile("Hub")).await.unwrap();
        let second = store.open_credentials(&username(), &profile("Renamed")).await.unwrap();
        assert_eq!(first.setup_id, second.setup_id);
        assert_eq!(second.display_name, "Renamed");

        let persisted = store.load_credentials(&username()).await.unwrap().unwrap();
        assert_eq!(persisted.display_name, "Renamed");
    }

    #[tokio::test]
    async fn identifier_cache_save_is_skipped_when_unchanged() {
        let (store, backend) = memory();
        let mut cache = store.open_identifier_cache(&username()).await.unwrap();
        cache.aid(&AccessoryId::from("a"), false);

        assert!(store.save_identifier_cache(&username(), &mut cache).await.unwrap());
        assert!(!store.save_identifier_cache(&username(), &mut cache).await.unwrap());
        assert_eq!(backend.write_count(), 1);

        let mut reloaded = store.open_identifier_cache(&username()).await.unwrap();
        assert!(!store.save_identifier_cache(&username(), &mut reloaded).await.unwrap());
        assert_eq!(reloaded.aid(&AccessoryId::from("a"), false), 2);
    }

    #[tokio::test]
    async fn corrupt_record_is_a_persistence_error() {
        let (store, backend) = memory();
        backend
            .write(&IdentityStore::credentials_key(&username()), b"{not json")
            .await
            .unwrap();
        let err = store.load_credentials(&username()).await.unwrap_err();
        assert!(matches!(err, CoreError::Persistence { .. }));
    }

    #[tokio::test]
    async fn file_store_round_trips_topology() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::file(dir.path());
        let mut record = TopologyRecord::new(username());
        record.accessories.push(CachedAccessory::new(
            crate::model::Accessory::new("tv", "TV"),
            true,
        ));
        store.save_topology(&record).await.unwrap();

        let loaded = store.load_topology(&username()).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.external_uuids().count(), 1);
        assert!(dir.path().join("topology.AABBCCDDEEFF.json").exists());
    }
}
