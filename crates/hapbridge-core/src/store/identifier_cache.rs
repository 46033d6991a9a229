// ── Identifier cache ──
//
// Stable small integers for (accessory, service, characteristic) triples.
// Ids are handed out the first time a triple is serialized and are never
// reassigned while the triple stays live. Counters only move forward, so an
// expired id is never reused for a different triple either.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::AccessoryId;

/// aid of the primary accessory of every endpoint.
pub const PRIMARY_AID: u64 = 1;
const FIRST_AID: u64 = 2;
const FIRST_IID: u64 = 1;

/// Persisted identifier cache (`identifier-cache.*.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierCache {
    #[serde(default)]
    entries: BTreeMap<String, u64>,
    #[serde(default = "first_aid")]
    next_aid: u64,
    #[serde(default)]
    next_iids: BTreeMap<String, u64>,

    /// Keys touched during the current tracking pass.
    #[serde(skip)]
    used: Option<BTreeSet<String>>,
    /// Content hash as of the last load or save.
    #[serde(skip)]
    pub(crate) saved_hash: Option<String>,
}

fn first_aid() -> u64 {
    FIRST_AID
}

impl Default for IdentifierCache {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_aid: FIRST_AID,
            next_iids: BTreeMap::new(),
            used: None,
            saved_hash: None,
        }
    }
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lookups (assign on first use) ────────────────────────────────

    /// aid for `uuid`. The primary accessory of an endpoint is always 1.
    pub fn aid(&mut self, uuid: &AccessoryId, primary: bool) -> u64 {
        let key = format!("A|{uuid}");
        if primary {
            self.entries.insert(key.clone(), PRIMARY_AID);
            self.mark(key);
            return PRIMARY_AID;
        }
        let next_aid = &mut self.next_aid;
        let aid = *self.entries.entry(key.clone()).or_insert_with(|| {
            let aid = *next_aid;
            *next_aid += 1;
            aid
        });
        self.mark(key);
        aid
    }

    pub fn service_iid(&mut self, uuid: &AccessoryId, kind: &str, subtype: Option<&str>) -> u64 {
        let key = format!("S|{uuid}|{kind}|{}", subtype.unwrap_or_default());
        self.iid(uuid, key)
    }

    pub fn characteristic_iid(
        &mut self,
        uuid: &AccessoryId,
        service: &str,
        subtype: Option<&str>,
        characteristic: &str,
    ) -> u64 {
        let key = format!(
            "C|{uuid}|{service}|{}|{characteristic}",
            subtype.unwrap_or_default()
        );
        self.iid(uuid, key)
    }

    fn iid(&mut self, uuid: &AccessoryId, key: String) -> u64 {
        let iid = match self.entries.get(&key) {
            Some(iid) => *iid,
            None => {
                let counter = self
                    .next_iids
                    .entry(uuid.as_str().to_owned())
                    .or_insert(FIRST_IID);
                let iid = *counter;
                *counter += 1;
                self.entries.insert(key.clone(), iid);
                iid
            }
        };
        self.mark(key);
        iid
    }

    fn mark(&mut self, key: String) {
        if let Some(used) = self.used.as_mut() {
            used.insert(key);
        }
    }

    // ── Usage tracking ───────────────────────────────────────────────

    pub fn start_tracking_usage(&mut self) {
        self.used = Some(BTreeSet::new());
    }

    pub fn is_tracking(&self) -> bool {
        self.used.is_some()
    }

    /// End the tracking pass and drop every entry that was not touched.
    /// Returns the number of expired entries. Without an active pass this
    /// expires nothing.
    pub fn stop_tracking_usage_and_expire_unused(&mut self) -> usize {
        let Some(used) = self.used.take() else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|key, _| used.contains(key));
        let expired = before - self.entries.len();

        // An accessory with no ids left gets a fresh aid if it returns, so
        // its iid counter can go with it.
        let stale: Vec<String> = self
            .next_iids
            .keys()
            .filter(|uuid| self.ids_for(&AccessoryId::from(uuid.as_str())).is_empty())
            .cloned()
            .collect();
        for uuid in &stale {
            self.next_iids.remove(uuid);
        }

        if expired > 0 {
            debug!(expired, remaining = self.entries.len(), "expired unused identifiers");
        }
        expired
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_accessory(&self, uuid: &AccessoryId) -> bool {
        self.entries.contains_key(&format!("A|{uuid}"))
    }

    /// Every id assigned to `uuid`, including its aid.
    pub fn ids_for(&self, uuid: &AccessoryId) -> Vec<u64> {
        let needle = format!("|{uuid}|");
        let aid_key = format!("A|{uuid}");
        self.entries
            .iter()
            .filter(|(key, _)| **key == aid_key || key.get(1..).is_some_and(|rest| rest.starts_with(&needle)))
            .map(|(_, id)| *id)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id(s: &str) -> AccessoryId {
        AccessoryId::from(s)
    }

    #[test]
    fn primary_is_aid_one_and_others_start_at_two() {
        let mut cache = IdentifierCache::new();
        assert_eq!(cache.aid(&id("bridge"), true), 1);
        assert_eq!(cache.aid(&id("a"), false), 2);
        assert_eq!(cache.aid(&id("b"), false), 3);
        assert_eq!(cache.aid(&id("a"), false), 2);
    }

    #[test]
    fn iids_are_per_accessory() {
        let mut cache = IdentifierCache::new();
        let a = id("a");
        let b = id("b");
        assert_eq!(cache.service_iid(&a, "Lightbulb", None), 1);
        assert_eq!(cache.characteristic_iid(&a, "Lightbulb", None, "On"), 2);
        assert_eq!(cache.service_iid(&b, "Switch", None), 1);
        assert_eq!(cache.service_iid(&a, "Lightbulb", None), 1);
        assert_eq!(cache.service_iid(&a, "Lightbulb", Some("second")), 3);
    }

    #[test]
    fn expiration_drops_untouched_entries_only() {
        let mut cache = IdentifierCache::new();
        let a = id("a");
        let b = id("b");
        cache.aid(&a, false);
        cache.service_iid(&a, "Outlet", None);
        cache.aid(&b, false);
        cache.service_iid(&b, "Switch", None);

        cache.start_tracking_usage();
        cache.aid(&a, false);
        cache.service_iid(&a, "Outlet", None);
        assert_eq!(cache.stop_tracking_usage_and_expire_unused(), 2);

        assert!(cache.contains_accessory(&a));
        assert!(!cache.contains_accessory(&b));
        assert!(!cache.is_tracking());
    }

    #[test]
    fn expired_ids_are_not_reused() {
        let mut cache = IdentifierCache::new();
        cache.aid(&id("gone"), false);
        cache.start_tracking_usage();
        cache.stop_tracking_usage_and_expire_unused();
        assert_eq!(cache.aid(&id("new"), false), 3);
    }

    #[test]
    fn expiration_prunes_counters_of_vanished_accessories() {
        let mut cache = IdentifierCache::new();
        let kept = id("kept");
        let gone = id("gone");
        cache.aid(&kept, false);
        cache.service_iid(&kept, "Outlet", None);
        cache.aid(&gone, false);
        cache.service_iid(&gone, "Switch", None);
        assert_eq!(cache.next_iids.len(), 2);

        cache.start_tracking_usage();
        cache.aid(&kept, false);
        cache.service_iid(&kept, "Outlet", None);
        cache.stop_tracking_usage_and_expire_unused();

        assert!(cache.next_iids.contains_key("kept"));
        assert!(!cache.next_iids.contains_key("gone"));
        let json = serde_json::to_value(&cache).unwrap();
        assert!(json["next_iids"].get("gone").is_none());

        // A returning accessory gets a new aid, never the expired one
        assert_eq!(cache.aid(&gone, false), 4);
    }

    #[test]
    fn stop_without_start_is_noop() {
        let mut cache = IdentifierCache::new();
        cache.aid(&id("a"), false);
        assert_eq!(cache.stop_tracking_usage_and_expire_unused(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ids_for_collects_accessory_entries() {
        let mut cache = IdentifierCache::new();
        let a = id("a");
        cache.aid(&a, false);
        cache.service_iid(&a, "Fan", None);
        cache.aid(&id("ab"), false);
        let mut ids = cache.ids_for(&a);
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn persisted_form_survives_json() {
        let mut cache = IdentifierCache::new();
        cache.aid(&id("a"), false);
        let json = serde_json::to_string(&cache).unwrap();
        let mut back: IdentifierCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back.aid(&id("a"), false), 2);
        assert_eq!(back.aid(&id("b"), false), 3);
    }
}
