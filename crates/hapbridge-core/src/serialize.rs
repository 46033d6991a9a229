// ── Attribute database ──
//
// The serialized accessory graph an endpoint advertises. Building it walks
// the accessories against an identifier cache, which assigns (and marks as
// used) every aid/iid it touches.

use serde::Serialize;
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::model::{Accessory, AccessoryId};
use crate::store::IdentifierCache;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicEntry {
    pub iid: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceEntry {
    pub iid: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub characteristics: Vec<CharacteristicEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessoryEntry {
    #[serde(skip)]
    pub uuid: AccessoryId,
    pub aid: u64,
    pub services: Vec<ServiceEntry>,
}

/// Serialized accessory graph of one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeDatabase {
    pub accessories: Vec<AccessoryEntry>,
}

impl AttributeDatabase {
    /// Serialize `accessories` in order. The first one is the endpoint's
    /// primary accessory and receives aid 1.
    pub fn build<'a>(
        accessories: impl IntoIterator<Item = &'a Accessory>,
        cache: &mut IdentifierCache,
    ) -> Self {
        let mut entries = Vec::new();
        for (index, accessory) in accessories.into_iter().enumerate() {
            let uuid = &accessory.uuid;
            let aid = cache.aid(uuid, index == 0);

            let mut services = Vec::with_capacity(accessory.services.len());
            for service in &accessory.services {
                let kind = service.kind.as_str();
                let subtype = service.subtype.as_deref();
                let iid = cache.service_iid(uuid, kind, subtype);

                let mut characteristics = Vec::with_capacity(service.characteristics.len());
                for characteristic in &service.characteristics {
                    characteristics.push(CharacteristicEntry {
                        iid: cache.characteristic_iid(uuid, kind, subtype, &characteristic.kind),
                        kind: characteristic.kind.clone(),
                        value: (!characteristic.value.is_null()).then(|| characteristic.value.clone()),
                    });
                }

                services.push(ServiceEntry {
                    iid,
                    kind: kind.to_owned(),
                    subtype: service.subtype.clone(),
                    characteristics,
                });
            }

            entries.push(AccessoryEntry {
                uuid: uuid.clone(),
                aid,
                services,
            });
        }
        Self { accessories: entries }
    }

    /// SHA-1 over the structure with values left out, so value-only changes
    /// keep the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut stripped = self.clone();
        for accessory in &mut stripped.accessories {
            for service in &mut accessory.services {
                for characteristic in &mut service.characteristics {
                    characteristic.value = None;
                }
            }
        }
        // Plain data with string keys: serialization cannot fail.
        let json = serde_json::to_vec(&stripped).unwrap_or_default();
        hex::encode(Sha1::digest(json))
    }

    pub fn entry_for(&self, uuid: &AccessoryId) -> Option<&AccessoryEntry> {
        self.accessories.iter().find(|entry| &entry.uuid == uuid)
    }

    pub fn len(&self) -> usize {
        self.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Service, ServiceKind};

    fn lamp(uuid: &str, on: bool) -> Accessory {
        Accessory::new(uuid, "Lamp")
            .with_service(Service::new(ServiceKind::Lightbulb).with_characteristic("On", on))
    }

    #[test]
    fn first_accessory_is_primary() {
        let mut cache = IdentifierCache::new();
        let bridge = Accessory::new("bridge", "Bridge");
        let a = lamp("a", false);
        let db = AttributeDatabase::build([&bridge, &a], &mut cache);
        assert_eq!(db.accessories[0].aid, 1);
        assert_eq!(db.accessories[1].aid, 2);
        assert_eq!(db.entry_for(&AccessoryId::from("a")).unwrap().services[0].iid, 1);
    }

    #[test]
    fn serializing_twice_assigns_identical_ids() {
        let mut cache = IdentifierCache::new();
        let bridge = Accessory::new("bridge", "Bridge");
        let a = lamp("a", false);
        let first = AttributeDatabase::build([&bridge, &a], &mut cache);
        let second = AttributeDatabase::build([&bridge, &a], &mut cache);
        assert_eq!(first, second);
    }

    #[test]
    fn fingerprint_ignores_values() {
        let mut cache = IdentifierCache::new();
        let off = AttributeDatabase::build([&lamp("a", false)], &mut cache);
        let on = AttributeDatabase::build([&lamp("a", true)], &mut cache);
        assert_ne!(off, on);
        assert_eq!(off.fingerprint(), on.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_structure() {
        let mut cache = IdentifierCache::new();
        let bridge = Accessory::new("bridge", "Bridge");
        let one = AttributeDatabase::build([&bridge], &mut cache);
        let two = AttributeDatabase::build([&bridge, &lamp("a", false)], &mut cache);
        assert_ne!(one.fingerprint(), two.fingerprint());
    }
}
