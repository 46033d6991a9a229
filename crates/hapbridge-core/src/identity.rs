// ── External endpoint identity ──
//
// Every external accessory is published under a username derived from the
// bridge's own username and the accessory UUID. The derivation is pure, so
// the credential record and identifier cache of an external endpoint can be
// found again after a restart without storing the mapping anywhere.

use sha1::{Digest, Sha1};

use crate::model::{AccessoryId, Username};

/// Octet layout of a username; `x` marks a hex position.
const TEMPLATE: &str = "xx:xx:xx:xx:xx:xx";

/// Derive the username of an external endpoint.
///
/// The first three octets are taken from `bridge`; the last three are
/// filled from the upper-case hex SHA-1 of `"{bridge}-{uuid}"`.
pub fn derive_username(bridge: &Username, uuid: &AccessoryId) -> Username {
    let mut hasher = Sha1::new();
    hasher.update(bridge.as_str().as_bytes());
    hasher.update(b"-");
    hasher.update(uuid.as_str().as_bytes());
    let digest = hex::encode_upper(hasher.finalize());

    let mut digits = digest.chars();
    let mut derived = String::with_capacity(Username::LEN);
    derived.push_str(bridge.prefix());
    for slot in TEMPLATE.chars().skip(derived.len()) {
        match slot {
            'x' => derived.push(digits.next().unwrap_or('0')),
            other => derived.push(other),
        }
    }

    Username::from_canonical(derived)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bridge() -> Username {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    #[test]
    fn derivation_is_deterministic() {
        let uuid = AccessoryId::from("e1");
        assert_eq!(derive_username(&bridge(), &uuid), derive_username(&bridge(), &uuid));
    }

    #[test]
    fn derived_username_keeps_bridge_prefix() {
        let derived = derive_username(&bridge(), &AccessoryId::from("e1"));
        assert!(derived.as_str().starts_with("AA:BB:CC:"));
        assert_eq!(derived.as_str().len(), Username::LEN);
        // Always a valid username
        assert_eq!(Username::parse(derived.as_str()).unwrap(), derived);
    }

    #[test]
    fn derived_suffix_comes_from_digest() {
        let uuid = AccessoryId::from("e1");
        let digest = hex::encode_upper(Sha1::digest(b"AA:BB:CC:DD:EE:FF-e1"));
        let expected = format!(
            "AA:BB:CC:{}:{}:{}",
            &digest[0..2],
            &digest[2..4],
            &digest[4..6]
        );
        assert_eq!(derive_username(&bridge(), &uuid).as_str(), expected);
    }

    #[test]
    fn different_uuids_yield_different_usernames() {
        let a = derive_username(&bridge(), &AccessoryId::from("e1"));
        let b = derive_username(&bridge(), &AccessoryId::from("e2"));
        assert_ne!(a, b);
    }
}
