// ── Credential record ──
//
// Pairing and identity metadata for one published endpoint. The record is
// refreshed from live configuration every time it is opened, so persisted
// name/category/PIN never drift from what the bridge is advertising.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Category, Username};

const SETUP_ID_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SETUP_ID_LEN: usize = 4;
const SETUP_PAYLOAD_LEN: usize = 9;
/// Transport flag for IP accessories in the setup payload.
const SETUP_FLAG_IP: u64 = 2;

/// Live configuration a credential record is refreshed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointProfile {
    pub display_name: String,
    pub category: Category,
    pub pincode: String,
}

/// A controller paired with an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedClient {
    /// Hex-encoded long-term public key.
    pub public_key: String,
    #[serde(default)]
    pub admin: bool,
}

/// Persisted credential record (`accessory-info.*.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryInfo {
    pub username: Username,
    pub display_name: String,
    pub category: Category,
    pub pincode: String,
    pub setup_id: String,
    #[serde(default)]
    pub paired_clients: BTreeMap<String, PairedClient>,
    #[serde(default = "default_config_version")]
    pub config_version: u16,
    /// Fingerprint of the last advertised attribute database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

fn default_config_version() -> u16 {
    1
}

impl AccessoryInfo {
    /// A fresh record with a newly generated setup id.
    pub fn create(username: Username, profile: &EndpointProfile) -> Self {
        Self {
            username,
            display_name: profile.display_name.clone(),
            category: profile.category,
            pincode: profile.pincode.clone(),
            setup_id: generate_setup_id(),
            paired_clients: BTreeMap::new(),
            config_version: default_config_version(),
            config_hash: None,
        }
    }

    /// Copy name, category and PIN from live configuration.
    /// Returns whether anything changed.
    pub fn refresh(&mut self, profile: &EndpointProfile) -> bool {
        let changed = self.display_name != profile.display_name
            || self.category != profile.category
            || self.pincode != profile.pincode;
        self.display_name.clone_from(&profile.display_name);
        self.category = profile.category;
        self.pincode.clone_from(&profile.pincode);
        changed
    }

    // ── Pairings ─────────────────────────────────────────────────────

    pub fn add_paired_client(&mut self, client: impl Into<String>, public_key: impl Into<String>, admin: bool) {
        self.paired_clients.insert(
            client.into(),
            PairedClient {
                public_key: public_key.into(),
                admin,
            },
        );
    }

    pub fn remove_paired_client(&mut self, client: &str) -> bool {
        self.paired_clients.remove(client).is_some()
    }

    pub fn is_paired(&self) -> bool {
        !self.paired_clients.is_empty()
    }

    // ── Configuration number ─────────────────────────────────────────

    /// Record the fingerprint of the attribute database about to be
    /// advertised. Bumps the configuration number when it differs from the
    /// last one and returns whether it did.
    pub fn record_configuration(&mut self, fingerprint: &str) -> bool {
        if self.config_hash.as_deref() == Some(fingerprint) {
            return false;
        }
        // The first fingerprint ever recorded describes configuration 1.
        if self.config_hash.is_some() {
            self.config_version = match self.config_version.checked_add(1) {
                Some(next) => next,
                None => 1,
            };
        }
        self.config_hash = Some(fingerprint.to_owned());
        true
    }

    // ── Setup payload ────────────────────────────────────────────────

    /// `X-HM://` setup URI encoding category, PIN and setup id.
    pub fn setup_uri(&self) -> String {
        let pin: u64 = self
            .pincode
            .chars()
            .filter_map(|c| c.to_digit(10))
            .fold(0, |acc, d| acc * 10 + u64::from(d));
        let payload =
            (u64::from(self.category.code()) << 31) | (SETUP_FLAG_IP << 27) | (pin & 0x07FF_FFFF);

        let mut encoded = to_base36(payload);
        while encoded.len() < SETUP_PAYLOAD_LEN {
            encoded.insert(0, '0');
        }
        format!("X-HM://{encoded}{}", self.setup_id)
    }
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while value > 0 {
        // value % 36 < 36, so the index is in range
        #[allow(clippy::cast_possible_truncation)]
        digits.push(SETUP_ID_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

fn generate_setup_id() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(SETUP_ID_LEN)
        .map(|b| char::from(SETUP_ID_ALPHABET[usize::from(*b) % SETUP_ID_ALPHABET.len()]))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn profile() -> EndpointProfile {
        EndpointProfile {
            display_name: "Living Room TV".into(),
            category: Category::Television,
            pincode: "031-45-154".into(),
        }
    }

    fn record() -> AccessoryInfo {
        AccessoryInfo::create("AA:BB:CC:11:22:33".parse().unwrap(), &profile())
    }

    #[test]
    fn setup_id_is_four_alphanumerics() {
        let info = record();
        assert_eq!(info.setup_id.len(), 4);
        assert!(info.setup_id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn refresh_reports_changes() {
        let mut info = record();
        assert!(!info.refresh(&profile()));
        let renamed = EndpointProfile {
            display_name: "Den TV".into(),
            ..profile()
        };
        assert!(info.refresh(&renamed));
        assert_eq!(info.display_name, "Den TV");
    }

    #[test]
    fn pairing_bookkeeping() {
        let mut info = record();
        assert!(!info.is_paired());
        info.add_paired_client("client-1", "abcd", true);
        assert!(info.is_paired());
        assert!(info.remove_paired_client("client-1"));
        assert!(!info.remove_paired_client("client-1"));
        assert!(!info.is_paired());
    }

    #[test]
    fn configuration_number_bumps_on_change_only() {
        let mut info = record();
        assert!(info.record_configuration("h1"));
        assert_eq!(info.config_version, 1);
        assert!(!info.record_configuration("h1"));
        assert!(info.record_configuration("h2"));
        assert_eq!(info.config_version, 2);
    }

    #[test]
    fn configuration_number_wraps_to_one() {
        let mut info = record();
        info.config_hash = Some("old".into());
        info.config_version = u16::MAX;
        info.record_configuration("new");
        assert_eq!(info.config_version, 1);
    }

    #[test]
    fn setup_uri_shape() {
        let mut info = record();
        info.setup_id = "1QJ8".into();
        let uri = info.setup_uri();
        assert!(uri.starts_with("X-HM://"));
        assert!(uri.ends_with("1QJ8"));
        assert_eq!(uri.len(), "X-HM://".len() + 9 + 4);
    }

    #[test]
    fn base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn missing_config_version_defaults_to_one() {
        let json = r#"{
            "username": "AA:BB:CC:11:22:33",
            "display_name": "x",
            "category": "bridge",
            "pincode": "031-45-154",
            "setup_id": "ABCD"
        }"#;
        let info: AccessoryInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.config_version, 1);
        assert!(info.paired_clients.is_empty());
    }
}
