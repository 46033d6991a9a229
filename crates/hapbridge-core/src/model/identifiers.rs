// ── Core identity types ──
//
// AccessoryId and Username identify every accessory and every published
// endpoint. Both are plain values, so every index in the crate is keyed by
// them rather than by object identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// ── AccessoryId ─────────────────────────────────────────────────────

/// Globally unique accessory identifier.
///
/// Carried verbatim as supplied by the plugin layer: it participates in
/// username derivation, so it is never re-cased or otherwise normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessoryId(String);

impl AccessoryId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccessoryId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for AccessoryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccessoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Uuid> for AccessoryId {
    fn from(u: Uuid) -> Self {
        Self(u.to_string())
    }
}

// ── Username ────────────────────────────────────────────────────────

/// Network identity of a published endpoint, in upper-case MAC form
/// (`AA:BB:CC:DD:EE:FF`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Length of the canonical `XX:XX:XX:XX:XX:XX` form.
    pub const LEN: usize = 17;

    /// Parse and normalize a username. Accepts colon- or dash-separated
    /// octets in either case.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = raw.as_ref();
        let normalized = raw.trim().to_ascii_uppercase().replace('-', ":");
        let octets: Vec<&str> = normalized.split(':').collect();
        let well_formed = octets.len() == 6
            && octets
                .iter()
                .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));

        if !well_formed {
            return Err(CoreError::validation(
                "username",
                format!("expected six colon-separated hex octets, got '{raw}'"),
            ));
        }
        Ok(Self(normalized))
    }

    /// Build from a string already known to be in canonical form.
    pub(crate) fn from_canonical(canonical: String) -> Self {
        debug_assert_eq!(canonical.len(), Self::LEN);
        Self(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first three octets including their separators (`AA:BB:CC`).
    pub fn prefix(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }

    /// Colon-free form used in storage keys.
    pub fn storage_key(&self) -> String {
        self.0.replace(':', "")
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Username {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Username {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}
