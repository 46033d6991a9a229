// ── Core error types ──
//
// User-facing errors from hapbridge-core. Callers never see io or serde
// errors directly: the identity store translates them into `Persistence`,
// and endpoint server failures are wrapped into `Network`.

use std::fmt;

use thiserror::Error;

use crate::endpoint::{EndpointError, EndpointId};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Topology errors ──────────────────────────────────────────────
    #[error("Accessory {uuid} is already registered as a {collection} accessory")]
    UniquenessViolation {
        uuid: String,
        collection: &'static str,
    },

    #[error("Accessory {uuid} cannot be admitted: {reason}")]
    InvalidTopology { uuid: String, reason: String },

    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Persistence failure for {key}: {reason}")]
    Persistence { key: String, reason: String },

    // ── Endpoint errors ──────────────────────────────────────────────
    #[error("Endpoint {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: EndpointError,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },
}

impl CoreError {
    pub(crate) fn persistence(key: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Persistence {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn network(endpoint: &EndpointId, source: EndpointError) -> Self {
        Self::Network {
            endpoint: endpoint.to_string(),
            source,
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
