//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help text
//! and process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use hapbridge_config::ConfigError;
use hapbridge_core::{CoreError, EndpointError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const NETWORK: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Topology ─────────────────────────────────────────────────────
    #[error("Accessory {uuid} is already registered as a {collection} accessory")]
    #[diagnostic(
        code(hapbridge::conflict),
        help("Each accessory uuid may appear once in [[accessories]].")
    )]
    Conflict { uuid: String, collection: String },

    #[error("Accessory {uuid} cannot be admitted: {reason}")]
    #[diagnostic(code(hapbridge::invalid_topology))]
    InvalidTopology { uuid: String, reason: String },

    #[error("{entity} '{identifier}' not found")]
    #[diagnostic(
        code(hapbridge::not_found),
        help("Records are created the first time `hapbridge run` publishes an identity.")
    )]
    NotFound { entity: String, identifier: String },

    // ── Persistence ──────────────────────────────────────────────────
    #[error("Could not persist {key}: {reason}")]
    #[diagnostic(
        code(hapbridge::persistence),
        help("Check that the storage directory exists and is writable.")
    )]
    Persistence { key: String, reason: String },

    // ── Endpoint ─────────────────────────────────────────────────────
    #[error("Endpoint {endpoint} failed")]
    #[diagnostic(code(hapbridge::network))]
    Network {
        endpoint: String,
        #[source]
        source: EndpointError,
    },

    // ── Validation / configuration ───────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hapbridge::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(hapbridge::config),
        help("Run `hapbridge config path` to locate the file, or `hapbridge config init` to create one.")
    )]
    Config { message: String },

    #[error("Could not render output: {0}")]
    #[diagnostic(code(hapbridge::render))]
    Render(String),

    #[error(transparent)]
    #[diagnostic(code(hapbridge::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Network { .. } => exit_code::NETWORK,
            Self::Validation { .. } | Self::Config { .. } => exit_code::USAGE,
            Self::InvalidTopology { .. }
            | Self::Persistence { .. }
            | Self::Render(_)
            | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UniquenessViolation { uuid, collection } => Self::Conflict {
                uuid,
                collection: collection.to_owned(),
            },
            CoreError::InvalidTopology { uuid, reason } => Self::InvalidTopology { uuid, reason },
            CoreError::NotFound { entity, identifier } => Self::NotFound {
                entity: entity.to_owned(),
                identifier,
            },
            CoreError::Persistence { key, reason } => Self::Persistence { key, reason },
            CoreError::Network { endpoint, source } => Self::Network { endpoint, source },
            CoreError::Validation { field, reason } => Self::Validation { field, reason },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let conflict: CliError = CoreError::UniquenessViolation {
            uuid: "a".into(),
            collection: "bridged",
        }
        .into();
        assert_eq!(conflict.exit_code(), exit_code::CONFLICT);

        let missing: CliError = CoreError::NotFound {
            entity: "accessory",
            identifier: "a".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let network: CliError = CoreError::Network {
            endpoint: "primary".into(),
            source: EndpointError::NotRunning,
        }
        .into();
        assert_eq!(network.exit_code(), exit_code::NETWORK);
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err: CliError = ConfigError::Validation {
            field: "pincode".into(),
            reason: "too simple".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
