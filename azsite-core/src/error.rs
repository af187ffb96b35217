//! Error types for argument validation, registration and deferred outputs

use std::sync::Arc;

use thiserror::Error;

use crate::provider::ProviderError;
use crate::schema::TypeError;

/// Errors raised synchronously while constructing or registering a resource
#[derive(Debug, Error)]
pub enum Error {
    /// A required field is absent or a locally-checkable constraint is violated
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Contradictory resource options
    #[error("Invalid resource options: {0}")]
    Configuration(String),

    /// The same resource identity was registered twice in one run
    #[error("Resource {urn} was already registered in this run")]
    DuplicateResource { urn: String },

    /// The orchestrator could not be reached or answered with garbage
    #[error("Engine communication failed: {0}")]
    EngineCommunication(#[from] MonitorError),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Argument validation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required property '{0}'")]
    MissingRequired(String),

    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Schema(Vec<TypeError>),
}

impl From<Vec<TypeError>> for ValidationError {
    fn from(errors: Vec<TypeError>) -> Self {
        // A lone missing-required error keeps its dedicated variant
        match errors.as_slice() {
            [TypeError::MissingRequired { name }] => Self::MissingRequired(name.clone()),
            _ => Self::Schema(errors),
        }
    }
}

/// Failures talking to the orchestration engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitorError {
    #[error("Orchestrator unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed acknowledgement: {0}")]
    MalformedAck(String),
}

/// Failures observed when reading a deferred output
#[derive(Debug, Clone, Error)]
pub enum OutputError {
    /// The provider failed to converge the resource
    #[error("Resource {urn} failed to converge: {error}")]
    Convergence {
        urn: String,
        error: Arc<ProviderError>,
    },

    /// The resolver went away without ever resolving
    #[error("Resource {urn} was abandoned before its outputs resolved")]
    Abandoned { urn: String },

    /// The value is not known yet (e.g., during a preview)
    #[error("Output of {urn} is unknown during {phase}")]
    Unknown { urn: String, phase: String },

    /// The provider reported outputs that do not match the output model
    #[error("Output '{name}' of {urn} is missing or malformed")]
    Malformed { urn: String, name: String },
}

impl OutputError {
    pub fn convergence(urn: impl Into<String>, error: ProviderError) -> Self {
        Self::Convergence {
            urn: urn.into(),
            error: Arc::new(error),
        }
    }
}
