//! Error model
//!
//! [`VerifyError`] is the closed taxonomy every authorization attempt ends in
//! when it does not succeed. It never escapes the engine as a fault: the
//! engine folds it into a [`crate::Decision`]. [`Error`] covers construction
//! time problems (bad configuration, store initialisation).

use crate::validator::FingerprintKind;
use serde::Serialize;
use thiserror::Error;

/// Why an authorization attempt was denied.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum VerifyError {
    /// No bearer token or session id was presented
    #[error("missing credential")]
    MissingCredential,

    /// A bound fingerprint no longer matches the request
    #[error("{kind} has changed")]
    FingerprintMismatch { kind: FingerprintKind },

    /// The token reached its usage budget
    #[error("token has been used more than {limit} times")]
    BudgetExhausted { limit: u32 },

    /// The state store failed or timed out
    #[error("state store unavailable")]
    StoreUnavailable {
        #[serde(skip)]
        detail: String,
    },

    /// The remote verification service could not be reached
    #[error("failed to reach verification service")]
    ServiceUnreachable {
        #[serde(skip)]
        detail: String,
    },

    /// Concurrent writers kept winning the compare-and-swap race
    #[error("contention")]
    Contention,

    /// Unexpected failure while processing (corrupt record, panic)
    #[error("internal fault")]
    InternalFault {
        #[serde(skip)]
        detail: String,
    },
}

impl VerifyError {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerifyError::StoreUnavailable { .. }
                | VerifyError::ServiceUnreachable { .. }
                | VerifyError::Contention
        )
    }

    /// Short stable label, used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            VerifyError::MissingCredential => "missing_credential",
            VerifyError::FingerprintMismatch { kind } => kind.mismatch_label(),
            VerifyError::BudgetExhausted { .. } => "budget_exhausted",
            VerifyError::StoreUnavailable { .. } => "store_unavailable",
            VerifyError::ServiceUnreachable { .. } => "service_unreachable",
            VerifyError::Contention => "contention",
            VerifyError::InternalFault { .. } => "internal_fault",
        }
    }

    /// Whether this is a legitimate denial rather than an operational problem.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            VerifyError::MissingCredential
                | VerifyError::FingerprintMismatch { .. }
                | VerifyError::BudgetExhausted { .. }
        )
    }

    pub(crate) fn store(err: &veritoken_store::StoreError) -> Self {
        if err.is_unreachable() {
            VerifyError::ServiceUnreachable {
                detail: err.to_string(),
            }
        } else {
            VerifyError::StoreUnavailable {
                detail: err.to_string(),
            }
        }
    }

    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        VerifyError::InternalFault {
            detail: detail.into(),
        }
    }
}

/// Construction-time errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration failed validation; every problem found is listed
    #[error("Invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The state store could not be initialised
    #[error("State store error: {0}")]
    Store(#[from] veritoken_store::StoreError),

    /// Logging could not be installed
    #[error("Observability setup failed: {0}")]
    Observability(String),
}

/// Result alias for construction-time operations
pub type Result<T> = std::result::Result<T, Error>;
