//! Per-token record persisted in the state store.

use crate::error::VerifyError;
use crate::fingerprint::Fingerprints;
use crate::validator::{ValidatorSpec, ValidatorState};
use serde::{Deserialize, Serialize};

/// Key prefix of every record.
pub const KEY_PREFIX: &str = "veritoken.";

/// Store key for `token`.
pub fn record_key(token: &str) -> String {
    format!("{KEY_PREFIX}{token}")
}

/// Ordered validator states bound to one token.
///
/// Serialized as a bare JSON array of [`ValidatorState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenRecord {
    validators: Vec<ValidatorState>,
}

impl TokenRecord {
    /// Binds every active spec, in spec order, against the first request.
    pub fn bind(specs: &[ValidatorSpec], fingerprints: &Fingerprints) -> Self {
        Self {
            validators: specs
                .iter()
                .filter_map(|spec| spec.bind(fingerprints))
                .collect(),
        }
    }

    /// Runs every check in order, stopping at the first failure.
    pub fn check(&mut self, fingerprints: &Fingerprints) -> Result<(), VerifyError> {
        self.validators
            .iter_mut()
            .try_for_each(|state| state.check(fingerprints))
    }

    pub fn validators(&self) -> &[ValidatorState] {
        &self.validators
    }

    /// Whether a successful check changes the record.
    ///
    /// Only the usage budget mutates; records without one are immutable
    /// after bind.
    pub fn has_budget(&self) -> bool {
        self.validators
            .iter()
            .any(|state| matches!(state, ValidatorState::UsageBudget { .. }))
    }

    /// `(count, limit)` of the usage budget, if any.
    pub fn usage(&self) -> Option<(u32, u32)> {
        self.validators.iter().find_map(|state| match state {
            ValidatorState::UsageBudget { count, limit } => Some((*count, *limit)),
            _ => None,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
