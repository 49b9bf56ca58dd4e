//! Validator model
//!
//! A [`ValidatorSpec`] is deployment configuration and is never mutated.
//! Binding a spec against the fingerprints of a token's first request yields
//! a fresh [`ValidatorState`], which is what gets persisted and checked on
//! every later request.

use crate::error::VerifyError;
use crate::fingerprint::Fingerprints;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Usage budget applied when a `usage-budget` spec omits its limit.
pub const DEFAULT_USAGE_LIMIT: u32 = 50;

/// Checkable validator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidatorKind {
    /// Client IP address
    Ip,
    /// Device signature (User-Agent)
    Device,
    /// Anti-forgery token header
    Csrf,
    /// Cap on accepted uses of the token
    UsageBudget,
}

impl ValidatorKind {
    /// The request fingerprint this kind compares, if any.
    pub fn fingerprint(self) -> Option<FingerprintKind> {
        match self {
            ValidatorKind::Ip => Some(FingerprintKind::Ip),
            ValidatorKind::Device => Some(FingerprintKind::Device),
            ValidatorKind::Csrf => Some(FingerprintKind::Csrf),
            ValidatorKind::UsageBudget => None,
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorKind::Ip => "ip",
            ValidatorKind::Device => "device",
            ValidatorKind::Csrf => "csrf",
            ValidatorKind::UsageBudget => "usage-budget",
        };
        f.write_str(name)
    }
}

/// Request-derived values a token can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintKind {
    Ip,
    Device,
    Csrf,
}

impl FingerprintKind {
    pub(crate) fn mismatch_label(self) -> &'static str {
        match self {
            FingerprintKind::Ip => "ip_changed",
            FingerprintKind::Device => "device_changed",
            FingerprintKind::Csrf => "csrf_changed",
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FingerprintKind::Ip => "IP address",
            FingerprintKind::Device => "device signature",
            FingerprintKind::Csrf => "anti-forgery token",
        };
        f.write_str(name)
    }
}

/// One configured validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSpec {
    pub kind: ValidatorKind,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Only meaningful for `usage-budget`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl ValidatorSpec {
    pub fn new(kind: ValidatorKind) -> Self {
        Self {
            kind,
            enabled: true,
            limit: None,
        }
    }

    pub fn ip() -> Self {
        Self::new(ValidatorKind::Ip)
    }

    pub fn device() -> Self {
        Self::new(ValidatorKind::Device)
    }

    pub fn csrf() -> Self {
        Self::new(ValidatorKind::Csrf)
    }

    pub fn usage_budget(limit: u32) -> Self {
        Self {
            kind: ValidatorKind::UsageBudget,
            enabled: true,
            limit: Some(limit),
        }
    }

    /// Same spec with `enabled = false`.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this spec takes part in bind and check.
    ///
    /// The usage budget ignores its `enabled` flag and is always active.
    pub fn is_active(&self) -> bool {
        self.enabled || self.kind == ValidatorKind::UsageBudget
    }

    /// Creates the per-token state for a token seen for the first time.
    ///
    /// Returns `None` for inactive specs. A fingerprint that could not be
    /// extracted binds as empty, which is never enforced later.
    pub fn bind(&self, fingerprints: &Fingerprints) -> Option<ValidatorState> {
        if !self.is_active() {
            return None;
        }

        let state = match self.kind {
            ValidatorKind::Ip => ValidatorState::Ip {
                bound: fingerprints.client_ip.clone(),
            },
            ValidatorKind::Device => ValidatorState::Device {
                bound: fingerprints.device.clone(),
            },
            ValidatorKind::Csrf => ValidatorState::Csrf {
                bound: fingerprints.csrf.clone(),
            },
            ValidatorKind::UsageBudget => ValidatorState::UsageBudget {
                count: 1,
                limit: self.limit.unwrap_or(DEFAULT_USAGE_LIMIT),
            },
        };
        Some(state)
    }
}

/// Persisted, per-token instance of a [`ValidatorSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValidatorState {
    Ip {
        #[serde(default)]
        bound: String,
    },
    Device {
        #[serde(default)]
        bound: String,
    },
    Csrf {
        #[serde(default)]
        bound: String,
    },
    UsageBudget {
        count: u32,
        limit: u32,
    },
}

impl ValidatorState {
    pub fn kind(&self) -> ValidatorKind {
        match self {
            ValidatorState::Ip { .. } => ValidatorKind::Ip,
            ValidatorState::Device { .. } => ValidatorKind::Device,
            ValidatorState::Csrf { .. } => ValidatorKind::Csrf,
            ValidatorState::UsageBudget { .. } => ValidatorKind::UsageBudget,
        }
    }

    /// The value bound at first use; `None` for the usage budget.
    pub fn bound_value(&self) -> Option<&str> {
        match self {
            ValidatorState::Ip { bound }
            | ValidatorState::Device { bound }
            | ValidatorState::Csrf { bound } => Some(bound),
            ValidatorState::UsageBudget { .. } => None,
        }
    }

    /// Checks the current request against this state.
    ///
    /// Bound values are only compared. The usage budget increments its count
    /// on success and is left untouched on failure.
    pub fn check(&mut self, fingerprints: &Fingerprints) -> Result<(), VerifyError> {
        match self {
            ValidatorState::UsageBudget { count, limit } => {
                if count.saturating_add(1) > *limit {
                    return Err(VerifyError::BudgetExhausted { limit: *limit });
                }
                *count += 1;
                Ok(())
            }
            _ => {
                let Some(kind) = self.kind().fingerprint() else {
                    return Ok(());
                };
                let bound = self.bound_value().unwrap_or_default();
                if bound.is_empty() || bound == fingerprints.get(kind) {
                    Ok(())
                } else {
                    Err(VerifyError::FingerprintMismatch { kind })
                }
            }
        }
    }
}
