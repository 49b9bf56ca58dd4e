//! Verification engine
//!
//! Two states per token: `Unbound` (no record) and `Bound` (record exists).
//! The first request presenting a token binds it; every later request is
//! checked against the bound record. Any failed check deletes the record.
//!
//! Every mutation is a `compare_and_swap` against the version that was read,
//! so concurrent requests on one token never lose a usage-budget increment.
//! A lost race restarts the whole load, check, write cycle.
//!
//! Revocation is version-guarded as well: a request that failed its check
//! against an old record only deletes that record, never one another request
//! rebound in the meantime.

use crate::error::VerifyError;
use crate::fingerprint::Fingerprints;
use crate::metrics;
use crate::record::{TokenRecord, record_key};
use crate::validator::ValidatorSpec;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use veritoken_store::{StateStore, StoreError, StoreResult};

/// Sliding idle expiry of a record.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(3600);
/// Stores keep expiry in whole seconds.
pub const MIN_RECORD_TTL: Duration = Duration::from_secs(1);
/// Bound on load, check, write cycles per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Per store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(2000);

pub const MSG_NEW_TOKEN: &str = "new token accepted";
pub const MSG_TOKEN_VALID: &str = "token valid";

/// Outcome of one authorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failed => "failed",
        }
    }
}

/// Result of [`Engine::authorize`], attached to the request for downstream
/// handlers. Serializes as `{"status": .., "message": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub status: Status,
    pub message: String,
    #[serde(skip)]
    error: Option<VerifyError>,
}

impl Decision {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(error: VerifyError) -> Self {
        Self {
            status: Status::Failed,
            message: error.to_string(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// The typed reason of a failed decision.
    pub fn error(&self) -> Option<&VerifyError> {
        self.error.as_ref()
    }
}

/// Loggable stand-in for a token: first 4 characters plus length.
pub fn token_hint(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}..({})", token.chars().count())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accepted {
    Bound,
    Valid,
}

impl Accepted {
    fn message(self) -> &'static str {
        match self {
            Accepted::Bound => MSG_NEW_TOKEN,
            Accepted::Valid => MSG_TOKEN_VALID,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Accepted::Bound => "bound",
            Accepted::Valid => "valid",
        }
    }
}

enum Attempt {
    Done(Accepted),
    /// Another writer changed the record between read and write
    Conflict,
}

/// Bind-then-verify engine over a shared [`StateStore`].
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn StateStore>,
    specs: Arc<[ValidatorSpec]>,
    ttl: Duration,
    max_attempts: u32,
    store_timeout: Duration,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.store.backend_name())
            .field("specs", &self.specs)
            .field("ttl", &self.ttl)
            .field("max_attempts", &self.max_attempts)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl Engine {
    pub fn new(store: Arc<dyn StateStore>, specs: impl Into<Arc<[ValidatorSpec]>>) -> Self {
        Self {
            store,
            specs: specs.into(),
            ttl: DEFAULT_RECORD_TTL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Values below [`MIN_RECORD_TTL`] are raised to it.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl.max(MIN_RECORD_TTL);
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn specs(&self) -> &[ValidatorSpec] {
        &self.specs
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Authorizes one request presenting `token`.
    ///
    /// Never fails: every error is folded into a failed [`Decision`].
    pub async fn authorize(&self, token: &str, fingerprints: &Fingerprints) -> Decision {
        let timer = metrics::AuthorizeTimer::start();

        let decision = match self.run(token, fingerprints).await {
            Ok(accepted) => {
                metrics::record_decision(Status::Success.as_str(), accepted.label());
                Decision::success(accepted.message())
            }
            Err(err) => {
                metrics::record_decision(Status::Failed.as_str(), err.label());
                Decision::failed(err)
            }
        };

        timer.observe();
        decision
    }

    async fn run(&self, token: &str, fingerprints: &Fingerprints) -> Result<Accepted, VerifyError> {
        if token.is_empty() {
            debug!("Request carries no credential");
            return Err(VerifyError::MissingCredential);
        }

        let key = record_key(token);
        let hint = token_hint(token);

        for attempt in 1..=self.max_attempts {
            match self.attempt(&key, &hint, fingerprints).await? {
                Attempt::Done(accepted) => return Ok(accepted),
                Attempt::Conflict => {
                    debug!(token = %hint, attempt, "Record changed concurrently, retrying");
                }
            }
        }

        warn!(
            token = %hint,
            attempts = self.max_attempts,
            "Giving up after repeated write conflicts"
        );
        Err(VerifyError::Contention)
    }

    async fn attempt(
        &self,
        key: &str,
        hint: &str,
        fingerprints: &Fingerprints,
    ) -> Result<Attempt, VerifyError> {
        let Some(current) = self.call("get", self.store.get(key)).await? else {
            return self.bind(key, hint, fingerprints).await;
        };

        let mut record = match TokenRecord::from_bytes(&current.value) {
            Ok(record) => record,
            Err(e) => {
                error!(token = %hint, error = %e, "Stored record is corrupt, revoking");
                self.revoke(key, hint, current.version).await;
                return Err(VerifyError::internal(format!("corrupt record: {e}")));
            }
        };

        if let Err(err) = record.check(fingerprints) {
            warn!(token = %hint, reason = %err, "Token check failed, revoking");
            self.revoke(key, hint, current.version).await;
            return Err(err);
        }

        let written = if record.has_budget() {
            let bytes = encode(&record)?;
            self.call(
                "compare_and_swap",
                self.store
                    .compare_and_swap(key, Some(current.version), &bytes, self.ttl),
            )
            .await?
        } else {
            // Immutable after bind: only slide the expiry
            self.call("expire", self.store.expire(key, self.ttl)).await?
        };

        if !written {
            return Ok(Attempt::Conflict);
        }

        debug!(token = %hint, usage = ?record.usage(), "Token valid");
        Ok(Attempt::Done(Accepted::Valid))
    }

    async fn bind(
        &self,
        key: &str,
        hint: &str,
        fingerprints: &Fingerprints,
    ) -> Result<Attempt, VerifyError> {
        let record = TokenRecord::bind(&self.specs, fingerprints);
        let bytes = encode(&record)?;

        let created = self
            .call(
                "compare_and_swap",
                self.store.compare_and_swap(key, None, &bytes, self.ttl),
            )
            .await?;
        if !created {
            return Ok(Attempt::Conflict);
        }

        info!(
            token = %hint,
            validators = record.validators().len(),
            "Bound new token"
        );
        Ok(Attempt::Done(Accepted::Bound))
    }

    /// Deletes the record that failed its check, if it is still `version`.
    /// A failing delete is logged and does not change the decision.
    async fn revoke(&self, key: &str, hint: &str, version: u64) {
        match self
            .call(
                "compare_and_delete",
                self.store.compare_and_delete(key, version),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(token = %hint, "Record already replaced, nothing to revoke"),
            Err(err) => error!(token = %hint, error = %err, "Failed to revoke token record"),
        }
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> Result<T, VerifyError> {
        let err = match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => StoreError::Timeout(self.store_timeout.as_millis() as u64),
        };

        error!(
            operation,
            backend = self.store.backend_name(),
            error = %err,
            "State store call failed"
        );
        metrics::record_store_error(operation);
        Err(VerifyError::store(&err))
    }
}

fn encode(record: &TokenRecord) -> Result<Vec<u8>, VerifyError> {
    record
        .to_bytes()
        .map_err(|e| VerifyError::internal(format!("failed to encode record: {e}")))
}
