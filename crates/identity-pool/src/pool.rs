//! Identity rotation and token freshness
//!
//! The pool owns every `Identity` and is the only code that writes their
//! token fields. Rotation is strictly round-robin in credential-list order.
//!
//! Auth-failure accounting:
//! - the search API rejecting a token marks the active identity revoked and
//!   rotates once
//! - a revoked identity is re-authorized interactively the next time it
//!   becomes active, whatever its recorded expiry says
//! - more consecutive rejections than twice the pool size, with no successful
//!   fetch in between, exhausts the pool

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use common::Secret;
use harvest_auth::{CredentialEntry, TokenCache};

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::lifecycle::{TokenLifecycle, now_secs};

/// When the pool advances to the next identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Only after the search API rejects the active identity.
    #[default]
    OnFailure,
    /// Before every request, spreading load across all identities.
    PerRequest,
}

/// Credentials for one outgoing request.
#[derive(Debug, Clone)]
pub struct ActiveCredential {
    pub handle: String,
    pub access_token: Secret<String>,
}

/// Ordered set of identities with one active at a time.
pub struct IdentityPool {
    identities: Vec<Identity>,
    active: usize,
    lifecycle: TokenLifecycle,
    cache: Option<TokenCache>,
    rotation: RotationPolicy,
    consecutive_auth_failures: usize,
}

impl IdentityPool {
    /// Build a pool from the credential list. Insertion order is rotation
    /// order; the first entry starts active.
    pub fn new(
        entries: Vec<CredentialEntry>,
        lifecycle: TokenLifecycle,
        rotation: RotationPolicy,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Empty);
        }
        let identities: Vec<Identity> = entries.into_iter().map(Identity::from).collect();
        info!(identities = identities.len(), ?rotation, "identity pool initialized");
        Ok(Self {
            identities,
            active: 0,
            lifecycle,
            cache: None,
            rotation,
            consecutive_auth_failures: 0,
        })
    }

    /// Attach a token cache, restoring any pairs it holds for known handles.
    pub fn with_cache(mut self, cache: TokenCache) -> Self {
        let mut restored = 0usize;
        for identity in &mut self.identities {
            if let Some(cached) = cache.get(identity.handle()) {
                identity.restore(cached);
                restored += 1;
            }
        }
        info!(restored, "restored cached tokens");
        self.cache = Some(cache);
        self
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> &Identity {
        &self.identities[self.active]
    }

    pub fn rotation(&self) -> RotationPolicy {
        self.rotation
    }

    /// Advance to the next identity, wrapping to the first.
    pub fn rotate(&mut self) {
        let from = self.active;
        self.active = (self.active + 1) % self.identities.len();
        metrics::counter!("harvest_identity_rotations_total").increment(1);
        info!(
            from = self.identities[from].handle(),
            to = self.identities[self.active].handle(),
            "rotated active identity"
        );
    }

    /// Interactively authorize every identity that has no token yet.
    ///
    /// Identities restored from the cache are left alone; `ensure_fresh`
    /// renews them when they expire.
    pub async fn bootstrap(&mut self, cancel: &CancellationToken) -> Result<()> {
        let missing: Vec<usize> = (0..self.identities.len())
            .filter(|&i| !self.identities[i].has_token())
            .collect();
        info!(
            total = self.identities.len(),
            missing = missing.len(),
            "bootstrapping identity pool"
        );
        for idx in missing {
            self.lifecycle
                .authorize_interactive(&mut self.identities[idx], cancel)
                .await?;
            metrics::counter!("harvest_reauthorizations_total", "mode" => "bootstrap").increment(1);
            self.persist(idx).await;
        }
        Ok(())
    }

    /// Make sure identity `idx` holds a usable token.
    ///
    /// Revoked identities go straight to interactive re-authorization.
    /// Expired ones try the refresh token first and fall back to the
    /// interactive flow; the identity is never dropped from the pool.
    /// An `idx` outside the pool is `UnknownIdentity`.
    pub async fn ensure_fresh(&mut self, idx: usize, cancel: &CancellationToken) -> Result<()> {
        let identity = self.identity_at(idx)?;
        if identity.is_revoked() {
            return self.force_reauthorize(idx, cancel).await;
        }
        if !identity.is_expired(now_secs()) {
            return Ok(());
        }

        debug!(handle = identity.handle(), "token expired, renewing");
        if identity.refresh_token().is_some() {
            match self.lifecycle.refresh(&mut self.identities[idx]).await {
                Ok(()) => {
                    metrics::counter!("harvest_reauthorizations_total", "mode" => "refresh")
                        .increment(1);
                    self.persist(idx).await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        handle = self.identities[idx].handle(),
                        error = %e,
                        "token refresh failed, falling back to interactive authorization"
                    );
                }
            }
        }

        self.lifecycle
            .authorize_interactive(&mut self.identities[idx], cancel)
            .await?;
        metrics::counter!("harvest_reauthorizations_total", "mode" => "interactive").increment(1);
        self.persist(idx).await;
        Ok(())
    }

    /// Re-run the interactive flow for identity `idx` regardless of expiry.
    pub async fn force_reauthorize(&mut self, idx: usize, cancel: &CancellationToken) -> Result<()> {
        let handle = self.identity_at(idx)?.handle();
        info!(handle, "forcing re-authorization");
        self.lifecycle
            .authorize_interactive(&mut self.identities[idx], cancel)
            .await?;
        metrics::counter!("harvest_reauthorizations_total", "mode" => "forced").increment(1);
        self.persist(idx).await;
        Ok(())
    }

    /// Credentials for the next request.
    ///
    /// Under `PerRequest` rotation this advances the pool first.
    pub async fn authorize(&mut self, cancel: &CancellationToken) -> Result<ActiveCredential> {
        if self.rotation == RotationPolicy::PerRequest {
            self.rotate();
        }
        let idx = self.active;
        self.ensure_fresh(idx, cancel).await?;

        let identity = &self.identities[idx];
        let access_token = identity
            .access_token()
            .ok_or_else(|| Error::NoToken(identity.handle().to_string()))?
            .clone();
        Ok(ActiveCredential {
            handle: identity.handle().to_string(),
            access_token,
        })
    }

    /// The search API rejected the active identity's token.
    ///
    /// Marks it revoked and rotates once (under `PerRequest` the next
    /// `authorize` rotates instead). Returns `PoolExhausted` when no identity
    /// has produced a successful fetch for more than two full cycles.
    pub fn report_auth_failure(&mut self, reason: &str) -> Result<()> {
        let identity = &mut self.identities[self.active];
        identity.revoked = true;
        self.consecutive_auth_failures += 1;
        warn!(
            handle = identity.handle(),
            reason,
            consecutive = self.consecutive_auth_failures,
            "identity rejected by search API"
        );

        let limit = self.identities.len() * 2;
        if self.consecutive_auth_failures > limit {
            return Err(Error::PoolExhausted(format!(
                "{} consecutive authorization failures across {} identities (last: {reason})",
                self.consecutive_auth_failures,
                self.identities.len()
            )));
        }

        if self.rotation == RotationPolicy::OnFailure {
            self.rotate();
        }
        Ok(())
    }

    /// A request using the active identity succeeded.
    pub fn report_success(&mut self) {
        if self.consecutive_auth_failures > 0 {
            debug!(
                cleared = self.consecutive_auth_failures,
                "authorization failure streak cleared"
            );
        }
        self.consecutive_auth_failures = 0;
    }

    fn identity_at(&self, idx: usize) -> Result<&Identity> {
        self.identities.get(idx).ok_or(Error::UnknownIdentity {
            index: idx,
            len: self.identities.len(),
        })
    }

    async fn persist(&mut self, idx: usize) {
        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        let identity = &self.identities[idx];
        let Some(token) = identity.to_cached() else {
            return;
        };
        if let Err(e) = cache.put(identity.handle(), token).await {
            warn!(handle = identity.handle(), error = %e, "failed to persist token");
        }
    }
}
