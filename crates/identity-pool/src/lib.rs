//! Rotating pool of harvester identities
//!
//! Owns every identity's token state and hands the fetch loop a bearer token
//! for each request. Tokens come from the OAuth collaborators in
//! `harvest-auth`; this crate only decides when to refresh, when to ask a
//! human, and which identity is active.
//!
//! Identity lifecycle:
//! 1. Loaded from the credential list, token restored from cache if present
//! 2. `bootstrap` authorizes every identity still without a token
//! 3. `authorize` refreshes expired tokens before handing one out
//! 4. A rejected token marks the identity revoked and rotates the pool
//! 5. The revoked identity is re-authorized when it becomes active again

pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod pool;

pub use error::{Error, Result};
pub use identity::Identity;
pub use lifecycle::TokenLifecycle;
pub use pool::{ActiveCredential, IdentityPool, RotationPolicy};
