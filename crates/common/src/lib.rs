//! Shared types for the resume harvester workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
