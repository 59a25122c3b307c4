//! Error types for the tornado simulation.
//!
//! Spawn requests return these instead of silently doing nothing, so callers
//! (the command interpreter, the storm scheduler, tests) can tell a cooldown
//! rejection apart from a failed build.  Per-tick vortex updates also return
//! [`SimResult`]; the factory logs the error and keeps the other vortices
//! running.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tornado::error::{SimResult, TornadoError};
//!
//! fn validate(p: Vec3) -> SimResult<Vec3> {
//!     if !p.is_finite() {
//!         return Err(TornadoError::InvalidSpawnPosition { x: p.x, y: p.y, z: p.z });
//!     }
//!     Ok(p)
//! }
//! ```

use std::fmt;

use crate::host::HostError;

/// Top-level error enum for the tornado simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum TornadoError {
    /// A spawn was requested at a NaN or infinite coordinate.  Rejected
    /// before any state changes.
    InvalidSpawnPosition { x: f32, y: f32, z: f32 },

    /// The previous spawn completed too recently.
    SpawnCooldown {
        /// Milliseconds until the next spawn will be accepted.
        remaining_ms: u64,
    },

    /// A vortex build is still running.
    SpawnInProgress,

    /// A bounded asset wait ran out of polls.
    AssetTimeout {
        asset: String,
        attempts: u32,
    },

    /// A host call failed in a way that cannot be degraded around.
    Host {
        /// Where the call was made (for logging).
        context: &'static str,
        message: String,
    },

    /// A vortex position stopped being finite mid-simulation.
    NonFinitePosition { context: &'static str },

    /// The configuration file could not be read, parsed or written.
    Config { key: String, message: String },
}

impl TornadoError {
    pub fn host(context: &'static str, err: HostError) -> Self {
        TornadoError::Host {
            context,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for TornadoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TornadoError::InvalidSpawnPosition { x, y, z } => {
                write!(f, "invalid spawn position ({}, {}, {})", x, y, z)
            }
            TornadoError::SpawnCooldown { remaining_ms } => {
                write!(f, "spawn on cooldown for another {} ms", remaining_ms)
            }
            TornadoError::SpawnInProgress => write!(f, "a vortex build is already in progress"),
            TornadoError::AssetTimeout { asset, attempts } => write!(
                f,
                "asset '{}' did not load within {} polls",
                asset, attempts
            ),
            TornadoError::Host { context, message } => {
                write!(f, "host call failed during '{}': {}", context, message)
            }
            TornadoError::NonFinitePosition { context } => {
                write!(f, "vortex position became non-finite during '{}'", context)
            }
            TornadoError::Config { key, message } => {
                write!(f, "configuration error at '{}': {}", key, message)
            }
        }
    }
}

impl std::error::Error for TornadoError {}

/// Convenience alias: a `Result` using `TornadoError` as the error type.
pub type SimResult<T> = Result<T, TornadoError>;
