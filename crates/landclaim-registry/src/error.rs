//! Error types for landclaim-registry

use landclaim_core::{ClaimId, SiegeId};
use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in registry operations
#[derive(Debug, Error)]
pub enum Error {
    /// The candidate boundary intersects a sibling claim
    #[error("boundary overlaps {conflicting}")]
    Overlap {
        /// The existing sibling that was hit
        conflicting: ClaimId,
    },

    /// The external region guard refused the boundary
    #[error("region guard denied the boundary")]
    RegionDenied,

    /// A creation listener cancelled the claim
    #[error("claim creation was cancelled by a listener")]
    CreationVetoed,

    /// Only top-level claims change hands
    #[error("{0} is a subdivision and cannot be transferred")]
    NotTransferable(ClaimId),

    #[error("{0} not found")]
    ClaimNotFound(ClaimId),

    /// A subdivision must sit entirely inside its parent
    #[error("subdivision boundary lies outside {0}")]
    OutsideParent(ClaimId),

    /// Corners (or parent and child) are in different worlds
    #[error("world mismatch: {0} vs {1}")]
    WorldMismatch(String, String),

    /// Subdivisions cannot contain subdivisions
    #[error("{0} is already a subdivision")]
    NestedSubdivision(ClaimId),

    #[error("{0} already exists")]
    DuplicateId(ClaimId),

    #[error("{0} not found")]
    SiegeNotFound(SiegeId),

    /// Neither a winner nor a loser was supplied
    #[error("siege end needs a winner or a loser")]
    SiegeOutcomeUnknown,

    /// The player is already in a siege, or the claim is
    #[error("siege cannot start: {0}")]
    SiegeUnavailable(&'static str),

    /// Rescue requested where the player is free to move
    #[error("player is not trapped")]
    NotTrapped,

    /// Rescue refused inside an administrative claim
    #[error("rescue is not available here")]
    RescueUnavailable,

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] landclaim_db::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] landclaim_core::Error),
}

impl Error {
    /// The sibling claim blocking a create or resize, if that was the cause
    pub fn conflicting_claim(&self) -> Option<ClaimId> {
        match self {
            Error::Overlap { conflicting } => Some(*conflicting),
            _ => None,
        }
    }
}
