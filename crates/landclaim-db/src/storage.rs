//! Persistence capability shared by every backend.

use crate::error::Result;
use indexmap::IndexMap;
use landclaim_core::{Balances, Claim, ClaimId, PlayerId};

/// Schema version written by this crate.
pub const LATEST_SCHEMA_VERSION: u32 = 3;

/// Claim and player-account persistence.
///
/// Implementations must be callable from a background writer thread while the
/// registry keeps reading on its own thread.
pub trait Storage: Send + Sync {
    /// Every readable claim record, sorted by ID.
    ///
    /// Unreadable records are logged and skipped, never returned as errors.
    /// Subdivisions come back detached with only `parent` set.
    fn load_claims(&self) -> Result<Vec<Claim>>;

    /// Write (or overwrite) one claim record.
    fn save_claim(&self, claim: &Claim) -> Result<()>;

    /// Remove one claim record. Missing records are not an error.
    fn delete_claim(&self, id: ClaimId) -> Result<()>;

    /// Stored balances, or `None` if the player has no record yet.
    fn load_balances(&self, player: PlayerId) -> Result<Option<Balances>>;

    fn save_balances(&self, player: PlayerId, balances: &Balances) -> Result<()>;

    /// Ignored players, `true` marking administrator-enforced entries.
    fn load_ignore_list(&self, player: PlayerId) -> Result<IndexMap<PlayerId, bool>>;

    fn save_ignore_list(&self, player: PlayerId, ignored: &IndexMap<PlayerId, bool>) -> Result<()>;

    /// Bonus blocks for every permission group with a stored total.
    fn load_group_bonuses(&self) -> Result<IndexMap<String, i32>>;

    fn save_group_bonus(&self, group: &str, amount: i32) -> Result<()>;

    /// Stored schema version; 0 when none has been written.
    fn schema_version(&self) -> Result<u32>;

    fn set_schema_version(&self, version: u32) -> Result<()>;
}
