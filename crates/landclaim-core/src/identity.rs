//! Identity types for claims, players and sieges

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a claim or subdivision
///
/// Assigned once when the claim first enters the registry and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub i64);

impl ClaimId {
    /// Placeholder carried by candidate claims that were never registered
    pub const UNASSIGNED: ClaimId = ClaimId(-1);

    /// Create a new claim ID
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "claim:{}", self.0)
    }
}

/// Identity of a player (canonical UUID)
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(uuid::Uuid);

impl PlayerId {
    /// Create a fresh random player ID
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse from the canonical hyphenated UUID form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }

    /// Wrap an existing UUID
    pub fn from_uuid(u: uuid::Uuid) -> Self {
        Self(u)
    }

    /// The wrapped UUID
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({})", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<uuid::Uuid> for PlayerId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

/// Identifier for an active or resolved siege
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiegeId(pub u64);

impl fmt::Display for SiegeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "siege:{}", self.0)
    }
}

/// Wall-clock based claim ID generator.
///
/// IDs are milliseconds since the epoch. When the clock has not advanced past
/// the last issued ID the generator forces `last + 1`, so IDs never repeat and
/// never decrease, even across restarts as long as [`ClaimIdGenerator::observe`]
/// is fed every loaded ID.
#[derive(Debug)]
pub struct ClaimIdGenerator {
    last: i64,
}

impl ClaimIdGenerator {
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// Issue the next ID given an explicit millisecond timestamp
    pub fn next_at(&mut self, now_millis: i64) -> ClaimId {
        let id = if now_millis <= self.last {
            self.last + 1
        } else {
            now_millis
        };
        self.last = id;
        ClaimId(id)
    }

    /// Record an ID that already exists so later IDs sort after it
    pub fn observe(&mut self, id: ClaimId) {
        if id.0 > self.last {
            self.last = id.0;
        }
    }
}

impl Default for ClaimIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
