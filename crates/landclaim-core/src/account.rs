//! Per-player accounting record
//!
//! Balances are persisted; the owned-claim list and siege reference are
//! rebuilt in memory and only refer to claims by ID.

use crate::identity::{ClaimId, PlayerId, SiegeId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Persisted part of a player account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Earned by play time
    pub accrued: i32,
    /// Granted by administrators
    pub bonus: i32,
}

/// Claim-block balances, owned claims and chat/siege state for one player
#[derive(Debug, Clone, Default)]
pub struct PlayerAccount {
    pub balances: Balances,
    /// False until balances have been read from storage
    pub loaded: bool,
    /// Owned top-level claims, in registration order
    pub claims: Vec<ClaimId>,
    /// Ignored players; `true` marks an administrator-enforced ignore
    pub ignored: IndexMap<PlayerId, bool>,
    /// Set when the ignore list needs saving
    pub ignore_list_changed: bool,
    pub last_siege_end: Option<DateTime<Utc>>,
    pub siege: Option<SiegeId>,
}

impl PlayerAccount {
    /// A zero-balance account that has not consulted storage yet
    pub fn new() -> Self {
        Self::default()
    }

    /// An account populated from stored balances
    pub fn from_balances(balances: Balances) -> Self {
        Self {
            balances,
            loaded: true,
            ..Self::default()
        }
    }

    /// Attach an owned top-level claim
    pub fn add_claim(&mut self, id: ClaimId) {
        if !self.claims.contains(&id) {
            self.claims.push(id);
        }
    }

    /// Detach an owned claim; returns whether it was listed
    pub fn remove_claim(&mut self, id: ClaimId) -> bool {
        let before = self.claims.len();
        self.claims.retain(|c| *c != id);
        before != self.claims.len()
    }

    pub fn owns(&self, id: ClaimId) -> bool {
        self.claims.contains(&id)
    }

    /// Ignore `other`, optionally enforced by an administrator
    pub fn ignore(&mut self, other: PlayerId, admin_enforced: bool) {
        self.ignored.insert(other, admin_enforced);
        self.ignore_list_changed = true;
    }

    /// Stop ignoring `other`. Administrator-enforced entries stay unless forced.
    pub fn unignore(&mut self, other: PlayerId, force: bool) -> bool {
        match self.ignored.get(&other) {
            Some(true) if !force => false,
            Some(_) => {
                self.ignored.shift_remove(&other);
                self.ignore_list_changed = true;
                true
            }
            None => false,
        }
    }

    pub fn is_ignoring(&self, other: PlayerId) -> bool {
        self.ignored.contains_key(&other)
    }

    /// Blocks left to spend given the group bonus and the total owned area
    pub fn remaining_blocks(&self, group_bonus: i32, claimed_area: i64) -> i64 {
        self.balances.accrued as i64 + self.balances.bonus as i64 + group_bonus as i64 - claimed_area
    }
}
