//! Player account cache
//!
//! Accounts are created on first touch with zero balances and an owned-claim
//! list derived from the claim tree. Stored balances are only read the first
//! time something needs them. Every mutation queues a save before returning.

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use indexmap::IndexMap;
use landclaim_core::{ClaimStore, PlayerAccount, PlayerId};
use landclaim_db::{Storage, WriteBack};
use std::sync::Arc;
use tracing::{debug, error};

/// In-memory accounts keyed by player
pub struct AccountCache {
    accounts: DashMap<PlayerId, PlayerAccount>,
    group_bonuses: DashMap<String, i32>,
    storage: Arc<dyn Storage>,
    writer: Arc<WriteBack>,
}

impl AccountCache {
    pub(crate) fn new(
        storage: Arc<dyn Storage>,
        writer: Arc<WriteBack>,
        group_bonuses: IndexMap<String, i32>,
    ) -> Self {
        Self {
            accounts: DashMap::new(),
            group_bonuses: group_bonuses.into_iter().collect(),
            storage,
            writer,
        }
    }

    /// The cached account, created if absent. Does not read storage.
    pub(crate) fn entry<'a>(
        &'a self,
        player: PlayerId,
        claims: &ClaimStore,
    ) -> RefMut<'a, PlayerId, PlayerAccount> {
        self.accounts.entry(player).or_insert_with(|| {
            let mut account = PlayerAccount::new();
            account.claims = claims
                .top_level()
                .iter()
                .filter(|id| claims.get(**id).and_then(|c| c.owner) == Some(player))
                .copied()
                .collect();
            account
        })
    }

    /// The cached account with stored balances and ignore list applied.
    pub(crate) fn loaded_entry<'a>(
        &'a self,
        player: PlayerId,
        claims: &ClaimStore,
    ) -> RefMut<'a, PlayerId, PlayerAccount> {
        let mut account = self.entry(player, claims);
        if !account.loaded {
            self.load_into(player, &mut account);
        }
        account
    }

    fn load_into(&self, player: PlayerId, account: &mut PlayerAccount) {
        match self.storage.load_balances(player) {
            Ok(Some(balances)) => account.balances = balances,
            Ok(None) => debug!(player = %player, "no stored account, starting at zero"),
            Err(e) => error!(player = %player, error = %e, "failed to load account, starting at zero"),
        }
        match self.storage.load_ignore_list(player) {
            Ok(ignored) => {
                for (id, admin) in ignored {
                    account.ignored.entry(id).or_insert(admin);
                }
            }
            Err(e) => error!(player = %player, error = %e, "failed to load ignore list"),
        }
        account.loaded = true;
    }

    /// Queue a save of balances, plus the ignore list if it changed
    pub(crate) fn save(&self, player: PlayerId, account: &mut PlayerAccount) {
        if !account.loaded {
            // Never overwrite stored balances with unloaded zeros
            self.load_into(player, account);
        }
        self.writer.save_balances(player, account.balances);
        if account.ignore_list_changed {
            self.writer.save_ignore_list(player, account.ignored.clone());
            account.ignore_list_changed = false;
        }
    }

    /// A copy of the cached account, if any
    pub fn cached(&self, player: PlayerId) -> Option<PlayerAccount> {
        self.accounts.get(&player).map(|a| a.clone())
    }

    pub fn is_cached(&self, player: PlayerId) -> bool {
        self.accounts.contains_key(&player)
    }

    /// Evict from memory without touching storage
    pub fn clear(&self, player: PlayerId) {
        self.accounts.remove(&player);
    }

    pub fn group_bonus(&self, group: &str) -> i32 {
        self.group_bonuses.get(group).map(|b| *b).unwrap_or(0)
    }

    /// Add to a group's bonus and persist the new total
    pub fn adjust_group_bonus(&self, group: &str, amount: i32) -> i32 {
        let total = {
            let mut entry = self.group_bonuses.entry(group.to_string()).or_insert(0);
            *entry += amount;
            *entry
        };
        self.writer.save_group_bonus(group, total);
        total
    }

    /// Snapshot of every group with a bonus
    pub fn group_bonuses(&self) -> Vec<(String, i32)> {
        self.group_bonuses
            .iter()
            .map(|g| (g.key().clone(), *g.value()))
            .collect()
    }
}
