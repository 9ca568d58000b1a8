//! In-memory backend for tests and embedding.
//!
//! Claims are kept as [`ClaimRecord`]s so loading goes through the same
//! conversion as the durable backends.

use crate::error::Result;
use crate::record::ClaimRecord;
use crate::storage::Storage;
use dashmap::DashMap;
use indexmap::IndexMap;
use landclaim_core::{Balances, Claim, ClaimId, PlayerId};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Volatile storage backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    claims: DashMap<ClaimId, ClaimRecord>,
    players: DashMap<PlayerId, Balances>,
    ignore_lists: DashMap<PlayerId, IndexMap<PlayerId, bool>>,
    groups: DashMap<String, i32>,
    schema_version: AtomicU32,
    claim_writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a stored schema version, as if written by an older release.
    pub fn with_schema_version(version: u32) -> Self {
        let storage = Self::new();
        storage.schema_version.store(version, Ordering::SeqCst);
        storage
    }

    /// The stored record for a claim, if any.
    pub fn claim_record(&self, id: ClaimId) -> Option<ClaimRecord> {
        self.claims.get(&id).map(|r| r.clone())
    }

    /// Insert a raw record without going through a claim.
    pub fn insert_record(&self, record: ClaimRecord) {
        self.claims.insert(ClaimId(record.id), record);
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    /// Number of claim writes performed so far.
    pub fn claim_writes(&self) -> usize {
        self.claim_writes.load(Ordering::SeqCst)
    }
}

impl Storage for MemoryStorage {
    fn load_claims(&self) -> Result<Vec<Claim>> {
        let mut claims = Vec::with_capacity(self.claims.len());
        for entry in self.claims.iter() {
            match entry.value().clone().into_claim() {
                Ok(claim) => claims.push(claim),
                Err(e) => tracing::error!(claim = entry.key().raw(), error = %e, "skipping unreadable claim record"),
            }
        }
        claims.sort_by_key(|c| c.id);
        Ok(claims)
    }

    fn save_claim(&self, claim: &Claim) -> Result<()> {
        self.claims.insert(claim.id, ClaimRecord::from_claim(claim));
        self.claim_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_claim(&self, id: ClaimId) -> Result<()> {
        self.claims.remove(&id);
        Ok(())
    }

    fn load_balances(&self, player: PlayerId) -> Result<Option<Balances>> {
        Ok(self.players.get(&player).map(|b| *b))
    }

    fn save_balances(&self, player: PlayerId, balances: &Balances) -> Result<()> {
        self.players.insert(player, *balances);
        Ok(())
    }

    fn load_ignore_list(&self, player: PlayerId) -> Result<IndexMap<PlayerId, bool>> {
        Ok(self
            .ignore_lists
            .get(&player)
            .map(|l| l.clone())
            .unwrap_or_default())
    }

    fn save_ignore_list(&self, player: PlayerId, ignored: &IndexMap<PlayerId, bool>) -> Result<()> {
        self.ignore_lists.insert(player, ignored.clone());
        Ok(())
    }

    fn load_group_bonuses(&self) -> Result<IndexMap<String, i32>> {
        Ok(self
            .groups
            .iter()
            .map(|g| (g.key().clone(), *g.value()))
            .collect())
    }

    fn save_group_bonus(&self, group: &str, amount: i32) -> Result<()> {
        self.groups.insert(group.to_string(), amount);
        Ok(())
    }

    fn schema_version(&self) -> Result<u32> {
        Ok(self.schema_version.load(Ordering::SeqCst))
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        self.schema_version.store(version, Ordering::SeqCst);
        Ok(())
    }
}
