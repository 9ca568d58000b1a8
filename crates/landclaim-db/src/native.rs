//! native_db backend.
//!
//! Each record kind is a native_model type with its own primary key. Trustee
//! maps and ignore lists are stored as bincode blobs inside the row.

use crate::error::{Error, Result};
use crate::record::ClaimRecord;
use crate::storage::Storage;
use indexmap::IndexMap;
use landclaim_core::{Balances, Claim, ClaimId, PlayerId};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, error};

const SCHEMA_KEY: &str = "schema_version";

/// Stored claim row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct StoredClaim {
    /// Primary key - claim ID.
    #[primary_key]
    pub id: i64,
    pub lesser_boundary_corner: String,
    pub greater_boundary_corner: String,
    pub owner: String,
    /// Serialized trustee map.
    pub trustees: Vec<u8>,
    pub parent_id: i64,
    pub inherit_permissions: bool,
}

impl StoredClaim {
    pub fn from_record(record: &ClaimRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            lesser_boundary_corner: record.lesser_boundary_corner.clone(),
            greater_boundary_corner: record.greater_boundary_corner.clone(),
            owner: record.owner.clone(),
            trustees: bincode::serialize(&record.trustees)?,
            parent_id: record.parent_id,
            inherit_permissions: record.inherit_permissions,
        })
    }

    pub fn to_record(&self) -> Result<ClaimRecord> {
        let trustees = bincode::deserialize(&self.trustees)
            .map_err(|e| Error::corrupt(self.id.to_string(), e))?;
        Ok(ClaimRecord {
            id: self.id,
            lesser_boundary_corner: self.lesser_boundary_corner.clone(),
            greater_boundary_corner: self.greater_boundary_corner.clone(),
            owner: self.owner.clone(),
            trustees,
            parent_id: self.parent_id,
            inherit_permissions: self.inherit_permissions,
        })
    }
}

/// Stored player balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct StoredPlayer {
    /// Primary key - canonical UUID string.
    #[primary_key]
    pub player: String,
    pub accrued: i32,
    pub bonus: i32,
}

/// Stored ignore list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct StoredIgnoreList {
    #[primary_key]
    pub player: String,
    /// Serialized `(uuid, admin_enforced)` pairs.
    pub entries: Vec<u8>,
}

/// Stored group bonus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 4, version = 1)]
#[native_db]
pub struct StoredGroupBonus {
    #[primary_key]
    pub group: String,
    pub amount: i32,
}

/// Stored single-value metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 5, version = 1)]
#[native_db]
pub struct StoredMeta {
    #[primary_key]
    pub key: String,
    pub value: u32,
}

// Static models for the database
static MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models.define::<StoredClaim>().unwrap();
    models.define::<StoredPlayer>().unwrap();
    models.define::<StoredIgnoreList>().unwrap();
    models.define::<StoredGroupBonus>().unwrap();
    models.define::<StoredMeta>().unwrap();
    models
});

/// Embedded database backend.
pub struct NativeDbStorage {
    db: Database<'static>,
}

impl NativeDbStorage {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new()
            .create(&MODELS, path.as_ref())
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }
}

impl Storage for NativeDbStorage {
    fn load_claims(&self) -> Result<Vec<Claim>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredClaim>()?;
        let rows: std::result::Result<Vec<StoredClaim>, _> = scan.all()?.collect();
        let rows = rows.map_err(|e| Error::Database(e.to_string()))?;

        let mut claims = Vec::with_capacity(rows.len());
        for row in rows {
            match row.to_record().and_then(ClaimRecord::into_claim) {
                Ok(claim) => claims.push(claim),
                Err(e) => error!(claim = row.id, error = %e, "skipping unreadable claim row"),
            }
        }
        claims.sort_by_key(|c| c.id);
        debug!(count = claims.len(), "read claim rows");
        Ok(claims)
    }

    fn save_claim(&self, claim: &Claim) -> Result<()> {
        let stored = StoredClaim::from_record(&ClaimRecord::from_claim(claim))?;
        let rw = self.db.rw_transaction()?;
        rw.upsert(stored)?;
        rw.commit()?;
        Ok(())
    }

    fn delete_claim(&self, id: ClaimId) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let stored: Option<StoredClaim> = rw.get().primary(id.raw())?;
        if let Some(s) = stored {
            rw.remove(s)?;
        }
        rw.commit()?;
        Ok(())
    }

    fn load_balances(&self, player: PlayerId) -> Result<Option<Balances>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredPlayer> = r.get().primary(player.to_string())?;
        Ok(stored.map(|s| Balances {
            accrued: s.accrued,
            bonus: s.bonus,
        }))
    }

    fn save_balances(&self, player: PlayerId, balances: &Balances) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredPlayer {
            player: player.to_string(),
            accrued: balances.accrued,
            bonus: balances.bonus,
        })?;
        rw.commit()?;
        Ok(())
    }

    fn load_ignore_list(&self, player: PlayerId) -> Result<IndexMap<PlayerId, bool>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredIgnoreList> = r.get().primary(player.to_string())?;
        let Some(stored) = stored else {
            return Ok(IndexMap::new());
        };
        let entries: Vec<(PlayerId, bool)> = bincode::deserialize(&stored.entries)
            .map_err(|e| Error::corrupt(stored.player.clone(), e))?;
        Ok(entries.into_iter().collect())
    }

    fn save_ignore_list(&self, player: PlayerId, ignored: &IndexMap<PlayerId, bool>) -> Result<()> {
        let entries: Vec<(PlayerId, bool)> = ignored.iter().map(|(id, admin)| (*id, *admin)).collect();
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredIgnoreList {
            player: player.to_string(),
            entries: bincode::serialize(&entries)?,
        })?;
        rw.commit()?;
        Ok(())
    }

    fn load_group_bonuses(&self) -> Result<IndexMap<String, i32>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredGroupBonus>()?;
        let rows: std::result::Result<Vec<StoredGroupBonus>, _> = scan.all()?.collect();
        let rows = rows.map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|g| (g.group, g.amount)).collect())
    }

    fn save_group_bonus(&self, group: &str, amount: i32) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredGroupBonus {
            group: group.to_string(),
            amount,
        })?;
        rw.commit()?;
        Ok(())
    }

    fn schema_version(&self) -> Result<u32> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredMeta> = r.get().primary(SCHEMA_KEY.to_string())?;
        Ok(stored.map(|m| m.value).unwrap_or(0))
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredMeta {
            key: SCHEMA_KEY.to_string(),
            value: version,
        })?;
        rw.commit()?;
        Ok(())
    }
}
