//! Backend-neutral claim record.
//!
//! Corners are stored as `world;x;y;z` strings, the owner as a canonical UUID
//! string (empty for administrative claims) and trustees as identity string to
//! permission name. Both the flat-file and native_db backends persist this
//! shape.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use landclaim_core::{Bounds, Claim, ClaimId, ClaimPermission, Location, PlayerId, Trustee};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Parent ID written for top-level claims.
pub const NO_PARENT: i64 = -1;

/// Serialized form of a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id: i64,
    pub lesser_boundary_corner: String,
    pub greater_boundary_corner: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub trustees: IndexMap<String, String>,
    #[serde(default = "default_parent_id")]
    pub parent_id: i64,
    #[serde(default = "default_inherit")]
    pub inherit_permissions: bool,
}

fn default_parent_id() -> i64 {
    NO_PARENT
}

fn default_inherit() -> bool {
    true
}

impl ClaimRecord {
    /// Capture the persistent fields of a claim.
    pub fn from_claim(claim: &Claim) -> Self {
        Self {
            id: claim.id.raw(),
            lesser_boundary_corner: claim.lesser_corner().to_string(),
            greater_boundary_corner: claim.greater_corner().to_string(),
            owner: claim.owner.map(|o| o.to_string()).unwrap_or_default(),
            trustees: claim
                .trustees
                .iter()
                .map(|(t, p)| (t.to_string(), p.to_string()))
                .collect(),
            parent_id: claim.parent.map(|p| p.raw()).unwrap_or(NO_PARENT),
            inherit_permissions: claim.inherit_permissions,
        }
    }

    /// Rebuild a detached claim.
    ///
    /// Bad corners are fatal for the record. An unreadable owner turns the
    /// claim administrative and unreadable trustee entries are dropped; both
    /// are logged.
    pub fn into_claim(self) -> Result<Claim> {
        let name = self.id.to_string();
        let lesser: Location = self
            .lesser_boundary_corner
            .parse()
            .map_err(|e| Error::corrupt(&name, e))?;
        let greater: Location = self
            .greater_boundary_corner
            .parse()
            .map_err(|e| Error::corrupt(&name, e))?;
        if lesser.world != greater.world {
            return Err(Error::corrupt(
                &name,
                format!("corners in different worlds ({} / {})", lesser.world, greater.world),
            ));
        }

        let owner = if self.owner.trim().is_empty() {
            None
        } else {
            match PlayerId::parse(self.owner.trim()) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(claim = %name, owner = %self.owner, error = %e, "unreadable owner, treating as administrative");
                    None
                }
            }
        };

        let mut claim = Claim::new(
            ClaimId(self.id),
            lesser.world,
            Bounds::from_corners(lesser.pos, greater.pos),
            owner,
        );
        claim.inherit_permissions = self.inherit_permissions;
        if self.parent_id != NO_PARENT {
            claim.parent = Some(ClaimId(self.parent_id));
        }
        for (who, level) in self.trustees {
            let trustee = who.parse::<Trustee>();
            let permission = level.parse::<ClaimPermission>();
            match (trustee, permission) {
                (Ok(t), Ok(p)) => claim.set_permission(t, p),
                _ => warn!(claim = %name, trustee = %who, level = %level, "skipping unreadable permission entry"),
            }
        }
        Ok(claim)
    }
}
