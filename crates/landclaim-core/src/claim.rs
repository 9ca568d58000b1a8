//! Claim records and the claim arena
//!
//! Claims form a shallow tree: top-level claims own an ordered list of
//! subdivisions. Both directions are stored as [`ClaimId`] references inside a
//! single [`ClaimStore`], so the store is the only owner of claim data.

use crate::geometry::{Bounds, Location};
use crate::identity::{ClaimId, PlayerId, SiegeId};
use crate::permission::{ClaimPermission, Trustee};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A land claim or subdivision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Unique identifier, immutable once assigned
    pub id: ClaimId,
    /// World the claim lives in
    pub world: String,
    /// Boundary box
    pub bounds: Bounds,
    /// Owner, or `None` for an administrative claim
    pub owner: Option<PlayerId>,
    /// Enclosing claim for subdivisions
    pub parent: Option<ClaimId>,
    /// Subdivisions, in creation order
    pub children: Vec<ClaimId>,
    /// Explicit permission grants
    pub trustees: IndexMap<Trustee, ClaimPermission>,
    /// Subdivisions only: fall back to the parent's grants
    pub inherit_permissions: bool,
    /// True while the claim is live in a registry
    #[serde(skip)]
    pub in_registry: bool,
    /// Active siege this claim is drawn into
    #[serde(skip)]
    pub siege: Option<SiegeId>,
    /// Post-siege looting window
    #[serde(skip)]
    pub doors_open: bool,
}

impl Claim {
    /// Create a detached claim (not yet in any registry)
    pub fn new(id: ClaimId, world: impl Into<String>, bounds: Bounds, owner: Option<PlayerId>) -> Self {
        Self {
            id,
            world: world.into(),
            bounds,
            owner,
            parent: None,
            children: Vec::new(),
            trustees: IndexMap::new(),
            inherit_permissions: true,
            in_registry: false,
            siege: None,
            doors_open: false,
        }
    }

    /// Set the parent claim
    pub fn with_parent(mut self, parent: Option<ClaimId>) -> Self {
        self.parent = parent;
        self
    }

    /// Ownerless claims are administrative
    pub fn is_admin(&self) -> bool {
        self.owner.is_none()
    }

    pub fn is_subdivision(&self) -> bool {
        self.parent.is_some()
    }

    pub fn lesser_corner(&self) -> Location {
        let p = self.bounds.lesser();
        Location::new(self.world.clone(), p.x, p.y, p.z)
    }

    pub fn greater_corner(&self) -> Location {
        let p = self.bounds.greater();
        Location::new(self.world.clone(), p.x, p.y, p.z)
    }

    pub fn width(&self) -> i32 {
        self.bounds.width()
    }

    pub fn height(&self) -> i32 {
        self.bounds.height()
    }

    pub fn area(&self) -> i64 {
        self.bounds.area()
    }

    /// Geometry-only containment: same world and inside this claim's own box.
    ///
    /// Does not consult the parent or children; see [`ClaimStore::contains`].
    pub fn contains_in_bounds(&self, location: &Location, ignore_height: bool) -> bool {
        self.world == location.world && self.bounds.contains(location.pos, ignore_height)
    }

    /// Same world and horizontally intersecting
    pub fn overlaps(&self, other: &Claim) -> bool {
        self.world == other.world && self.bounds.overlaps(&other.bounds)
    }

    /// Index keys for every chunk the claim touches
    pub fn chunk_hashes(&self) -> Vec<i64> {
        self.bounds.chunk_hashes()
    }

    /// Grant (or replace) a permission
    pub fn set_permission(&mut self, trustee: Trustee, permission: ClaimPermission) {
        self.trustees.insert(trustee, permission);
    }

    /// Remove a grant, returning what it was
    pub fn drop_permission(&mut self, trustee: &Trustee) -> Option<ClaimPermission> {
        self.trustees.shift_remove(trustee)
    }

    /// Explicit grant for a trustee, ignoring inheritance
    pub fn permission_of(&self, trustee: &Trustee) -> Option<ClaimPermission> {
        self.trustees.get(trustee).copied()
    }
}

/// Arena holding every live claim, keyed by ID
#[derive(Debug, Clone, Default)]
pub struct ClaimStore {
    /// All live claims by ID, in insertion order
    claims: IndexMap<ClaimId, Claim>,
    /// Top-level claims, in insertion order
    top_level: Vec<ClaimId>,
}

impl ClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a claim, linking it under its parent if it has one.
    ///
    /// The parent must already be present; a subdivision whose parent is
    /// missing is returned back as `Err`.
    pub fn insert(&mut self, mut claim: Claim) -> std::result::Result<ClaimId, Claim> {
        let id = claim.id;
        match claim.parent {
            Some(parent_id) => match self.claims.get_mut(&parent_id) {
                Some(parent) => {
                    if !parent.children.contains(&id) {
                        parent.children.push(id);
                    }
                }
                None => return Err(claim),
            },
            None => self.top_level.push(id),
        }
        claim.in_registry = true;
        self.claims.insert(id, claim);
        Ok(id)
    }

    /// Remove a single claim, unlinking it from its parent.
    ///
    /// Children are left in place; callers remove them first.
    pub fn remove(&mut self, id: ClaimId) -> Option<Claim> {
        let mut claim = self.claims.shift_remove(&id)?;
        match claim.parent {
            Some(parent_id) => {
                if let Some(parent) = self.claims.get_mut(&parent_id) {
                    parent.children.retain(|c| *c != id);
                }
            }
            None => self.top_level.retain(|c| *c != id),
        }
        claim.in_registry = false;
        Some(claim)
    }

    pub fn get(&self, id: ClaimId) -> Option<&Claim> {
        self.claims.get(&id)
    }

    pub fn get_mut(&mut self, id: ClaimId) -> Option<&mut Claim> {
        self.claims.get_mut(&id)
    }

    /// Whether a claim with this ID is live
    pub fn is_live(&self, id: ClaimId) -> bool {
        self.claims.contains_key(&id)
    }

    /// Top-level claim IDs, in insertion order
    pub fn top_level(&self) -> &[ClaimId] {
        &self.top_level
    }

    /// Claims competing for space with a claim under `parent`
    pub fn siblings(&self, parent: Option<ClaimId>) -> Vec<ClaimId> {
        match parent {
            Some(parent_id) => self
                .claims
                .get(&parent_id)
                .map(|p| p.children.clone())
                .unwrap_or_default(),
            None => self.top_level.clone(),
        }
    }

    /// Every live claim, including subdivisions
    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.claims.values()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Tree-aware containment.
    ///
    /// A point is only inside a subdivision when it is also inside that
    /// subdivision's parent. With `exclude_subdivisions`, a point that falls in
    /// any child of `id` is reported as outside `id`.
    pub fn contains(
        &self,
        id: ClaimId,
        location: &Location,
        ignore_height: bool,
        exclude_subdivisions: bool,
    ) -> bool {
        let Some(claim) = self.claims.get(&id) else {
            return false;
        };
        if !claim.contains_in_bounds(location, ignore_height) {
            return false;
        }
        if let Some(parent_id) = claim.parent {
            return self.contains(parent_id, location, ignore_height, false);
        }
        if exclude_subdivisions {
            return !claim
                .children
                .iter()
                .any(|child| self.contains(*child, location, ignore_height, true));
        }
        true
    }
}
