//! The claim registry
//!
//! Owns the claim arena, the chunk index and the account cache, and keeps
//! them consistent. All mutation goes through `&mut Registry`; hosts that
//! share it across threads wrap it with [`Registry::into_shared`].
//!
//! ```text
//! caller ──► Registry ──► ClaimStore (authoritative tree)
//!               │    ├──► ChunkIndex (derived)
//!               │    ├──► AccountCache
//!               │    └──► WriteBack ──► Storage (worker thread)
//!               └──► Scheduler (siege checkups, door re-secure, rescue)
//! ```

use crate::accounts::AccountCache;
use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::hooks::Hooks;
use crate::siege::SiegeBook;
use crate::tasks::RegistryTask;
use indexmap::IndexSet;
use landclaim_core::{
    chunk_hash, BlockPos, Bounds, ChunkIndex, Claim, ClaimId, ClaimIdGenerator, ClaimPermission,
    ClaimStore, Clock, Location, PlayerAccount, PlayerId, Scheduler, TickScheduler, Trustee,
};
use landclaim_core::geometry::CHUNK_SHIFT;
use landclaim_db::{FlatFileStorage, Storage, WriteBack, LATEST_SCHEMA_VERSION};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A registry behind the coarse lock
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Parameters for a new claim or subdivision
#[derive(Debug, Clone, PartialEq)]
pub struct NewClaim {
    pub world: String,
    pub corner1: BlockPos,
    pub corner2: BlockPos,
    /// `None` creates an administrative claim
    pub owner: Option<PlayerId>,
    /// Set to create a subdivision
    pub parent: Option<ClaimId>,
    /// Reuse a known ID instead of generating one
    pub id: Option<ClaimId>,
    /// Player performing the action, if any
    pub actor: Option<PlayerId>,
}

impl NewClaim {
    pub fn new(
        world: impl Into<String>,
        corner1: BlockPos,
        corner2: BlockPos,
        owner: Option<PlayerId>,
    ) -> Self {
        Self {
            world: world.into(),
            corner1,
            corner2,
            owner,
            parent: None,
            id: None,
            actor: None,
        }
    }

    pub fn under(mut self, parent: ClaimId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_id(mut self, id: ClaimId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn by(mut self, actor: PlayerId) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Land-claim registry
pub struct Registry {
    pub(crate) config: RegistryConfig,
    pub(crate) claims: ClaimStore,
    pub(crate) index: ChunkIndex,
    pub(crate) ids: ClaimIdGenerator,
    pub(crate) accounts: AccountCache,
    pub(crate) sieges: SiegeBook,
    pub(crate) scheduler: Box<dyn Scheduler<RegistryTask>>,
    pub(crate) writer: Arc<WriteBack>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) hooks: Hooks,
}

impl Registry {
    /// Load every claim from `storage` and start the background writer.
    ///
    /// Delayed tasks run on an in-process [`TickScheduler`] driven by
    /// [`Registry::advance_ticks`].
    pub fn open(
        config: RegistryConfig,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        hooks: Hooks,
    ) -> Result<Self> {
        Self::open_with_scheduler(config, storage, clock, hooks, Box::new(TickScheduler::new()))
    }

    /// Open a flat-file data directory at `config.data_dir`
    pub fn open_flat_file(config: RegistryConfig, clock: Arc<dyn Clock>, hooks: Hooks) -> Result<Self> {
        let storage = Arc::new(FlatFileStorage::open(&config.data_dir)?);
        Self::open(config, storage, clock, hooks)
    }

    /// Like [`Registry::open`], with a host-provided scheduler
    pub fn open_with_scheduler(
        config: RegistryConfig,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        hooks: Hooks,
        scheduler: Box<dyn Scheduler<RegistryTask>>,
    ) -> Result<Self> {
        let stored_version = storage.schema_version()?;
        let loaded = storage.load_claims()?;
        let group_bonuses = storage.load_group_bonuses()?;
        let writer = Arc::new(WriteBack::start(Arc::clone(&storage)));

        let mut registry = Self {
            accounts: AccountCache::new(Arc::clone(&storage), Arc::clone(&writer), group_bonuses),
            config,
            claims: ClaimStore::new(),
            index: ChunkIndex::new(),
            ids: ClaimIdGenerator::new(),
            sieges: SiegeBook::new(),
            scheduler,
            writer,
            clock,
            hooks,
        };
        registry.attach_loaded(loaded);

        if stored_version < LATEST_SCHEMA_VERSION {
            registry.migrate(stored_version);
            // Record the version only once every rewrite has landed
            registry.writer.flush();
            storage.set_schema_version(LATEST_SCHEMA_VERSION)?;
        } else if stored_version > LATEST_SCHEMA_VERSION {
            warn!(stored = stored_version, latest = LATEST_SCHEMA_VERSION, "data written by a newer release");
        }
        Ok(registry)
    }

    /// Insert loaded claims: top-level first, then subdivisions.
    fn attach_loaded(&mut self, loaded: Vec<Claim>) {
        let total = loaded.len();
        let (top, subs): (Vec<Claim>, Vec<Claim>) = loaded.into_iter().partition(|c| c.parent.is_none());

        for claim in top {
            self.ids.observe(claim.id);
            if self.claims.is_live(claim.id) {
                warn!(claim = %claim.id, "duplicate claim record, skipping");
                continue;
            }
            self.index_new(claim);
        }

        for claim in subs {
            self.ids.observe(claim.id);
            let Some(parent_id) = claim.parent else {
                continue;
            };
            let parent_ok = self
                .claims
                .get(parent_id)
                .map(|p| !p.is_subdivision() && p.world == claim.world)
                .unwrap_or(false);
            if !parent_ok {
                warn!(claim = %claim.id, parent = %parent_id, "subdivision without a usable parent, skipping");
                continue;
            }
            if self.claims.is_live(claim.id) {
                warn!(claim = %claim.id, "duplicate claim record, skipping");
                continue;
            }
            self.index_new(claim);
        }

        info!(
            loaded = self.claims.len(),
            skipped = total - self.claims.len(),
            top_level = self.claims.top_level().len(),
            "claims loaded"
        );
    }

    fn migrate(&mut self, from: u32) {
        let mut rewritten = 0;
        for top in self.claims.top_level().to_vec() {
            let Some(claim) = self.claims.get(top) else {
                continue;
            };
            self.writer.save_claim(claim);
            rewritten += 1;
            for child in &claim.children {
                if let Some(sub) = self.claims.get(*child) {
                    self.writer.save_claim(sub);
                    rewritten += 1;
                }
            }
        }
        info!(from, to = LATEST_SCHEMA_VERSION, rewritten, "migrated claim records");
    }

    /// Put a claim into the arena and index. The parent, if any, must be live.
    fn index_new(&mut self, claim: Claim) -> bool {
        match self.claims.insert(claim) {
            Ok(id) => {
                if let Some(claim) = self.claims.get(id) {
                    self.index.index(claim);
                }
                true
            }
            Err(orphan) => {
                warn!(claim = %orphan.id, "parent vanished while attaching claim");
                false
            }
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Wrap in the coarse lock for sharing across threads
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Block until queued writes reach storage
    pub fn flush(&self) {
        self.writer.flush();
    }

    // ------------------------------------------------------------------
    // Creation, resize, deletion
    // ------------------------------------------------------------------

    /// Validate a claim without registering it.
    ///
    /// Returns the normalized candidate, carrying the requested ID or
    /// [`ClaimId::UNASSIGNED`].
    pub fn validate_claim(&self, request: &NewClaim) -> Result<Claim> {
        self.build_candidate(request, request.id)
    }

    /// Create and register a claim or subdivision.
    pub fn create_claim(&mut self, request: NewClaim) -> Result<ClaimId> {
        if let Some(id) = request.id {
            if self.claims.is_live(id) {
                return Err(Error::DuplicateId(id));
            }
        }
        let mut claim = self.build_candidate(&request, None)?;

        claim.id = match request.id {
            Some(id) => {
                self.ids.observe(id);
                id
            }
            None => self.ids.next_at(self.clock.now().timestamp_millis()),
        };

        if let Some(events) = &self.hooks.events {
            if !events.claim_created(&claim, request.actor) {
                debug!(claim = %claim.id, "claim creation cancelled");
                return Err(Error::CreationVetoed);
            }
        }

        let id = claim.id;
        let owner = claim.owner;
        let top_level = claim.parent.is_none();
        if !self.index_new(claim) {
            return Err(Error::ClaimNotFound(request.parent.unwrap_or(id)));
        }
        if let (Some(owner), true) = (owner, top_level) {
            self.accounts.entry(owner, &self.claims).add_claim(id);
        }
        if let Some(claim) = self.claims.get(id) {
            self.writer.save_claim(claim);
        }
        debug!(claim = %id, owner = ?owner, "claim created");
        Ok(id)
    }

    /// Normalize corners and check the candidate against its siblings.
    ///
    /// `resizing` names the claim being reshaped, which is exempt from its
    /// own overlap check.
    fn build_candidate(&self, request: &NewClaim, resizing: Option<ClaimId>) -> Result<Claim> {
        let mut bounds = Bounds::from_corners(request.corner1, request.corner2);

        if bounds.lesser().y < self.config.max_depth {
            bounds = bounds.with_floor(self.config.max_depth);
        }
        if request.owner.is_none() || self.config.is_creative_world(&request.world) {
            bounds = bounds.with_floor(self.config.bedrock_y);
        }

        if let Some(parent_id) = request.parent {
            let parent = self.claims.get(parent_id).ok_or(Error::ClaimNotFound(parent_id))?;
            if parent.is_subdivision() {
                return Err(Error::NestedSubdivision(parent_id));
            }
            if parent.world != request.world {
                return Err(Error::WorldMismatch(request.world.clone(), parent.world.clone()));
            }
            let footprint_inside = parent.bounds.contains(bounds.lesser(), true)
                && parent.bounds.contains(bounds.greater(), true);
            if !footprint_inside {
                return Err(Error::OutsideParent(parent_id));
            }
            if bounds.lesser().y < parent.bounds.lesser().y {
                bounds = bounds.with_floor(parent.bounds.lesser().y);
            }
        }

        let mut candidate = Claim::new(
            resizing.unwrap_or(ClaimId::UNASSIGNED),
            request.world.clone(),
            bounds,
            request.owner,
        )
        .with_parent(request.parent);
        if let Some(id) = request.id {
            candidate.id = id;
        }

        for sibling in self.claims.siblings(request.parent) {
            if Some(sibling) == resizing {
                continue;
            }
            if let Some(existing) = self.claims.get(sibling) {
                if existing.overlaps(&candidate) {
                    return Err(Error::Overlap {
                        conflicting: sibling,
                    });
                }
            }
        }

        if let (Some(actor), Some(guard)) = (request.actor, &self.hooks.region_guard) {
            if self.config.respect_region_guard && !guard.can_build(actor, &request.world, &bounds) {
                return Err(Error::RegionDenied);
            }
        }

        Ok(candidate)
    }

    /// Move a claim's corners, keeping it clear of its siblings.
    pub fn resize_claim(
        &mut self,
        id: ClaimId,
        corner1: BlockPos,
        corner2: BlockPos,
        actor: Option<PlayerId>,
    ) -> Result<()> {
        let before = self.claims.get(id).ok_or(Error::ClaimNotFound(id))?.clone();
        let request = NewClaim {
            world: before.world.clone(),
            corner1,
            corner2,
            owner: before.owner,
            parent: before.parent,
            id: Some(id),
            actor,
        };
        let candidate = self.build_candidate(&request, Some(id))?;

        self.index.deindex(&before);
        let after = {
            let claim = self.claims.get_mut(id).ok_or(Error::ClaimNotFound(id))?;
            claim.bounds = candidate.bounds;
            claim.clone()
        };
        self.index.index(&after);
        self.writer.save_claim(&after);
        if let Some(events) = &self.hooks.events {
            events.claim_modified(&before, &after, actor);
        }
        debug!(claim = %id, "claim resized");
        Ok(())
    }

    /// Move the bottom of a claim tree to `new_depth`.
    ///
    /// Called on a subdivision it applies to the parent. Depths below the
    /// configured maximum are raised to it.
    pub fn extend_claim(&mut self, id: ClaimId, new_depth: i32) -> Result<()> {
        let claim = self.claims.get(id).ok_or(Error::ClaimNotFound(id))?;
        let top = claim.parent.unwrap_or(id);
        let depth = new_depth.max(self.config.max_depth);

        let before = self.claims.get(top).ok_or(Error::ClaimNotFound(top))?.clone();
        let mut members = vec![top];
        members.extend(before.children.iter().copied());
        for member in members {
            if let Some(claim) = self.claims.get_mut(member) {
                claim.bounds = claim.bounds.with_floor(depth);
                self.writer.save_claim(claim);
            }
        }
        if let (Some(events), Some(after)) = (&self.hooks.events, self.claims.get(top)) {
            events.claim_modified(&before, after, None);
        }
        Ok(())
    }

    /// Delete a claim and all its subdivisions.
    ///
    /// Returns the removed claim, or `None` if it was not live. Never fails.
    pub fn delete_claim(&mut self, id: ClaimId, fire_event: bool, release_pets: bool) -> Option<Claim> {
        let children = self.claims.get(id)?.children.clone();
        for child in children {
            self.delete_claim(child, true, false);
        }

        let claim = self.claims.remove(id)?;
        self.index.deindex(&claim);
        self.writer.delete_claim(id);

        if let (Some(owner), false) = (claim.owner, claim.is_subdivision()) {
            let mut account = self.accounts.loaded_entry(owner, &self.claims);
            account.remove_claim(id);
            self.accounts.save(owner, &mut account);
        }
        if fire_event {
            if let Some(events) = &self.hooks.events {
                events.claim_deleted(&claim);
            }
        }
        if release_pets && !claim.is_subdivision() && !claim.is_admin() {
            if let Some(pets) = &self.hooks.pets {
                pets.release_pets(&claim);
            }
        }
        info!(claim = %id, owner = ?claim.owner, "claim deleted");
        Some(claim)
    }

    /// Delete every top-level claim owned by `owner` (`None` = administrative).
    pub fn delete_claims_for_owner(&mut self, owner: Option<PlayerId>, release_pets: bool) -> Vec<ClaimId> {
        let doomed: Vec<ClaimId> = self
            .claims
            .top_level()
            .iter()
            .filter(|id| self.claims.get(**id).map(|c| c.owner) == Some(owner))
            .copied()
            .collect();
        for id in &doomed {
            self.delete_claim(*id, true, release_pets);
        }
        doomed
    }

    /// Delete every top-level claim in a world, optionally sparing
    /// administrative claims.
    pub fn delete_claims_in_world(&mut self, world: &str, include_admin: bool) -> Vec<ClaimId> {
        let doomed: Vec<ClaimId> = self
            .claims
            .top_level()
            .iter()
            .filter(|id| {
                self.claims
                    .get(**id)
                    .map(|c| c.world == world && (include_admin || !c.is_admin()))
                    .unwrap_or(false)
            })
            .copied()
            .collect();
        for id in &doomed {
            self.delete_claim(*id, false, false);
        }
        info!(world, deleted = doomed.len(), "claims deleted in world");
        doomed
    }

    /// Hand a top-level claim (and its subdivisions) to a new owner.
    pub fn change_owner(&mut self, id: ClaimId, new_owner: Option<PlayerId>) -> Result<()> {
        let claim = self.claims.get(id).ok_or(Error::ClaimNotFound(id))?;
        if claim.is_subdivision() {
            return Err(Error::NotTransferable(id));
        }
        let old_owner = claim.owner;
        let children = claim.children.clone();

        if let Some(old) = old_owner {
            let mut account = self.accounts.loaded_entry(old, &self.claims);
            account.remove_claim(id);
            self.accounts.save(old, &mut account);
        }

        for member in std::iter::once(id).chain(children) {
            if let Some(claim) = self.claims.get_mut(member) {
                claim.owner = new_owner;
                self.writer.save_claim(claim);
            }
        }

        if let Some(new) = new_owner {
            let mut account = self.accounts.loaded_entry(new, &self.claims);
            account.add_claim(id);
            self.accounts.save(new, &mut account);
        }
        info!(claim = %id, from = ?old_owner, to = ?new_owner, "claim transferred");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_claim(&self, id: ClaimId) -> Option<&Claim> {
        self.claims.get(id)
    }

    /// Top-level claims, in registration order
    pub fn claims(&self) -> Vec<&Claim> {
        self.claims
            .top_level()
            .iter()
            .filter_map(|id| self.claims.get(*id))
            .collect()
    }

    /// Every live claim, subdivisions included
    pub fn all_claims(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter()
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    /// Tree-aware containment, see [`ClaimStore::contains`]
    pub fn contains(&self, id: ClaimId, location: &Location, ignore_height: bool, exclude_subdivisions: bool) -> bool {
        self.claims.contains(id, location, ignore_height, exclude_subdivisions)
    }

    /// The claim at a point, preferring a subdivision over its parent.
    ///
    /// `hint` is checked first and returned if it still covers the point.
    pub fn get_claim_at(&self, location: &Location, ignore_height: bool, hint: Option<ClaimId>) -> Option<ClaimId> {
        if let Some(hint) = hint {
            if self.claims.contains(hint, location, ignore_height, true) {
                return Some(hint);
            }
        }

        let mut top_match = None;
        let mut top_matches = 0;
        for id in self.index.bucket(location.chunk_hash()) {
            let Some(claim) = self.claims.get(*id) else {
                continue;
            };
            if !self.claims.contains(*id, location, ignore_height, false) {
                continue;
            }
            if claim.is_subdivision() {
                return Some(*id);
            }
            top_matches += 1;
            if top_match.is_none() {
                top_match = Some(*id);
            }
        }
        if top_matches > 1 {
            warn!(location = %location, matches = top_matches, "overlapping top-level claims at one point");
        }
        top_match
    }

    /// Claim IDs indexed under a chunk coordinate
    pub fn claims_in_chunk(&self, chunk_x: i32, chunk_z: i32) -> Vec<ClaimId> {
        self.index.at_chunk(chunk_x, chunk_z).to_vec()
    }

    /// Top-level claims within `nearby_radius` blocks (by chunk) of a location
    pub fn nearby_claims(&self, location: &Location) -> Vec<ClaimId> {
        let r = self.config.nearby_radius;
        let (x, z) = (location.pos.x, location.pos.z);
        let mut found = IndexSet::new();
        let (min_x, max_x) = (x.saturating_sub(r) >> CHUNK_SHIFT, x.saturating_add(r) >> CHUNK_SHIFT);
        let (min_z, max_z) = (z.saturating_sub(r) >> CHUNK_SHIFT, z.saturating_add(r) >> CHUNK_SHIFT);
        for chunk_x in min_x..=max_x {
            for chunk_z in min_z..=max_z {
                for id in self.index.bucket(chunk_hash(chunk_x, chunk_z)) {
                    let Some(claim) = self.claims.get(*id) else {
                        continue;
                    };
                    if claim.world != location.world {
                        continue;
                    }
                    found.insert(claim.parent.unwrap_or(*id));
                }
            }
        }
        found.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    /// Whether `player` holds at least `required` on a claim.
    ///
    /// Unknown claims grant nothing.
    pub fn check_permission(&self, id: ClaimId, player: PlayerId, required: ClaimPermission) -> bool {
        let Some(claim) = self.claims.get(id) else {
            return false;
        };
        let top = claim
            .parent
            .and_then(|p| self.claims.get(p))
            .unwrap_or(claim);

        let contested = matches!(required, ClaimPermission::Build | ClaimPermission::Inventory);
        if contested && top.siege.is_some() {
            return false;
        }
        if top.doors_open && matches!(required, ClaimPermission::Access | ClaimPermission::Inventory) {
            return true;
        }
        if top.owner == Some(player) {
            return true;
        }
        self.trust_grants(id, player, required)
    }

    /// Grant `level` to a trustee, replacing any earlier grant
    pub fn set_permission(&mut self, id: ClaimId, trustee: Trustee, level: ClaimPermission) -> Result<()> {
        self.edit_claim(id, |claim| claim.set_permission(trustee, level))
    }

    /// Revoke a trustee's grant; revoking a missing grant is not an error
    pub fn drop_permission(&mut self, id: ClaimId, trustee: &Trustee) -> Result<Option<ClaimPermission>> {
        let mut dropped = None;
        self.edit_claim(id, |claim| dropped = claim.drop_permission(trustee))?;
        Ok(dropped)
    }

    /// Whether a subdivision falls back to its parent's grants
    pub fn set_inherit_permissions(&mut self, id: ClaimId, inherit: bool) -> Result<()> {
        self.edit_claim(id, |claim| claim.inherit_permissions = inherit)
    }

    fn edit_claim(&mut self, id: ClaimId, edit: impl FnOnce(&mut Claim)) -> Result<()> {
        let claim = self.claims.get_mut(id).ok_or(Error::ClaimNotFound(id))?;
        let before = claim.clone();
        edit(claim);
        self.writer.save_claim(claim);
        if let Some(events) = &self.hooks.events {
            events.claim_modified(&before, claim, None);
        }
        Ok(())
    }

    fn trust_grants(&self, id: ClaimId, player: PlayerId, required: ClaimPermission) -> bool {
        let Some(claim) = self.claims.get(id) else {
            return false;
        };
        let granted = claim.trustees.iter().any(|(trustee, level)| {
            let applies = match trustee {
                Trustee::Player(p) => *p == player,
                Trustee::Public => true,
                Trustee::Group(node) => self.hooks.has_permission(player, node),
            };
            applies && level.grants(required)
        });
        if granted {
            return true;
        }
        match claim.parent {
            Some(parent) if claim.inherit_permissions => self.trust_grants(parent, player, required),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// The cached account, created with zero balances if absent.
    ///
    /// Does not read storage; see [`Registry::loaded_account`].
    pub fn account(&self, player: PlayerId) -> PlayerAccount {
        self.accounts.entry(player, &self.claims).clone()
    }

    /// The account with stored balances applied
    pub fn loaded_account(&self, player: PlayerId) -> PlayerAccount {
        self.accounts.loaded_entry(player, &self.claims).clone()
    }

    pub fn accounts(&self) -> &AccountCache {
        &self.accounts
    }

    /// Evict a player's account from memory; storage is untouched
    pub fn clear_cached_account(&self, player: PlayerId) {
        self.accounts.clear(player);
    }

    pub fn add_accrued_blocks(&self, player: PlayerId, amount: i32) -> i32 {
        let mut account = self.accounts.loaded_entry(player, &self.claims);
        account.balances.accrued += amount;
        self.accounts.save(player, &mut account);
        account.balances.accrued
    }

    pub fn adjust_bonus_blocks(&self, player: PlayerId, amount: i32) -> i32 {
        let mut account = self.accounts.loaded_entry(player, &self.claims);
        account.balances.bonus += amount;
        self.accounts.save(player, &mut account);
        account.balances.bonus
    }

    /// Change a permission group's bonus; returns the new total
    pub fn adjust_group_bonus(&self, group: &str, amount: i32) -> i32 {
        self.accounts.adjust_group_bonus(group, amount)
    }

    /// Sum of bonuses for every group the host says the player belongs to
    pub fn group_bonus_blocks(&self, player: PlayerId) -> i32 {
        self.accounts
            .group_bonuses()
            .into_iter()
            .filter(|(group, _)| self.hooks.has_permission(player, group))
            .map(|(_, amount)| amount)
            .sum()
    }

    /// Accrued + bonus + group bonus, minus the area of owned top-level claims
    pub fn remaining_claim_blocks(&self, player: PlayerId) -> i64 {
        let group_bonus = self.group_bonus_blocks(player);
        let account = self.loaded_account(player);
        let claimed: i64 = account
            .claims
            .iter()
            .filter_map(|id| self.claims.get(*id))
            .map(Claim::area)
            .sum();
        account.remaining_blocks(group_bonus, claimed)
    }

    pub fn ignore_player(&self, player: PlayerId, other: PlayerId, admin_enforced: bool) {
        let mut account = self.accounts.loaded_entry(player, &self.claims);
        account.ignore(other, admin_enforced);
        self.accounts.save(player, &mut account);
    }

    /// Stop ignoring; administrator-enforced entries need `force`
    pub fn unignore_player(&self, player: PlayerId, other: PlayerId, force: bool) -> bool {
        let mut account = self.accounts.loaded_entry(player, &self.claims);
        let removed = account.unignore(other, force);
        if removed {
            self.accounts.save(player, &mut account);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{ClaimEvents, PermissionHost, PetKeeper, RegionGuard};
    use landclaim_core::ManualClock;
    use landclaim_db::MemoryStorage;
    use parking_lot::Mutex as PlMutex;

    fn pos(x: i32, z: i32) -> BlockPos {
        BlockPos::new(x, 64, z)
    }

    fn open_with(storage: Arc<MemoryStorage>, hooks: Hooks) -> Registry {
        Registry::open(
            RegistryConfig::default(),
            storage,
            Arc::new(ManualClock::starting_now()),
            hooks,
        )
        .unwrap()
    }

    fn open() -> (Registry, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (open_with(storage.clone(), Hooks::new()), storage)
    }

    fn square(owner: PlayerId, x0: i32, z0: i32, x1: i32, z1: i32) -> NewClaim {
        NewClaim::new("world", pos(x0, z0), pos(x1, z1), Some(owner))
    }

    #[derive(Default)]
    struct Recorder {
        veto: bool,
        created: PlMutex<Vec<ClaimId>>,
        modified: PlMutex<Vec<ClaimId>>,
        deleted: PlMutex<Vec<ClaimId>>,
        pets: PlMutex<Vec<ClaimId>>,
    }

    impl ClaimEvents for Recorder {
        fn claim_created(&self, claim: &Claim, _actor: Option<PlayerId>) -> bool {
            self.created.lock().push(claim.id);
            !self.veto
        }

        fn claim_modified(&self, _before: &Claim, after: &Claim, _actor: Option<PlayerId>) {
            self.modified.lock().push(after.id);
        }

        fn claim_deleted(&self, claim: &Claim) {
            self.deleted.lock().push(claim.id);
        }
    }

    impl PetKeeper for Recorder {
        fn release_pets(&self, claim: &Claim) {
            self.pets.lock().push(claim.id);
        }
    }

    struct DenyAll;

    impl RegionGuard for DenyAll {
        fn can_build(&self, _actor: PlayerId, _world: &str, _bounds: &Bounds) -> bool {
            false
        }
    }

    struct Groups(Vec<(PlayerId, &'static str)>);

    impl PermissionHost for Groups {
        fn has_permission(&self, player: PlayerId, node: &str) -> bool {
            self.0.iter().any(|(p, n)| *p == player && *n == node)
        }
    }

    #[test]
    fn test_sibling_overlap_rejected() {
        let (mut registry, _) = open();
        let owner = PlayerId::random();
        let a = registry.create_claim(square(owner, 0, 0, 10, 10)).unwrap();

        let err = registry.create_claim(square(owner, 5, 5, 15, 15)).unwrap_err();
        assert_eq!(err.conflicting_claim(), Some(a));

        let c = registry.create_claim(square(owner, 20, 0, 30, 10)).unwrap();
        assert_ne!(a, c);
        assert_eq!(registry.claims().len(), 2);
        assert_eq!(registry.account(owner).claims, vec![a, c]);
    }

    #[test]
    fn test_subdivision_lookup() {
        let (mut registry, _) = open();
        let owner = PlayerId::random();
        let a = registry.create_claim(square(owner, 0, 0, 100, 100)).unwrap();
        let s = registry
            .create_claim(square(owner, 10, 10, 20, 20).under(a))
            .unwrap();

        assert_eq!(registry.get_claim_at(&Location::new("world", 15, 64, 15), false, None), Some(s));
        assert_eq!(registry.get_claim_at(&Location::new("world", 50, 64, 50), false, None), Some(a));
        assert_eq!(registry.get_claim_at(&Location::new("world", 150, 64, 50), false, None), None);
        assert_eq!(registry.get_claim_at(&Location::new("nether", 15, 64, 15), false, None), None);
        // Hint on the parent does not hide the subdivision
        assert_eq!(registry.get_claim_at(&Location::new("world", 15, 64, 15), false, Some(a)), Some(s));
        assert_eq!(registry.get_claim_at(&Location::new("world", 50, 64, 50), false, Some(a)), Some(a));
        // Subdivisions do not count against the owner's top-level list
        assert_eq!(registry.account(owner).claims, vec![a]);
    }

    #[test]
    fn test_subdivision_rules() {
        let (mut registry, _) = open();
        let owner = PlayerId::random();
        let a = registry.create_claim(square(owner, 0, 0, 50, 50)).unwrap();
        let s = registry.create_claim(square(owner, 0, 0, 10, 10).under(a)).unwrap();

        assert!(matches!(
            registry.create_claim(square(owner, 40, 40, 60, 60).under(a)),
            Err(Error::OutsideParent(id)) if id == a
        ));
        assert!(matches!(
            registry.create_claim(square(owner, 1, 1, 2, 2).under(s)),
            Err(Error::NestedSubdivision(id)) if id == s
        ));
        assert!(matches!(
            registry.create_claim(square(owner, 5, 5, 20, 20).under(a)),
            Err(Error::Overlap { conflicting }) if conflicting == s
        ));
        // A top-level claim elsewhere does not collide with subdivisions
        assert!(registry.create_claim(square(owner, 60, 0, 70, 10)).is_ok());
    }

    #[test]
    fn test_delete_with_subdivisions_clears_index() {
        let recorder = Arc::new(Recorder::default());
        let storage = Arc::new(MemoryStorage::new());
        let hooks = Hooks::new().with_events(recorder.clone()).with_pets(recorder.clone());
        let mut registry = open_with(storage.clone(), hooks);
        let owner = PlayerId::random();

        let a = registry.create_claim(square(owner, 0, 0, 40, 40)).unwrap();
        let s1 = registry.create_claim(square(owner, 1, 1, 5, 5).under(a)).unwrap();
        let s2 = registry.create_claim(square(owner, 20, 20, 35, 35).under(a)).unwrap();

        let removed = registry.delete_claim(a, true, true).unwrap();
        assert!(!removed.in_registry);
        assert_eq!(registry.claim_count(), 0);
        assert_eq!(registry.index.bucket_count(), 0);
        for cx in 0..=2 {
            for cz in 0..=2 {
                assert!(registry.claims_in_chunk(cx, cz).is_empty());
            }
        }
        assert_eq!(*recorder.deleted.lock(), vec![s1, s2, a]);
        assert_eq!(*recorder.pets.lock(), vec![a]);
        assert!(registry.account(owner).claims.is_empty());

        // Repeat delete is a no-op
        assert!(registry.delete_claim(a, true, true).is_none());
        assert_eq!(recorder.deleted.lock().len(), 3);

        registry.flush();
        assert_eq!(storage.claim_count(), 0);
    }

    #[test]
    fn test_resize_overlap_leaves_claim_unchanged() {
        let recorder = Arc::new(Recorder::default());
        let storage = Arc::new(MemoryStorage::new());
        let mut registry = open_with(storage, Hooks::new().with_events(recorder.clone()));
        let owner = PlayerId::random();
        let a = registry.create_claim(square(owner, 0, 0, 10, 10)).unwrap();
        let b = registry.create_claim(square(owner, 40, 0, 50, 10)).unwrap();
        let before = registry.get_claim(a).unwrap().clone();

        let err = registry.resize_claim(a, pos(0, 0), pos(45, 10), None).unwrap_err();
        assert_eq!(err.conflicting_claim(), Some(b));
        assert_eq!(registry.get_claim(a).unwrap(), &before);
        assert!(recorder.modified.lock().is_empty());

        // Growing into free space re-indexes the new chunks
        registry.resize_claim(a, pos(0, 0), pos(30, 10), None).unwrap();
        assert_eq!(registry.get_claim(a).unwrap().width(), 31);
        assert_eq!(registry.claims_in_chunk(1, 0), vec![a]);
        assert_eq!(*recorder.modified.lock(), vec![a]);

        // Shrinking drops the old chunks
        registry.resize_claim(a, pos(0, 0), pos(5, 5), None).unwrap();
        assert!(registry.claims_in_chunk(1, 0).is_empty());
    }

    #[test]
    fn test_depth_rules() {
        let storage = Arc::new(MemoryStorage::new());
        let config = RegistryConfig {
            max_depth: 10,
            bedrock_y: -64,
            creative_worlds: vec!["creative".to_string()],
            ..RegistryConfig::default()
        };
        let mut registry = Registry::open(
            config,
            storage,
            Arc::new(ManualClock::starting_now()),
            Hooks::new(),
        )
        .unwrap();
        let owner = PlayerId::random();

        let deep = registry
            .create_claim(NewClaim::new("world", BlockPos::new(0, -30, 0), BlockPos::new(5, 2, 5), Some(owner)))
            .unwrap();
        assert_eq!(registry.get_claim(deep).unwrap().bounds.lesser().y, 10);

        let admin = registry
            .create_claim(NewClaim::new("world", BlockPos::new(20, 70, 0), BlockPos::new(25, 70, 5), None))
            .unwrap();
        assert_eq!(registry.get_claim(admin).unwrap().bounds.lesser().y, -64);

        let creative = registry
            .create_claim(NewClaim::new("creative", BlockPos::new(0, 70, 0), BlockPos::new(5, 70, 5), Some(owner)))
            .unwrap();
        assert_eq!(registry.get_claim(creative).unwrap().bounds.lesser().y, -64);

        registry.extend_claim(deep, -100).unwrap();
        assert_eq!(registry.get_claim(deep).unwrap().bounds.lesser().y, 10);
        registry.extend_claim(deep, 0).unwrap();
        assert_eq!(registry.get_claim(deep).unwrap().bounds.lesser().y, 10);
    }

    #[test]
    fn test_extend_applies_to_whole_tree() {
        let (mut registry, _) = open();
        let owner = PlayerId::random();
        let a = registry.create_claim(square(owner, 0, 0, 20, 20)).unwrap();
        let s = registry.create_claim(square(owner, 2, 2, 4, 4).under(a)).unwrap();

        registry.extend_claim(s, 5).unwrap();
        assert_eq!(registry.get_claim(a).unwrap().bounds.lesser().y, 5);
        assert_eq!(registry.get_claim(s).unwrap().bounds.lesser().y, 5);
    }

    #[test]
    fn test_veto_and_region_guard() {
        let recorder = Arc::new(Recorder {
            veto: true,
            ..Recorder::default()
        });
        let storage = Arc::new(MemoryStorage::new());
        let mut registry = open_with(storage.clone(), Hooks::new().with_events(recorder.clone()));
        let owner = PlayerId::random();

        assert!(matches!(
            registry.create_claim(square(owner, 0, 0, 5, 5)),
            Err(Error::CreationVetoed)
        ));
        assert_eq!(registry.claim_count(), 0);
        assert_eq!(registry.index.bucket_count(), 0);
        assert!(registry.account(owner).claims.is_empty());

        let mut guarded = open_with(Arc::new(MemoryStorage::new()), Hooks::new().with_region_guard(Arc::new(DenyAll)));
        let err = guarded.create_claim(square(owner, 0, 0, 5, 5).by(owner)).unwrap_err();
        assert!(matches!(err, Error::RegionDenied));
        assert_eq!(err.conflicting_claim(), None);
        // Without an actor the guard is not consulted
        assert!(guarded.create_claim(square(owner, 0, 0, 5, 5)).is_ok());
    }

    #[test]
    fn test_dry_run_registers_nothing() {
        let (registry, storage) = open();
        let owner = PlayerId::random();
        let candidate = registry
            .validate_claim(&NewClaim::new("world", pos(10, 10), pos(0, 0), Some(owner)))
            .unwrap();
        assert_eq!(candidate.id, ClaimId::UNASSIGNED);
        assert!(!candidate.in_registry);
        assert_eq!(candidate.bounds.lesser(), pos(0, 0));
        assert_eq!(registry.claim_count(), 0);
        registry.flush();
        assert_eq!(storage.claim_count(), 0);
    }

    #[test]
    fn test_requested_id() {
        let (mut registry, _) = open();
        let owner = PlayerId::random();
        let id = registry.create_claim(square(owner, 0, 0, 5, 5).with_id(ClaimId(42))).unwrap();
        assert_eq!(id, ClaimId(42));
        assert!(matches!(
            registry.create_claim(square(owner, 50, 50, 55, 55).with_id(ClaimId(42))),
            Err(Error::DuplicateId(_))
        ));
    }

    #[test]
    fn test_ids_unique_when_clock_stands_still() {
        let (mut registry, _) = open();
        let owner = PlayerId::random();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(registry.create_claim(square(owner, i * 10, 0, i * 10 + 5, 5)).unwrap());
        }
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn test_change_owner() {
        let (mut registry, _) = open();
        let alice = PlayerId::random();
        let bob = PlayerId::random();
        let a = registry.create_claim(square(alice, 0, 0, 10, 10)).unwrap();
        let s = registry.create_claim(square(alice, 1, 1, 3, 3).under(a)).unwrap();

        assert!(matches!(registry.change_owner(s, Some(bob)), Err(Error::NotTransferable(id)) if id == s));
        registry.change_owner(a, Some(bob)).unwrap();
        assert_eq!(registry.get_claim(a).unwrap().owner, Some(bob));
        assert_eq!(registry.get_claim(s).unwrap().owner, Some(bob));
        assert!(registry.account(alice).claims.is_empty());
        assert_eq!(registry.account(bob).claims, vec![a]);
        assert!(matches!(registry.change_owner(ClaimId(1), None), Err(Error::ClaimNotFound(_))));
    }

    #[test]
    fn test_bulk_deletes() {
        let (mut registry, _) = open();
        let alice = PlayerId::random();
        let bob = PlayerId::random();
        registry.create_claim(square(alice, 0, 0, 5, 5)).unwrap();
        registry.create_claim(square(alice, 10, 0, 15, 5)).unwrap();
        let b = registry.create_claim(square(bob, 20, 0, 25, 5)).unwrap();
        let admin = registry
            .create_claim(NewClaim::new("world", pos(30, 0), pos(35, 5), None))
            .unwrap();
        let nether = registry
            .create_claim(NewClaim::new("nether", pos(0, 0), pos(5, 5), Some(bob)))
            .unwrap();

        assert_eq!(registry.delete_claims_for_owner(Some(alice), false).len(), 2);
        assert_eq!(registry.delete_claims_in_world("world", false), vec![b]);
        assert!(registry.get_claim(admin).is_some());
        assert_eq!(registry.delete_claims_for_owner(None, false), vec![admin]);
        assert_eq!(registry.claims().iter().map(|c| c.id).collect::<Vec<_>>(), vec![nether]);
    }

    #[test]
    fn test_nearby_claims() {
        let (mut registry, _) = open();
        let owner = PlayerId::random();
        let near = registry.create_claim(square(owner, 100, 100, 110, 110)).unwrap();
        registry.create_claim(square(owner, 102, 102, 104, 104).under(near)).unwrap();
        registry.create_claim(square(owner, 1000, 1000, 1010, 1010)).unwrap();
        registry
            .create_claim(NewClaim::new("nether", pos(0, 0), pos(5, 5), Some(owner)))
            .unwrap();

        assert_eq!(registry.nearby_claims(&Location::new("world", 0, 64, 0)), vec![near]);

        // Radius reaching past the coordinate limits
        let edge = registry
            .create_claim(square(owner, i32::MAX - 20, i32::MIN, i32::MAX, i32::MIN + 20))
            .unwrap();
        let corner = Location::new("world", i32::MAX - 5, 64, i32::MIN + 5);
        assert_eq!(registry.nearby_claims(&corner), vec![edge]);
    }

    #[test]
    fn test_permissions() {
        let alice = PlayerId::random();
        let bob = PlayerId::random();
        let carol = PlayerId::random();
        let hooks = Hooks::new().with_permissions(Arc::new(Groups(vec![(carol, "builders")])));
        let mut registry = open_with(Arc::new(MemoryStorage::new()), hooks);

        let a = registry.create_claim(square(alice, 0, 0, 20, 20)).unwrap();
        let s = registry.create_claim(square(alice, 1, 1, 5, 5).under(a)).unwrap();
        registry
            .set_permission(a, Trustee::Player(bob), ClaimPermission::Inventory)
            .unwrap();
        registry
            .set_permission(a, Trustee::Group("builders".into()), ClaimPermission::Build)
            .unwrap();

        assert!(registry.check_permission(a, alice, ClaimPermission::Build));
        assert!(registry.check_permission(a, bob, ClaimPermission::Access));
        assert!(!registry.check_permission(a, bob, ClaimPermission::Build));
        assert!(registry.check_permission(a, carol, ClaimPermission::Build));
        // Subdivision inherits, until told not to
        assert!(registry.check_permission(s, bob, ClaimPermission::Inventory));
        registry.set_inherit_permissions(s, false).unwrap();
        assert!(!registry.check_permission(s, bob, ClaimPermission::Inventory));
        assert!(registry.check_permission(s, alice, ClaimPermission::Build));

        let stranger = PlayerId::random();
        assert!(!registry.check_permission(a, stranger, ClaimPermission::Access));
        registry
            .set_permission(a, Trustee::Public, ClaimPermission::Access)
            .unwrap();
        assert!(registry.check_permission(a, stranger, ClaimPermission::Access));
        assert_eq!(
            registry.drop_permission(a, &Trustee::Public).unwrap(),
            Some(ClaimPermission::Access)
        );
        assert!(!registry.check_permission(a, stranger, ClaimPermission::Access));
        assert_eq!(registry.drop_permission(a, &Trustee::Public).unwrap(), None);
        assert!(!registry.check_permission(ClaimId(5), alice, ClaimPermission::Access));
        assert!(registry.set_permission(ClaimId(5), Trustee::Public, ClaimPermission::Build).is_err());
    }

    #[test]
    fn test_accounts_and_blocks() {
        let alice = PlayerId::random();
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save_balances(alice, &landclaim_core::Balances { accrued: 100, bonus: 10 })
            .unwrap();
        let hooks = Hooks::new().with_permissions(Arc::new(Groups(vec![(alice, "vip")])));
        let mut registry = open_with(storage.clone(), hooks);

        // Lazy: the plain account has not read storage yet
        assert!(!registry.account(alice).loaded);
        assert_eq!(registry.loaded_account(alice).balances.accrued, 100);

        registry.create_claim(square(alice, 0, 0, 4, 4)).unwrap();
        assert_eq!(registry.adjust_group_bonus("vip", 50), 50);
        assert_eq!(registry.adjust_group_bonus("other", 7), 7);
        assert_eq!(registry.group_bonus_blocks(alice), 50);
        assert_eq!(registry.remaining_claim_blocks(alice), 100 + 10 + 50 - 25);

        assert_eq!(registry.add_accrued_blocks(alice, 5), 105);
        assert_eq!(registry.adjust_bonus_blocks(alice, -10), 0);
        registry.flush();
        assert_eq!(
            storage.load_balances(alice).unwrap(),
            Some(landclaim_core::Balances { accrued: 105, bonus: 0 })
        );
        assert_eq!(storage.load_group_bonuses().unwrap().get("vip"), Some(&50));

        let bob = PlayerId::random();
        registry.ignore_player(alice, bob, true);
        assert!(!registry.unignore_player(alice, bob, false));
        registry.flush();
        assert_eq!(storage.load_ignore_list(alice).unwrap().get(&bob), Some(&true));

        // Evicted accounts are rebuilt from storage and the claim tree
        registry.clear_cached_account(alice);
        assert!(!registry.accounts().is_cached(alice));
        let reloaded = registry.loaded_account(alice);
        assert_eq!(reloaded.balances.accrued, 105);
        assert_eq!(reloaded.claims.len(), 1);
        assert!(reloaded.is_ignoring(bob));
    }

    #[test]
    fn test_reload_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let owner = PlayerId::random();
        let (a, s) = {
            let mut registry = open_with(storage.clone(), Hooks::new());
            let a = registry.create_claim(square(owner, 0, 0, 30, 30)).unwrap();
            let s = registry.create_claim(square(owner, 5, 5, 9, 9).under(a)).unwrap();
            registry
                .set_permission(a, Trustee::Public, ClaimPermission::Access)
                .unwrap();
            (a, s)
        };

        let mut registry = open_with(storage.clone(), Hooks::new());
        assert_eq!(registry.claim_count(), 2);
        assert_eq!(registry.get_claim(a).unwrap().children, vec![s]);
        assert_eq!(registry.get_claim(s).unwrap().parent, Some(a));
        assert_eq!(
            registry.get_claim(a).unwrap().permission_of(&Trustee::Public),
            Some(ClaimPermission::Access)
        );
        assert_eq!(registry.get_claim_at(&Location::new("world", 6, 64, 6), false, None), Some(s));
        assert_eq!(registry.account(owner).claims, vec![a]);

        // New IDs continue past everything loaded
        let next = registry.create_claim(square(owner, 100, 100, 105, 105)).unwrap();
        assert!(next > s);
    }

    #[test]
    fn test_orphan_subdivision_skipped_on_load() {
        let storage = Arc::new(MemoryStorage::new());
        let owner = PlayerId::random();
        let orphan = Claim::new(
            ClaimId(77),
            "world",
            Bounds::from_corners(pos(0, 0), pos(3, 3)),
            Some(owner),
        )
        .with_parent(Some(ClaimId(5)));
        storage.save_claim(&orphan).unwrap();

        let registry = open_with(storage, Hooks::new());
        assert_eq!(registry.claim_count(), 0);
    }

    #[test]
    fn test_migration_rewrites_and_records_version() {
        let storage = Arc::new(MemoryStorage::with_schema_version(1));
        let owner = PlayerId::random();
        let top = Claim::new(ClaimId(1), "world", Bounds::from_corners(pos(0, 0), pos(9, 9)), Some(owner));
        let sub = Claim::new(ClaimId(2), "world", Bounds::from_corners(pos(1, 1), pos(2, 2)), Some(owner))
            .with_parent(Some(ClaimId(1)));
        storage.save_claim(&top).unwrap();
        storage.save_claim(&sub).unwrap();
        assert_eq!(storage.claim_writes(), 2);

        let registry = open_with(storage.clone(), Hooks::new());
        assert_eq!(storage.claim_writes(), 4);
        assert_eq!(storage.schema_version().unwrap(), LATEST_SCHEMA_VERSION);
        drop(registry);

        // Already current: nothing rewritten
        let _registry = open_with(storage.clone(), Hooks::new());
        assert_eq!(storage.claim_writes(), 4);
    }

    #[test]
    fn test_newer_schema_version_never_lowered() {
        let storage = Arc::new(MemoryStorage::with_schema_version(LATEST_SCHEMA_VERSION + 2));
        let owner = PlayerId::random();
        storage
            .save_claim(&Claim::new(ClaimId(1), "world", Bounds::from_corners(pos(0, 0), pos(9, 9)), Some(owner)))
            .unwrap();

        let registry = open_with(storage.clone(), Hooks::new());
        registry.flush();
        assert_eq!(registry.claim_count(), 1);
        assert_eq!(storage.schema_version().unwrap(), LATEST_SCHEMA_VERSION + 2);
        assert_eq!(storage.claim_writes(), 1);
    }

    #[test]
    fn test_corrupt_flat_files_do_not_block_startup() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("schema_version"), "garbage").unwrap();
        std::fs::create_dir_all(dir.path().join("PlayerData")).unwrap();
        std::fs::write(dir.path().join("PlayerData").join("$vip"), "lots").unwrap();
        let config = RegistryConfig {
            data_dir: dir.path().to_path_buf(),
            ..RegistryConfig::default()
        };

        let registry = Registry::open_flat_file(config, Arc::new(ManualClock::starting_now()), Hooks::new()).unwrap();
        assert_eq!(registry.accounts().group_bonus("vip"), 0);
        let version = std::fs::read_to_string(dir.path().join("schema_version")).unwrap();
        assert_eq!(version.trim(), LATEST_SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_lookup_unaffected_by_unrelated_claim() {
        let (mut registry, _) = open();
        let owner = PlayerId::random();
        let a = registry.create_claim(square(owner, 0, 0, 40, 40)).unwrap();
        let point = Location::new("world", 5, 70, 5);
        let hashes = registry.get_claim(a).unwrap().chunk_hashes();
        let buckets_before: Vec<Vec<ClaimId>> = hashes.iter().map(|h| registry.index.bucket(*h).to_vec()).collect();
        assert_eq!(registry.get_claim_at(&point, false, None), Some(a));

        let b = registry.create_claim(square(PlayerId::random(), 300, 300, 320, 320)).unwrap();
        // Shares one chunk column with `a`
        let c = registry.create_claim(square(owner, 41, 0, 60, 10)).unwrap();

        assert_eq!(registry.get_claim_at(&point, false, None), Some(a));
        assert_eq!(registry.get_claim_at(&point, false, Some(b)), Some(a));
        let buckets_after: Vec<Vec<ClaimId>> = hashes.iter().map(|h| registry.index.bucket(*h).to_vec()).collect();
        let c_hashes = registry.get_claim(c).unwrap().chunk_hashes();
        let untouched: Vec<(Vec<ClaimId>, Vec<ClaimId>)> = hashes
            .iter()
            .zip(buckets_before.iter().zip(buckets_after.iter()))
            .filter(|(h, _)| !c_hashes.contains(h))
            .map(|(_, (before, after))| (before.clone(), after.clone()))
            .collect();
        assert!(!untouched.is_empty());
        for hash in &c_hashes {
            if hashes.contains(hash) {
                assert_eq!(registry.index.bucket(*hash), &[a, c]);
            }
        }
        for (before, after) in untouched {
            assert_eq!(before, after);
        }
        assert_eq!(registry.get_claim(a).unwrap().bounds, Bounds::from_corners(pos(0, 0), pos(40, 40)));
    }

    /// Fails every claim write, delegates everything else
    struct FailingClaimWrites {
        inner: MemoryStorage,
    }

    impl Storage for FailingClaimWrites {
        fn load_claims(&self) -> landclaim_db::Result<Vec<Claim>> {
            self.inner.load_claims()
        }
        fn save_claim(&self, _claim: &Claim) -> landclaim_db::Result<()> {
            Err(landclaim_db::Error::Io(std::io::Error::other("read-only filesystem")))
        }
        fn delete_claim(&self, _id: ClaimId) -> landclaim_db::Result<()> {
            Err(landclaim_db::Error::Io(std::io::Error::other("read-only filesystem")))
        }
        fn load_balances(&self, player: PlayerId) -> landclaim_db::Result<Option<landclaim_core::Balances>> {
            self.inner.load_balances(player)
        }
        fn save_balances(&self, player: PlayerId, balances: &landclaim_core::Balances) -> landclaim_db::Result<()> {
            self.inner.save_balances(player, balances)
        }
        fn load_ignore_list(&self, player: PlayerId) -> landclaim_db::Result<indexmap::IndexMap<PlayerId, bool>> {
            self.inner.load_ignore_list(player)
        }
        fn save_ignore_list(
            &self,
            player: PlayerId,
            ignored: &indexmap::IndexMap<PlayerId, bool>,
        ) -> landclaim_db::Result<()> {
            self.inner.save_ignore_list(player, ignored)
        }
        fn load_group_bonuses(&self) -> landclaim_db::Result<indexmap::IndexMap<String, i32>> {
            self.inner.load_group_bonuses()
        }
        fn save_group_bonus(&self, group: &str, amount: i32) -> landclaim_db::Result<()> {
            self.inner.save_group_bonus(group, amount)
        }
        fn schema_version(&self) -> landclaim_db::Result<u32> {
            self.inner.schema_version()
        }
        fn set_schema_version(&self, version: u32) -> landclaim_db::Result<()> {
            self.inner.set_schema_version(version)
        }
    }

    #[test]
    fn test_write_failures_stay_off_the_caller() {
        let storage = Arc::new(FailingClaimWrites {
            inner: MemoryStorage::new(),
        });
        let mut registry = Registry::open(
            RegistryConfig::default(),
            storage.clone(),
            Arc::new(ManualClock::starting_now()),
            Hooks::new(),
        )
        .unwrap();
        let owner = PlayerId::random();

        let a = registry.create_claim(square(owner, 0, 0, 10, 10)).unwrap();
        registry.resize_claim(a, pos(0, 0), pos(12, 12), None).unwrap();
        registry.flush();
        assert_eq!(registry.get_claim(a).unwrap().width(), 13);
        assert!(storage.inner.load_claims().unwrap().is_empty());

        // The writer is still alive and other records land
        assert_eq!(registry.add_accrued_blocks(owner, 40), 40);
        assert!(registry.delete_claim(a, true, false).is_some());
        registry.flush();
        assert_eq!(storage.inner.load_balances(owner).unwrap().unwrap().accrued, 40);
    }

    #[test]
    fn test_flat_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = RegistryConfig {
            data_dir: dir.path().to_path_buf(),
            ..RegistryConfig::default()
        };
        let owner = PlayerId::random();
        let a = {
            let mut registry =
                Registry::open_flat_file(config.clone(), Arc::new(ManualClock::starting_now()), Hooks::new()).unwrap();
            let a = registry.create_claim(square(owner, -20, -20, 20, 20)).unwrap();
            registry.add_accrued_blocks(owner, 300);
            a
        };

        let registry = Registry::open_flat_file(config, Arc::new(ManualClock::starting_now()), Hooks::new()).unwrap();
        assert_eq!(registry.get_claim(a).unwrap().area(), 41 * 41);
        assert_eq!(registry.loaded_account(owner).balances.accrued, 300);
        assert_eq!(registry.get_claim_at(&Location::new("world", -5, 64, 5), false, None), Some(a));
    }

    #[test]
    fn test_shared_handle() {
        let (registry, _) = open();
        let shared = registry.into_shared();
        let owner = PlayerId::random();
        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || shared.lock().create_claim(square(owner, 0, 0, 5, 5)).is_ok())
        };
        assert!(worker.join().unwrap());
        assert_eq!(shared.lock().claim_count(), 1);
    }
}
