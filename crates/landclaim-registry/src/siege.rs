//! Siege state machine
//!
//! A siege moves `Active -> Resolved`. While active, the claims it has drawn
//! in deny building and container access to everyone. A checkup task runs on
//! the scheduler and, after each run, schedules the next one; it is never a
//! fixed repeating timer. When the attacker wins, doors stay open for a
//! looting window and a follow-up task closes them again.

use crate::error::{Error, Result};
use crate::hooks::{ItemStack, SiegeCheck};
use crate::registry::Registry;
use crate::tasks::RegistryTask;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use landclaim_core::{ClaimId, ClaimPermission, PlayerId, SiegeId, TaskHandle};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Siege lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiegeState {
    Active,
    Resolved,
}

/// A running or finished siege
#[derive(Debug, Clone, PartialEq)]
pub struct SiegeRecord {
    pub id: SiegeId,
    pub attacker: PlayerId,
    pub defender: PlayerId,
    /// Claims drawn in, starting with the one the siege began on
    pub claims: Vec<ClaimId>,
    /// Pending checkup task
    pub checkup: Option<TaskHandle>,
    pub started: DateTime<Utc>,
    pub state: SiegeState,
}

/// How a siege ended
#[derive(Debug, Clone, PartialEq)]
pub struct SiegeOutcome {
    pub winner: PlayerId,
    pub loser: PlayerId,
    /// True when the attacker won and doors were opened
    pub doors_opened: bool,
    /// Stacks that did not fit in the winner's inventory and were dropped
    pub dropped: Vec<ItemStack>,
    /// The siege, now resolved
    pub record: SiegeRecord,
}

/// Active sieges and cooldown expiry times
#[derive(Debug, Default)]
pub(crate) struct SiegeBook {
    active: IndexMap<SiegeId, SiegeRecord>,
    next_id: u64,
    /// `(attacker, defender-or-owner)` -> cooldown end
    cooldowns: HashMap<(PlayerId, PlayerId), DateTime<Utc>>,
}

impl SiegeBook {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> SiegeId {
        self.next_id += 1;
        SiegeId(self.next_id)
    }

    fn cooling(&self, attacker: PlayerId, other: PlayerId, now: DateTime<Utc>) -> bool {
        self.cooldowns
            .get(&(attacker, other))
            .map(|end| *end > now)
            .unwrap_or(false)
    }

    fn start_cooldown(&mut self, attacker: PlayerId, other: PlayerId, until: DateTime<Utc>) {
        self.cooldowns.insert((attacker, other), until);
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        self.cooldowns.retain(|_, end| *end > now);
    }
}

impl Registry {
    /// Begin a siege on the top-level claim containing `claim`.
    pub fn start_siege(&mut self, attacker: PlayerId, defender: PlayerId, claim: ClaimId) -> Result<SiegeId> {
        let target = self.claims.get(claim).ok_or(Error::ClaimNotFound(claim))?;
        let top_id = target.parent.unwrap_or(claim);
        let top = self.claims.get(top_id).ok_or(Error::ClaimNotFound(top_id))?;

        if top.is_admin() {
            return Err(Error::SiegeUnavailable("administrative claims cannot be sieged"));
        }
        if top.siege.is_some() {
            return Err(Error::SiegeUnavailable("claim is already under siege"));
        }
        let busy = |player| {
            self.accounts
                .cached(player)
                .map(|a| a.siege.is_some())
                .unwrap_or(false)
        };
        if busy(attacker) || busy(defender) {
            return Err(Error::SiegeUnavailable("player is already in a siege"));
        }
        if self.on_cooldown(attacker, defender, Some(top_id)) {
            return Err(Error::SiegeUnavailable("siege cooldown has not expired"));
        }

        let id = self.sieges.next_id();
        let handle = self
            .scheduler
            .schedule(self.config.siege_checkup_ticks, RegistryTask::SiegeCheckup(id));
        let record = SiegeRecord {
            id,
            attacker,
            defender,
            claims: vec![top_id],
            checkup: Some(handle),
            started: self.clock.now(),
            state: SiegeState::Active,
        };
        self.sieges.active.insert(id, record);

        for player in [attacker, defender] {
            self.accounts.entry(player, &self.claims).siege = Some(id);
        }
        if let Some(top) = self.claims.get_mut(top_id) {
            top.siege = Some(id);
        }
        info!(siege = %id, attacker = %attacker, defender = %defender, claim = %top_id, "siege started");
        Ok(id)
    }

    pub fn siege(&self, id: SiegeId) -> Option<&SiegeRecord> {
        self.sieges.active.get(&id)
    }

    /// Active sieges, oldest first
    pub fn sieges(&self) -> impl Iterator<Item = &SiegeRecord> {
        self.sieges.active.values()
    }

    /// Draw another claim into the siege `player` is part of.
    ///
    /// Only claims where the player has standing access can be drawn in, and
    /// never administrative claims or claims already in a siege.
    pub fn try_extend_siege(&mut self, player: PlayerId, claim: ClaimId) -> bool {
        let Some(siege_id) = self.accounts.cached(player).and_then(|a| a.siege) else {
            return false;
        };
        let Some(target) = self.claims.get(claim) else {
            return false;
        };
        let top_id = target.parent.unwrap_or(claim);
        let Some(top) = self.claims.get(top_id) else {
            return false;
        };
        let already_drawn = self
            .sieges
            .active
            .get(&siege_id)
            .map(|s| s.claims.contains(&top_id))
            .unwrap_or(true);
        if already_drawn || top.is_admin() || top.siege.is_some() {
            return false;
        }
        if !self.check_permission(top_id, player, ClaimPermission::Access) {
            return false;
        }

        if let Some(record) = self.sieges.active.get_mut(&siege_id) {
            record.claims.push(top_id);
        }
        if let Some(top) = self.claims.get_mut(top_id) {
            top.siege = Some(siege_id);
        }
        debug!(siege = %siege_id, claim = %top_id, "siege extended");
        true
    }

    /// Resolve a siege. At most one of `winner` and `loser` may be unknown.
    ///
    /// `drops` carries the loser's inventory when the siege ended in a
    /// death; it goes to the winner, with any overflow dropped at the
    /// winner's feet.
    pub fn end_siege(
        &mut self,
        id: SiegeId,
        winner: Option<PlayerId>,
        loser: Option<PlayerId>,
        drops: Option<Vec<ItemStack>>,
    ) -> Result<SiegeOutcome> {
        let record = self.sieges.active.get(&id).ok_or(Error::SiegeNotFound(id))?;
        let other = |p: PlayerId| {
            if p == record.attacker {
                record.defender
            } else {
                record.attacker
            }
        };
        let (winner, loser) = match (winner, loser) {
            (Some(w), Some(l)) => (w, l),
            (Some(w), None) => (w, other(w)),
            (None, Some(l)) => (other(l), l),
            (None, None) => return Err(Error::SiegeOutcomeUnknown),
        };

        let mut record = self
            .sieges
            .active
            .shift_remove(&id)
            .ok_or(Error::SiegeNotFound(id))?;
        record.state = SiegeState::Resolved;
        let attacker_won = winner == record.attacker;
        let now = self.clock.now();
        let cooldown_end = now + Duration::minutes(self.config.siege_cooldown_minutes);

        self.accounts.entry(record.attacker, &self.claims).siege = None;
        {
            let mut defender = self.accounts.entry(record.defender, &self.claims);
            defender.siege = None;
            defender.last_siege_end = Some(now);
        }

        self.sieges.prune(now);
        self.sieges
            .start_cooldown(record.attacker, record.defender, cooldown_end);
        for claim_id in &record.claims {
            let Some(claim) = self.claims.get_mut(*claim_id) else {
                continue;
            };
            claim.siege = None;
            if attacker_won {
                claim.doors_open = true;
            }
            if let Some(owner) = claim.owner {
                self.sieges.start_cooldown(record.attacker, owner, cooldown_end);
            }
        }

        if let Some(handle) = record.checkup.take() {
            self.scheduler.cancel(handle);
        }
        if attacker_won {
            self.scheduler.schedule(
                self.config.doors_open_ticks(),
                RegistryTask::SecureClaims(record.claims.clone()),
            );
        }

        let dropped = match drops {
            Some(drops) => self.hand_over_drops(winner, drops),
            None => Vec::new(),
        };

        info!(siege = %id, winner = %winner, loser = %loser, attacker_won, "siege ended");
        Ok(SiegeOutcome {
            winner,
            loser,
            doors_opened: attacker_won,
            dropped,
            record,
        })
    }

    fn hand_over_drops(&self, winner: PlayerId, drops: Vec<ItemStack>) -> Vec<ItemStack> {
        let drops: Vec<ItemStack> = drops.into_iter().filter(|s| !s.is_empty()).collect();
        if drops.is_empty() {
            return drops;
        }
        let Some(inventory) = &self.hooks.inventory else {
            warn!(player = %winner, stacks = drops.len(), "no inventory host, siege drops discarded");
            return Vec::new();
        };
        let overflow = inventory.give(winner, drops);
        if !overflow.is_empty() {
            inventory.drop_at_player(winner, overflow.clone());
        }
        overflow
    }

    /// Whether any cooldown blocks `attacker` from sieging `defender` (on
    /// `claim`, if given).
    pub fn on_cooldown(&self, attacker: PlayerId, defender: PlayerId, claim: Option<ClaimId>) -> bool {
        let now = self.clock.now();
        if self.sieges.cooling(attacker, defender, now) {
            return true;
        }

        let defender_guard = Duration::minutes(self.config.siege_defender_cooldown_minutes);
        let recently_defended = self
            .accounts
            .cached(defender)
            .and_then(|a| a.last_siege_end)
            .map(|end| now < end + defender_guard)
            .unwrap_or(false);
        if recently_defended {
            return true;
        }

        claim
            .and_then(|id| self.claims.get(id))
            .and_then(|c| c.owner)
            .map(|owner| self.sieges.cooling(attacker, owner, now))
            .unwrap_or(false)
    }

    pub(crate) fn run_siege_checkup(&mut self, id: SiegeId) {
        let Some(record) = self.sieges.active.get(&id) else {
            return;
        };
        let verdict = match &self.hooks.referee {
            Some(referee) => referee.checkup(record),
            None => SiegeCheck::Continue,
        };
        if let SiegeCheck::Ended { winner, loser } = verdict {
            match self.end_siege(id, winner, loser, None) {
                Ok(_) => return,
                Err(e) => warn!(siege = %id, error = %e, "siege checkup could not resolve, continuing"),
            }
        }
        let handle = self
            .scheduler
            .schedule(self.config.siege_checkup_ticks, RegistryTask::SiegeCheckup(id));
        if let Some(record) = self.sieges.active.get_mut(&id) {
            record.checkup = Some(handle);
        }
    }

    /// Close the looting window on claims from an ended siege
    pub(crate) fn secure_claims(&mut self, claims: &[ClaimId]) {
        for id in claims {
            if let Some(claim) = self.claims.get_mut(*id) {
                claim.doors_open = false;
            }
        }
        debug!(claims = claims.len(), "claims secured");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::hooks::{Hooks, InventoryHost, SiegeReferee};
    use crate::registry::NewClaim;
    use landclaim_core::{BlockPos, ManualClock};
    use landclaim_db::MemoryStorage;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Fixture {
        registry: Registry,
        clock: Arc<ManualClock>,
        attacker: PlayerId,
        defender: PlayerId,
        claim: ClaimId,
    }

    fn fixture(hooks: Hooks) -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let mut registry = Registry::open(
            RegistryConfig::default(),
            Arc::new(MemoryStorage::new()),
            clock.clone(),
            hooks,
        )
        .unwrap();
        let attacker = PlayerId::random();
        let defender = PlayerId::random();
        let claim = registry
            .create_claim(NewClaim::new(
                "world",
                BlockPos::new(0, 64, 0),
                BlockPos::new(20, 64, 20),
                Some(defender),
            ))
            .unwrap();
        Fixture {
            registry,
            clock,
            attacker,
            defender,
            claim,
        }
    }

    /// Holds at most `capacity` stacks
    struct SmallBag {
        capacity: usize,
        held: Mutex<Vec<ItemStack>>,
        dropped: Mutex<Vec<ItemStack>>,
    }

    impl InventoryHost for SmallBag {
        fn give(&self, _player: PlayerId, mut items: Vec<ItemStack>) -> Vec<ItemStack> {
            let mut held = self.held.lock();
            let room = self.capacity.saturating_sub(held.len()).min(items.len());
            held.extend(items.drain(..room));
            items
        }

        fn drop_at_player(&self, _player: PlayerId, items: Vec<ItemStack>) {
            self.dropped.lock().extend(items);
        }
    }

    struct EndsWith(Option<PlayerId>);

    impl SiegeReferee for EndsWith {
        fn checkup(&self, _siege: &SiegeRecord) -> SiegeCheck {
            match self.0 {
                Some(winner) => SiegeCheck::Ended {
                    winner: Some(winner),
                    loser: None,
                },
                None => SiegeCheck::Continue,
            }
        }
    }

    #[test]
    fn test_siege_locks_claim() {
        let mut f = fixture(Hooks::new());
        let siege = f.registry.start_siege(f.attacker, f.defender, f.claim).unwrap();

        assert_eq!(f.registry.get_claim(f.claim).unwrap().siege, Some(siege));
        assert_eq!(f.registry.account(f.attacker).siege, Some(siege));
        assert_eq!(f.registry.account(f.defender).siege, Some(siege));
        assert_eq!(f.registry.siege(siege).unwrap().state, SiegeState::Active);
        // Even the owner cannot build or loot during a siege
        assert!(!f.registry.check_permission(f.claim, f.defender, ClaimPermission::Build));
        assert!(f.registry.check_permission(f.claim, f.defender, ClaimPermission::Access));

        assert!(matches!(
            f.registry.start_siege(f.attacker, f.defender, f.claim),
            Err(Error::SiegeUnavailable(_))
        ));
    }

    #[test]
    fn test_admin_claim_cannot_be_sieged() {
        let mut f = fixture(Hooks::new());
        let admin = f
            .registry
            .create_claim(NewClaim::new("world", BlockPos::new(100, 0, 100), BlockPos::new(110, 0, 110), None))
            .unwrap();
        assert!(f.registry.start_siege(f.attacker, f.defender, admin).is_err());
    }

    #[test]
    fn test_end_infers_winner() {
        let mut f = fixture(Hooks::new());
        let siege = f.registry.start_siege(f.attacker, f.defender, f.claim).unwrap();

        assert!(matches!(
            f.registry.end_siege(siege, None, None, None),
            Err(Error::SiegeOutcomeUnknown)
        ));
        let outcome = f.registry.end_siege(siege, None, Some(f.attacker), None).unwrap();
        assert_eq!(outcome.winner, f.defender);
        assert!(!outcome.doors_opened);
        assert_eq!(outcome.record.state, SiegeState::Resolved);

        assert!(f.registry.siege(siege).is_none());
        assert_eq!(f.registry.get_claim(f.claim).unwrap().siege, None);
        assert_eq!(f.registry.account(f.attacker).siege, None);
        assert!(f.registry.account(f.defender).last_siege_end.is_some());
        assert!(matches!(
            f.registry.end_siege(siege, Some(f.attacker), None, None),
            Err(Error::SiegeNotFound(_))
        ));
    }

    #[test]
    fn test_attacker_win_opens_then_secures_doors() {
        let mut f = fixture(Hooks::new());
        let siege = f.registry.start_siege(f.attacker, f.defender, f.claim).unwrap();
        let outcome = f.registry.end_siege(siege, Some(f.attacker), None, None).unwrap();
        assert!(outcome.doors_opened);
        assert_eq!(outcome.loser, f.defender);

        let looter = PlayerId::random();
        assert!(f.registry.check_permission(f.claim, looter, ClaimPermission::Inventory));
        assert!(!f.registry.check_permission(f.claim, looter, ClaimPermission::Build));

        let window = f.registry.config().doors_open_ticks();
        f.registry.advance_ticks(window - 1);
        assert!(f.registry.get_claim(f.claim).unwrap().doors_open);
        f.registry.advance_ticks(1);
        assert!(!f.registry.get_claim(f.claim).unwrap().doors_open);
        assert!(!f.registry.check_permission(f.claim, looter, ClaimPermission::Inventory));
    }

    #[test]
    fn test_cooldowns() {
        let mut f = fixture(Hooks::new());
        let siege = f.registry.start_siege(f.attacker, f.defender, f.claim).unwrap();
        f.registry.end_siege(siege, Some(f.defender), None, None).unwrap();

        // Pair cooldown
        assert!(f.registry.on_cooldown(f.attacker, f.defender, None));

        // Blanket defender cooldown applies to anyone
        let someone = PlayerId::random();
        assert!(f.registry.on_cooldown(someone, f.defender, None));
        f.clock.advance(Duration::minutes(16));
        assert!(!f.registry.on_cooldown(someone, f.defender, None));

        // Attacker vs claim owner, reached through a different defender
        let tenant = PlayerId::random();
        assert!(f.registry.on_cooldown(f.attacker, tenant, Some(f.claim)));
        assert!(!f.registry.on_cooldown(f.attacker, tenant, None));

        f.clock.advance(Duration::minutes(45));
        assert!(!f.registry.on_cooldown(f.attacker, f.defender, Some(f.claim)));
        assert!(f.registry.start_siege(f.attacker, f.defender, f.claim).is_ok());
    }

    #[test]
    fn test_checkup_reschedules_until_referee_ends() {
        let mut f = fixture(Hooks::new().with_referee(Arc::new(EndsWith(None))));
        let siege = f.registry.start_siege(f.attacker, f.defender, f.claim).unwrap();
        let interval = f.registry.config().siege_checkup_ticks;

        let first = f.registry.siege(siege).unwrap().checkup;
        f.registry.advance_ticks(interval);
        let second = f.registry.siege(siege).unwrap().checkup;
        assert!(second.is_some());
        assert_ne!(first, second);
        assert_eq!(f.registry.pending_tasks(), 1);

        let mut g = fixture(Hooks::new());
        let attacker = g.attacker;
        g.registry.hooks = Hooks::new().with_referee(Arc::new(EndsWith(Some(attacker))));
        let siege = g.registry.start_siege(g.attacker, g.defender, g.claim).unwrap();
        g.registry.advance_ticks(interval);
        assert!(g.registry.siege(siege).is_none());
        assert!(g.registry.get_claim(g.claim).unwrap().doors_open);
    }

    #[test]
    fn test_drops_go_to_winner() {
        let bag = Arc::new(SmallBag {
            capacity: 2,
            held: Mutex::new(Vec::new()),
            dropped: Mutex::new(Vec::new()),
        });
        let mut f = fixture(Hooks::new().with_inventory(bag.clone()));
        let siege = f.registry.start_siege(f.attacker, f.defender, f.claim).unwrap();
        let drops = vec![
            ItemStack::new("diamond", 3),
            ItemStack::new("air", 0),
            ItemStack::new("iron_ingot", 12),
            ItemStack::new("bread", 5),
        ];
        let outcome = f
            .registry
            .end_siege(siege, None, Some(f.defender), Some(drops))
            .unwrap();

        assert_eq!(bag.held.lock().len(), 2);
        assert_eq!(*bag.dropped.lock(), vec![ItemStack::new("bread", 5)]);
        assert_eq!(outcome.dropped, vec![ItemStack::new("bread", 5)]);
    }

    #[test]
    fn test_extend_siege() {
        let mut f = fixture(Hooks::new());
        let other = f
            .registry
            .create_claim(NewClaim::new(
                "world",
                BlockPos::new(100, 64, 0),
                BlockPos::new(120, 64, 20),
                Some(PlayerId::random()),
            ))
            .unwrap();
        let own = f
            .registry
            .create_claim(NewClaim::new(
                "world",
                BlockPos::new(200, 64, 0),
                BlockPos::new(220, 64, 20),
                Some(f.defender),
            ))
            .unwrap();

        // Not in a siege yet
        assert!(!f.registry.try_extend_siege(f.defender, own));

        let siege = f.registry.start_siege(f.attacker, f.defender, f.claim).unwrap();
        assert!(!f.registry.try_extend_siege(f.defender, other));
        assert!(f.registry.try_extend_siege(f.defender, own));
        assert!(!f.registry.try_extend_siege(f.defender, own));
        assert_eq!(f.registry.siege(siege).unwrap().claims, vec![f.claim, own]);
        assert_eq!(f.registry.get_claim(own).unwrap().siege, Some(siege));
    }
}
