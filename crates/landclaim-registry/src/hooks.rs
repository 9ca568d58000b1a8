//! Host collaborators
//!
//! The registry never talks to the game directly. Everything it needs from the
//! host (region protection, event listeners, inventories, permission nodes,
//! siege rules, teleporting) goes through these traits. Every hook is optional;
//! a missing hook means "allow" or "do nothing".

use crate::siege::SiegeRecord;
use landclaim_core::{Bounds, Claim, Location, PlayerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A stack of items carried over from a defeated player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub kind: String,
    pub amount: u32,
}

impl ItemStack {
    pub fn new(kind: impl Into<String>, amount: u32) -> Self {
        Self {
            kind: kind.into(),
            amount,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0 || self.kind.is_empty()
    }
}

/// External region protection that can veto claim boundaries
pub trait RegionGuard: Send + Sync {
    fn can_build(&self, actor: PlayerId, world: &str, bounds: &Bounds) -> bool;
}

/// Claim lifecycle listeners
pub trait ClaimEvents: Send + Sync {
    /// Called before a new claim is registered. Return `false` to cancel.
    fn claim_created(&self, _claim: &Claim, _actor: Option<PlayerId>) -> bool {
        true
    }

    fn claim_modified(&self, _before: &Claim, _after: &Claim, _actor: Option<PlayerId>) {}

    fn claim_deleted(&self, _claim: &Claim) {}
}

/// Releases tamed animals owned by a claim owner
pub trait PetKeeper: Send + Sync {
    fn release_pets(&self, claim: &Claim);
}

/// Player inventories
pub trait InventoryHost: Send + Sync {
    /// Add items to a player's inventory, returning whatever did not fit
    fn give(&self, player: PlayerId, items: Vec<ItemStack>) -> Vec<ItemStack>;

    /// Drop items on the ground where the player stands
    fn drop_at_player(&self, player: PlayerId, items: Vec<ItemStack>);
}

/// Host permission nodes, used for `[group]` trustees and group bonuses
pub trait PermissionHost: Send + Sync {
    fn has_permission(&self, player: PlayerId, node: &str) -> bool;
}

/// Verdict of a siege checkup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiegeCheck {
    /// Keep going and check again later
    Continue,
    /// Resolve now; at least one side should be known
    Ended {
        winner: Option<PlayerId>,
        loser: Option<PlayerId>,
    },
}

/// Decides whether a running siege should resolve
pub trait SiegeReferee: Send + Sync {
    fn checkup(&self, siege: &SiegeRecord) -> SiegeCheck;
}

/// Moves a trapped player somewhere safe
pub trait RescueHandler: Send + Sync {
    fn rescue(&self, player: PlayerId, from: &Location);
}

/// Bundle of optional collaborators handed to the registry
#[derive(Clone, Default)]
pub struct Hooks {
    pub region_guard: Option<Arc<dyn RegionGuard>>,
    pub events: Option<Arc<dyn ClaimEvents>>,
    pub pets: Option<Arc<dyn PetKeeper>>,
    pub inventory: Option<Arc<dyn InventoryHost>>,
    pub permissions: Option<Arc<dyn PermissionHost>>,
    pub referee: Option<Arc<dyn SiegeReferee>>,
    pub rescue: Option<Arc<dyn RescueHandler>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region_guard(mut self, guard: Arc<dyn RegionGuard>) -> Self {
        self.region_guard = Some(guard);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn ClaimEvents>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_pets(mut self, pets: Arc<dyn PetKeeper>) -> Self {
        self.pets = Some(pets);
        self
    }

    pub fn with_inventory(mut self, inventory: Arc<dyn InventoryHost>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionHost>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_referee(mut self, referee: Arc<dyn SiegeReferee>) -> Self {
        self.referee = Some(referee);
        self
    }

    pub fn with_rescue(mut self, rescue: Arc<dyn RescueHandler>) -> Self {
        self.rescue = Some(rescue);
        self
    }

    /// Whether the host grants `node` to `player`; false without a host
    pub(crate) fn has_permission(&self, player: PlayerId, node: &str) -> bool {
        self.permissions
            .as_ref()
            .map(|p| p.has_permission(player, node))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("region_guard", &self.region_guard.is_some())
            .field("events", &self.events.is_some())
            .field("pets", &self.pets.is_some())
            .field("inventory", &self.inventory.is_some())
            .field("permissions", &self.permissions.is_some())
            .field("referee", &self.referee.is_some())
            .field("rescue", &self.rescue.is_some())
            .finish()
    }
}
