//! Delayed registry work
//!
//! Tasks sit in the registry's [`Scheduler`](landclaim_core::Scheduler) until
//! the host advances time past their due tick.

use crate::error::{Error, Result};
use crate::registry::Registry;
use landclaim_core::{ClaimId, ClaimPermission, Location, PlayerId, SiegeId, TaskHandle, Tick};
use tracing::{debug, info};

/// Work the registry schedules for later
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryTask {
    /// Ask the referee whether a siege is over
    SiegeCheckup(SiegeId),
    /// Close doors opened by a won siege
    SecureClaims(Vec<ClaimId>),
    /// Move a trapped player out of a claim
    Rescue { player: PlayerId, from: Location },
}

impl Registry {
    /// Move scheduled time forward and run every task that came due.
    ///
    /// Returns the number of tasks run. Tasks scheduled while running wait
    /// for a later call.
    pub fn advance_ticks(&mut self, ticks: Tick) -> usize {
        let due = self.scheduler.advance(ticks);
        let count = due.len();
        for task in due {
            self.run_task(task);
        }
        count
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    fn run_task(&mut self, task: RegistryTask) {
        debug!(?task, "running task");
        match task {
            RegistryTask::SiegeCheckup(id) => self.run_siege_checkup(id),
            RegistryTask::SecureClaims(claims) => self.secure_claims(&claims),
            RegistryTask::Rescue { player, from } => match &self.hooks.rescue {
                Some(handler) => handler.rescue(player, &from),
                None => debug!(player = %player, "no rescue handler, rescue dropped"),
            },
        }
    }

    /// Schedule a rescue for a player stuck inside someone else's claim.
    ///
    /// Fails with [`Error::NotTrapped`] when the player is outside every
    /// claim or may build where they stand.
    pub fn request_rescue(&mut self, player: PlayerId, location: Location) -> Result<TaskHandle> {
        let claim = self
            .get_claim_at(&location, false, None)
            .ok_or(Error::NotTrapped)?;
        if self.check_permission(claim, player, ClaimPermission::Build) {
            return Err(Error::NotTrapped);
        }
        let is_admin = self.claims.get(claim).map(|c| c.is_admin()).unwrap_or(false);
        if is_admin && !self.config.allow_trapped_in_admin_claims {
            return Err(Error::RescueUnavailable);
        }

        info!(player = %player, claim = %claim, "rescue scheduled");
        Ok(self.scheduler.schedule(
            self.config.rescue_delay_ticks,
            RegistryTask::Rescue {
                player,
                from: location,
            },
        ))
    }
}
