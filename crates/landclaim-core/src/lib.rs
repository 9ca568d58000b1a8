//! Landclaim Core - claim geometry, claim tree and spatial index
//!
//! This crate provides the in-memory building blocks of the claim registry:
//! - Block and chunk geometry (`BlockPos`, `Location`, `Bounds`, chunk hashes)
//! - Identifiers (`ClaimId`, `PlayerId`, `SiegeId`) and the claim ID generator
//! - The claim record and the `ClaimStore` arena holding the claim tree
//! - The `ChunkIndex` mapping chunk hashes to claims
//! - Permission levels and trustee keys
//! - Player account records
//! - Wall-clock sources and a tick-based task scheduler
//!
//! Nothing here performs I/O; persistence lives in `landclaim-db` and the
//! orchestration that keeps these pieces consistent lives in
//! `landclaim-registry`.

mod account;
mod claim;
mod error;
pub mod geometry;
mod identity;
mod index;
mod permission;
pub mod schedule;
pub mod time;

pub use account::{Balances, PlayerAccount};
pub use claim::{Claim, ClaimStore};
pub use error::{Error, Result};
pub use geometry::{chunk_hash, BlockPos, Bounds, ChunkPos, Location};
pub use identity::{ClaimId, ClaimIdGenerator, PlayerId, SiegeId};
pub use index::ChunkIndex;
pub use permission::{ClaimPermission, Trustee};
pub use schedule::{Scheduler, TaskHandle, TickScheduler};
pub use time::{Clock, ManualClock, SystemClock, Tick};
