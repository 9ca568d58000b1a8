//! Landclaim Registry - the claim registry service
//!
//! This crate ties the in-memory claim tree from `landclaim-core` to the
//! storage backends in `landclaim-db` and keeps them consistent.
//!
//! ## Architecture
//!
//! ```text
//! Registry (single logical owner, wrap in SharedRegistry to share)
//!  │
//!  ├── ClaimStore + ChunkIndex   claim tree and chunk lookup
//!  ├── AccountCache              lazily loaded player accounts
//!  ├── SiegeBook                 active sieges and cooldowns
//!  ├── Scheduler<RegistryTask>   delayed work, driven by the host
//!  ├── WriteBack                 background persistence
//!  └── Hooks                     host collaborators
//! ```
//!
//! ## Key Components
//!
//! - [`Registry`]: creates, resizes, transfers and deletes claims, answers
//!   location and permission queries, and drives sieges and rescues
//! - [`RegistryConfig`]: RON configuration with defaults for every field
//! - [`Hooks`]: optional host traits for region protection, events,
//!   inventories, permission nodes, siege rules and teleporting

mod accounts;
mod config;
mod error;
mod hooks;
mod registry;
mod siege;
mod tasks;

pub use accounts::AccountCache;
pub use config::RegistryConfig;
pub use error::{Error, Result};
pub use hooks::{
    ClaimEvents, Hooks, InventoryHost, ItemStack, PermissionHost, PetKeeper, RegionGuard,
    RescueHandler, SiegeCheck, SiegeReferee,
};
pub use registry::{NewClaim, Registry, SharedRegistry};
pub use siege::{SiegeOutcome, SiegeRecord, SiegeState};
pub use tasks::RegistryTask;
