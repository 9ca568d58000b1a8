//! Landclaim DB - persistence for claims and player accounts
//!
//! Provides:
//! - The `Storage` capability every backend implements
//! - A flat-file backend (RON claim records, text player records)
//! - A native_db backend with typed models
//! - An in-memory backend for tests and embedding
//! - A background `WriteBack` worker so callers never wait on disk
//! - Soft mute and banned word lists

mod error;
mod flat_file;
mod lists;
mod memory;
mod native;
mod record;
mod storage;
mod writeback;

pub use error::{Error, Result};
pub use flat_file::FlatFileStorage;
pub use lists::{load_banned_words, SoftMutes, BANNED_WORDS_FILE, SOFT_MUTE_FILE};
pub use memory::MemoryStorage;
pub use native::NativeDbStorage;
pub use record::{ClaimRecord, NO_PARENT};
pub use storage::{Storage, LATEST_SCHEMA_VERSION};
pub use writeback::WriteBack;
