//! The inventory: data model, cross-process lock, file-backed store, and
//! record selection queries.

pub mod lock;
pub mod model;
mod query;
pub mod store;

pub use lock::{InventoryLock, LockGuard};
pub use model::{NewVideo, RecordPatch, Transition, VideoRecord, VideoStatus, check_transition};
pub use store::{DuplicateHit, InventoryStore};
