//! clipsync library crate.
//!
//! Coordinates a three-stage video pipeline (discover → transform →
//! publish) across independent, short-lived processes. All shared state
//! lives in a lock-file-guarded columnar inventory file; see the
//! `inventory` module for the concurrency contract.

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod drivers;
pub mod error;
pub mod inventory;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
