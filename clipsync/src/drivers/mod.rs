//! Stage drivers: one state transition per invocation.
//!
//! Each driver is a short-lived entry point invoked by an external
//! scheduler. Durable state lives exclusively in the inventory store; a
//! driver acquires the lock only for the brief claim/persist operations
//! bracketing the slow collaborator calls.

pub mod discover;
pub mod publish;
pub mod transform;

pub use discover::DiscoverOutcome;
pub use transform::TransformOutcome;
