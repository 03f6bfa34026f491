//! Volume lifecycle coordinator.
//!
//! [`VolumeDriver`] is the only component callers talk to. It validates
//! requests, orders the block-file and shared-mount work, heals drift between
//! the records and the live system and persists every successful change
//! before reporting success.

mod coordinator;
mod locks;
mod request;

pub use coordinator::{Capabilities, Scope, VolumeDriver};
