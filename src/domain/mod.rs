//! Domain layer - pure business logic with no I/O.
//!
//! This layer contains the core concepts of the moderation engine:
//! - Identities and the cooldown / activity keys built from them
//! - Sliding-window activity counting
//! - Inbound message events
//! - Rule decisions and per-event outcomes
//!
//! All types in this layer are plain data and easily testable.

pub mod decision;
pub mod event;
pub mod identity;
pub mod window;
