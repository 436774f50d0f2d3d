//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Activity windows (flood counting)
//! - Cooldown tracker (warning admission)
//! - Rule engine (per-event decisions)
//! - Moderator (warning and audit delivery)
//! - Persistence worker (coalesced snapshots)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod cooldown;
pub mod engine;
pub mod metrics;
pub mod moderator;
pub mod persistence;
pub mod ports;
pub mod window_store;
