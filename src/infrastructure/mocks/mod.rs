//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod clock;
pub mod collaborators;
pub mod layer;

pub use clock::MockClock;
pub use collaborators::{MemoryCooldownStore, Post, RecordingAuditSink, RecordingNotifier};
pub use layer::{CapturedEvent, MockCaptureLayer};
