//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Storage implementations (sharded maps with LRU bounds)
//! - Slack and webhook delivery
//! - The cooldown state file
//! - Settings, environment and logging bootstrap

pub mod audit;
pub mod builder;
pub mod classifier;
pub mod clock;
pub mod cooldown_file;
pub mod eviction;
pub mod logging;
pub mod notifier;
pub mod settings;
pub mod storage;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides controllable test doubles for clocks,
/// cooldown stores and delivery collaborators.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// slack-patrol = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
