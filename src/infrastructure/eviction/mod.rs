//! Eviction policy adapters.
//!
//! Concrete implementations of the `EvictionPolicy` port that bound the
//! number of tracked identities.

pub mod lru;

pub use lru::LruEviction;
