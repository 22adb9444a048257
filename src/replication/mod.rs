//! # State Replication
//!
//! Keeps shared mutable game entities synchronized with remote observers
//! without resending unchanged state. Two specializations share the idea
//! "push full state once, then only what changed":
//!
//! - **Baseline/delta entities** ([`group::Group`]): a full-state baseline on
//!   subscribe, then incremental updates addressed to named slots.
//! - **Versioned views** ([`map::MapLocationCache`]): bucketed collections
//!   tagged with per-tier version counters; consumers present the version
//!   they last saw and receive a bucket only if it advanced.

pub mod baseline;
pub mod group;
pub mod map;
pub mod observer;

pub use baseline::BaselineBuilder;
pub use group::{Group, GroupPhase, LootRule, Member, GROUP_CAPACITY};
pub use map::{MapLocationCache, MapTier, TierVersions};
pub use observer::{ObserverSet, ReplicationEvent};
