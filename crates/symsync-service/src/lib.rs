//! Retrieves, caches and serves the binaries and debug symbols of labeled builds.
//!
//! The [`facade::CrashSyncFacade`] resolves a build identifier to a source-control label,
//! checks the on-disk [`caching::CacheStore`] and, on a miss, stages the artifacts through the
//! [`sync::ArtifactSyncer`] before registering them as a new cache entry.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod facade;
pub mod logging;
pub mod sync;
pub mod types;
pub mod vcs;
