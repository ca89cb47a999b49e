//! Remote job orchestration and monitoring core.
//!
//! Everything here talks to the cluster through the [`remote::RemoteExecutor`]
//! trait: one command on one host with an explicit timeout. Above that sit
//! the scheduler integration ([`jobs`], [`script`]), the monitoring side
//! ([`resource`], [`progress`], [`anomaly`]) and the suite orchestrator
//! ([`suite`]).

pub mod anomaly;
pub mod error;
pub mod jobs;
pub mod progress;
pub mod remote;
pub mod resource;
pub mod script;
pub mod suite;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ClusterError, ClusterResult};
