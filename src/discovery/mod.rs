//! Pod annotation autodiscovery
//!
//! Pods carry input configurations in their annotations. Each distinct
//! configuration (by MD5 of its canonical text) is registered once in a
//! [`DiscoveryRegistry`] and its inputs are started on the shared task
//! tracker.

pub mod annotations;
pub mod engine;
pub mod registry;

pub use annotations::{canonicalize, config_hash, discover, DiscoveredConfig};
pub use engine::{Autodiscovery, ScanReport};
pub use registry::{DiscoveryEntry, DiscoveryRegistry};
