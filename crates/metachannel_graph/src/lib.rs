#![deny(missing_docs)]

//! The artifact-graph engine behind the metachannel proxy.
//!
//! The engine turns upstream repodata documents into dependency graphs over
//! package names, fuses the graphs of several channels into one namespace
//! with a defined precedence order, computes the set of packages transitively
//! required to build a constraint set, and applies optional per-artifact
//! filters before serializing the result back into a repodata document.
//!
//! All state lives behind the [`Metachannel`] handle: an HTTP client, a
//! TTL-bounded raw cache tier of per-channel fetches, and a derived tier of
//! per-request [`ArtifactGraph`]s. Both tiers coalesce concurrent requests so
//! the same repodata is never fetched, and the same derived repository never
//! built, twice at the same time.

pub mod fetch;

mod artifact_graph;
mod blacklist;
mod cache;
mod error;
mod filters;
mod graph;
mod metachannel;
mod repo;
mod warmer;

pub use artifact_graph::ArtifactGraph;
pub use blacklist::BlacklistStore;
pub use cache::CoalescedTtlCache;
pub use error::MetachannelError;
pub use graph::{DepGraph, PackageNode};
pub use metachannel::{Metachannel, MetachannelBuilder, DEFAULT_BASE_URL};
pub use repo::{FusedRepoData, RawRepoData};
pub use warmer::Warmer;
