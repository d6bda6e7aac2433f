#![deny(missing_docs)]

//! Defines the data model of the metachannel proxy: repodata documents and
//! their artifact records, channel references, architecture tags and the
//! request constraint language.
//!
//! All types in this crate are plain data. Fetching, graph construction and
//! filtering live in the `metachannel_graph` crate.

mod arch;
mod channel_ref;
mod constraints;
mod record;

pub use arch::{Arch, ParseArchError};
pub use channel_ref::{ChannelRef, ParseChannelRefError};
pub use constraints::{Constraints, FunctionalConstraint};
pub use record::{ArtifactRecord, RepoData};
