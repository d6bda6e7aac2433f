//! Raw and fused per-arch repositories.

use std::sync::Arc;

use metachannel_types::Arch;
use url::Url;

use crate::graph::DepGraph;

/// The graph-ified result of one (channel, arch, variant) fetch.
///
/// Immutable once constructed; owned by the raw cache tier and shared with
/// every fusion that needs it.
#[derive(Debug, Clone)]
pub struct RawRepoData {
    /// The channel the document was fetched from.
    pub channel: String,

    /// The arch of the document.
    pub arch: Arch,

    /// The upstream prefix artifact urls were joined onto.
    pub url_prefix: Url,

    /// The dependency graph of the document.
    pub graph: DepGraph,
}

/// An ordered set of repodatas treated as a single repository.
///
/// Artifacts in earlier repodatas take precedence. Never cached: fusing
/// cached raws is cheap compared to fetching them.
#[derive(Debug, Clone)]
pub struct FusedRepoData {
    /// The arch shared by all component repodatas.
    pub arch: Arch,

    /// The component channels in precedence order; blacklist lookup walks
    /// these.
    pub component_channels: Vec<String>,

    /// The composed graph.
    pub graph: DepGraph,
}

impl FusedRepoData {
    /// Composes the given repodatas, earliest (highest precedence) first.
    pub fn fuse(raws: &[Arc<RawRepoData>], arch: Arch) -> FusedRepoData {
        tracing::debug!("fusing {} repodatas for {arch}", raws.len());
        let mut component_channels = Vec::with_capacity(raws.len());
        let mut graph = DepGraph::default();
        for (i, raw) in raws.iter().enumerate() {
            component_channels.push(raw.channel.clone());
            graph = if i == 0 {
                raw.graph.clone()
            } else {
                graph.compose(&raw.graph)
            };
        }
        FusedRepoData {
            arch,
            component_channels,
            graph,
        }
    }
}
