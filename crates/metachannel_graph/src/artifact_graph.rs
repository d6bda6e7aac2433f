//! The per-request derived repository.

use std::{
    collections::BTreeMap,
    io::Write,
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use metachannel_types::{Arch, ChannelRef, Constraints, FunctionalConstraint, RepoData};
use parking_lot::Mutex;
use url::Url;

use crate::{
    blacklist::BlacklistStore, error::MetachannelError, fetch::Variant, filters, graph::DepGraph,
    repo::FusedRepoData,
};

/// A value memoized for a bounded time. The lock is held while the value is
/// produced, so concurrent callers of the same serialization coalesce.
#[derive(Debug)]
struct TtlMemo<T: Clone> {
    slot: Mutex<Option<(Instant, T)>>,
    ttl: Duration,
}

impl<T: Clone> TtlMemo<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    fn get_or_insert_with(&self, produce: impl FnOnce() -> T) -> T {
        let mut slot = self.slot.lock();
        if let Some((at, value)) = slot.as_ref() {
            if at.elapsed() < self.ttl {
                return value.clone();
            }
        }
        let value = produce();
        *slot = Some((Instant::now(), value.clone()));
        value
    }

    fn get_or_try_insert_with<E>(
        &self,
        produce: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut slot = self.slot.lock();
        if let Some((at, value)) = slot.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
        }
        let value = produce()?;
        *slot = Some((Instant::now(), value.clone()));
        Ok(value)
    }
}

/// The derived result of one request: a constrained view over the fused
/// graph of the requested channels, plus memoized serializations of it.
///
/// Construction, filtering and serialization are CPU bound and synchronous;
/// callers run them on a worker. Once published into the derived cache tier
/// an instance is immutable apart from its internal memos.
#[derive(Debug)]
pub struct ArtifactGraph {
    channels: ChannelRef,
    arch: Arch,
    variant: Variant,
    constraints: Constraints,
    component_channels: Vec<String>,
    constrained_graph: DepGraph,
    blacklists: Arc<BlacklistStore>,
    dict: TtlMemo<Arc<RepoData>>,
    json: TtlMemo<Arc<str>>,
    bzip: TtlMemo<Bytes>,
}

impl ArtifactGraph {
    /// Builds the constrained graph of a request from its fused per-arch
    /// repository and the auxiliary (normally `noarch`) repository that is
    /// resolved along with it.
    pub(crate) fn new(
        channels: ChannelRef,
        arch: Arch,
        variant: Variant,
        constraints: Constraints,
        fused: FusedRepoData,
        auxiliary: FusedRepoData,
        blacklists: Arc<BlacklistStore>,
        memo_ttl: Duration,
    ) -> ArtifactGraph {
        let combined = fused.graph.compose(&auxiliary.graph);
        let constrained_graph = if constraints.packages.is_empty() {
            combined
        } else {
            let closure = combined.recursive_parents(constraints.packages.iter().cloned());
            combined.subgraph(&closure)
        };
        ArtifactGraph {
            channels,
            arch,
            variant,
            constraints,
            component_channels: fused.component_channels,
            constrained_graph,
            blacklists,
            dict: TtlMemo::new(memo_ttl),
            json: TtlMemo::new(memo_ttl),
            bzip: TtlMemo::new(memo_ttl),
        }
    }

    /// The channels of the request, in precedence order.
    pub fn channels(&self) -> &ChannelRef {
        &self.channels
    }

    /// The arch of the request.
    pub fn arch(&self) -> &Arch {
        &self.arch
    }

    /// The upstream variant the request resolved.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// The constrained graph backing this repository.
    pub fn graph(&self) -> &DepGraph {
        &self.constrained_graph
    }

    /// The derived repodata document: for every node the artifact map of the
    /// request arch, run through the filter pipeline and unioned into a
    /// single `packages` map.
    ///
    /// Only the request arch is surfaced; artifacts a node carries under
    /// other arches (including `noarch`) are served by their own requests.
    pub fn repodata_json_dict(&self) -> Arc<RepoData> {
        self.dict.get_or_insert_with(|| Arc::new(self.build_dict()))
    }

    fn build_dict(&self) -> RepoData {
        let mut all_packages = BTreeMap::new();

        // A fixed node order makes cross-node filename collisions (malformed
        // upstream data) resolve deterministically: later names win.
        let mut names: Vec<&str> = self.constrained_graph.names().collect();
        names.sort_unstable();

        for name in names {
            let Some(node) = self.constrained_graph.node(name) else {
                continue;
            };
            let Some(packages) = node.artifacts_for(&self.arch) else {
                continue;
            };

            let mut packages = packages.clone();
            if self.constraints.has(FunctionalConstraint::MaxBuildNo) {
                packages = filters::constrain_by_build_number(&packages);
            }
            if self.constraints.has(FunctionalConstraint::UntrackFeatures) {
                packages = filters::untrack_features(&packages);
            }
            for blacklist_name in self.constraints.values(FunctionalConstraint::Blacklist) {
                let blacklist = self.blacklists.effective(
                    blacklist_name,
                    &self.component_channels,
                    &self.arch,
                );
                packages = filters::constrain_by_blacklist(&packages, &blacklist);
            }

            all_packages.extend(packages);
        }

        RepoData {
            packages: all_packages,
        }
    }

    /// The document serialized as JSON text. Deterministic: the `packages`
    /// map is keyed lexicographically by filename.
    pub fn repodata_json(&self) -> Result<Arc<str>, MetachannelError> {
        self.json.get_or_try_insert_with(|| {
            let dict = self.repodata_json_dict();
            serde_json::to_string(dict.as_ref())
                .map(Arc::from)
                .map_err(|err| {
                    MetachannelError::Internal(format!("failed to serialize repodata: {err}"))
                })
        })
    }

    /// The JSON text compressed with bzip2 at level 1.
    pub fn repodata_json_bzip(&self) -> Result<Bytes, MetachannelError> {
        self.bzip.get_or_try_insert_with(|| {
            let json = self.repodata_json()?;
            let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
            encoder
                .write_all(json.as_bytes())
                .and_then(|()| encoder.finish())
                .map(Bytes::from)
                .map_err(|err| {
                    MetachannelError::Internal(format!("failed to compress repodata: {err}"))
                })
        })
    }

    /// The upstream download url of an artifact present in the current
    /// document.
    pub fn lookup_url(&self, filename: &str) -> Result<Url, MetachannelError> {
        let dict = self.repodata_json_dict();
        let record = dict
            .packages
            .get(filename)
            .ok_or_else(|| MetachannelError::ArtifactNotFound(filename.to_string()))?;
        record
            .url
            .clone()
            .ok_or_else(|| MetachannelError::Internal(format!("artifact {filename} has no url")))
    }
}
