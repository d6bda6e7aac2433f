//! The engine handle: owns the HTTP client, the configuration and both cache
//! tiers.

use std::{path::PathBuf, sync::Arc, time::Duration};

use futures::future::try_join_all;
use metachannel_types::{Arch, ChannelRef, Constraints};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use url::Url;

use crate::{
    artifact_graph::ArtifactGraph,
    blacklist::BlacklistStore,
    cache::CoalescedTtlCache,
    error::MetachannelError,
    fetch::{self, FetchRepoDataError, Variant},
    graph::DepGraph,
    repo::{FusedRepoData, RawRepoData},
    warmer::Warmer,
};

/// The default upstream prefix channels are fetched from.
pub const DEFAULT_BASE_URL: &str = "https://conda.anaconda.org";

const DEFAULT_TTL: Duration = Duration::from_secs(600);
const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_BLACKLIST_DIR: &str = "blacklists";

/// Central access point of the artifact-graph engine.
///
/// The handle deduplicates concurrent work: requests for the same upstream
/// repodata or the same derived repository only build once while every other
/// caller waits for the in-flight result. It is cheaply cloneable and can be
/// shared between threads; all state is owned by the handle, there is no
/// process-global state.
#[derive(Clone)]
pub struct Metachannel {
    inner: Arc<MetachannelInner>,
}

struct MetachannelInner {
    /// The client used for upstream fetches; carries the fetch timeout.
    client: ClientWithMiddleware,

    /// The upstream prefix channels are fetched from.
    base_url: Url,

    /// TTL shared by both tiers and the serialization memos.
    ttl: Duration,

    /// Raw tier: one entry per upstream (channel, arch, variant) fetch.
    raw: CoalescedTtlCache<RawKey, Arc<RawRepoData>, FetchRepoDataError>,

    /// Derived tier: one entry per request key.
    derived: CoalescedTtlCache<DerivedKey, Arc<ArtifactGraph>, MetachannelError>,

    /// Blacklist configuration store.
    blacklists: Arc<BlacklistStore>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RawKey {
    channel: String,
    arch: Arch,
    variant: Variant,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DerivedKey {
    channels: ChannelRef,
    arch: Arch,
    /// The raw constraint entries, sorted, so equivalent requests share an
    /// entry regardless of ordering.
    constraints: Vec<String>,
    variant: Variant,
}

impl Default for Metachannel {
    fn default() -> Self {
        Metachannel::new()
    }
}

impl Metachannel {
    /// Constructs an engine with the default configuration. Use
    /// [`Metachannel::builder`] for more control.
    pub fn new() -> Self {
        Metachannel::builder().finish()
    }

    /// Returns a builder to configure the engine.
    pub fn builder() -> MetachannelBuilder {
        MetachannelBuilder::default()
    }

    /// The fused repository of the given channels for one arch.
    ///
    /// Raw per-channel fetches go through the raw cache tier and run
    /// concurrently; the fusion itself is recomputed per call.
    pub async fn repo_data(
        &self,
        channels: &ChannelRef,
        arch: &Arch,
        variant: Variant,
    ) -> Result<FusedRepoData, MetachannelError> {
        let raws = try_join_all(
            channels
                .iter()
                .map(|channel| self.raw_repo_data(channel, arch, variant)),
        )
        .await?;

        let arch = arch.clone();
        let fused = tokio::task::spawn_blocking(move || FusedRepoData::fuse(&raws, arch))
            .await
            .map_err(FetchRepoDataError::from)?;
        Ok(fused)
    }

    async fn raw_repo_data(
        &self,
        channel: &str,
        arch: &Arch,
        variant: Variant,
    ) -> Result<Arc<RawRepoData>, FetchRepoDataError> {
        let key = RawKey {
            channel: channel.to_string(),
            arch: arch.clone(),
            variant,
        };
        let inner = &self.inner;
        inner
            .raw
            .get_or_try_init(key, || {
                let channel = channel.to_string();
                let arch = arch.clone();
                async move {
                    let fetched =
                        fetch::fetch_repo_data(&inner.client, &inner.base_url, &channel, &arch, variant)
                            .await?;
                    let raw = tokio::task::spawn_blocking(move || {
                        let graph =
                            DepGraph::from_repodata(fetched.repo_data, &arch, &fetched.url_prefix);
                        Arc::new(RawRepoData {
                            channel,
                            arch,
                            url_prefix: fetched.url_prefix,
                            graph,
                        })
                    })
                    .await?;
                    Ok(raw)
                }
            })
            .await
    }

    /// The derived repository of one request.
    ///
    /// Concurrent requests for the same (channels, arch, constraints,
    /// variant) share a single construction; a construction failure is
    /// observed by every waiter and leaves no negative cache entry behind.
    pub async fn artifact_graph(
        &self,
        channels: ChannelRef,
        arch: Arch,
        constraints: Vec<String>,
        variant: Variant,
    ) -> Result<Arc<ArtifactGraph>, MetachannelError> {
        let mut sorted = constraints.clone();
        sorted.sort();
        let key = DerivedKey {
            channels: channels.clone(),
            arch: arch.clone(),
            constraints: sorted,
            variant,
        };

        self.inner
            .derived
            .get_or_try_init(key, || async move {
                let fused = self.repo_data(&channels, &arch, variant).await?;

                // The auxiliary repodata mirrors what a downstream resolve
                // consumes next to the requested arch: noarch, or linux-64
                // as the stand-in when noarch itself was requested.
                let auxiliary_arch = if arch.is_noarch() {
                    Arch::linux_64()
                } else {
                    Arch::noarch()
                };
                let auxiliary = self.repo_data(&channels, &auxiliary_arch, variant).await?;

                let constraints = Constraints::parse(&constraints);
                let blacklists = self.inner.blacklists.clone();
                let ttl = self.inner.ttl;
                let graph = tokio::task::spawn_blocking(move || {
                    Arc::new(ArtifactGraph::new(
                        channels,
                        arch,
                        variant,
                        constraints,
                        fused,
                        auxiliary,
                        blacklists,
                        ttl,
                    ))
                })
                .await
                .map_err(FetchRepoDataError::from)?;
                Ok(graph)
            })
            .await
    }

    /// Sweeps expired entries from both tiers.
    pub fn sweep(&self) {
        self.inner.raw.sweep();
        self.inner.derived.sweep();
    }

    /// Spawns a background warmer that keeps the raw tier of the given
    /// (channel, arch) pairs populated.
    pub fn spawn_warmer(&self, targets: Vec<(String, Arch)>, interval: Duration) -> Warmer {
        Warmer::spawn(self.clone(), targets, interval)
    }
}

/// Builder for a [`Metachannel`] engine.
#[derive(Debug)]
pub struct MetachannelBuilder {
    base_url: Url,
    ttl: Duration,
    capacity: usize,
    fetch_timeout: Duration,
    blacklist_dir: PathBuf,
}

impl Default for MetachannelBuilder {
    fn default() -> Self {
        MetachannelBuilder {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("the default base url is valid"),
            ttl: DEFAULT_TTL,
            capacity: DEFAULT_CAPACITY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            blacklist_dir: PathBuf::from(DEFAULT_BLACKLIST_DIR),
        }
    }
}

impl MetachannelBuilder {
    /// Sets the upstream prefix channels are fetched from.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Sets the TTL of both cache tiers and the serialization memos.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the capacity bound of both cache tiers.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the total timeout of a single upstream fetch.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the directory blacklist files are read from.
    #[must_use]
    pub fn with_blacklist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.blacklist_dir = dir.into();
        self
    }

    /// Constructs the engine.
    pub fn finish(self) -> Metachannel {
        let client = ClientBuilder::new(
            Client::builder()
                .timeout(self.fetch_timeout)
                .build()
                .expect("failed to construct the http client"),
        )
        .build();

        Metachannel {
            inner: Arc::new(MetachannelInner {
                client,
                base_url: self.base_url,
                ttl: self.ttl,
                raw: CoalescedTtlCache::new(self.capacity, self.ttl),
                derived: CoalescedTtlCache::new(self.capacity, self.ttl),
                blacklists: Arc::new(BlacklistStore::new(self.blacklist_dir)),
            }),
        }
    }
}
