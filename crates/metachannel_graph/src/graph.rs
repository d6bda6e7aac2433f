//! The dependency graph of a repodata document.
//!
//! Nodes are package *names*; every artifact observed for a name hangs off
//! its node, split per arch. Edges run `dep → dependent`, which makes the
//! predecessors of a node exactly the packages it depends on. The graph is a
//! plain value: composition returns a new graph instead of mutating either
//! input, so per-arch attributes can never be lost by a node-presence-only
//! merge.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use fxhash::{FxHashMap, FxHashSet};
use metachannel_types::{Arch, ArtifactRecord, RepoData};
use url::Url;

/// One package name with the artifacts observed for it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PackageNode {
    /// The arches this package name appears under.
    pub archs: BTreeSet<Arch>,

    /// filename → record, one map per observed arch. Names that only appear
    /// as a dependency of another package carry no artifact maps at all.
    pub artifacts: BTreeMap<Arch, BTreeMap<String, ArtifactRecord>>,
}

impl PackageNode {
    /// The artifact map of the given arch, if any artifacts were observed
    /// under it.
    pub fn artifacts_for(&self, arch: &Arch) -> Option<&BTreeMap<String, ArtifactRecord>> {
        self.artifacts.get(arch)
    }

    /// Merges a lower precedence node into this one: arch sets union, and on
    /// filename collision the entry already present wins.
    fn merge_from(&mut self, other: &PackageNode) {
        self.archs.extend(other.archs.iter().cloned());
        for (arch, packages) in &other.artifacts {
            let merged = self.artifacts.entry(arch.clone()).or_default();
            for (filename, record) in packages {
                merged
                    .entry(filename.clone())
                    .or_insert_with(|| record.clone());
            }
        }
    }
}

/// A directed dependency graph over package names.
#[derive(Debug, Default, Clone)]
pub struct DepGraph {
    nodes: FxHashMap<String, PackageNode>,

    /// node → the names of its direct dependencies (its predecessors).
    depends_on: FxHashMap<String, FxHashSet<String>>,
}

impl DepGraph {
    /// Builds the graph of one parsed repodata document.
    ///
    /// Every dependency name becomes a node even when no artifact of it is
    /// part of the document, so edge endpoints always exist. Artifacts
    /// without a package name are malformed and skipped.
    pub fn from_repodata(repo_data: RepoData, arch: &Arch, url_prefix: &Url) -> DepGraph {
        let mut graph = DepGraph::default();
        for (filename, mut record) in repo_data.packages {
            if record.name.is_empty() {
                tracing::warn!("skipping artifact {filename} without a package name");
                continue;
            }
            match url_prefix.join(&filename) {
                Ok(url) => record.url = Some(url),
                Err(err) => {
                    tracing::warn!("skipping artifact {filename} with unrepresentable url: {err}");
                    continue;
                }
            }

            let name = record.name.clone();
            let deps: Vec<String> = record.depend_names().map(str::to_string).collect();

            let node = graph.nodes.entry(name.clone()).or_default();
            node.archs.insert(arch.clone());
            node.artifacts
                .entry(arch.clone())
                .or_default()
                .insert(filename, record);

            for dep in deps {
                graph.nodes.entry(dep.clone()).or_default();
                graph.depends_on.entry(name.clone()).or_default().insert(dep);
            }
        }
        graph
    }

    /// The number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if a node with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// The node of the given package name.
    pub fn node(&self, name: &str) -> Option<&PackageNode> {
        self.nodes.get(name)
    }

    /// Iterates all package names in unspecified order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// The names of the direct dependencies of a node.
    pub fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.depends_on
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Attribute-preserving union with a lower precedence graph.
    ///
    /// Node and edge sets are unioned; for nodes present on both sides the
    /// arch sets merge and the per-arch filename maps union with `self`
    /// winning every filename collision.
    pub fn compose(&self, other: &DepGraph) -> DepGraph {
        let mut composed = self.clone();
        for (name, node) in &other.nodes {
            composed
                .nodes
                .entry(name.clone())
                .or_default()
                .merge_from(node);
        }
        for (name, deps) in &other.depends_on {
            composed
                .depends_on
                .entry(name.clone())
                .or_default()
                .extend(deps.iter().cloned());
        }
        composed
    }

    /// All ancestors of the seed set: every node with a path to some seed
    /// along `dep → dependent` edges, seeds included.
    ///
    /// Seeds that are unknown to the graph are logged and treated as
    /// terminal; they never fail the traversal.
    pub fn recursive_parents<I, S>(&self, seeds: I) -> FxHashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut done = FxHashSet::default();
        let mut todo: VecDeque<String> = seeds.into_iter().map(Into::into).collect();
        while let Some(name) = todo.pop_front() {
            if done.contains(&name) {
                continue;
            }
            if !self.nodes.contains_key(&name) {
                tracing::warn!("package {name} not found in graph");
                done.insert(name);
                continue;
            }
            if let Some(deps) = self.depends_on.get(&name) {
                todo.extend(deps.iter().filter(|dep| !done.contains(*dep)).cloned());
            }
            done.insert(name);
        }
        done
    }

    /// The induced subgraph on `keep`: the nodes in the set and the edges
    /// with both endpoints remaining.
    pub fn subgraph(&self, keep: &FxHashSet<String>) -> DepGraph {
        let nodes = self
            .nodes
            .iter()
            .filter(|(name, _)| keep.contains(*name))
            .map(|(name, node)| (name.clone(), node.clone()))
            .collect();
        let depends_on = self
            .depends_on
            .iter()
            .filter(|(name, _)| keep.contains(*name))
            .map(|(name, deps)| {
                let deps: FxHashSet<String> =
                    deps.iter().filter(|dep| keep.contains(*dep)).cloned().collect();
                (name.clone(), deps)
            })
            .filter(|(_, deps)| !deps.is_empty())
            .collect();
        DepGraph { nodes, depends_on }
    }
}
