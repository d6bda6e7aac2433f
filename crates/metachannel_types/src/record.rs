use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use url::Url;

/// A single record in a repodata document. A record describes one
/// downloadable artifact of a package.
///
/// Records are never mutated once they are part of a graph; the filter
/// pipeline produces new records by copy-on-write.
#[skip_serializing_none]
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ArtifactRecord {
    /// The name of the package this artifact belongs to. Upstream documents
    /// always carry it; a record without a name is malformed and is skipped
    /// during graph construction.
    #[serde(default)]
    pub name: String,

    /// The version of the package.
    pub version: Option<String>,

    /// The build string of the artifact.
    #[serde(default)]
    pub build: String,

    /// The build number of the artifact.
    pub build_number: Option<u64>,

    /// Specification of the packages this artifact depends on. Only the
    /// leading token of each entry, the dependency's package name, is
    /// significant to the proxy; the remainder is opaque solver input.
    #[serde(default)]
    pub depends: Vec<String>,

    /// Space separated feature tokens.
    pub features: Option<String>,

    /// The feature this artifact tracks.
    pub track_features: Option<String>,

    /// The upstream download location of the artifact. Synthesized as
    /// `<url_prefix>/<filename>` when the record is inserted into a graph;
    /// always points at the originating upstream, never at the proxy.
    pub url: Option<Url>,

    /// Every upstream field we do not consume, carried verbatim so the
    /// emitted repodata stays a superset-compatible copy of the upstream
    /// document.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ArtifactRecord {
    /// Returns the package name of each dependency spec: the part up to the
    /// first space.
    pub fn depend_names(&self) -> impl Iterator<Item = &str> {
        self.depends
            .iter()
            .map(|dep| dep.split_once(' ').unwrap_or((dep.as_str(), "")).0)
    }
}

/// A repodata document: the JSON catalogue of artifacts for one
/// (channel, arch).
///
/// Only the top level `packages` map is consumed; documents emitted by the
/// proxy contain exactly that map. Keying by filename in a `BTreeMap` gives
/// the serialized form a well defined lexicographic key order.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct RepoData {
    /// The artifacts contained in the document, keyed by filename.
    #[serde(default)]
    pub packages: BTreeMap<String, ArtifactRecord>,
}
