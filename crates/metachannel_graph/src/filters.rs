//! The per-artifact filter pipeline.
//!
//! Filters operate on one node's per-arch artifact map and never mutate
//! their input: each returns a new map, leaving the records owned by the raw
//! graphs untouched. They compose in a fixed order: build-number pruning,
//! feature untracking, blacklist removal.

use std::collections::{btree_map, BTreeMap};

use fxhash::FxHashSet;
use metachannel_types::ArtifactRecord;

/// The feature → explicit dependency rewrite table used by
/// `--untrack-features`.
const FEATURE_MAP: &[(&str, &str)] = &[
    ("blas_openblas", "blas * openblas"),
    ("blas_mkl", "blas * mkl"),
    ("blas_nomkl", "blas * nomkl"),
    ("vc9", "vs2008_runtime"),
    ("vc10", "vs2010_runtime"),
    ("vc14", "vs2015_runtime"),
];

fn feature_replacement(feature: &str) -> Option<&'static str> {
    FEATURE_MAP
        .iter()
        .find(|(from, _)| *from == feature)
        .map(|(_, to)| *to)
}

/// Keeps only the highest build number within each (version, build stem)
/// group.
///
/// The build stem is the build string up to the last `_`. Artifacts whose
/// suffix is not purely numeric (mutex packages such as `blas`) are kept
/// unconditionally. Ties on build number keep the lexicographically greatest
/// filename. Artifacts without a version are malformed and dropped with a
/// warning.
pub(crate) fn constrain_by_build_number(
    packages: &BTreeMap<String, ArtifactRecord>,
) -> BTreeMap<String, ArtifactRecord> {
    let mut keep = BTreeMap::new();
    let mut best: BTreeMap<(&str, &str), (u64, &String)> = BTreeMap::new();

    for (filename, record) in packages {
        let Some(version) = record.version.as_deref() else {
            tracing::warn!("dropping artifact {filename} without a version");
            continue;
        };
        let (stem, number) = record
            .build
            .rsplit_once('_')
            .unwrap_or(("", record.build.as_str()));
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            keep.insert(filename.clone(), record.clone());
            continue;
        }

        let build_number = record.build_number.unwrap_or(0);
        match best.entry((version, stem)) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert((build_number, filename));
            }
            btree_map::Entry::Occupied(mut entry) => {
                let (current_number, current_filename) = *entry.get();
                if (build_number, filename.as_str()) > (current_number, current_filename.as_str())
                {
                    entry.insert((build_number, filename));
                }
            }
        }
    }

    for (_, (_, filename)) in best {
        if let Some(record) = packages.get(filename) {
            keep.insert(filename.clone(), record.clone());
        }
    }
    keep
}

/// Rewrites virtual features into explicit dependencies.
///
/// Feature tokens with a known replacement are removed and their expansion
/// appended to `depends`; the remaining tokens are reassembled, or the field
/// is dropped when none remain. A `track_features` naming a known feature is
/// dropped as well.
pub(crate) fn untrack_features(
    packages: &BTreeMap<String, ArtifactRecord>,
) -> BTreeMap<String, ArtifactRecord> {
    packages
        .iter()
        .map(|(filename, record)| {
            let mut record = record.clone();
            if let Some(features) = record.features.take() {
                let mut kept = Vec::new();
                for feature in features.split_whitespace() {
                    match feature_replacement(feature) {
                        Some(replacement) => record.depends.push(replacement.to_string()),
                        None => kept.push(feature),
                    }
                }
                if !kept.is_empty() {
                    record.features = Some(kept.join(" "));
                }
            }
            if record
                .track_features
                .as_deref()
                .and_then(feature_replacement)
                .is_some()
            {
                record.track_features = None;
            }
            (filename.clone(), record)
        })
        .collect()
}

/// Drops every artifact whose filename is in the effective blacklist. An
/// empty blacklist returns the input unchanged.
pub(crate) fn constrain_by_blacklist(
    packages: &BTreeMap<String, ArtifactRecord>,
    blacklist: &FxHashSet<String>,
) -> BTreeMap<String, ArtifactRecord> {
    if blacklist.is_empty() {
        return packages.clone();
    }
    let constrained: BTreeMap<String, ArtifactRecord> = packages
        .iter()
        .filter(|(filename, _)| !blacklist.contains(*filename))
        .map(|(filename, record)| (filename.clone(), record.clone()))
        .collect();
    tracing::debug!(
        "blacklist constrained {} to {} artifacts",
        packages.len(),
        constrained.len()
    );
    constrained
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(value: serde_json::Value) -> ArtifactRecord {
        serde_json::from_value(value).unwrap()
    }

    fn packages(entries: &[(&str, serde_json::Value)]) -> BTreeMap<String, ArtifactRecord> {
        entries
            .iter()
            .map(|(filename, value)| (filename.to_string(), record(value.clone())))
            .collect()
    }

    #[test]
    fn test_build_number_keeps_top_build_per_stem() {
        let input = packages(&[
            (
                "foo-1.0-py37_0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "build": "py37_0", "build_number": 0}),
            ),
            (
                "foo-1.0-py37_1.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "build": "py37_1", "build_number": 1}),
            ),
            (
                "foo-1.0-py38_0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "build": "py38_0", "build_number": 0}),
            ),
        ]);
        let output = constrain_by_build_number(&input);
        let filenames: Vec<&str> = output.keys().map(String::as_str).collect();
        assert_eq!(
            filenames,
            ["foo-1.0-py37_1.tar.bz2", "foo-1.0-py38_0.tar.bz2"]
        );
    }

    #[test]
    fn test_build_number_keeps_mutex_packages() {
        let input = packages(&[
            (
                "blas-1.0-openblas.tar.bz2",
                serde_json::json!({"name": "blas", "version": "1.0", "build": "openblas"}),
            ),
            (
                "blas-1.0-mkl.tar.bz2",
                serde_json::json!({"name": "blas", "version": "1.0", "build": "mkl"}),
            ),
        ]);
        let output = constrain_by_build_number(&input);
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_build_number_tie_break_is_deterministic() {
        let input = packages(&[
            (
                "foo-1.0-py37_0_a.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "build": "py37_0", "build_number": 0}),
            ),
            (
                "foo-1.0-py37_0_b.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "build": "py37_0", "build_number": 0}),
            ),
        ]);
        let output = constrain_by_build_number(&input);
        let filenames: Vec<&str> = output.keys().map(String::as_str).collect();
        assert_eq!(filenames, ["foo-1.0-py37_0_b.tar.bz2"]);
    }

    #[test]
    fn test_build_number_drops_versionless_artifacts() {
        let input = packages(&[(
            "broken-0-py37_0.tar.bz2",
            serde_json::json!({"name": "broken", "build": "py37_0"}),
        )]);
        assert!(constrain_by_build_number(&input).is_empty());
    }

    #[test]
    fn test_build_number_is_idempotent() {
        let input = packages(&[
            (
                "foo-1.0-py37_0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "build": "py37_0", "build_number": 0}),
            ),
            (
                "foo-1.0-py37_1.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "build": "py37_1", "build_number": 1}),
            ),
            (
                "blas-1.0-openblas.tar.bz2",
                serde_json::json!({"name": "blas", "version": "1.0", "build": "openblas"}),
            ),
        ]);
        let once = constrain_by_build_number(&input);
        let twice = constrain_by_build_number(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_untrack_features_rewrites_depends() {
        let input = packages(&[(
            "numpy-1.18-py37_0.tar.bz2",
            serde_json::json!({
                "name": "numpy", "version": "1.18", "build": "py37_0",
                "depends": ["python"], "features": "blas_openblas debug",
            }),
        )]);
        let output = untrack_features(&input);
        let record = &output["numpy-1.18-py37_0.tar.bz2"];
        assert_eq!(record.depends, ["python", "blas * openblas"]);
        assert_eq!(record.features.as_deref(), Some("debug"));
    }

    #[test]
    fn test_untrack_features_drops_empty_field_and_tracked() {
        let input = packages(&[(
            "openblas-0.3-0.tar.bz2",
            serde_json::json!({
                "name": "openblas", "version": "0.3", "build": "0",
                "features": "blas_openblas", "track_features": "blas_openblas",
            }),
        )]);
        let output = untrack_features(&input);
        let record = &output["openblas-0.3-0.tar.bz2"];
        assert_eq!(record.features, None);
        assert_eq!(record.track_features, None);
        assert_eq!(record.depends, ["blas * openblas"]);
    }

    #[test]
    fn test_untrack_features_keeps_unknown_track_features() {
        let input = packages(&[(
            "bar-1.0-0.tar.bz2",
            serde_json::json!({
                "name": "bar", "version": "1.0", "build": "0",
                "track_features": "something_else",
            }),
        )]);
        let output = untrack_features(&input);
        assert_eq!(
            output["bar-1.0-0.tar.bz2"].track_features.as_deref(),
            Some("something_else")
        );
    }

    #[test]
    fn test_untrack_features_is_idempotent() {
        let input = packages(&[(
            "numpy-1.18-py37_0.tar.bz2",
            serde_json::json!({
                "name": "numpy", "version": "1.18", "build": "py37_0",
                "depends": ["python"], "features": "blas_mkl vc14 debug",
                "track_features": "vc14",
            }),
        )]);
        let once = untrack_features(&input);
        let twice = untrack_features(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_blacklist_removal() {
        let input = packages(&[
            (
                "foo-1.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "build": "0"}),
            ),
            (
                "bar-1.0-0.tar.bz2",
                serde_json::json!({"name": "bar", "version": "1.0", "build": "0"}),
            ),
        ]);
        let mut blacklist = FxHashSet::default();
        blacklist.insert("foo-1.0-0.tar.bz2".to_string());

        let output = constrain_by_blacklist(&input, &blacklist);
        assert_eq!(output.len(), 1);
        assert!(output.contains_key("bar-1.0-0.tar.bz2"));

        let unchanged = constrain_by_blacklist(&input, &FxHashSet::default());
        assert_eq!(unchanged, input);
    }
}
