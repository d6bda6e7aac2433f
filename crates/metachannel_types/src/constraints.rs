use std::collections::{BTreeMap, BTreeSet};

/// A functional constraint selects a per-artifact filter instead of seeding
/// the dependency closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FunctionalConstraint {
    /// `--max-build-no`: within each (version, build stem) group keep only
    /// the artifact with the highest build number.
    MaxBuildNo,

    /// `--untrack-features`: rewrite virtual features into explicit
    /// dependencies.
    UntrackFeatures,

    /// `--blacklist=<name>`: drop artifacts listed in the named blacklist
    /// file of any component channel.
    Blacklist,
}

impl FunctionalConstraint {
    /// Parses the `--flag` part of a constraint entry.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "--max-build-no" => Some(FunctionalConstraint::MaxBuildNo),
            "--untrack-features" => Some(FunctionalConstraint::UntrackFeatures),
            "--blacklist" => Some(FunctionalConstraint::Blacklist),
            _ => None,
        }
    }

    /// The `--flag` spelling of this constraint.
    pub fn as_flag(&self) -> &'static str {
        match self {
            FunctionalConstraint::MaxBuildNo => "--max-build-no",
            FunctionalConstraint::UntrackFeatures => "--untrack-features",
            FunctionalConstraint::Blacklist => "--blacklist",
        }
    }
}

/// The parsed constraint segment of a request.
///
/// Entries starting with `--` are functional constraints (`--flag` or
/// `--flag=value`); everything else is a bare package name seeding the
/// dependency closure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    /// Package names the closure must include.
    pub packages: Vec<String>,

    /// Functional constraints with their argument values. Flags without an
    /// argument map to a set containing the empty string, mirroring their
    /// wire form.
    pub functional: BTreeMap<FunctionalConstraint, BTreeSet<String>>,
}

impl Constraints {
    /// Parses a list of raw constraint entries.
    ///
    /// Unknown `--flags` are ignored with a warning; empty entries are
    /// dropped so that an absent constraint segment means "no constraints".
    pub fn parse<I, S>(constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Constraints::default();
        for constraint in constraints {
            let constraint = constraint.as_ref();
            if constraint.starts_with("--") {
                let (key, value) = constraint.split_once('=').unwrap_or((constraint, ""));
                match FunctionalConstraint::from_flag(key) {
                    Some(functional) => {
                        parsed
                            .functional
                            .entry(functional)
                            .or_default()
                            .insert(value.to_string());
                    }
                    None => tracing::warn!("ignoring unknown constraint flag {key}"),
                }
            } else if !constraint.is_empty() {
                parsed.packages.push(constraint.to_string());
            }
        }
        parsed
    }

    /// Returns true if the given functional constraint was requested.
    pub fn has(&self, functional: FunctionalConstraint) -> bool {
        self.functional.contains_key(&functional)
    }

    /// The argument values of the given functional constraint.
    pub fn values(&self, functional: FunctionalConstraint) -> impl Iterator<Item = &str> {
        self.functional
            .get(&functional)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}
