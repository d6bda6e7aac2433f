use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A target platform slice of a channel (`linux-64`, `osx-64`, `win-64`,
/// `noarch`, ...).
///
/// The proxy treats the tag as opaque except for `noarch`, which is
/// cross-platform: every request for a concrete arch implicitly also consumes
/// the `noarch` repodata of the same channels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arch(String);

/// An error that can occur when parsing an [`Arch`] from a string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseArchError {
    /// The arch path segment was empty.
    #[error("the arch must not be empty")]
    Empty,
}

impl Arch {
    /// The cross-platform arch.
    pub fn noarch() -> Arch {
        Arch("noarch".to_string())
    }

    /// The stand-in auxiliary arch used when a request targets `noarch`
    /// itself.
    pub fn linux_64() -> Arch {
        Arch("linux-64".to_string())
    }

    /// Returns true if this is the cross-platform arch.
    pub fn is_noarch(&self) -> bool {
        self.0 == "noarch"
    }

    /// Returns the arch as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Arch {
    type Err = ParseArchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseArchError::Empty);
        }
        Ok(Arch(s.to_string()))
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
