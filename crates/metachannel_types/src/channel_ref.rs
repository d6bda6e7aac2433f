use std::{fmt, str::FromStr};

use thiserror::Error;

/// An ordered, non-empty sequence of channel identifiers such as
/// `conda-forge` or `conda-forge/label/gcc7`.
///
/// Order encodes precedence: when several channels carry the same artifact
/// filename, the earliest channel in the list wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRef(Vec<String>);

/// An error that can occur when parsing a [`ChannelRef`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseChannelRefError {
    /// No channel was specified at all.
    #[error("at least one channel must be specified")]
    Empty,

    /// One of the comma separated entries was empty.
    #[error("channel names must not be empty")]
    EmptyChannel,
}

impl ChannelRef {
    /// Constructs a channel reference from an ordered list of channel names.
    pub fn new(channels: Vec<String>) -> Result<Self, ParseChannelRefError> {
        if channels.is_empty() {
            return Err(ParseChannelRefError::Empty);
        }
        if channels.iter().any(String::is_empty) {
            return Err(ParseChannelRefError::EmptyChannel);
        }
        Ok(ChannelRef(channels))
    }

    /// The channel names in precedence order.
    pub fn channels(&self) -> &[String] {
        &self.0
    }

    /// Iterates the channel names in precedence order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromStr for ChannelRef {
    type Err = ParseChannelRefError;

    /// Parses a comma separated channel list, e.g.
    /// `conda-forge,conda-forge/label/gcc7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseChannelRefError::Empty);
        }
        ChannelRef::new(s.split(',').map(str::to_string).collect())
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}
