use metachannel_types::{ParseArchError, ParseChannelRefError};
use thiserror::Error;

use crate::fetch::FetchRepoDataError;

/// Errors surfaced by the engine to its callers.
///
/// The error is cheap to clone so that every waiter of a coalesced request
/// can observe the failure of the single in-flight construction.
#[derive(Debug, Clone, Error)]
pub enum MetachannelError {
    /// Fetching an upstream repodata document failed.
    #[error(transparent)]
    Fetch(#[from] FetchRepoDataError),

    /// The requested artifact is not part of the derived repodata.
    #[error("artifact {0} not found")]
    ArtifactNotFound(String),

    /// The channel, arch or constraint part of the request could not be
    /// parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// An unexpected failure inside the engine. Never caught; always
    /// propagated.
    #[error("{0}")]
    Internal(String),
}

impl From<ParseChannelRefError> for MetachannelError {
    fn from(err: ParseChannelRefError) -> Self {
        MetachannelError::MalformedRequest(err.to_string())
    }
}

impl From<ParseArchError> for MetachannelError {
    fn from(err: ParseArchError) -> Self {
        MetachannelError::MalformedRequest(err.to_string())
    }
}
