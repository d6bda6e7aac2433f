use metachannel_graph::MetachannelError;
use metachannel_types::{Arch, ChannelRef};

/// A parsed `/<channels>/<constraints>/<arch>/<artifact>` request path.
///
/// Channels may themselves contain `/` (e.g. `conda-forge/label/gcc7`), so
/// the path is parsed from the back: the last three segments are the
/// constraint list, the arch and the artifact; everything in front joins
/// back into the channel list.
#[derive(Debug, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub channels: ChannelRef,
    pub constraints: Vec<String>,
    pub arch: Arch,
    pub artifact: String,
}

impl ArtifactRequest {
    pub fn parse(path: &str) -> Result<ArtifactRequest, MetachannelError> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if segments.len() < 4 {
            return Err(MetachannelError::MalformedRequest(format!(
                "expected /<channels>/<constraints>/<arch>/<artifact>, got {path}"
            )));
        }

        let artifact = segments[segments.len() - 1];
        if artifact.is_empty() {
            return Err(MetachannelError::MalformedRequest(
                "the artifact name must not be empty".to_string(),
            ));
        }
        let arch: Arch = segments[segments.len() - 2].parse()?;
        let constraints: Vec<String> = segments[segments.len() - 3]
            .split(',')
            .map(str::to_string)
            .collect();
        let channels: ChannelRef = segments[..segments.len() - 3].join("/").parse()?;

        Ok(ArtifactRequest {
            channels,
            constraints,
            arch,
            artifact: artifact.to_string(),
        })
    }
}
