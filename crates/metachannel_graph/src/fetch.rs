//! Stateless download and decoding of upstream repodata documents.
//!
//! The fetcher suspends on network I/O only; decompression and JSON parsing
//! run on a blocking worker so they never stall the async runtime. All
//! caching lives in the [`crate::Metachannel`] tiers.

use std::{io::Read, sync::Arc};

use metachannel_types::{Arch, RepoData};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use url::Url;

/// Defines which upstream repodata file to download.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Fetch `repodata.json.bz2`, the complete catalogue.
    #[default]
    Full,

    /// Fetch `current_repodata.json`: only the latest version of each
    /// package.
    ///
    /// Note that this file is not available on every upstream channel.
    Current,
}

impl Variant {
    /// The file name of the repodata file to download.
    pub fn file_name(&self) -> &'static str {
        match self {
            Variant::Full => "repodata.json.bz2",
            Variant::Current => "current_repodata.json",
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Error)]
pub enum FetchRepoDataError {
    #[error("failed to download {0}")]
    UpstreamUnavailable(Url, #[source] Arc<reqwest_middleware::Error>),

    #[error("upstream returned status {1} for {0}")]
    UpstreamStatus(Url, StatusCode),

    #[error("no repodata found at {0}")]
    NotFound(Url),

    #[error("channel {0} does not form a valid repodata url")]
    InvalidSubdirUrl(String, #[source] Arc<url::ParseError>),

    #[error("failed to decompress {0}")]
    DecodeError(Url, #[source] Arc<std::io::Error>),

    #[error("failed to parse {0}")]
    ParseError(Url, #[source] Arc<serde_json::Error>),

    #[error("the operation was cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for FetchRepoDataError {
    fn from(err: tokio::task::JoinError) -> Self {
        match err.try_into_panic() {
            // A panicking parse worker takes the request down with it.
            Ok(panic) => std::panic::resume_unwind(panic),
            Err(_) => FetchRepoDataError::Cancelled,
        }
    }
}

/// The result of fetching one upstream repodata document.
#[derive(Debug, Clone)]
pub struct RepodataFetch {
    /// The parsed document.
    pub repo_data: RepoData,

    /// `<base>/<channel>/<arch>/`; per-artifact urls are joined onto this
    /// when the document is turned into a graph.
    pub url_prefix: Url,
}

/// Computes the url prefix of a (channel, arch) under the given upstream
/// base.
pub fn subdir_url(base_url: &Url, channel: &str, arch: &Arch) -> Result<Url, FetchRepoDataError> {
    let base = base_url.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{channel}/{arch}/"))
        .map_err(|err| FetchRepoDataError::InvalidSubdirUrl(channel.to_string(), Arc::new(err)))
}

/// Downloads and parses one upstream repodata document.
pub async fn fetch_repo_data(
    client: &ClientWithMiddleware,
    base_url: &Url,
    channel: &str,
    arch: &Arch,
    variant: Variant,
) -> Result<RepodataFetch, FetchRepoDataError> {
    let url_prefix = subdir_url(base_url, channel, arch)?;
    let repodata_url = url_prefix
        .join(variant.file_name())
        .map_err(|err| FetchRepoDataError::InvalidSubdirUrl(channel.to_string(), Arc::new(err)))?;

    tracing::info!("retrieving {repodata_url}");
    let response = client
        .get(repodata_url.clone())
        .send()
        .await
        .map_err(|err| FetchRepoDataError::UpstreamUnavailable(repodata_url.clone(), Arc::new(err)))?;

    match response.status() {
        StatusCode::NOT_FOUND => return Err(FetchRepoDataError::NotFound(repodata_url)),
        status if !status.is_success() => {
            return Err(FetchRepoDataError::UpstreamStatus(repodata_url, status));
        }
        _ => {}
    }

    let bytes = response.bytes().await.map_err(|err| {
        FetchRepoDataError::UpstreamUnavailable(repodata_url.clone(), Arc::new(err.into()))
    })?;

    let url = repodata_url.clone();
    let repo_data =
        tokio::task::spawn_blocking(move || parse_repodata(&bytes, variant, &url)).await??;

    Ok(RepodataFetch {
        repo_data,
        url_prefix,
    })
}

fn parse_repodata(bytes: &[u8], variant: Variant, url: &Url) -> Result<RepoData, FetchRepoDataError> {
    let decoded;
    let json = match variant {
        Variant::Full => {
            let mut buffer = Vec::new();
            bzip2::read::BzDecoder::new(bytes)
                .read_to_end(&mut buffer)
                .map_err(|err| FetchRepoDataError::DecodeError(url.clone(), Arc::new(err)))?;
            decoded = buffer;
            decoded.as_slice()
        }
        Variant::Current => bytes,
    };
    serde_json::from_slice(json)
        .map_err(|err| FetchRepoDataError::ParseError(url.clone(), Arc::new(err)))
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_subdir_url() {
        let base = Url::parse("https://conda.anaconda.org").unwrap();
        let arch = "linux-64".parse().unwrap();
        let url = subdir_url(&base, "conda-forge/label/gcc7", &arch).unwrap();
        assert_eq!(
            url.as_str(),
            "https://conda.anaconda.org/conda-forge/label/gcc7/linux-64/"
        );

        // The prefix keeps its trailing slash so artifact joins append.
        let artifact = url.join("zlib-1.2.11-h7b6447c_3.tar.bz2").unwrap();
        assert_eq!(
            artifact.as_str(),
            "https://conda.anaconda.org/conda-forge/label/gcc7/linux-64/zlib-1.2.11-h7b6447c_3.tar.bz2"
        );
    }

    #[test]
    fn test_parse_repodata_full_round_trip() {
        let doc = br#"{"packages": {"zlib-1.2.11-0.tar.bz2": {"name": "zlib", "version": "1.2.11", "build": "0", "depends": []}}}"#;
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
        encoder.write_all(doc).unwrap();
        let compressed = encoder.finish().unwrap();

        let url = Url::parse("https://example.invalid/repodata.json.bz2").unwrap();
        let repo_data = parse_repodata(&compressed, Variant::Full, &url).unwrap();
        assert_eq!(repo_data.packages.len(), 1);
        assert_eq!(repo_data.packages["zlib-1.2.11-0.tar.bz2"].name, "zlib");
    }

    #[test]
    fn test_parse_repodata_rejects_garbage() {
        let url = Url::parse("https://example.invalid/repodata.json.bz2").unwrap();
        assert!(matches!(
            parse_repodata(b"not bzip2", Variant::Full, &url),
            Err(FetchRepoDataError::DecodeError(..))
        ));
        assert!(matches!(
            parse_repodata(b"not json", Variant::Current, &url),
            Err(FetchRepoDataError::ParseError(..))
        ));
    }
}
