use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use metachannel_types::Arch;
use url::Url;

/// Command line options of the metachannel proxy.
#[derive(Debug, Parser)]
#[clap(name = "metachannel-server", author, version, about, long_about = None)]
pub struct Args {
    /// The address to listen on.
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// The port to listen on.
    #[clap(long, default_value_t = 20124)]
    pub port: u16,

    /// Accepted for compatibility with earlier deployments; has no effect.
    #[clap(long)]
    pub reload: bool,

    /// The upstream prefix channels are fetched from.
    #[clap(long, default_value = metachannel_graph::DEFAULT_BASE_URL)]
    pub base_url: Url,

    /// A `<channel>/<arch>` pair to keep warm in the background. May be
    /// given multiple times; defaults to the conda-forge set.
    #[clap(long = "warm", value_name = "CHANNEL/ARCH")]
    pub warm: Vec<String>,

    /// The directory blacklist files are read from.
    #[clap(long, default_value = "blacklists")]
    pub blacklist_dir: PathBuf,

    /// Log verbose.
    #[clap(short, long)]
    pub verbose: bool,
}

impl Args {
    /// The warm list: the configured pairs, or the default set when none was
    /// given.
    pub fn warm_targets(&self) -> anyhow::Result<Vec<(String, Arch)>> {
        if self.warm.is_empty() {
            return Ok(default_warm_targets());
        }
        self.warm
            .iter()
            .map(|entry| {
                let (channel, arch) = entry
                    .rsplit_once('/')
                    .with_context(|| format!("expected <channel>/<arch>, got {entry}"))?;
                Ok((channel.to_string(), arch.parse::<Arch>()?))
            })
            .collect()
    }
}

fn default_warm_targets() -> Vec<(String, Arch)> {
    [
        ("conda-forge", "noarch"),
        ("conda-forge", "osx-64"),
        ("conda-forge", "linux-64"),
        ("conda-forge", "win-64"),
        ("conda-forge/label/gcc7", "osx-64"),
        ("conda-forge/label/gcc7", "linux-64"),
    ]
    .into_iter()
    .map(|(channel, arch)| {
        (
            channel.to_string(),
            arch.parse().expect("the default arches are valid"),
        )
    })
    .collect()
}
