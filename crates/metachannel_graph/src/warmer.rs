//! Background refresh of the raw cache tier.

use std::time::Duration;

use metachannel_types::{Arch, ChannelRef};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{fetch::Variant, metachannel::Metachannel};

/// Periodically refreshes a fixed set of (channel, arch) upstreams so user
/// requests never block on a cold fetch.
///
/// Every tick runs the regular raw-tier lookup: an unexpired entry is a
/// no-op, an expired one refetches. Fetch errors are logged and retried on
/// the next tick; they never terminate a loop or affect the other targets.
/// The warmer honours its cancellation token and exits within one tick of
/// [`Warmer::shutdown`]; an in-flight fetch is abandoned, which the cache
/// tier recovers from.
pub struct Warmer {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Warmer {
    pub(crate) fn spawn(
        metachannel: Metachannel,
        targets: Vec<(String, Arch)>,
        interval: Duration,
    ) -> Warmer {
        let token = CancellationToken::new();
        let handles = targets
            .into_iter()
            .map(|(channel, arch)| {
                tokio::spawn(warm_loop(
                    metachannel.clone(),
                    channel,
                    arch,
                    interval,
                    token.clone(),
                ))
            })
            .collect();
        Warmer { token, handles }
    }

    /// Stops all warm loops and waits for them to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

impl Drop for Warmer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn warm_loop(
    metachannel: Metachannel,
    channel: String,
    arch: Arch,
    interval: Duration,
    token: CancellationToken,
) {
    let channels = match ChannelRef::new(vec![channel.clone()]) {
        Ok(channels) => channels,
        Err(err) => {
            tracing::warn!("not warming invalid channel {channel}: {err}");
            return;
        }
    };

    let mut ticks = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticks.tick() => {}
        }

        metachannel.sweep();
        tokio::select! {
            _ = token.cancelled() => return,
            result = metachannel.repo_data(&channels, &arch, Variant::Full) => {
                if let Err(err) = result {
                    tracing::warn!("failed to warm {channel}/{arch}: {err}");
                }
            }
        }
    }
}
