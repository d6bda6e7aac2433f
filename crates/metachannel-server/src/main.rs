//! HTTP front of the metachannel proxy.
//!
//! The server is a thin collaborator around the [`metachannel_graph`]
//! engine: it parses request paths, maps the engine's error taxonomy onto
//! status codes and emits redirects for artifact downloads. All heavy
//! lifting (fetching, graph work, serialization, compression) happens inside
//! the engine, with CPU bound steps dispatched to blocking workers so the
//! listener never stalls.

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use metachannel_graph::Metachannel;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::{
    app::{router, AppState},
    cli::Args,
};

mod app;
mod cli;
mod request;

const WARM_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_filter.into())
        .from_env()
        .context("invalid RUST_LOG directive")?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if args.reload {
        tracing::warn!("--reload is accepted for compatibility but has no effect");
    }

    let metachannel = Metachannel::builder()
        .with_base_url(args.base_url.clone())
        .with_blacklist_dir(args.blacklist_dir.clone())
        .finish();

    // Start the background workers that run through all the warm channels.
    let warmer = metachannel.spawn_warmer(args.warm_targets()?, WARM_INTERVAL);

    let app = router(Arc::new(AppState { metachannel }));

    let host = effective_host(&args.host);
    let addr = format!("{host}:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    warmer.shutdown().await;
    Ok(())
}

/// Rebinds loopback to all interfaces when running inside a container, where
/// a loopback-only listener would be unreachable from outside.
fn effective_host(host: &str) -> String {
    if host == "127.0.0.1" && running_in_container() {
        tracing::info!("container detected, binding 0.0.0.0 instead of 127.0.0.1");
        return "0.0.0.0".to_string();
    }
    host.to_string()
}

fn running_in_container() -> bool {
    Path::new("/.dockerenv").exists() || Path::new("/run/.containerenv").exists()
}
