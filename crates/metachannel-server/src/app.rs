use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use metachannel_graph::{
    fetch::{FetchRepoDataError, Variant},
    Metachannel, MetachannelError,
};

use crate::request::ArtifactRequest;

pub struct AppState {
    pub metachannel: Metachannel,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/version", get(version))
        .fallback(get(artifact))
        .with_state(state)
}

async fn index() -> &'static str {
    include_str!("../../../README.md")
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// `GET /<channel1,channel2,...>/<constraint1,...>/<arch>/<artifact>`
///
/// Example:
///
///     /conda-forge/pandas,ipython,scikit-learn/linux-64/repodata.json
#[tracing::instrument(level = "debug", skip(state))]
async fn artifact(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    match artifact_response(&state, uri.path()).await {
        Ok(response) => response,
        Err(err) => error_response(&err),
    }
}

async fn artifact_response(state: &AppState, path: &str) -> Result<Response, MetachannelError> {
    let ArtifactRequest {
        channels,
        constraints,
        arch,
        artifact,
    } = ArtifactRequest::parse(path)?;

    match artifact.as_str() {
        "repodata.json" => {
            let graph = state
                .metachannel
                .artifact_graph(channels, arch, constraints, Variant::Full)
                .await?;
            let json = tokio::task::spawn_blocking(move || graph.repodata_json())
                .await
                .map_err(worker_lost)??;
            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                json.to_string(),
            )
                .into_response())
        }
        "repodata.json.bz2" => {
            let graph = state
                .metachannel
                .artifact_graph(channels, arch, constraints, Variant::Full)
                .await?;
            let compressed = tokio::task::spawn_blocking(move || graph.repodata_json_bzip())
                .await
                .map_err(worker_lost)??;
            Ok(([(header::CONTENT_TYPE, "application/x-bzip2")], compressed).into_response())
        }
        "current_repodata.json" => {
            let graph = state
                .metachannel
                .artifact_graph(channels, arch, constraints, Variant::Current)
                .await?;
            let json = tokio::task::spawn_blocking(move || graph.repodata_json())
                .await
                .map_err(worker_lost)??;
            Ok((
                [(header::CONTENT_TYPE, "application/json")],
                json.to_string(),
            )
                .into_response())
        }
        other if other.ends_with(".json") => {
            Err(MetachannelError::ArtifactNotFound(other.to_string()))
        }
        _ => {
            // Downstream clients cannot consume the urls stored inside the
            // emitted repodata directly, so artifact downloads come back to
            // the proxy and are redirected to whichever upstream won
            // precedence for the filename.
            let graph = state
                .metachannel
                .artifact_graph(channels, arch, constraints, Variant::Full)
                .await?;
            let url = tokio::task::spawn_blocking(move || graph.lookup_url(&artifact))
                .await
                .map_err(worker_lost)??;
            Ok(Redirect::temporary(url.as_str()).into_response())
        }
    }
}

fn worker_lost(err: tokio::task::JoinError) -> MetachannelError {
    if let Ok(panic) = err.try_into_panic() {
        std::panic::resume_unwind(panic);
    }
    MetachannelError::Internal("a request worker was cancelled".to_string())
}

fn error_response(err: &MetachannelError) -> Response {
    let status = match err {
        MetachannelError::Fetch(fetch) => match fetch {
            FetchRepoDataError::NotFound(_) => StatusCode::NOT_FOUND,
            FetchRepoDataError::UpstreamUnavailable(..)
            | FetchRepoDataError::UpstreamStatus(..) => StatusCode::BAD_GATEWAY,
            FetchRepoDataError::InvalidSubdirUrl(..) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        MetachannelError::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
        MetachannelError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        MetachannelError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("{err}");
    } else {
        tracing::debug!("{err}");
    }
    (status, err.to_string()).into_response()
}
