//! HTTP routes.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /similar-tracks?artist=&track=&limit=` | `{"tracks":[...]}` |
//! | `GET /top-tracks?artist=&limit=` | `{"tracks":[...]}` |
//! | `GET /mediaserver-proxy/album/:id?...` | upstream body and status |
//! | `GET /lyrics?artist=&title=&album=&duration=` | lyrics cache entry |
//! | `GET /health` | `{"status":"ok",...}` |
//!
//! Every route except `/health` passes the [`CurrentUser`] check first.
//! Failures are `{"error": message, "code": code}`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use core_library::LyricsCacheEntry;
use core_metadata::LyricsQuery;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::{CoreError, CoreService};

/// Decides whether a request comes from a signed-in user.
///
/// Sessions are issued elsewhere; implementations only inspect headers.
#[async_trait]
pub trait CurrentUser: Send + Sync {
    async fn is_authenticated(&self, headers: &HeaderMap) -> bool;
}

/// Lets every request through.
pub struct AllowAll;

#[async_trait]
impl CurrentUser for AllowAll {
    async fn is_authenticated(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub core: CoreService,
    pub current_user: Arc<dyn CurrentUser>,
}

impl AppState {
    pub fn new(core: CoreService) -> Self {
        Self {
            core,
            current_user: Arc::new(AllowAll),
        }
    }

    pub fn with_current_user(mut self, current_user: Arc<dyn CurrentUser>) -> Self {
        self.current_user = current_user;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/similar-tracks", get(similar_tracks))
        .route("/top-tracks", get(top_tracks))
        .route("/mediaserver-proxy/album/:id", get(proxy_album))
        .route("/lyrics", get(lyrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            current_user_middleware,
        ));

    let public = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Rejects the request unless [`CurrentUser`] accepts it.
pub async fn current_user_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Unauthenticated> {
    if !state.current_user.is_authenticated(request.headers()).await {
        debug!(path = %request.uri().path(), "Rejected unauthenticated request");
        return Err(Unauthenticated);
    }
    Ok(next.run(request).await)
}

#[derive(Debug)]
pub struct Unauthenticated;

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": "Unauthorized",
            "code": "UNAUTHENTICATED",
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "core-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct TracksResponse<T> {
    pub tracks: Vec<T>,
}

// Parameters stay optional so a missing one is reported as VALIDATION_ERROR
// rather than axum's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct SimilarTracksParams {
    artist: Option<String>,
    track: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopTracksParams {
    artist: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LyricsParams {
    artist: Option<String>,
    title: Option<String>,
    album: Option<String>,
    duration: Option<String>,
}

async fn similar_tracks(
    State(state): State<AppState>,
    Query(params): Query<SimilarTracksParams>,
) -> Result<Response, CoreError> {
    let tracks = state
        .core
        .similar_tracks(
            params.artist.as_deref().unwrap_or_default(),
            params.track.as_deref().unwrap_or_default(),
            params.limit.as_deref(),
        )
        .await?;
    Ok(Json(TracksResponse { tracks }).into_response())
}

async fn top_tracks(
    State(state): State<AppState>,
    Query(params): Query<TopTracksParams>,
) -> Result<Response, CoreError> {
    let tracks = state
        .core
        .top_tracks(
            params.artist.as_deref().unwrap_or_default(),
            params.limit.as_deref(),
        )
        .await?;
    Ok(Json(TracksResponse { tracks }).into_response())
}

async fn proxy_album(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let upstream = match state.core.proxy_album(&album_id, query).await {
        Ok(upstream) => upstream,
        Err(e) => {
            let mut response = e.into_response();
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            return response;
        }
    };

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, upstream.body).into_response();
    let headers = response.headers_mut();
    for (name, value) in &upstream.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid proxied header"),
        }
    }
    headers
        .entry(CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("application/json"));
    response
}

async fn lyrics(
    State(state): State<AppState>,
    Query(params): Query<LyricsParams>,
) -> Result<Json<LyricsCacheEntry>, CoreError> {
    let query = LyricsQuery {
        artist: params.artist.unwrap_or_default(),
        title: params.title.unwrap_or_default(),
        album: params.album,
        duration: params.duration,
    };
    Ok(Json(state.core.lyrics(&query).await?))
}
