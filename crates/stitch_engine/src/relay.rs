// Axum handler that relays a remote video to the browser with an open CORS header.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use stitch_logging::{stitch_debug, stitch_error};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use crate::FetchSettings;

pub const PROXY_PATH: &str = "/api/proxy-video";

const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("URL is required")]
    BadRequest,
    #[error("Failed to fetch video: {0}")]
    UpstreamFetch(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::BadRequest => StatusCode::BAD_REQUEST,
            RelayError::UpstreamFetch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared outbound client for the relay handler.
#[derive(Debug, Clone)]
pub struct RelayState {
    client: reqwest::Client,
}

impl RelayState {
    pub fn new(settings: &FetchSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[derive(Debug, Deserialize)]
struct RelayQuery {
    url: Option<String>,
}

pub fn relay_router(state: RelayState) -> Router {
    Router::new()
        .route(PROXY_PATH, get(proxy_handler))
        .with_state(state)
}

/// GET /api/proxy-video?url=...: one outbound GET, body streamed back as it arrives.
async fn proxy_handler(
    State(state): State<RelayState>,
    Query(query): Query<RelayQuery>,
) -> Result<Response, RelayError> {
    let url = query
        .url
        .filter(|url| !url.is_empty())
        .ok_or(RelayError::BadRequest)?;

    let upstream = state.client.get(&url).send().await.map_err(|err| {
        stitch_error!("relay fetch error url={} err={}", url, err);
        RelayError::UpstreamFetch(err.to_string())
    })?;

    let status = upstream.status();
    if !status.is_success() {
        stitch_error!("relay upstream status={} url={}", status.as_u16(), url);
        let reason = status.canonical_reason().unwrap_or_default();
        return Err(RelayError::UpstreamFetch(
            format!("Failed to fetch: {} {}", status.as_u16(), reason)
                .trim_end()
                .to_string(),
        ));
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    stitch_debug!(
        "relay streaming url={} content_type={:?} length={:?}",
        url,
        content_type,
        upstream.content_length()
    );

    let body = Body::from_stream(upstream.bytes_stream());
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ),
        ],
        body,
    )
        .into_response())
}

/// A running HTTP server for a router, with graceful shutdown.
pub struct RelayServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RelayServer {
    /// Bind `addr` (port 0 picks a free port) and serve `router` in the background.
    pub async fn bind(addr: SocketAddr, router: Router) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::start(listener, router)
    }

    /// Serve `router` on an already bound listener.
    pub fn start(listener: TcpListener, router: Router) -> io::Result<Self> {
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                stitch_error!("server stopped with error: {}", err);
            }
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL for reaching this server from the same host.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        loopback_url(self.addr)
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

/// `http://` URL for a listening address, with unspecified IPs mapped to loopback.
pub fn loopback_url(addr: SocketAddr) -> Result<Url, url::ParseError> {
    let ip = match addr.ip() {
        ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        ip => ip,
    };
    Url::parse(&format!("http://{}/", SocketAddr::new(ip, addr.port())))
}
