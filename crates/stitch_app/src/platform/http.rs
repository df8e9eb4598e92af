//! Session API served next to the relay endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use stitch_core::{Effect, Msg, SessionViewModel, SourceRef};
use stitch_engine::{relay_router, RelayState, RunId};
use stitch_logging::stitch_info;

use super::session::{App, Dispatched, EditRejected};

const CROSS_ORIGIN_EMBEDDER_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-embedder-policy");
const CROSS_ORIGIN_OPENER_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-opener-policy");

/// Session routes plus the relay, with cross-origin isolation headers on every response.
pub fn server_router(app: Arc<App>, relay: RelayState) -> Router {
    session_router(app)
        .merge(relay_router(relay))
        .layer(middleware::from_fn(isolation_headers))
}

pub fn session_router(app: Arc<App>) -> Router {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/entries", post(add_entry))
        .route("/api/entries/{index}", put(change_entry).delete(remove_entry))
        .route("/api/run", post(run))
        .route("/api/error/dismiss", post(dismiss_error))
        .route("/api/output/{run_id}", get(download_output))
        .with_state(app)
}

async fn isolation_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        CROSS_ORIGIN_EMBEDDER_POLICY,
        HeaderValue::from_static("require-corp"),
    );
    headers.insert(
        CROSS_ORIGIN_OPENER_POLICY,
        HeaderValue::from_static("same-origin"),
    );
    response
}

fn rejected(status: StatusCode, message: &str, view: SessionViewModel) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message, "session": view })),
    )
        .into_response()
}

fn edit_response(result: Result<Dispatched, EditRejected>) -> Response {
    match result {
        Ok(dispatched) => Json(dispatched.view).into_response(),
        Err(EditRejected::Locked(view)) => rejected(
            StatusCode::CONFLICT,
            "entries cannot be edited while a run is in progress",
            view,
        ),
        Err(EditRejected::NoSuchEntry(view)) => {
            rejected(StatusCode::NOT_FOUND, "no entry at that position", view)
        }
    }
}

async fn get_session(State(app): State<Arc<App>>) -> Json<SessionViewModel> {
    Json(app.view())
}

async fn add_entry(State(app): State<Arc<App>>, Json(source): Json<SourceRef>) -> Response {
    edit_response(app.edit(None, Msg::EntryAdded(source)))
}

async fn change_entry(
    State(app): State<Arc<App>>,
    Path(index): Path<usize>,
    Json(source): Json<SourceRef>,
) -> Response {
    edit_response(app.edit(Some(index), Msg::EntryChanged { index, source }))
}

async fn remove_entry(State(app): State<Arc<App>>, Path(index): Path<usize>) -> Response {
    edit_response(app.edit(Some(index), Msg::EntryRemoved { index }))
}

async fn run(State(app): State<Arc<App>>) -> Response {
    let dispatched = app.dispatch(Msg::RunClicked);
    let started = dispatched
        .effects
        .iter()
        .any(|effect| matches!(effect, Effect::StartRun { .. }));
    if started {
        (StatusCode::ACCEPTED, Json(dispatched.view)).into_response()
    } else {
        rejected(
            StatusCode::CONFLICT,
            "a run cannot start in the current phase",
            dispatched.view,
        )
    }
}

async fn dismiss_error(State(app): State<Arc<App>>) -> Response {
    let dispatched = app.dispatch(Msg::ErrorDismissed);
    if dispatched.changed {
        Json(dispatched.view).into_response()
    } else {
        rejected(StatusCode::CONFLICT, "there is no error to dismiss", dispatched.view)
    }
}

async fn download_output(State(app): State<Arc<App>>, Path(run_id): Path<RunId>) -> Response {
    let Some(output) = app.outputs().get(run_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no output for that run" })),
        )
            .into_response();
    };
    stitch_info!("Serving output of run {} ({} bytes)", run_id, output.byte_len());
    let disposition = format!("attachment; filename=\"{}\"", output.filename);
    (
        [
            (header::CONTENT_TYPE, output.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        output.bytes,
    )
        .into_response()
}
