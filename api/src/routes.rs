use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use camfeed_common::action::{Action, ActionCell};
use camfeed_common::shutdown::ShutdownListener;
use camfeed_producer::SharedFrameBuffer;
use serde::Serialize;
use tracing::info;

use crate::pages;
use crate::stream::{StreamEncoder, CONTENT_TYPE};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub action: Arc<ActionCell>,
    pub buffer: SharedFrameBuffer,
    pub shutdown: ShutdownListener,
    pub jpeg_quality: u8,
}

#[derive(Debug, Serialize)]
pub struct Status {
    action: Action,
    latest_seq: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u8>,
    stream_clients: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(Action::None.path(), get(index))
        .route(Action::RotateLeft.path(), get(rotate_left))
        .route(Action::RotateRight.path(), get(rotate_right))
        .route(Action::Flip180.path(), get(flip_image))
        .route(Action::Greyscale.path(), get(grey_scale))
        .route(Action::MotionOverlay.path(), get(motion_detection))
        .route("/video_feed", get(video_feed))
        .route("/status", get(status))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn select(state: &AppState, action: Action) -> Html<String> {
    let previous = state.action.set(action);
    if previous != action {
        info!(?previous, ?action, "camera action selected");
    }
    Html(pages::render(action))
}

/// GET /, landing page, resets to the unmodified feed
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    select(&state, Action::None)
}

/// GET /rotate-left
pub async fn rotate_left(State(state): State<Arc<AppState>>) -> Html<String> {
    select(&state, Action::RotateLeft)
}

/// GET /rotate-right
pub async fn rotate_right(State(state): State<Arc<AppState>>) -> Html<String> {
    select(&state, Action::RotateRight)
}

/// GET /flip-image
pub async fn flip_image(State(state): State<Arc<AppState>>) -> Html<String> {
    select(&state, Action::Flip180)
}

/// GET /grey-scale/
pub async fn grey_scale(State(state): State<Arc<AppState>>) -> Html<String> {
    select(&state, Action::Greyscale)
}

/// GET /motion-detection/
pub async fn motion_detection(State(state): State<Arc<AppState>>) -> Html<String> {
    select(&state, Action::MotionOverlay)
}

/// GET /video_feed, endless multipart JPEG stream of the processed frames
pub async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    let subscriber = state.buffer.subscribe(state.shutdown.clone());
    info!(
        stream_clients = state.buffer.subscriber_count(),
        "stream client connected"
    );
    let body = Body::from_stream(StreamEncoder::new(subscriber, state.jpeg_quality).into_stream());
    (
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        body,
    )
        .into_response()
}

/// GET /status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Status> {
    let latest = state.buffer.read_latest();
    Json(Status {
        action: state.action.get(),
        latest_seq: latest.as_ref().map(|f| f.seq()),
        width: latest.as_ref().map(|f| f.width()),
        height: latest.as_ref().map(|f| f.height()),
        channels: latest.as_ref().map(|f| f.channels()),
        stream_clients: state.buffer.subscriber_count(),
    })
}
