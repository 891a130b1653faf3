//! Twilio-facing routes
//!
//! # Endpoints
//!
//! - `POST /incoming-call` - voice webhook, answers with `<Connect><Stream>` TwiML
//! - `POST /call-status-update` - status callback
//! - `GET /media-stream/{call_sid}` - WebSocket upgrade for the call's media stream

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{media_stream, voice};
use crate::state::AppState;
use std::sync::Arc;

pub fn create_voice_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/incoming-call", post(voice::incoming_call))
        .route("/call-status-update", post(voice::call_status_update))
        .route(
            "/media-stream/{call_sid}",
            get(media_stream::media_stream_handler),
        )
        .layer(TraceLayer::new_for_http())
}
