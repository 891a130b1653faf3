pub mod api;
pub mod voice;

use std::sync::Arc;

use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::state::AppState;

/// The complete application: health check plus the Twilio routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let security_headers = tower::ServiceBuilder::new().layer(SetResponseHeaderLayer::overriding(
        http::header::X_CONTENT_TYPE_OPTIONS,
        http::HeaderValue::from_static("nosniff"),
    ));

    api::create_api_router()
        .merge(voice::create_voice_router())
        .with_state(state)
        .layer(security_headers)
}
