//! Twilio voice webhooks
//!
//! - `POST /incoming-call` opens the AI speech connection, then answers with
//!   TwiML that points Twilio's media stream back at this server.
//! - `POST /call-status-update` ends the session once the call reaches a
//!   terminal status.

use std::sync::Arc;

use axum::{
    Form,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, info};

use crate::core::bridge::EndReason;
use crate::state::AppState;

/// Form fields Twilio posts when a call arrives.
#[derive(Debug, Deserialize)]
pub struct IncomingCallForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
}

/// Twilio call progress values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Canceled,
    Failed,
    Error,
    #[serde(other)]
    Unknown,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Failed
                | CallStatus::Busy
                | CallStatus::NoAnswer
                | CallStatus::Canceled
                | CallStatus::Error
        )
    }

    /// How a session ends when the call reaches this status.
    pub fn end_reason(self) -> Option<EndReason> {
        match self {
            CallStatus::Completed => Some(EndReason::Completed),
            s if s.is_terminal() => Some(EndReason::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallStatusForm {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus")]
    pub call_status: CallStatus,
    #[serde(rename = "ErrorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "ErrorMessage", default)]
    pub error_message: Option<String>,
}

/// TwiML that connects the call to `wss://{host}/media-stream/{call_sid}`.
pub fn connect_stream_twiml(host: &str, call_sid: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="wss://{host}/media-stream/{call_sid}" /></Connect></Response>"#
    )
}

pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    Form(form): Form<IncomingCallForm>,
) -> Response {
    info!(
        call_sid = %form.call_sid,
        from = form.from.as_deref().unwrap_or("unknown"),
        to = form.to.as_deref().unwrap_or("unknown"),
        "Incoming call"
    );

    let Some(api_key) = state.config.openai_api_key.as_deref() else {
        error!("OPENAI_API_KEY is not configured; rejecting call");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    if let Err(e) = state.bridge.begin_session(api_key).await {
        error!(call_sid = %form.call_sid, "Failed to start call session: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let twiml = connect_stream_twiml(&state.config.public_host(), &form.call_sid);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        twiml,
    )
        .into_response()
}

pub async fn call_status_update(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CallStatusForm>,
) -> StatusCode {
    let call_sid = form.call_sid.as_deref().unwrap_or("unknown");

    if form.call_status == CallStatus::Error {
        error!(
            call_sid,
            error_code = form.error_code.as_deref(),
            error_message = form.error_message.as_deref(),
            "Call error"
        );
    } else {
        info!(call_sid, status = ?form.call_status, "Call status update");
    }

    if let Some(reason) = form.call_status.end_reason() {
        state.bridge.end_session(reason).await;
    }

    StatusCode::OK
}
