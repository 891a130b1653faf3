//! Twilio media stream WebSocket
//!
//! Twilio connects here after receiving the `<Connect><Stream>` TwiML. The
//! socket is split: a writer task drains [`MediaStreamFrame`]s into it, and
//! the read half becomes the inbound text stream of a [`TwilioMediaStream`]
//! that is attached to the current call session.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, future};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::telephony::{
    MediaStreamFrame, SharedTelephony, TelephonyError, TwilioMediaStream,
};
use crate::state::AppState;

/// Outbound frames buffered ahead of the socket writer
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    Path(call_sid): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!(%call_sid, "Media stream connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, call_sid, state))
}

async fn handle_media_stream(socket: WebSocket, call_sid: String, state: Arc<AppState>) {
    info!(%call_sid, "Media stream connected");

    let (mut sender, receiver) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<MediaStreamFrame>(CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let should_close = matches!(frame, MediaStreamFrame::Close);

            let result = match frame {
                MediaStreamFrame::Text(text) => sender.send(Message::Text(text.into())).await,
                MediaStreamFrame::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                debug!("Media stream socket write failed: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    // Text frames only; a close frame or read error ends the stream
    let inbound = receiver
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(_) => None,
                Err(e) => Some(Err(TelephonyError::Transport(e.to_string()))),
            })
        })
        .boxed();

    let close_timeout = Duration::from_millis(state.config.bridge.close_timeout_ms);
    let telephony: SharedTelephony = Arc::new(
        TwilioMediaStream::new(inbound, frame_tx.clone()).with_close_timeout(close_timeout),
    );

    if let Err(e) = state.bridge.attach_telephony(telephony) {
        warn!(%call_sid, "Rejecting media stream: {}", e);
        if frame_tx.send(MediaStreamFrame::Close).await.is_err() {
            error!(%call_sid, "Media stream writer already stopped");
        }
    }
}
