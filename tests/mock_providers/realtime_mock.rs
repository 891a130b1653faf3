//! WebSocket Mock Server for the OpenAI Realtime API
//!
//! Accepts connections on a random local port, greets each one with
//! `session.created`, records every client event, and lets the test push
//! server events or close the socket from the server side.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

/// What the mock saw during one opening handshake
#[derive(Debug, Clone)]
pub struct HandshakeRecord {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub openai_beta: Option<String>,
}

enum Push {
    Event(Value),
    Close,
}

struct Shared {
    handshakes: Mutex<Vec<HandshakeRecord>>,
    received: Mutex<Vec<Value>>,
    reject_with: Mutex<Option<u16>>,
    connections: AtomicUsize,
    close_from_client: AtomicBool,
    push_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Push>>,
}

pub struct MockRealtimeServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    push_tx: mpsc::UnboundedSender<Push>,
    accept_task: JoinHandle<()>,
}

impl MockRealtimeServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (push_tx, push_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            handshakes: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            reject_with: Mutex::new(None),
            connections: AtomicUsize::new(0),
            close_from_client: AtomicBool::new(false),
            push_rx: tokio::sync::Mutex::new(push_rx),
        });

        let accept_shared = shared.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = accept_shared.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, shared).await;
                });
            }
        });

        Self {
            addr,
            shared,
            push_tx,
            accept_task,
        }
    }

    /// Endpoint to put in `RealtimeConfig::endpoint`
    pub fn endpoint(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    /// Fail every following handshake with this HTTP status
    pub fn reject_handshakes(&self, status: u16) {
        *self.shared.reject_with.lock() = Some(status);
    }

    pub fn push(&self, event: Value) {
        let _ = self.push_tx.send(Push::Event(event));
    }

    /// Send a close frame from the server side
    pub fn close_connection(&self) {
        let _ = self.push_tx.send(Push::Close);
    }

    pub fn handshakes(&self) -> Vec<HandshakeRecord> {
        self.shared.handshakes.lock().clone()
    }

    /// Every client event received so far, across connections
    pub fn received(&self) -> Vec<Value> {
        self.shared.received.lock().clone()
    }

    pub fn received_of_type(&self, event_type: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|event| event["type"] == event_type)
            .collect()
    }

    /// Accepted (upgraded) connections
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Whether a client sent a close frame
    pub fn close_from_client(&self) -> bool {
        self.shared.close_from_client.load(Ordering::SeqCst)
    }
}

impl Drop for MockRealtimeServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Server events in the shape the Realtime API sends them
pub mod events {
    use serde_json::{Value, json};

    pub fn speech_started(audio_start_ms: u64) -> Value {
        json!({
            "type": "input_audio_buffer.speech_started",
            "event_id": "evt_speech",
            "audio_start_ms": audio_start_ms,
            "item_id": "item_caller"
        })
    }

    pub fn audio_delta(delta_b64: &str) -> Value {
        json!({
            "type": "response.audio.delta",
            "event_id": "evt_audio",
            "response_id": "resp_1",
            "item_id": "item_bot",
            "output_index": 0,
            "content_index": 0,
            "delta": delta_b64
        })
    }

    pub fn transcript_done(transcript: &str) -> Value {
        json!({
            "type": "response.audio_transcript.done",
            "event_id": "evt_transcript",
            "item_id": "item_bot",
            "transcript": transcript
        })
    }

    pub fn caller_transcript(transcript: &str) -> Value {
        json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "event_id": "evt_caller",
            "item_id": "item_caller",
            "content_index": 0,
            "transcript": transcript
        })
    }

    pub fn error(message: &str) -> Value {
        json!({
            "type": "error",
            "event_id": "evt_error",
            "error": {
                "type": "invalid_request_error",
                "code": "invalid_value",
                "message": message
            }
        })
    }
}

async fn handle_connection(
    stream: TcpStream,
    shared: Arc<Shared>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let reject = *shared.reject_with.lock();
    let recorder = shared.clone();

    let callback = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        recorder.handshakes.lock().push(HandshakeRecord {
            path: req.uri().path().to_string(),
            query: req.uri().query().map(str::to_string),
            authorization: header("authorization"),
            openai_beta: header("openai-beta"),
        });

        match reject {
            Some(status) => {
                let mut error = ErrorResponse::new(Some("rejected by mock".to_string()));
                *error.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED);
                Err(error)
            }
            None => Ok(response),
        }
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    shared.connections.fetch_add(1, Ordering::SeqCst);
    let (mut write, mut read) = ws_stream.split();

    let created = json!({
        "type": "session.created",
        "event_id": "evt_created",
        "session": {
            "id": "sess_mock",
            "object": "realtime.session",
            "model": "gpt-4o-realtime-preview-2024-10-01"
        }
    });
    write.send(Message::Text(created.to_string().into())).await?;

    let mut push_rx = shared.push_rx.lock().await;

    loop {
        tokio::select! {
            push = push_rx.recv() => match push {
                Some(Push::Event(event)) => {
                    write.send(Message::Text(event.to_string().into())).await?;
                }
                Some(Push::Close) => {
                    write.send(Message::Close(None)).await?;
                }
                None => break,
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(event) = serde_json::from_str::<Value>(&text) {
                        shared.received.lock().push(event);
                    }
                }
                // tungstenite answers the close; keep reading until the stream ends
                Some(Ok(Message::Close(_))) => {
                    shared.close_from_client.store(true, Ordering::SeqCst);
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            }
        }
    }

    Ok(())
}
