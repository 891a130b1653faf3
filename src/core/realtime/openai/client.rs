//! OpenAI Realtime API client implementation.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: G.711 u-law (phone calls), base64 encoded
//!
//! # Connection Task
//!
//! `connect()` spawns one task that owns the socket. It forwards queued client
//! events and decodes server events, awaiting every subscriber of event N
//! before reading event N+1. When the socket ends the task releases the
//! session slot, publishes the terminal state and dispatches
//! [`RealtimeEvent::Disconnected`].
//!
//! `close()` waits on that task, so it must not be awaited from inside a
//! subscriber of the same connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message, client::IntoClientRequest};

use super::config::{OPENAI_BETA_HEADER, OPENAI_REALTIME_URL, OpenAIRealtimeModel};
use super::messages::{ClientEvent, ServerEvent, SessionConfig};
use crate::core::audio::{AudioFrame, Side};
use crate::core::connection::ConnectionState;
use crate::core::dispatch::EventDispatcher;
use crate::core::realtime::base::{
    BaseRealtime, ProviderErrorInfo, RealtimeCallback, RealtimeConfig, RealtimeError,
    RealtimeEvent, RealtimeEventKind, RealtimeResult, SessionOptions, TranscriptResult,
    TranscriptRole,
};
use crate::core::realtime::slot::{SessionSlot, SlotGuard};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on the WebSocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands for the connection task.
#[derive(Debug)]
enum Outbound {
    Event(ClientEvent),
    Close,
}

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime API client.
///
/// All state shared with the connection task lives behind `Arc`s so the
/// client can itself be shared (`Arc<OpenAIRealtime>`) between the bridge's
/// subscribers.
pub struct OpenAIRealtime {
    config: RealtimeConfig,
    model: OpenAIRealtimeModel,
    endpoint: String,
    slot: Arc<SessionSlot>,

    /// Connection state, observable by `close()`
    state: Arc<watch::Sender<ConnectionState>>,
    /// Set once `session.update` has been queued
    configured: AtomicBool,
    session_id: Arc<RwLock<Option<String>>>,

    ws_sender: Arc<Mutex<Option<mpsc::Sender<Outbound>>>>,
    dispatcher: Arc<EventDispatcher<RealtimeEvent>>,
    slot_guard: Arc<Mutex<Option<SlotGuard>>>,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
}

impl OpenAIRealtime {
    pub fn new(config: RealtimeConfig, slot: Arc<SessionSlot>) -> RealtimeResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let model = if config.model.is_empty() {
            OpenAIRealtimeModel::default()
        } else {
            OpenAIRealtimeModel::parse(&config.model).ok_or_else(|| {
                RealtimeError::InvalidConfiguration(format!(
                    "Unsupported realtime model: {}",
                    config.model
                ))
            })?
        };

        let endpoint = Self::build_ws_url(config.endpoint.as_deref(), model)?;
        let (state, _) = watch::channel(ConnectionState::Connecting);

        Ok(Self {
            config,
            model,
            endpoint,
            slot,
            state: Arc::new(state),
            configured: AtomicBool::new(false),
            session_id: Arc::new(RwLock::new(None)),
            ws_sender: Arc::new(Mutex::new(None)),
            dispatcher: Arc::new(EventDispatcher::new()),
            slot_guard: Arc::new(Mutex::new(None)),
            connection_handle: Mutex::new(None),
        })
    }

    /// Get the configured model.
    pub fn model(&self) -> OpenAIRealtimeModel {
        self.model
    }

    /// Full WebSocket URL including the model parameter.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Session ID reported by `session.created`.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Build the WebSocket URL with model parameter.
    fn build_ws_url(base: Option<&str>, model: OpenAIRealtimeModel) -> RealtimeResult<String> {
        let base = base.unwrap_or(OPENAI_REALTIME_URL);
        let mut url = url::Url::parse(base).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("Invalid realtime endpoint {base}: {e}"))
        })?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "Realtime endpoint must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }

        url.query_pairs_mut().append_pair("model", model.as_str());
        Ok(url.to_string())
    }

    fn build_request(&self) -> RealtimeResult<http::Request<()>> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|_| {
                RealtimeError::InvalidConfiguration("API key contains invalid characters".into())
            })?;
        let headers = request.headers_mut();
        headers.insert(http::header::AUTHORIZATION, bearer);
        headers.insert("OpenAI-Beta", HeaderValue::from_static(OPENAI_BETA_HEADER));

        Ok(request)
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "OpenAI Realtime state change");
        }
    }

    /// Queue a command for the connection task without waiting.
    fn enqueue(&self, command: Outbound) -> Result<(), mpsc::error::TrySendError<Outbound>> {
        match self.ws_sender.lock().as_ref() {
            Some(sender) => sender.try_send(command),
            None => Err(mpsc::error::TrySendError::Closed(command)),
        }
    }

    /// Map a decoded server event onto the bridge event vocabulary.
    fn translate(event: ServerEvent, session_id: &RwLock<Option<String>>) -> Option<RealtimeEvent> {
        match event {
            ServerEvent::SessionCreated { session } => {
                tracing::info!(session_id = %session.id, "OpenAI Realtime session created");
                *session_id.write() = Some(session.id.clone());
                Some(RealtimeEvent::SessionCreated {
                    session_id: session.id,
                })
            }

            ServerEvent::SessionUpdated { session } => {
                tracing::debug!(session_id = %session.id, "OpenAI Realtime session updated");
                Some(RealtimeEvent::SessionUpdated)
            }

            ServerEvent::Error { error } => {
                tracing::error!(
                    "OpenAI Realtime error: {} - {}",
                    error.error_type,
                    error.message
                );
                Some(RealtimeEvent::Error(ProviderErrorInfo {
                    error_type: error.error_type,
                    code: error.code,
                    message: error.message,
                }))
            }

            ServerEvent::SpeechStarted {
                audio_start_ms,
                item_id,
            } => {
                tracing::debug!("Speech started at {}ms", audio_start_ms);
                Some(RealtimeEvent::SpeechStarted {
                    audio_start_ms,
                    item_id,
                })
            }

            ServerEvent::SpeechStopped {
                audio_end_ms,
                item_id,
            } => {
                tracing::debug!("Speech stopped at {}ms", audio_end_ms);
                Some(RealtimeEvent::SpeechStopped {
                    audio_end_ms,
                    item_id,
                })
            }

            ServerEvent::ConversationItemCreated { item } => {
                tracing::debug!(item_id = ?item.id, role = ?item.role, "Conversation item created");
                Some(RealtimeEvent::ConversationItemCreated { item_id: item.id })
            }

            ServerEvent::TranscriptionCompleted {
                item_id,
                transcript,
            } => Some(RealtimeEvent::TranscriptDone(TranscriptResult {
                text: transcript,
                role: TranscriptRole::User,
                is_final: true,
                item_id,
            })),

            ServerEvent::AudioTranscriptDelta { item_id, delta } => {
                Some(RealtimeEvent::TranscriptDelta(TranscriptResult {
                    text: delta,
                    role: TranscriptRole::Assistant,
                    is_final: false,
                    item_id,
                }))
            }

            ServerEvent::AudioTranscriptDone {
                item_id,
                transcript,
            } => Some(RealtimeEvent::TranscriptDone(TranscriptResult {
                text: transcript,
                role: TranscriptRole::Assistant,
                is_final: true,
                item_id,
            })),

            ServerEvent::AudioDelta {
                response_id,
                item_id,
                delta,
            } => match ServerEvent::decode_audio_delta(&delta) {
                Ok(audio) => Some(RealtimeEvent::AudioDelta {
                    frame: AudioFrame::new(Bytes::from(audio), Side::AiSpeech),
                    item_id,
                    response_id,
                }),
                Err(e) => {
                    tracing::error!("Failed to decode audio delta: {}", e);
                    None
                }
            },

            ServerEvent::ResponseDone { response } => {
                tracing::debug!(status = ?response.status, "Response done: {}", response.id);
                Some(RealtimeEvent::ResponseDone {
                    response_id: response.id,
                })
            }

            _ => {
                tracing::trace!("Unhandled server event");
                None
            }
        }
    }
}

#[async_trait]
impl BaseRealtime for OpenAIRealtime {
    async fn connect(&self) -> RealtimeResult<()> {
        if self.connection_handle.lock().is_some() || self.connection_state().is_terminal() {
            return Err(RealtimeError::InvalidConfiguration(
                "A realtime connection cannot be reopened".to_string(),
            ));
        }

        // Fails before any network I/O when another call holds the slot
        let guard = self.slot.try_acquire()?;
        let request = self.build_request()?;

        self.set_state(ConnectionState::Connecting);
        tracing::info!(model = %self.model, "Connecting to OpenAI Realtime API");

        let connected = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| RealtimeError::Timeout("WebSocket handshake".to_string()))
            .and_then(|result| {
                result.map_err(|e| match e {
                    tungstenite::Error::Http(response)
                        if matches!(response.status().as_u16(), 401 | 403) =>
                    {
                        RealtimeError::AuthenticationFailed(format!(
                            "Handshake rejected with {}",
                            response.status()
                        ))
                    }
                    other => RealtimeError::ConnectionFailed(other.to_string()),
                })
            });

        let (ws_stream, _response) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!("OpenAI Realtime connection failed: {}", e);
                self.set_state(ConnectionState::Error);
                drop(guard);
                return Err(e);
            }
        };

        tracing::info!(slot_id = %guard.id(), "Connected to OpenAI Realtime API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<Outbound>(WS_CHANNEL_CAPACITY);
        *self.ws_sender.lock() = Some(tx);
        *self.slot_guard.lock() = Some(guard);

        let dispatcher = self.dispatcher.clone();
        let session_id = self.session_id.clone();
        let state = self.state.clone();
        let ws_sender = self.ws_sender.clone();
        let slot_guard = self.slot_guard.clone();

        self.set_state(ConnectionState::Open);

        let handle = tokio::spawn(async move {
            let mut failure: Option<String> = None;
            let mut commands_open = true;

            loop {
                tokio::select! {
                    command = rx.recv(), if commands_open => match command {
                        Some(Outbound::Event(event)) => {
                            let json = match serde_json::to_string(&event) {
                                Ok(j) => j,
                                Err(e) => {
                                    tracing::error!("Failed to serialize {}: {}", event.event_type(), e);
                                    continue;
                                }
                            };
                            if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                tracing::error!("Failed to send WebSocket message: {}", e);
                                failure = Some(e.to_string());
                                break;
                            }
                        }
                        Some(Outbound::Close) => {
                            tracing::debug!("Sending close frame to OpenAI Realtime");
                            if let Err(e) = ws_sink.send(Message::Close(None)).await {
                                tracing::warn!("Failed to send close frame: {}", e);
                                break;
                            }
                        }
                        // Sender dropped by close(): keep reading until the peer acknowledges
                        None => commands_open = false,
                    },

                    incoming = ws_stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerEvent>(&text) {
                                Ok(event) => {
                                    if let Some(event) = Self::translate(event, &session_id) {
                                        dispatcher.dispatch(event).await;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!("Failed to parse server event: {} - {}", e, text);
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                tracing::error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "WebSocket closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            failure = Some(e.to_string());
                            break;
                        }
                        None => break,
                    },
                }
            }

            *ws_sender.lock() = None;
            let terminal = if failure.is_some() {
                ConnectionState::Error
            } else {
                ConnectionState::Closed
            };
            // Slot is free by the time close() observes the terminal state
            slot_guard.lock().take();
            state.send_replace(terminal);

            tracing::info!(state = %terminal, "OpenAI Realtime connection task ended");
            dispatcher
                .dispatch(RealtimeEvent::Disconnected { error: failure })
                .await;
        });

        *self.connection_handle.lock() = Some(handle);
        Ok(())
    }

    async fn close(&self) -> RealtimeResult<()> {
        let current = self.connection_state();
        if current.is_terminal() {
            return Ok(());
        }

        let handle = self.connection_handle.lock().take();
        let Some(handle) = handle else {
            // Never connected
            self.set_state(ConnectionState::Closed);
            return Ok(());
        };

        self.set_state(ConnectionState::Closing);
        let sender = self.ws_sender.lock().take();
        if let Some(sender) = sender
            && sender.try_send(Outbound::Close).is_err()
        {
            // An aborted task never publishes a terminal state, so finish here
            tracing::warn!("Close command could not be queued, aborting connection task");
            handle.abort();
            self.slot_guard.lock().take();
            self.set_state(ConnectionState::Closed);
            return Ok(());
        }

        let mut state_rx = self.state.subscribe();
        let timeout = Duration::from_millis(self.config.close_timeout_ms);
        let acknowledged = tokio::time::timeout(timeout, state_rx.wait_for(|s| s.is_terminal()))
            .await
            .is_ok();

        if acknowledged {
            tracing::info!("OpenAI Realtime connection closed");
            return Ok(());
        }

        tracing::warn!(
            timeout_ms = self.config.close_timeout_ms,
            "OpenAI Realtime close was not acknowledged, aborting"
        );
        handle.abort();
        self.set_state(ConnectionState::Closed);
        self.slot_guard.lock().take();
        Err(RealtimeError::Timeout("close acknowledgment".to_string()))
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn configure_session(&self, options: &SessionOptions) -> RealtimeResult<()> {
        let state = self.connection_state();
        if !state.is_open() {
            tracing::error!(%state, "configure_session called before the connection is open");
            return Err(RealtimeError::NotConnected);
        }

        if self
            .configured
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RealtimeError::AlreadyConfigured);
        }

        let session = SessionConfig::from(options);
        self.enqueue(Outbound::Event(ClientEvent::SessionUpdate { session }))
            .map_err(|e| {
                self.configured.store(false, Ordering::Release);
                RealtimeError::WebSocketError(e.to_string())
            })?;

        tracing::info!("OpenAI Realtime session configuration sent");
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    fn on_message(&self, kind: RealtimeEventKind, callback: RealtimeCallback) {
        self.dispatcher.subscribe(kind, callback);
    }

    fn clear_subscriptions(&self) {
        self.dispatcher.clear();
    }

    fn send_audio(&self, frame: &AudioFrame) -> bool {
        let state = self.connection_state();
        if !state.is_open() {
            tracing::warn!(%state, bytes = frame.len(), "Dropping audio for OpenAI Realtime: connection not open");
            return false;
        }

        match self.enqueue(Outbound::Event(ClientEvent::audio_append(frame.payload()))) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping audio for OpenAI Realtime: {}", e);
                false
            }
        }
    }

    fn clear_audio(&self) -> bool {
        let state = self.connection_state();
        if !state.is_open() {
            tracing::warn!(%state, "Skipping input buffer clear: connection not open");
            return false;
        }

        match self.enqueue(Outbound::Event(ClientEvent::InputAudioBufferClear)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to queue input buffer clear: {}", e);
                false
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

impl Drop for OpenAIRealtime {
    fn drop(&mut self) {
        if let Some(handle) = self.connection_handle.get_mut().take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
