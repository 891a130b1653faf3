//! Call bridge coordinator.
//!
//! Owns at most one [`Session`] at a time and wires the relay between its
//! AI speech connection and telephony stream:
//!
//! | Event                        | Action                                         |
//! |------------------------------|------------------------------------------------|
//! | telephony `Start`            | record stream id, send deferred configuration  |
//! | AI `AudioDelta`              | telephony `send_audio`                         |
//! | telephony `Media`            | AI `send_audio`                                |
//! | AI `SpeechStarted` (barge-in)| AI `clear_audio`, then telephony `clear_audio` |
//! | AI transcripts / `Error`     | observer                                       |
//! | either side `Disconnected`   | `end_session`                                  |
//!
//! Callbacks hold a weak reference to the session, so events arriving after
//! teardown are dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use super::error::{BridgeError, BridgeResult, EndReason};
use super::observer::{SessionError, SessionObserver, TracingObserver};
use super::session::{Session, SessionState};
use crate::core::audio::Side;
use crate::core::realtime::{
    RealtimeCallback, RealtimeConfig, RealtimeEvent, RealtimeEventKind, RealtimeFactory,
    SessionOptions, SessionSlot, default_realtime_factory,
};
use crate::core::telephony::{SharedTelephony, TelephonyCallback, TelephonyEvent, TelephonyEventKind};

/// Settings applied to every session the bridge creates.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Connection template; the API key is supplied per call
    pub realtime: RealtimeConfig,
    pub session: SessionOptions,
    /// Send the session configuration when the telephony stream starts
    /// instead of right after the AI connection opens.
    pub defer_session_config: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            realtime: RealtimeConfig::default(),
            session: SessionOptions::default(),
            defer_session_config: true,
        }
    }
}

struct BridgeInner {
    config: BridgeConfig,
    slot: Arc<SessionSlot>,
    factory: RealtimeFactory,
    observer: Arc<dyn SessionObserver>,
    current: Mutex<Option<Arc<Session>>>,
}

/// Coordinates the single active call.
///
/// Cheap to clone; clones share the same session and slot.
#[derive(Clone)]
pub struct CallBridge {
    inner: Arc<BridgeInner>,
}

impl CallBridge {
    pub fn new(
        config: BridgeConfig,
        factory: RealtimeFactory,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                config,
                slot: SessionSlot::new(),
                factory,
                observer,
                current: Mutex::new(None),
            }),
        }
    }

    /// Bridge backed by the configured realtime provider, logging through `tracing`.
    pub fn with_defaults(config: BridgeConfig) -> Self {
        Self::new(
            config,
            default_realtime_factory(),
            Arc::new(TracingObserver),
        )
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// The process-wide AI connection slot.
    pub fn slot(&self) -> &Arc<SessionSlot> {
        &self.inner.slot
    }

    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.inner.current.lock().clone()
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.current_session().map(|s| s.state())
    }

    pub fn is_active(&self) -> bool {
        self.inner.current.lock().is_some()
    }

    /// Open the AI speech connection for a new call.
    ///
    /// Resolves once the connection is `Open`, which is when the caller may
    /// tell the telephony provider to start streaming. A failed handshake or
    /// an already active connection is returned as an error.
    pub async fn begin_session(&self, credential: &str) -> BridgeResult<()> {
        let stale = self
            .inner
            .current
            .lock()
            .as_ref()
            .filter(|s| s.ai().connection_state().is_terminal())
            .map(|s| s.id());
        if let Some(id) = stale {
            tracing::info!(session_id = %id, "Discarding ended call session");
            self.end_if_current(id, EndReason::AiClosed).await;
        }

        let mut realtime_config = self.inner.config.realtime.clone();
        realtime_config.api_key = credential.to_string();

        let ai = (self.inner.factory)(realtime_config, self.inner.slot.clone())?;
        let session = Arc::new(Session::new(ai.clone()));
        self.wire_ai_lifecycle(&session);

        if let Err(e) = ai.connect().await {
            tracing::error!(session_id = %session.id(), "Failed to open AI speech connection: {}", e);
            ai.clear_subscriptions();
            return Err(e.into());
        }
        session.mark_ai_connected();

        if !self.inner.config.defer_session_config
            && let Err(e) = session.configure(&self.inner.config.session)
        {
            tracing::error!(session_id = %session.id(), "Failed to configure AI session: {}", e);
            ai.clear_subscriptions();
            if let Err(close_err) = ai.close().await {
                tracing::warn!("Error closing AI speech connection: {}", close_err);
            }
            return Err(e.into());
        }

        tracing::info!(
            session_id = %session.id(),
            provider = ai.provider_name(),
            "AI speech connection open"
        );
        *self.inner.current.lock() = Some(session);
        Ok(())
    }

    /// Accept the telephony media stream for the current session.
    pub fn attach_telephony(&self, telephony: SharedTelephony) -> BridgeResult<()> {
        let session = self
            .current_session()
            .ok_or(BridgeError::NoActiveSession)?;

        let ai_state = session.ai().connection_state();
        if !ai_state.is_open() {
            return Err(BridgeError::AiNotReady(ai_state));
        }

        if !session.attach_telephony(telephony.clone()) {
            return Err(BridgeError::TelephonyAlreadyAttached);
        }

        self.wire_relay(&session, &telephony);
        telephony.start()?;

        tracing::info!(
            session_id = %session.id(),
            provider = telephony.provider_name(),
            "Telephony stream attached"
        );
        Ok(())
    }

    /// Tear down the current session. Safe to call when nothing is active.
    pub async fn end_session(&self, reason: EndReason) {
        let session = self.inner.current.lock().take();
        match session {
            Some(session) => teardown(session, reason).await,
            None => tracing::debug!(%reason, "end_session: no active call session"),
        }
    }

    async fn end_if_current(&self, id: Uuid, reason: EndReason) {
        end_if_current(&self.inner, id, reason).await;
    }

    /// Error and disconnect handling for the AI side, active from connect on.
    fn wire_ai_lifecycle(&self, session: &Arc<Session>) {
        let ai = session.ai();
        let observer = self.inner.observer.clone();
        ai.on_message(
            RealtimeEventKind::Error,
            realtime_callback(move |event| {
                if let RealtimeEvent::Error(info) = event {
                    observer.on_error(&SessionError::Provider(info));
                }
            }),
        );

        let bridge = Arc::downgrade(&self.inner);
        let observer = self.inner.observer.clone();
        let id = session.id();
        ai.on_message(
            RealtimeEventKind::Disconnected,
            realtime_callback(move |event| {
                match event {
                    RealtimeEvent::Disconnected { error: Some(message) } => {
                        tracing::error!(session_id = %id, "AI speech connection failed: {}", message);
                        observer.on_error(&SessionError::Transport {
                            side: Side::AiSpeech,
                            message,
                        });
                    }
                    _ => tracing::info!(session_id = %id, "AI speech connection ended"),
                }
                spawn_end(bridge.clone(), id, EndReason::AiClosed);
            }),
        );
    }

    fn wire_relay(&self, session: &Arc<Session>, telephony: &SharedTelephony) {
        let ai = session.ai();
        let weak = Arc::downgrade(session);

        // Stream start: record the id and send the deferred configuration
        {
            let weak = weak.clone();
            let options = self.inner.config.session.clone();
            let observer = self.inner.observer.clone();
            let defer = self.inner.config.defer_session_config;
            telephony.on_message(
                TelephonyEventKind::Start,
                telephony_callback(move |event| {
                    let TelephonyEvent::Start { stream_sid, .. } = event else {
                        return;
                    };
                    let Some(session) = weak.upgrade() else {
                        return;
                    };
                    tracing::info!(session_id = %session.id(), stream_sid = %stream_sid, "Incoming stream has started");
                    session.record_stream(stream_sid);

                    if defer {
                        match session.configure(&options) {
                            Ok(true) => tracing::info!(session_id = %session.id(), "AI session configured"),
                            Ok(false) => {}
                            Err(e) => observer.on_error(&SessionError::Configuration(e.to_string())),
                        }
                    }
                }),
            );
        }

        // AI audio to the caller
        {
            let weak = weak.clone();
            ai.on_message(
                RealtimeEventKind::AudioDelta,
                realtime_callback(move |event| {
                    let RealtimeEvent::AudioDelta { frame, .. } = event else {
                        return;
                    };
                    let Some(session) = weak.upgrade() else {
                        return;
                    };
                    if session.can_relay()
                        && let Some(telephony) = session.telephony()
                    {
                        telephony.send_audio(&frame);
                    }
                }),
            );
        }

        // Caller audio to the AI
        {
            let weak = weak.clone();
            telephony.on_message(
                TelephonyEventKind::Media,
                telephony_callback(move |event| {
                    let TelephonyEvent::Media { frame, .. } = event else {
                        return;
                    };
                    let Some(session) = weak.upgrade() else {
                        return;
                    };
                    if session.can_relay() {
                        session.ai().send_audio(&frame);
                    }
                }),
            );
        }

        // Barge-in: AI input buffer first, then caller playback
        {
            let weak = weak.clone();
            ai.on_message(
                RealtimeEventKind::SpeechStarted,
                realtime_callback(move |_event| {
                    let Some(session) = weak.upgrade() else {
                        return;
                    };
                    tracing::debug!(session_id = %session.id(), "Caller started speaking, clearing audio");
                    session.ai().clear_audio();
                    if let Some(telephony) = session.telephony() {
                        telephony.clear_audio();
                    }
                }),
            );
        }

        for kind in [RealtimeEventKind::TranscriptDelta, RealtimeEventKind::TranscriptDone] {
            let observer = self.inner.observer.clone();
            ai.on_message(
                kind,
                realtime_callback(move |event| match event {
                    RealtimeEvent::TranscriptDelta(t) => observer.on_transcript_delta(&t),
                    RealtimeEvent::TranscriptDone(t) => observer.on_transcript_final(&t),
                    _ => {}
                }),
            );
        }

        telephony.on_message(
            TelephonyEventKind::Stop,
            telephony_callback(move |event| {
                if let TelephonyEvent::Stop { call_sid } = event {
                    tracing::info!(call_sid = ?call_sid, "Telephony stream stopped");
                }
            }),
        );

        let bridge = Arc::downgrade(&self.inner);
        let observer = self.inner.observer.clone();
        let id = session.id();
        telephony.on_message(
            TelephonyEventKind::Disconnected,
            telephony_callback(move |event| {
                match event {
                    TelephonyEvent::Disconnected { error: Some(message) } => {
                        tracing::error!(session_id = %id, "Telephony stream failed: {}", message);
                        observer.on_error(&SessionError::Transport {
                            side: Side::Telephony,
                            message,
                        });
                    }
                    _ => tracing::info!(session_id = %id, "Telephony stream ended"),
                }
                spawn_end(bridge.clone(), id, EndReason::TelephonyClosed);
            }),
        );
    }
}

/// Wrap a synchronous handler as a dispatch callback.
fn realtime_callback<F>(handler: F) -> RealtimeCallback
where
    F: Fn(RealtimeEvent) + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |event: RealtimeEvent| {
        let handler = handler.clone();
        Box::pin(async move { handler(event) }) as Pin<Box<dyn Future<Output = ()> + Send>>
    })
}

fn telephony_callback<F>(handler: F) -> TelephonyCallback
where
    F: Fn(TelephonyEvent) + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |event: TelephonyEvent| {
        let handler = handler.clone();
        Box::pin(async move { handler(event) }) as Pin<Box<dyn Future<Output = ()> + Send>>
    })
}

/// End a session from inside an adapter callback. Spawned because closing
/// waits on the very connection task that is dispatching.
fn spawn_end(bridge: Weak<BridgeInner>, id: Uuid, reason: EndReason) {
    tokio::spawn(async move {
        if let Some(bridge) = bridge.upgrade() {
            end_if_current(&bridge, id, reason).await;
        }
    });
}

async fn end_if_current(inner: &BridgeInner, id: Uuid, reason: EndReason) {
    let session = {
        let mut current = inner.current.lock();
        match current.as_ref() {
            Some(s) if s.id() == id => current.take(),
            _ => None,
        }
    };
    if let Some(session) = session {
        teardown(session, reason).await;
    }
}

async fn teardown(session: Arc<Session>, reason: EndReason) {
    tracing::info!(session_id = %session.id(), %reason, "Ending call session");

    let ai = session.ai().clone();
    let telephony = session.telephony();

    ai.clear_subscriptions();
    if let Some(telephony) = &telephony {
        telephony.clear_subscriptions();
    }
    session.mark_disconnected();

    if let Err(e) = ai.close().await {
        tracing::warn!(session_id = %session.id(), "Error closing AI speech connection: {}", e);
    }
    if let Some(telephony) = telephony
        && let Err(e) = telephony.close().await
    {
        tracing::warn!(session_id = %session.id(), "Error closing telephony stream: {}", e);
    }

    tracing::info!(session_id = %session.id(), "Call session ended");
}
