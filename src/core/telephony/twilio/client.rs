//! Twilio Media Streams adapter.
//!
//! Twilio opens a WebSocket to this service for each bridged call. The HTTP
//! layer splits that socket into an inbound text stream and an outbound
//! [`MediaStreamFrame`] channel drained by its writer task; this adapter sits
//! between the two and never touches the socket directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::messages::{TwilioInbound, TwilioOutbound};
use crate::core::audio::{AudioFrame, Side};
use crate::core::connection::ConnectionState;
use crate::core::dispatch::EventDispatcher;
use crate::core::realtime::DEFAULT_CLOSE_TIMEOUT_MS;
use crate::core::telephony::base::{
    BaseTelephony, MediaFormat, TelephonyCallback, TelephonyError, TelephonyEvent,
    TelephonyEventKind, TelephonyResult,
};

/// Inbound text frames from the Twilio socket.
pub type InboundStream = BoxStream<'static, Result<String, TelephonyError>>;

/// Frames handed to the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaStreamFrame {
    Text(String),
    Close,
}

pub struct TwilioMediaStream {
    inbound: Mutex<Option<InboundStream>>,
    outbound: mpsc::Sender<MediaStreamFrame>,
    state: Arc<watch::Sender<ConnectionState>>,
    stream_sid: Arc<RwLock<Option<String>>>,
    call_sid: Arc<RwLock<Option<String>>>,
    dispatcher: Arc<EventDispatcher<TelephonyEvent>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl TwilioMediaStream {
    /// Wrap an accepted media stream socket.
    pub fn new(inbound: InboundStream, outbound: mpsc::Sender<MediaStreamFrame>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Open);
        Self {
            inbound: Mutex::new(Some(inbound)),
            outbound,
            state: Arc::new(state),
            stream_sid: Arc::new(RwLock::new(None)),
            call_sid: Arc::new(RwLock::new(None)),
            dispatcher: Arc::new(EventDispatcher::new()),
            reader_handle: Mutex::new(None),
            close_timeout: Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS),
        }
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Call SID reported in the start message.
    pub fn call_sid(&self) -> Option<String> {
        self.call_sid.read().clone()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Twilio media stream state change");
        }
    }

    /// Serialize and queue an outbound message for the writer.
    fn send_outbound(&self, message: &TwilioOutbound) -> bool {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize Twilio message: {}", e);
                return false;
            }
        };

        match self.outbound.try_send(MediaStreamFrame::Text(json)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping Twilio message: {}", e);
                false
            }
        }
    }

    /// Translate one inbound frame. Malformed frames yield `None`.
    fn translate(
        text: &str,
        stream_sid: &RwLock<Option<String>>,
        call_sid: &RwLock<Option<String>>,
    ) -> Option<TelephonyEvent> {
        let message = match serde_json::from_str::<TwilioInbound>(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Failed to parse Twilio message: {}", e);
                return None;
            }
        };

        match message {
            TwilioInbound::Connected { protocol, version } => {
                tracing::info!(%protocol, ?version, "Twilio media stream connected");
                Some(TelephonyEvent::Connected { protocol, version })
            }

            TwilioInbound::Start { start, .. } => {
                tracing::info!(
                    stream_sid = %start.stream_sid,
                    call_sid = ?start.call_sid,
                    tracks = ?start.tracks,
                    "Twilio media stream started"
                );
                *stream_sid.write() = Some(start.stream_sid.clone());
                *call_sid.write() = start.call_sid.clone();

                Some(TelephonyEvent::Start {
                    stream_sid: start.stream_sid,
                    call_sid: start.call_sid,
                    media_format: start.media_format.map(|f| MediaFormat {
                        encoding: f.encoding,
                        sample_rate: f.sample_rate,
                        channels: f.channels,
                    }),
                    custom_parameters: start.custom_parameters,
                })
            }

            TwilioInbound::Media { media, .. } => {
                match AudioFrame::from_base64(&media.payload, Side::Telephony) {
                    Ok(frame) => {
                        tracing::trace!(bytes = frame.len(), chunk = ?media.chunk, "Twilio media frame");
                        Some(TelephonyEvent::Media {
                            frame,
                            chunk: media.chunk.and_then(|c| c.parse().ok()),
                            timestamp_ms: media.timestamp.and_then(|t| t.parse().ok()),
                        })
                    }
                    Err(e) => {
                        tracing::warn!("Invalid base64 media payload: {}", e);
                        None
                    }
                }
            }

            TwilioInbound::Mark { mark, .. } => {
                tracing::debug!(name = %mark.name, "Twilio mark");
                Some(TelephonyEvent::Mark { name: mark.name })
            }

            TwilioInbound::Dtmf { dtmf, .. } => {
                tracing::info!(digit = %dtmf.digit, "Twilio DTMF");
                Some(TelephonyEvent::Dtmf { digit: dtmf.digit })
            }

            TwilioInbound::Stop { stop, .. } => {
                let call_sid = stop.and_then(|s| s.call_sid);
                tracing::info!(call_sid = ?call_sid, "Twilio media stream stopped");
                Some(TelephonyEvent::Stop { call_sid })
            }

            TwilioInbound::Unknown => {
                tracing::debug!("Ignoring unknown Twilio event");
                None
            }
        }
    }
}

#[async_trait]
impl BaseTelephony for TwilioMediaStream {
    fn start(&self) -> TelephonyResult<()> {
        let Some(mut inbound) = self.inbound.lock().take() else {
            return Err(TelephonyError::AlreadyStarted);
        };

        let dispatcher = self.dispatcher.clone();
        let state = self.state.clone();
        let stream_sid = self.stream_sid.clone();
        let call_sid = self.call_sid.clone();

        let handle = tokio::spawn(async move {
            let mut failure: Option<String> = None;

            while let Some(frame) = inbound.next().await {
                match frame {
                    Ok(text) => {
                        if let Some(event) = Self::translate(&text, &stream_sid, &call_sid) {
                            dispatcher.dispatch(event).await;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Twilio media stream error: {}", e);
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }

            let terminal = if failure.is_some() {
                ConnectionState::Error
            } else {
                ConnectionState::Closed
            };
            state.send_replace(terminal);
            tracing::info!(state = %terminal, "Twilio media stream reader ended");

            dispatcher
                .dispatch(TelephonyEvent::Disconnected { error: failure })
                .await;
        });

        *self.reader_handle.lock() = Some(handle);
        Ok(())
    }

    async fn close(&self) -> TelephonyResult<()> {
        if self.connection_state().is_terminal() {
            return Ok(());
        }

        self.set_state(ConnectionState::Closing);
        if self.outbound.try_send(MediaStreamFrame::Close).is_err() {
            tracing::debug!("Twilio writer already gone");
        }

        let handle = self.reader_handle.lock().take();
        let Some(handle) = handle else {
            // Never started: nothing is reading, so the socket is ours to drop
            self.inbound.lock().take();
            self.set_state(ConnectionState::Closed);
            return Ok(());
        };

        let mut state_rx = self.state.subscribe();
        let acknowledged =
            tokio::time::timeout(self.close_timeout, state_rx.wait_for(|s| s.is_terminal()))
                .await
                .is_ok();

        if acknowledged {
            tracing::info!("Twilio media stream closed");
            return Ok(());
        }

        tracing::warn!(
            timeout_ms = self.close_timeout.as_millis() as u64,
            "Twilio media stream close was not acknowledged, aborting reader"
        );
        handle.abort();
        self.set_state(ConnectionState::Closed);
        Err(TelephonyError::Timeout("close acknowledgment".to_string()))
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn stream_id(&self) -> Option<String> {
        self.stream_sid.read().clone()
    }

    fn on_message(&self, kind: TelephonyEventKind, callback: TelephonyCallback) {
        self.dispatcher.subscribe(kind, callback);
    }

    fn clear_subscriptions(&self) {
        self.dispatcher.clear();
    }

    fn send_audio(&self, frame: &AudioFrame) -> bool {
        let state = self.connection_state();
        if !state.is_open() {
            tracing::warn!(%state, bytes = frame.len(), "Dropping audio for Twilio: connection not open");
            return false;
        }

        let Some(stream_sid) = self.stream_id() else {
            tracing::warn!("Dropping audio for Twilio: stream has not started");
            return false;
        };

        self.send_outbound(&TwilioOutbound::media(stream_sid, frame.to_base64()))
    }

    fn clear_audio(&self) -> bool {
        let state = self.connection_state();
        if !state.is_open() {
            tracing::warn!(%state, "Skipping Twilio clear: connection not open");
            return false;
        }

        let Some(stream_sid) = self.stream_id() else {
            tracing::warn!("Skipping Twilio clear: stream has not started");
            return false;
        };

        tracing::debug!(stream_sid = %stream_sid, "Clearing Twilio playback buffer");
        self.send_outbound(&TwilioOutbound::clear(stream_sid))
    }

    fn provider_name(&self) -> &'static str {
        "twilio"
    }
}

impl Drop for TwilioMediaStream {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const START: &str = r#"{"event":"start","sequenceNumber":"1","start":{"accountSid":"AC1","streamSid":"CA123","callSid":"CA123","tracks":["inbound"],"customParameters":{},"mediaFormat":{"encoding":"audio/x-mulaw","sampleRate":8000,"channels":1}},"streamSid":"CA123"}"#;

    fn adapter() -> (
        TwilioMediaStream,
        fmpsc::UnboundedSender<Result<String, TelephonyError>>,
        mpsc::Receiver<MediaStreamFrame>,
    ) {
        let (in_tx, in_rx) = fmpsc::unbounded();
        let (out_tx, out_rx) = mpsc::channel(16);
        let stream = TwilioMediaStream::new(in_rx.boxed(), out_tx)
            .with_close_timeout(Duration::from_millis(200));
        (stream, in_tx, out_rx)
    }

    fn counter(kind_counter: Arc<AtomicUsize>) -> TelephonyCallback {
        Arc::new(move |_event: TelephonyEvent| {
            let kind_counter = kind_counter.clone();
            Box::pin(async move {
                kind_counter.fetch_add(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
    }

    #[test]
    fn test_send_before_start_is_dropped() {
        let (stream, _in_tx, mut out_rx) = adapter();
        let frame = AudioFrame::new(vec![1u8, 2, 3], Side::AiSpeech);

        assert!(!stream.send_audio(&frame));
        assert!(!stream.clear_audio());
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (stream, _in_tx, _out_rx) = adapter();
        stream.start().unwrap();
        assert!(matches!(stream.start(), Err(TelephonyError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_start_records_stream_sid_and_relays_media() {
        let (stream, in_tx, mut out_rx) = adapter();
        let media = Arc::new(AtomicUsize::new(0));
        stream.on_message(TelephonyEventKind::Media, counter(media.clone()));
        stream.start().unwrap();

        in_tx.unbounded_send(Ok(START.to_string())).unwrap();
        in_tx
            .unbounded_send(Ok(
                r#"{"event":"media","media":{"track":"inbound","chunk":"1","timestamp":"20","payload":"//8="},"streamSid":"CA123"}"#.to_string(),
            ))
            .unwrap();
        in_tx.unbounded_send(Ok("not json".to_string())).unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while media.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(stream.stream_id().as_deref(), Some("CA123"));
        assert_eq!(stream.call_sid().as_deref(), Some("CA123"));

        let frame = AudioFrame::new(vec![0xffu8, 0x7f], Side::AiSpeech);
        assert!(stream.send_audio(&frame));
        assert!(stream.clear_audio());

        let MediaStreamFrame::Text(sent) = out_rx.recv().await.unwrap() else {
            panic!("expected text frame");
        };
        let sent: serde_json::Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(sent["event"], "media");
        assert_eq!(sent["streamSid"], "CA123");
        assert_eq!(sent["media"]["payload"], frame.to_base64());

        let MediaStreamFrame::Text(clear) = out_rx.recv().await.unwrap() else {
            panic!("expected text frame");
        };
        assert!(clear.contains(r#""event":"clear""#));
    }

    #[tokio::test]
    async fn test_close_waits_for_inbound_end() {
        let (stream, in_tx, mut out_rx) = adapter();
        let disconnected = Arc::new(AtomicUsize::new(0));
        stream.on_message(TelephonyEventKind::Disconnected, counter(disconnected.clone()));
        stream.start().unwrap();

        // Simulate the socket writer: a close frame ends the peer's stream
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if frame == MediaStreamFrame::Close {
                    drop(in_tx);
                    break;
                }
            }
        });

        stream.close().await.unwrap();
        assert_eq!(stream.connection_state(), ConnectionState::Closed);
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);

        // Idempotent
        stream.close().await.unwrap();
        assert!(!stream.send_audio(&AudioFrame::new(vec![0u8], Side::AiSpeech)));
    }

    #[tokio::test]
    async fn test_close_times_out_when_peer_never_closes() {
        let (stream, _in_tx, _out_rx) = adapter();
        stream.start().unwrap();

        assert!(matches!(stream.close().await, Err(TelephonyError::Timeout(_))));
        assert_eq!(stream.connection_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_transport_error_is_terminal() {
        let (stream, in_tx, _out_rx) = adapter();
        stream.start().unwrap();
        in_tx
            .unbounded_send(Err(TelephonyError::Transport("reset".into())))
            .unwrap();

        let mut state_rx = stream.state.subscribe();
        tokio::time::timeout(Duration::from_secs(1), state_rx.wait_for(|s| s.is_terminal()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stream.connection_state(), ConnectionState::Error);
    }
}
