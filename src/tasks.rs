use crate::error::AppError;
use crate::twilio_types::{StartMeta, TwilioMessage, TwilioOutbound};
use crate::utils::b64_decode;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, Stream, StreamExt},
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// What the session cares about from the media stream once it has started.
#[derive(Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Decoded caller audio
    Media(Vec<u8>),
    /// Playback of a named outbound mark finished
    Mark(String),
    Stop,
}

/// Capture the Twilio Start media message from the beginning of a Twilio
/// websocket stream.
pub async fn get_twilio_start_meta(
    twilio_stream: &mut SplitStream<WebSocket>,
) -> Result<StartMeta, AppError> {
    loop {
        match twilio_stream.next().await {
            Some(Ok(Message::Text(json))) => match serde_json::from_str(&json) {
                Ok(TwilioMessage::Connected { protocol, version }) => {
                    trace!("Got connected message with {protocol} and {version}");
                }
                Ok(TwilioMessage::Start { start, .. }) => break Ok(start),
                Ok(_) => {
                    break Err(AppError::Transport(
                        "expected a connected or start message before any other",
                    ));
                }
                Err(e) => {
                    error!(error=%e, "failed to deserialize Twilio text message");
                    break Err(AppError::Transport("malformed Twilio message"));
                }
            },
            Some(Ok(Message::Ping(_))) => (),
            Some(Ok(_)) => {
                break Err(AppError::Transport(
                    "unexpected websocket message type from Twilio",
                ));
            }
            Some(Err(e)) => {
                error!(error=%e, "failed to receive message from Twilio");
                break Err(AppError::Transport("websocket receive error"));
            }
            None => break Err(AppError::Transport("end of stream before start")),
        }
    }
}

/// Map one Twilio text frame to a transport event. `Ok(None)` for frames the
/// session ignores.
pub fn parse_twilio_event(json: &str) -> Result<Option<TransportEvent>, AppError> {
    let message = serde_json::from_str::<TwilioMessage>(json).map_err(|e| {
        error!(error=%e, "failed to parse Twilio text message");
        AppError::Transport("failed to parse incoming text message")
    })?;
    match message {
        TwilioMessage::Media { media, .. } => match b64_decode(&media.payload) {
            Ok(chunk) => Ok(Some(TransportEvent::Media(chunk))),
            Err(e) => {
                warn!(error=%e, "dropping undecodable media payload");
                Ok(None)
            }
        },
        TwilioMessage::Mark { mark, .. } => Ok(Some(TransportEvent::Mark(mark.name))),
        TwilioMessage::Stop {
            sequence_number, ..
        } => {
            debug!("Got stop message {sequence_number}");
            Ok(Some(TransportEvent::Stop))
        }
        TwilioMessage::Connected { .. } | TwilioMessage::Start { .. } => {
            warn!("ignoring repeated connected/start message");
            Ok(None)
        }
    }
}

/// Task that forwards caller-side events to the session. A stop message (or
/// the stream ending) cancels `stop` so an in-flight turn is abandoned.
///
/// The socket is read continuously: while a turn holds the session and the
/// event queue is full, incoming frames are dropped rather than queued.
pub async fn read_twilio_events<S>(
    mut twilio_stream: S,
    events: mpsc::Sender<TransportEvent>,
    stop: CancellationToken,
) -> Result<(), AppError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut dropped: u64 = 0;
    let res = loop {
        match twilio_stream.next().await {
            Some(Ok(Message::Text(json))) => match parse_twilio_event(&json) {
                Ok(Some(TransportEvent::Stop)) => {
                    stop.cancel();
                    // Session may already be gone, or its queue full.
                    let _ = events.try_send(TransportEvent::Stop);
                    break Ok(());
                }
                Ok(Some(event)) => match events.try_send(event) {
                    Ok(()) => (),
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        trace!(dropped, "session busy; dropping inbound frame");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("session closed; stopping reader");
                        break Ok(());
                    }
                },
                Ok(None) => (),
                Err(e) => break Err(e),
            },
            Some(Ok(Message::Ping(_))) => (),
            Some(Ok(Message::Close(_))) | None => {
                info!("end of twilio stream");
                break Ok(());
            }
            Some(Ok(m)) => {
                warn!(message=?m, "unsupported message type from Twilio");
            }
            Some(Err(e)) => {
                error!(error=%e, "failed to receive message from Twilio");
                break Err(AppError::Transport(
                    "failed to receive message from Twilio stream",
                ));
            }
        }
    };
    if dropped > 0 {
        debug!(dropped, "inbound frames dropped while the session was busy");
    }
    stop.cancel();
    res
}

/// Task that funnels session output onto the websocket, then closes it.
pub async fn send_twilio_ws_messages(
    mut twilio_sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<TwilioOutbound>,
) -> Result<(), AppError> {
    while let Some(msg) = outbound.recv().await {
        let json = serde_json::to_string(&msg).map_err(|e| {
            error!(error=%e, "failed to serialize outbound message");
            AppError::Transport("outbound serialization")
        })?;
        if let Err(e) = twilio_sink.send(Message::Text(json)).await {
            error!(error=%e, "failed to send message to Twilio");
            return Err(AppError::Transport("websocket send error"));
        }
    }
    debug!("outbound channel closed; closing websocket");
    let _ = twilio_sink.close().await;
    Ok(())
}
