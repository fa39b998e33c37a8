use crate::consts::{
    EVENT_CHANNEL_CAPACITY, HOLD_MESSAGE, NOT_IN_SERVICE_MESSAGE, OUTBOUND_CHANNEL_CAPACITY,
    UNAVAILABLE_MESSAGE,
};
use crate::error::handle_error;
use crate::session::run_session;
use crate::tasks::{get_twilio_start_meta, read_twilio_events, send_twilio_ws_messages};
use crate::twilio_types::{
    wrap_twiml, ConnectAction, Connection, Response, ResponseAction, SayAction, StreamAction,
    StreamParameter, StreamTrack, TwilioConnectPayload,
};
use crate::types::AppState;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Host, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use futures_util::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

fn say(text: &str, language: &str) -> ResponseAction {
    ResponseAction::Say(SayAction {
        text: text.to_string(),
        language: Some(language.to_string()),
        ..Default::default()
    })
}

fn twiml_response(response: Response) -> (StatusCode, HeaderMap, String) {
    let twiml = wrap_twiml(xmlserde::xml_serialize(response));
    trace!("twiml: '{}'", twiml);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    (StatusCode::OK, headers, twiml)
}

/// Hold message, then connect the call's audio to our media stream endpoint.
/// The numbers ride along as stream parameters.
pub fn connect_twiml(host: &str, payload: &TwilioConnectPayload, language: &str) -> Response {
    let stream_action = StreamAction {
        url: format!("wss://{host}/twilio/stream"),
        track: Some(StreamTrack::Inbound),
        parameters: vec![
            StreamParameter {
                name: "From".to_string(),
                value: payload.from.clone(),
            },
            StreamParameter {
                name: "To".to_string(),
                value: payload.to.clone(),
            },
        ],
        ..Default::default()
    };
    Response {
        actions: vec![
            say(HOLD_MESSAGE, language),
            ResponseAction::Connect(ConnectAction {
                connection: Connection::Stream(stream_action),
            }),
        ],
    }
}

/// Twilio voice webhook for an incoming call.
pub async fn twiml_voice(
    Host(host): Host,
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> impl IntoResponse {
    trace!(body=%body, "voice webhook body");
    let payload = match serde_urlencoded::from_str::<TwilioConnectPayload>(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error=%e, "failed to deserialize Twilio connect payload");
            return (
                StatusCode::BAD_REQUEST,
                HeaderMap::new(),
                "Bad request".to_string(),
            );
        }
    };
    let language = &app_state.config.language_code;
    info!(call_sid=%payload.call_sid, to=%payload.to, "incoming call");

    let business = app_state.deps.store.find_active_business(&payload.to).await;
    match business {
        Ok(Some(business)) => {
            debug!(business=%business.business_name, "routing call to media stream");
            let response = connect_twiml(&host, &payload, language);
            match app_state.deps.pending_calls.lock() {
                Ok(mut pending) => {
                    pending.insert(payload.call_sid.clone(), payload);
                }
                Err(_) => error!("pending call cache poisoned"),
            }
            twiml_response(response)
        }
        Ok(None) => {
            warn!(to=%payload.to, "no active business for dialed number");
            twiml_response(Response {
                actions: vec![say(NOT_IN_SERVICE_MESSAGE, language)],
            })
        }
        Err(e) => {
            error!(error=%e, "failed to look up business");
            twiml_response(Response {
                actions: vec![say(UNAVAILABLE_MESSAGE, language)],
            })
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| socket_handler(socket, app_state))
}

async fn socket_handler(socket: WebSocket, app_state: Arc<AppState>) {
    let (twilio_sink, mut twilio_stream) = socket.split();
    // Get Twilio stream id and call parameters
    let start_meta = match get_twilio_start_meta(&mut twilio_stream).await {
        Ok(meta) => meta,
        Err(e) => {
            handle_error(e).await;
            return;
        }
    };
    debug!(meta = ?start_meta, "got start meta from twilio stream");

    let span = info_span!("call", call_sid = %start_meta.call_sid);
    let stop = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

    let reader = tokio::spawn(
        read_twilio_events(twilio_stream, event_tx, stop.clone()).instrument(span.clone()),
    );
    let writer =
        tokio::spawn(send_twilio_ws_messages(twilio_sink, outbound_rx).instrument(span.clone()));

    let res = run_session(
        app_state.deps.clone(),
        start_meta,
        event_rx,
        outbound_tx,
        stop.clone(),
    )
    .instrument(span)
    .await;
    if let Err(e) = res {
        handle_error(e).await;
    }

    // The session dropped its sender, so the writer drains and closes the
    // socket; the reader has nothing left to deliver.
    stop.cancel();
    match writer.await {
        Ok(Err(e)) => handle_error(e).await,
        Err(e) => error!(error=%e, "writer task failed"),
        Ok(Ok(())) => (),
    }
    reader.abort();
    debug!("call closed");
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CALLER, ROUTING_NUMBER};

    fn payload() -> TwilioConnectPayload {
        TwilioConnectPayload {
            call_sid: "CA1".to_string(),
            account_sid: Some("AC1".to_string()),
            call_status: Some("ringing".to_string()),
            direction: Some("inbound".to_string()),
            from: CALLER.to_string(),
            to: ROUTING_NUMBER.to_string(),
            from_city: None,
            from_country: None,
        }
    }

    #[test]
    fn connect_twiml_streams_with_numbers() {
        let twiml = wrap_twiml(xmlserde::xml_serialize(connect_twiml(
            "voice.example.test",
            &payload(),
            "en-GB",
        )));
        assert!(twiml.contains("language=\"en-GB\""));
        assert!(twiml.contains(HOLD_MESSAGE));
        assert!(twiml.contains("url=\"wss://voice.example.test/twilio/stream\""));
        assert!(twiml.contains("track=\"inbound_track\""));
        assert!(twiml.contains("<Parameter name=\"From\" value=\"+447700900123\""));
        assert!(twiml.contains("<Parameter name=\"To\" value=\"+441130000000\""));
    }

    #[test]
    fn not_in_service_has_no_stream() {
        let (status, headers, twiml) = twiml_response(Response {
            actions: vec![say(NOT_IN_SERVICE_MESSAGE, "en-GB")],
        });
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/xml");
        assert!(twiml.contains(NOT_IN_SERVICE_MESSAGE));
        assert!(!twiml.contains("<Connect"));
    }
}
