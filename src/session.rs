//! One live call, from the media stream's start message to the persisted
//! interaction record.

use crate::actions::detect_emergency;
use crate::context::load_context;
use crate::conversation_state::CallSession;
use crate::db_types::{InteractionType, NewInteraction};
use crate::error::AppError;
use crate::tasks::TransportEvent;
use crate::turn::{bounded, TurnEngine, TurnOutcome};
use crate::twilio_types::{OutboundMarkMeta, OutboundMediaMeta, StartMeta, TwilioOutbound};
use crate::types::{ChatMessage, SessionDeps};
use crate::utils::{b64_encode, truncate_chars};
use crate::utterance::{UtteranceBuffer, UtteranceSettings};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SUMMARY_INSTRUCTION: &str = "Summarize this call in 1-2 sentences";
const SUMMARY_FALLBACK_CHARS: usize = 200;
const BOOKING_MARKER: &str = "create_booking";
const OWNER_DEFAULT_NAME: &str = "Owner";
const CUSTOMER_DEFAULT_NAME: &str = "New Customer";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Active,
    Finalizing,
    Closed,
}

struct PhaseTracker(SessionPhase);

impl PhaseTracker {
    fn enter(&mut self, next: SessionPhase) {
        debug!(from=?self.0, to=?next, "session phase");
        self.0 = next;
    }
}

/// Caller and callee numbers from the stream's custom parameters, falling
/// back to the cached voice webhook payload.
fn resolve_numbers(deps: &SessionDeps, start: &StartMeta) -> Result<(String, String), AppError> {
    let cached = match deps.pending_calls.lock() {
        Ok(mut pending) => pending.remove(&start.call_sid),
        Err(_) => {
            error!("pending call cache poisoned");
            None
        }
    };
    let from = start
        .custom_parameters
        .get("From")
        .cloned()
        .or_else(|| cached.as_ref().map(|p| p.from.clone()));
    let to = start
        .custom_parameters
        .get("To")
        .cloned()
        .or_else(|| cached.as_ref().map(|p| p.to.clone()));
    match (from, to) {
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Err(AppError::Transport(
            "start message carried no caller or callee number",
        )),
    }
}

/// Send one synthesized payload followed by a mark naming it.
async fn play(
    outbound: &mpsc::Sender<TwilioOutbound>,
    stream_sid: &str,
    audio: &[u8],
    mark: String,
) -> Result<(), AppError> {
    let media = TwilioOutbound::Media {
        media: OutboundMediaMeta {
            payload: b64_encode(audio),
        },
        stream_sid: stream_sid.to_string(),
    };
    let mark = TwilioOutbound::Mark {
        mark: OutboundMarkMeta { name: mark },
        stream_sid: stream_sid.to_string(),
    };
    for msg in [media, mark] {
        outbound
            .send(msg)
            .await
            .map_err(|_| AppError::Transport("outbound channel closed"))?;
    }
    Ok(())
}

/// Drive a call from its start message to close. Only an unresolvable
/// business (or missing numbers) fails the session; every later failure is
/// absorbed.
pub async fn run_session(
    deps: SessionDeps,
    start: StartMeta,
    mut events: mpsc::Receiver<TransportEvent>,
    outbound: mpsc::Sender<TwilioOutbound>,
    stop: CancellationToken,
) -> Result<(), AppError> {
    let mut phase = PhaseTracker(SessionPhase::Connecting);

    let (caller, callee) = resolve_numbers(&deps, &start)?;
    let context = load_context(deps.store.as_ref(), &callee, &caller).await?;
    info!(
        business=%context.business.business_name,
        owner = context.is_owner,
        "session context loaded"
    );
    let mut session = CallSession::new(
        start.call_sid,
        start.stream_sid,
        caller,
        callee,
        context,
        deps.settings.history_window,
    );
    let engine = TurnEngine::new(deps.clone());

    // Spoken only; the greeting stays out of the transcript.
    if let Some(audio) = engine.synthesize(&deps.settings.greeting).await {
        if let Err(e) = play(&outbound, &session.stream_sid, &audio, "greeting".to_string()).await {
            warn!(error=%e, "failed to send greeting");
        }
    }

    phase.enter(SessionPhase::Active);
    let mut utterances = UtteranceBuffer::new(UtteranceSettings::default());
    'call: loop {
        let event = tokio::select! {
            biased;
            _ = stop.cancelled() => break 'call,
            event = events.recv() => event,
        };
        match event {
            Some(TransportEvent::Media(chunk)) => {
                for utterance in utterances.push(&chunk) {
                    if stop.is_cancelled() {
                        break 'call;
                    }
                    let outcome = tokio::select! {
                        outcome = engine.run_turn(&mut session, &utterance) => outcome,
                        _ = stop.cancelled() => {
                            info!("call ended mid-turn");
                            break 'call;
                        }
                    };
                    if let TurnOutcome::Responded {
                        audio: Some(audio), ..
                    } = outcome
                    {
                        let mark = format!("turn-{}", session.turns_completed);
                        if let Err(e) = play(&outbound, &session.stream_sid, &audio, mark).await {
                            warn!(error=%e, "failed to send reply audio");
                        }
                    }
                }
            }
            Some(TransportEvent::Mark(name)) => debug!(mark=%name, "playback finished"),
            Some(TransportEvent::Stop) | None => break 'call,
        }
    }
    stop.cancel();
    if utterances.is_speaking() {
        debug!("caller hung up mid-utterance; discarding buffered audio");
    }

    phase.enter(SessionPhase::Finalizing);
    finalize(&deps, &engine, &session).await;

    phase.enter(SessionPhase::Closed);
    Ok(())
}

async fn summarize(deps: &SessionDeps, transcript: &str) -> String {
    if transcript.trim().is_empty() {
        return String::new();
    }
    let messages = [
        ChatMessage::system(SUMMARY_INSTRUCTION),
        ChatMessage::user(transcript),
    ];
    match bounded(
        "completion",
        deps.settings.service_timeout,
        deps.completion.complete(&messages),
    )
    .await
    {
        Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
        Ok(_) => truncate_chars(transcript, SUMMARY_FALLBACK_CHARS).to_string(),
        Err(e) => {
            warn!(error=%e, "summary failed; using transcript excerpt");
            truncate_chars(transcript, SUMMARY_FALLBACK_CHARS).to_string()
        }
    }
}

/// Record the call: customer counter, summary, one interaction row, and the
/// urgent alert when needed. Best effort throughout.
async fn finalize(deps: &SessionDeps, engine: &TurnEngine, session: &CallSession) {
    let business = session.business();
    let transcript = session.full_transcript();

    let default_name = if session.is_owner() {
        OWNER_DEFAULT_NAME
    } else {
        CUSTOMER_DEFAULT_NAME
    };
    let customer_id = match deps
        .store
        .record_customer_call(business.id, &session.caller_number, default_name)
        .await
    {
        Ok(customer) => Some(customer.id),
        Err(e) => {
            error!(error=%e, "failed to record customer call");
            None
        }
    };

    let summary = summarize(deps, &transcript).await;
    let is_emergency = detect_emergency(&transcript);
    let interaction_type = if session.is_owner() {
        InteractionType::OwnerTest
    } else if transcript.contains(BOOKING_MARKER) {
        InteractionType::Booking
    } else {
        InteractionType::InboundCall
    };

    let interaction = NewInteraction {
        call_sid: session.call_sid.clone(),
        business_id: business.id,
        customer_id,
        interaction_type,
        caller_phone: session.caller_number.clone(),
        call_duration: session.duration_secs(),
        transcript: transcript.clone(),
        summary,
        is_emergency,
    };
    match deps.store.insert_interaction(interaction).await {
        Ok(row) => info!(
            interaction=%row.id,
            kind=%row.interaction_type,
            emergency = row.is_emergency,
            turns = session.turns_completed,
            "call recorded"
        ),
        Err(e) => error!(error=%e, "failed to record interaction"),
    }

    if is_emergency && !session.is_owner() {
        warn!("emergency call; alerting owner");
        engine.actions().alert_emergency(session, &transcript);
    }
}
