use crate::actions::ActionProcessor;
use crate::conversation_state::CallSession;
use crate::directive::{extract_directive, ExtractedAction};
use crate::error::ServiceError;
use crate::prompt::compose_prompt;
use crate::types::{ChatMessage, Role, SessionDeps};

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const APOLOGY: &str = "I apologize, I'm having a technical moment. Could you repeat that?";
/// Transcripts shorter than this (trimmed) are treated as noise.
const MIN_TRANSCRIPT_CHARS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingAudio,
    Transcribing,
    Generating,
    ExtractingAction,
    Synthesizing,
    Idle,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing intelligible was heard; no reply, no history change.
    Skipped,
    Responded {
        /// What was voiced, directive stripped
        spoken: String,
        /// `None` when synthesis failed or there was nothing to say
        audio: Option<Vec<u8>>,
    },
}

/// Bound a service call by `limit`, mapping expiry to `ServiceError::Timeout`.
pub async fn bounded<T, F>(service: &'static str, limit: Duration, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(ServiceError::Timeout {
            service,
            millis: limit.as_millis(),
        }),
    }
}

/// Runs one inbound utterance through recognition, completion, action
/// dispatch and synthesis.
pub struct TurnEngine {
    deps: SessionDeps,
    actions: ActionProcessor,
}

impl TurnEngine {
    pub fn new(deps: SessionDeps) -> Self {
        let actions = ActionProcessor::new(deps.store.clone(), deps.notifier.clone());
        Self { deps, actions }
    }

    pub fn actions(&self) -> &ActionProcessor {
        &self.actions
    }

    pub async fn run_turn(&self, session: &mut CallSession, audio: &[u8]) -> TurnOutcome {
        session.turn_phase = TurnPhase::Transcribing;
        let user_text = match self.transcribe(audio).await {
            Some(text) => text,
            None => {
                session.turn_phase = TurnPhase::Idle;
                return TurnOutcome::Skipped;
            }
        };
        info!(user=%user_text, "caller said");

        session.turn_phase = TurnPhase::Generating;
        let reply = self.generate(session, &user_text).await;

        session.turn_phase = TurnPhase::ExtractingAction;
        let extracted = extract_directive(&reply);
        match extracted.action {
            ExtractedAction::Parsed(directive) => {
                debug!(directive=?directive, "dispatching action");
                if let Err(e) = self.actions.apply(session, directive).await {
                    warn!(error=%e, "failed to apply action");
                }
            }
            ExtractedAction::Malformed(_) | ExtractedAction::None => {}
        }

        session.turn_phase = TurnPhase::Synthesizing;
        let audio = self.synthesize(&extracted.spoken).await;

        session.turn_phase = TurnPhase::Idle;
        session.turns_completed += 1;
        TurnOutcome::Responded {
            spoken: extracted.spoken,
            audio,
        }
    }

    /// `None` for silence, noise, or a recognition failure.
    async fn transcribe(&self, audio: &[u8]) -> Option<String> {
        let settings = &self.deps.settings;
        let res = bounded(
            "stt",
            settings.service_timeout,
            self.deps.stt.transcribe(audio, &settings.audio),
        )
        .await;
        let text = match res {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("no speech recognized");
                return None;
            }
            Err(e) => {
                warn!(error=%e, "speech recognition failed; skipping turn");
                return None;
            }
        };
        let text = text.trim();
        if text.chars().count() < MIN_TRANSCRIPT_CHARS {
            debug!(transcript=%text, "transcript too short; skipping turn");
            return None;
        }
        Some(text.to_string())
    }

    /// Ask for a reply to `user_text`. A completion failure yields the
    /// apology and leaves the history untouched; both lines still go into
    /// the transcript.
    async fn generate(&self, session: &mut CallSession, user_text: &str) -> String {
        let now = (self.deps.clock)();
        let system = compose_prompt(
            self.deps.store.as_ref(),
            &self.deps.settings.assistant_name,
            &session.context,
            now,
        )
        .await;

        let mut messages = Vec::with_capacity(session.history_len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(session.history().cloned());
        messages.push(ChatMessage::user(user_text));

        let reply = match bounded(
            "completion",
            self.deps.settings.service_timeout,
            self.deps.completion.complete(&messages),
        )
        .await
        {
            Ok(reply) => {
                session.push_exchange(user_text, &reply);
                reply
            }
            Err(e) => {
                warn!(error=%e, "completion failed; apologizing");
                APOLOGY.to_string()
            }
        };
        session.record(Role::User, user_text);
        session.record(Role::Assistant, reply.clone());
        reply
    }

    /// Synthesize `text` in the assistant's voice. Empty text and synthesis
    /// failures both yield `None`.
    pub async fn synthesize(&self, text: &str) -> Option<Vec<u8>> {
        if text.trim().is_empty() {
            return None;
        }
        let settings = &self.deps.settings;
        let res = bounded(
            "tts",
            settings.service_timeout,
            self.deps.tts.synthesize(text, &settings.voice, &settings.audio),
        )
        .await;
        match res {
            Ok(audio) if !audio.is_empty() => Some(audio),
            Ok(_) => {
                warn!("synthesis returned no audio");
                None
            }
            Err(e) => {
                warn!(error=%e, "synthesis failed; turn stays silent");
                None
            }
        }
    }
}
