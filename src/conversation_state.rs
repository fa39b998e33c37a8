use crate::context::SessionContext;
use crate::db_types::Business;
use crate::turn::TurnPhase;
use crate::types::{ChatMessage, Role};

use std::collections::VecDeque;
use std::time::Instant;

/// One line of the call transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Role,
    pub text: String,
}

/// State of one live call. Owned by that call's session task and never shared.
pub struct CallSession {
    pub call_sid: String,
    /// The stream id collected from the Twilio start message
    pub stream_sid: String,
    pub caller_number: String,
    pub callee_number: String,
    pub context: SessionContext,
    /// Everything said on the call, in order; assistant lines are the raw AI text
    pub transcript: Vec<TranscriptEntry>,
    /// Rolling conversation sent back to the completion service
    history: VecDeque<ChatMessage>,
    history_window: usize,
    pub turn_phase: TurnPhase,
    pub turns_completed: usize,
    pub started_at: Instant,
}

impl CallSession {
    pub fn new(
        call_sid: String,
        stream_sid: String,
        caller_number: String,
        callee_number: String,
        context: SessionContext,
        history_window: usize,
    ) -> Self {
        Self {
            call_sid,
            stream_sid,
            caller_number,
            callee_number,
            context,
            transcript: vec![],
            history: VecDeque::with_capacity(history_window + 2),
            history_window,
            turn_phase: TurnPhase::AwaitingAudio,
            turns_completed: 0,
            started_at: Instant::now(),
        }
    }

    pub fn business(&self) -> &Business {
        &self.context.business
    }

    pub fn is_owner(&self) -> bool {
        self.context.is_owner
    }

    pub fn record(&mut self, speaker: Role, text: impl Into<String>) {
        self.transcript.push(TranscriptEntry {
            speaker,
            text: text.into(),
        });
    }

    /// Append a completed user/assistant exchange, dropping the oldest entries
    /// beyond the window.
    pub fn push_exchange(&mut self, user_text: &str, assistant_text: &str) {
        self.history.push_back(ChatMessage::user(user_text));
        self.history.push_back(ChatMessage::assistant(assistant_text));
        while self.history.len() > self.history_window {
            self.history.pop_front();
        }
    }

    /// The most recent `history_window` messages, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ChatMessage> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// `role: text` lines, one per transcript entry.
    pub fn full_transcript(&self) -> String {
        self.transcript
            .iter()
            .map(|e| format!("{}: {}", e.speaker.as_str(), e.text))
            .collect::<Vec<String>>()
            .join("\n")
    }

    pub fn duration_secs(&self) -> i32 {
        i32::try_from(self.started_at.elapsed().as_secs()).unwrap_or(i32::MAX)
    }
}
