use crate::completion::Completion;
use crate::config::Config;
use crate::notify::Notifier;
use crate::store::DataStore;
use crate::stt::SpeechToText;
use crate::tts::TextToSpeech;
use crate::twilio_types::TwilioConnectPayload;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;

/// Who produced a line of conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged text turn sent to the completion service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioEncoding {
    Mulaw,
}

/// The transport's fixed audio parameters; used for recognition and synthesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    pub sample_rate_hz: u32,
    pub language_code: String,
}

impl AudioFormat {
    pub fn telephony(language_code: impl Into<String>) -> Self {
        Self {
            encoding: AudioEncoding::Mulaw,
            sample_rate_hz: 8_000,
            language_code: language_code.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceGender {
    Male,
    Female,
}

/// Identity of the assistant's synthesized voice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceParams {
    pub language_code: String,
    pub name: String,
    pub gender: VoiceGender,
}

pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(OffsetDateTime::now_utc)
}

/// Tunables for a single call session.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub assistant_name: String,
    pub greeting: String,
    pub audio: AudioFormat,
    pub voice: VoiceParams,
    pub service_timeout: Duration,
    pub history_window: usize,
}

/// Everything one call session needs. Cloned into each session; the service
/// handles are stateless and shared.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn DataStore>,
    pub stt: Arc<dyn SpeechToText>,
    pub completion: Arc<dyn Completion>,
    pub tts: Arc<dyn TextToSpeech>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Clock,
    pub settings: SessionSettings,
    // call sid => twilio voice webhook payload
    pub pending_calls: Arc<Mutex<HashMap<String, TwilioConnectPayload>>>,
}

pub struct AppState {
    pub config: Config,
    pub deps: SessionDeps,
}
