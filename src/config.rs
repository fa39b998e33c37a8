use crate::error::AppError;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 4_000;
const DEFAULT_ASSISTANT_NAME: &str = "Julian";
const DEFAULT_LANGUAGE_CODE: &str = "en-GB";
const DEFAULT_TTS_VOICE_NAME: &str = "en-GB-Neural2-B";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ELEVENLABS_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SttProvider {
    Google,
    Deepgram,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionProvider {
    Gemini,
    OpenAI,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    Google,
    ElevenLabs,
}

impl FromStr for SttProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(AppError::Config(format!("unsupported STT_PROVIDER: {other}"))),
        }
    }
}

impl FromStr for CompletionProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            other => Err(AppError::Config(format!(
                "unsupported COMPLETION_PROVIDER: {other}"
            ))),
        }
    }
}

impl FromStr for TtsProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "elevenlabs" | "eleven-labs" => Ok(Self::ElevenLabs),
            other => Err(AppError::Config(format!("unsupported TTS_PROVIDER: {other}"))),
        }
    }
}

/// Process configuration, read once at start-up.
#[derive(Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_level: Option<String>,
    pub stt_provider: SttProvider,
    pub completion_provider: CompletionProvider,
    pub tts_provider: TtsProvider,
    pub google_api_key: Option<String>,
    pub deepgram_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub service_timeout: Duration,
    pub assistant_name: String,
    pub language_code: String,
    pub tts_voice_name: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &"[REDACTED]")
            .field("database_max_connections", &self.database_max_connections)
            .field("log_level", &self.log_level)
            .field("stt_provider", &self.stt_provider)
            .field("completion_provider", &self.completion_provider)
            .field("tts_provider", &self.tts_provider)
            .field("google_api_key", &redact(&self.google_api_key))
            .field("deepgram_api_key", &redact(&self.deepgram_api_key))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("gemini_model", &self.gemini_model)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_model", &self.openai_model)
            .field("elevenlabs_api_key", &redact(&self.elevenlabs_api_key))
            .field("elevenlabs_voice_id", &self.elevenlabs_voice_id)
            .field("twilio_account_sid", &self.twilio_account_sid)
            .field("twilio_auth_token", &"[REDACTED]")
            .field("twilio_phone_number", &self.twilio_phone_number)
            .field("service_timeout", &self.service_timeout)
            .field("assistant_name", &self.assistant_name)
            .field("language_code", &self.language_code)
            .field("tts_voice_name", &self.tts_voice_name)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Keys belonging to providers
    /// that are not selected are optional.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| AppError::Config(format!("{key} not set")))
        };

        let stt_provider = get("STT_PROVIDER")
            .map(|v| v.parse::<SttProvider>())
            .transpose()?
            .unwrap_or(SttProvider::Google);
        let completion_provider = get("COMPLETION_PROVIDER")
            .map(|v| v.parse::<CompletionProvider>())
            .transpose()?
            .unwrap_or(CompletionProvider::Gemini);
        let tts_provider = get("TTS_PROVIDER")
            .map(|v| v.parse::<TtsProvider>())
            .transpose()?
            .unwrap_or(TtsProvider::Google);

        let needs_google =
            stt_provider == SttProvider::Google || tts_provider == TtsProvider::Google;
        let google_api_key = if needs_google {
            Some(require("GOOGLE_API_KEY")?)
        } else {
            get("GOOGLE_API_KEY")
        };
        let deepgram_api_key = match stt_provider {
            SttProvider::Deepgram => Some(require("DEEPGRAM_API_KEY")?),
            SttProvider::Google => get("DEEPGRAM_API_KEY"),
        };
        let gemini_api_key = match completion_provider {
            CompletionProvider::Gemini => Some(require("GEMINI_API_KEY")?),
            CompletionProvider::OpenAI => get("GEMINI_API_KEY"),
        };
        let openai_api_key = match completion_provider {
            CompletionProvider::OpenAI => Some(require("OPENAI_API_KEY")?),
            CompletionProvider::Gemini => get("OPENAI_API_KEY"),
        };
        let elevenlabs_api_key = match tts_provider {
            TtsProvider::ElevenLabs => Some(require("ELEVENLABS_API_KEY")?),
            TtsProvider::Google => get("ELEVENLABS_API_KEY"),
        };

        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v.parse().map_err(|_| {
                AppError::Config(format!("DATABASE_MAX_CONNECTIONS is not a number: {v}"))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let service_timeout_ms = match get("SERVICE_TIMEOUT_MS") {
            Some(v) => v.parse().map_err(|_| {
                AppError::Config(format!("SERVICE_TIMEOUT_MS is not a number: {v}"))
            })?,
            None => DEFAULT_SERVICE_TIMEOUT_MS,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: require("DATABASE_URL")?,
            database_max_connections,
            log_level: get("LOG_LEVEL"),
            stt_provider,
            completion_provider,
            tts_provider,
            google_api_key,
            deepgram_api_key,
            gemini_api_key,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            openai_api_key,
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            elevenlabs_api_key,
            elevenlabs_voice_id: get("ELEVENLABS_VOICE_ID")
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_VOICE_ID.to_string()),
            twilio_account_sid: require("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: require("TWILIO_AUTH_TOKEN")?,
            twilio_phone_number: require("TWILIO_PHONE_NUMBER")?,
            service_timeout: Duration::from_millis(service_timeout_ms),
            assistant_name: get("ASSISTANT_NAME")
                .unwrap_or_else(|| DEFAULT_ASSISTANT_NAME.to_string()),
            language_code: get("LANGUAGE_CODE")
                .unwrap_or_else(|| DEFAULT_LANGUAGE_CODE.to_string()),
            tts_voice_name: get("TTS_VOICE_NAME")
                .unwrap_or_else(|| DEFAULT_TTS_VOICE_NAME.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/receptionist"),
            ("GOOGLE_API_KEY", "google-key"),
            ("GEMINI_API_KEY", "gemini-key"),
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "secret"),
            ("TWILIO_PHONE_NUMBER", "+441130000000"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, AppError> {
        Config::from_lookup(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_select_google_and_gemini() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.stt_provider, SttProvider::Google);
        assert_eq!(config.completion_provider, CompletionProvider::Gemini);
        assert_eq!(config.tts_provider, TtsProvider::Google);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.service_timeout, Duration::from_millis(4_000));
        assert_eq!(config.language_code, "en-GB");
    }

    #[test]
    fn selected_provider_key_is_required() {
        let mut env = base_env();
        env.insert("COMPLETION_PROVIDER", "openai");
        match load(&env) {
            Err(AppError::Config(msg)) => assert!(msg.contains("OPENAI_API_KEY")),
            other => panic!("expected config error, got {other:?}"),
        }
        env.insert("OPENAI_API_KEY", "sk-test");
        let config = load(&env).unwrap();
        assert_eq!(config.completion_provider, CompletionProvider::OpenAI);
    }

    #[test]
    fn google_key_optional_when_unused() {
        let mut env = base_env();
        env.remove("GOOGLE_API_KEY");
        env.insert("STT_PROVIDER", "deepgram");
        env.insert("DEEPGRAM_API_KEY", "dg");
        env.insert("TTS_PROVIDER", "elevenlabs");
        env.insert("ELEVENLABS_API_KEY", "el");
        let config = load(&env).unwrap();
        assert!(config.google_api_key.is_none());
        assert_eq!(config.tts_provider, TtsProvider::ElevenLabs);
    }

    #[test]
    fn rejects_unknown_provider_and_bad_numbers() {
        let mut env = base_env();
        env.insert("TTS_PROVIDER", "espeak");
        assert!(matches!(load(&env), Err(AppError::Config(_))));

        let mut env = base_env();
        env.insert("SERVICE_TIMEOUT_MS", "soon");
        assert!(matches!(load(&env), Err(AppError::Config(_))));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = load(&base_env()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("google-key"));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
