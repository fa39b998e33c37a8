mod actions;
mod completion;
mod config;
mod context;
mod conversation_state;
mod db_types;
mod deepgram_types;
mod directive;
mod error;
mod gemini_types;
mod google_types;
mod handlers;
mod notify;
mod openai_types;
mod prompt;
mod session;
mod store;
mod stt;
mod tasks;
#[cfg(test)]
mod testing;
mod tts;
mod turn;
mod twilio_types;
mod types;
mod utils;
mod utterance;

use crate::completion::{Completion, GeminiCompletion, OpenAICompletion};
use crate::config::{CompletionProvider, Config, SttProvider, TtsProvider};
use crate::error::AppError;
use crate::notify::TwilioSms;
use crate::store::PgStore;
use crate::stt::{DeepgramStt, GoogleStt, SpeechToText};
use crate::tts::{ElevenLabsTts, GoogleTts, TextToSpeech};
use crate::types::{
    system_clock, AppState, AudioFormat, SessionDeps, SessionSettings, VoiceGender, VoiceParams,
};

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

pub mod consts {
    pub const GREETING: &str = "Hello! How can I help you today?";
    pub const HOLD_MESSAGE: &str = "Please hold while I connect you.";
    pub const NOT_IN_SERVICE_MESSAGE: &str =
        "Sorry, the number you have dialed is not in service. Goodbye.";
    pub const UNAVAILABLE_MESSAGE: &str =
        "Sorry, we can't take your call right now. Please try again later.";
    pub const MIN_WAV_HEADER_SZ: usize = 44;
    /// Messages, not turns: 5 user/assistant pairs
    pub const HISTORY_WINDOW: usize = 10;
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
    pub const OUTBOUND_CHANNEL_CAPACITY: usize = 32;
}

fn init_tracing(log_level: Option<&str>) -> Result<(), AppError> {
    let crate_level = match log_level {
        Some(level) => LevelFilter::from_str(level)
            .map_err(|_| AppError::Config(format!("invalid LOG_LEVEL: {level}")))?,
        None => LevelFilter::DEBUG,
    };
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", LevelFilter::OFF),
            ("receptionist_rs", crate_level),
        ]));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Config(format!("failed to install tracing subscriber: {e}")))
}

fn key(value: &Option<String>, name: &str) -> Result<String, AppError> {
    value
        .clone()
        .ok_or_else(|| AppError::Config(format!("{name} not set")))
}

/// Pick the configured backends and bundle them with the store.
fn build_deps(config: &Config, store: PgStore) -> Result<SessionDeps, AppError> {
    let http_client = reqwest::Client::new();
    let timeout = config.service_timeout;

    let stt: Arc<dyn SpeechToText> = match config.stt_provider {
        SttProvider::Google => Arc::new(GoogleStt::new(
            http_client.clone(),
            key(&config.google_api_key, "GOOGLE_API_KEY")?,
            timeout,
        )),
        SttProvider::Deepgram => Arc::new(DeepgramStt::new(
            http_client.clone(),
            key(&config.deepgram_api_key, "DEEPGRAM_API_KEY")?,
            timeout,
        )),
    };
    let completion: Arc<dyn Completion> = match config.completion_provider {
        CompletionProvider::Gemini => Arc::new(GeminiCompletion::new(
            http_client.clone(),
            key(&config.gemini_api_key, "GEMINI_API_KEY")?,
            config.gemini_model.clone(),
            timeout,
        )),
        CompletionProvider::OpenAI => Arc::new(OpenAICompletion::new(
            http_client.clone(),
            key(&config.openai_api_key, "OPENAI_API_KEY")?,
            config.openai_model.clone(),
            timeout,
        )),
    };
    let tts: Arc<dyn TextToSpeech> = match config.tts_provider {
        TtsProvider::Google => Arc::new(GoogleTts::new(
            http_client.clone(),
            key(&config.google_api_key, "GOOGLE_API_KEY")?,
            timeout,
        )),
        TtsProvider::ElevenLabs => Arc::new(ElevenLabsTts::new(
            http_client.clone(),
            key(&config.elevenlabs_api_key, "ELEVENLABS_API_KEY")?,
            config.elevenlabs_voice_id.clone(),
            timeout,
        )),
    };
    let notifier = Arc::new(TwilioSms::new(
        http_client,
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_phone_number.clone(),
        timeout,
    ));

    let settings = SessionSettings {
        assistant_name: config.assistant_name.clone(),
        greeting: consts::GREETING.to_string(),
        audio: AudioFormat::telephony(config.language_code.clone()),
        voice: VoiceParams {
            language_code: config.language_code.clone(),
            name: config.tts_voice_name.clone(),
            gender: VoiceGender::Male,
        },
        service_timeout: timeout,
        history_window: consts::HISTORY_WINDOW,
    };

    Ok(SessionDeps {
        store: Arc::new(store),
        stt,
        completion,
        tts,
        notifier,
        clock: system_clock(),
        settings,
        pending_calls: Arc::new(Mutex::new(HashMap::new())),
    })
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // A missing .env is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();
    let config = Config::from_env()?;
    init_tracing(config.log_level.as_deref())?;
    info!(config=?config, "starting");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    info!("database ready");

    let deps = build_deps(&config, PgStore::new(pool))?;
    let addr = SocketAddr::from_str(&config.bind_addr)
        .map_err(|e| AppError::Config(format!("invalid BIND_ADDR {}: {e}", config.bind_addr)))?;
    let app_state = Arc::new(AppState { config, deps });

    let app = Router::new()
        .route("/twilio/voice", post(handlers::twiml_voice))
        .route("/twilio/stream", get(handlers::ws_handler))
        .route("/health", get(handlers::health))
        .with_state(app_state);

    info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| {
            tracing::error!(error=%e, "server error");
            AppError::Transport("server stopped unexpectedly")
        })
}
