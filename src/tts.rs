use crate::error::{check_status, ServiceError};
use crate::google_types::{
    AudioConfig, SynthesisInput, SynthesizeSpeechRequest, SynthesizeSpeechResponse,
    VoiceSelectionParams,
};
use crate::types::{AudioEncoding, AudioFormat, VoiceGender, VoiceParams};
use crate::utils::{b64_decode, strip_wav_header};

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const ELEVENLABS_MODEL: &str = "eleven_turbo_v2_5";

/// Speech synthesis: text in, raw audio in the transport's encoding out.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceParams,
        format: &AudioFormat,
    ) -> Result<Vec<u8>, ServiceError>;
}

pub struct GoogleTts {
    http_client: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl GoogleTts {
    pub fn new(http_client: reqwest::Client, api_key: String, timeout: Duration) -> Self {
        Self {
            http_client,
            api_key,
            timeout,
        }
    }
}

fn google_synthesis_request(
    text: &str,
    voice: &VoiceParams,
    format: &AudioFormat,
) -> SynthesizeSpeechRequest {
    SynthesizeSpeechRequest {
        input: SynthesisInput {
            text: text.to_string(),
        },
        voice: VoiceSelectionParams {
            language_code: voice.language_code.clone(),
            name: voice.name.clone(),
            ssml_gender: match voice.gender {
                VoiceGender::Male => "MALE",
                VoiceGender::Female => "FEMALE",
            }
            .to_string(),
        },
        audio_config: AudioConfig {
            audio_encoding: match format.encoding {
                AudioEncoding::Mulaw => "MULAW",
            }
            .to_string(),
            sample_rate_hertz: format.sample_rate_hz,
        },
    }
}

#[async_trait]
impl TextToSpeech for GoogleTts {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceParams,
        format: &AudioFormat,
    ) -> Result<Vec<u8>, ServiceError> {
        const SERVICE: &str = "google-tts";
        let request = google_synthesis_request(text, voice, format);
        let resp = self
            .http_client
            .post(GOOGLE_TTS_URL)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        let resp = resp.json::<SynthesizeSpeechResponse>().await.map_err(|e| {
            error!(error=%e, "failed to deserialize google tts response");
            ServiceError::Decode {
                service: SERVICE,
                reason: e.to_string(),
            }
        })?;
        let audio = b64_decode(&resp.audio_content).map_err(|e| ServiceError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })?;
        debug!(bytes = audio.len(), "got google tts payload");
        let samples = strip_wav_header(&audio);
        if samples.is_empty() {
            return Err(ServiceError::Empty { service: SERVICE });
        }
        Ok(samples.to_vec())
    }
}

pub struct ElevenLabsTts {
    http_client: reqwest::Client,
    api_key: String,
    voice_id: String,
    timeout: Duration,
}

impl ElevenLabsTts {
    pub fn new(
        http_client: reqwest::Client,
        api_key: String,
        voice_id: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_key,
            voice_id,
            timeout,
        }
    }
}

fn elevenlabs_output_format(format: &AudioFormat) -> String {
    match format.encoding {
        AudioEncoding::Mulaw => format!("ulaw_{}", format.sample_rate_hz),
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    /// The configured ElevenLabs voice id stands in for `voice.name`.
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceParams,
        format: &AudioFormat,
    ) -> Result<Vec<u8>, ServiceError> {
        const SERVICE: &str = "elevenlabs-tts";
        let url = format!("{ELEVENLABS_TTS_URL}/{}", self.voice_id);
        let output_format = elevenlabs_output_format(format);
        let resp = self
            .http_client
            .post(url)
            .query(&[("output_format", output_format.as_str())])
            .header("xi-api-key", self.api_key.as_str())
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "text": text,
                "model_id": ELEVENLABS_MODEL,
            }))
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        let audio = resp.bytes().await.map_err(ServiceError::http(SERVICE))?;
        if audio.is_empty() {
            return Err(ServiceError::Empty { service: SERVICE });
        }
        Ok(audio.to_vec())
    }
}
