use crate::deepgram_types::ListenResponse;
use crate::error::{check_status, ServiceError};
use crate::google_types::{
    RecognitionAudio, RecognitionConfig, RecognizeRequest, RecognizeResponse,
};
use crate::types::{AudioEncoding, AudioFormat};
use crate::utils::b64_encode;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

const GOOGLE_SPEECH_URL: &str = "https://speech.googleapis.com/v1/speech:recognize";
const DEEPGRAM_LISTEN_URL: &str = "https://api.deepgram.com/v1/listen";

/// Speech recognition: one utterance of audio in, best transcript out.
/// `Ok(None)` means the service heard nothing.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &AudioFormat,
    ) -> Result<Option<String>, ServiceError>;
}

pub struct GoogleStt {
    http_client: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl GoogleStt {
    pub fn new(http_client: reqwest::Client, api_key: String, timeout: Duration) -> Self {
        Self {
            http_client,
            api_key,
            timeout,
        }
    }
}

fn google_encoding(encoding: AudioEncoding) -> &'static str {
    match encoding {
        AudioEncoding::Mulaw => "MULAW",
    }
}

fn best_google_transcript(resp: RecognizeResponse) -> Option<String> {
    resp.results
        .into_iter()
        .next()
        .and_then(|r| r.alternatives.into_iter().next())
        .map(|a| a.transcript)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl SpeechToText for GoogleStt {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &AudioFormat,
    ) -> Result<Option<String>, ServiceError> {
        const SERVICE: &str = "google-stt";
        let request = RecognizeRequest {
            config: RecognitionConfig {
                encoding: google_encoding(format.encoding).to_string(),
                sample_rate_hertz: format.sample_rate_hz,
                language_code: format.language_code.clone(),
            },
            audio: RecognitionAudio {
                content: b64_encode(audio),
            },
        };
        let resp = self
            .http_client
            .post(GOOGLE_SPEECH_URL)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        let resp = resp.json::<RecognizeResponse>().await.map_err(|e| {
            error!(error=%e, "failed to deserialize google speech response");
            ServiceError::Decode {
                service: SERVICE,
                reason: e.to_string(),
            }
        })?;
        let transcript = best_google_transcript(resp);
        debug!(transcript=?transcript, "google speech result");
        Ok(transcript)
    }
}

pub struct DeepgramStt {
    http_client: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl DeepgramStt {
    pub fn new(http_client: reqwest::Client, api_key: String, timeout: Duration) -> Self {
        Self {
            http_client,
            api_key,
            timeout,
        }
    }
}

fn deepgram_encoding(encoding: AudioEncoding) -> &'static str {
    match encoding {
        AudioEncoding::Mulaw => "mulaw",
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &AudioFormat,
    ) -> Result<Option<String>, ServiceError> {
        const SERVICE: &str = "deepgram-stt";
        let sample_rate = format.sample_rate_hz.to_string();
        let resp = self
            .http_client
            .post(DEEPGRAM_LISTEN_URL)
            .query(&[
                ("encoding", deepgram_encoding(format.encoding)),
                ("sample_rate", sample_rate.as_str()),
                ("language", format.language_code.as_str()),
                ("punctuate", "true"),
            ])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.api_key),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .timeout(self.timeout)
            .body(audio.to_vec())
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        let resp = resp.json::<ListenResponse>().await.map_err(|e| {
            error!(error=%e, "failed to deserialize deepgram listen response");
            ServiceError::Decode {
                service: SERVICE,
                reason: e.to_string(),
            }
        })?;
        debug!(request_id=?resp.metadata.as_ref().map(|m| m.request_id), "deepgram listen result");
        Ok(resp
            .best_transcript()
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }
}
