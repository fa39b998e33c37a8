use serde::{Deserialize, Serialize};

// Cloud Speech-to-Text v1 `speech:recognize`

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeRequest {
    pub config: RecognitionConfig,
    pub audio: RecognitionAudio,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    pub encoding: String,
    pub sample_rate_hertz: u32,
    pub language_code: String,
}

#[derive(Serialize, Debug)]
pub struct RecognitionAudio {
    pub content: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct RecognizeResponse {
    #[serde(default)]
    pub results: Vec<SpeechRecognitionResult>,
}

#[derive(Deserialize, Debug)]
pub struct SpeechRecognitionResult {
    #[serde(default)]
    pub alternatives: Vec<SpeechRecognitionAlternative>,
}

#[derive(Deserialize, Debug)]
pub struct SpeechRecognitionAlternative {
    #[serde(default)]
    pub transcript: String,
    pub confidence: Option<f32>,
}

// Cloud Text-to-Speech v1 `text:synthesize`

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeSpeechRequest {
    pub input: SynthesisInput,
    pub voice: VoiceSelectionParams,
    pub audio_config: AudioConfig,
}

#[derive(Serialize, Debug)]
pub struct SynthesisInput {
    pub text: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSelectionParams {
    pub language_code: String,
    pub name: String,
    pub ssml_gender: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub audio_encoding: String,
    pub sample_rate_hertz: u32,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeSpeechResponse {
    /// Base64-encoded audio.
    pub audio_content: String,
}
