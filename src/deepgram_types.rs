use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response body of Deepgram's pre-recorded `/v1/listen` endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ListenResponse {
    pub metadata: Option<ListenMetadata>,
    pub results: ListenResults,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ListenMetadata {
    pub request_id: Uuid,
    #[serde(default)]
    pub duration: f32,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug)]
pub struct ListenResults {
    #[serde(default)]
    pub channels: Vec<Channel>,
}

#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct Channel {
    pub alternatives: Vec<Alternative>,
}

#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct Word {
    pub word: String,
    pub start: f32,
    pub end: f32,
    pub confidence: f32,
}

impl ListenResponse {
    /// Best transcript of the first channel, if any.
    pub fn best_transcript(&self) -> Option<&str> {
        self.results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.as_str())
    }
}
