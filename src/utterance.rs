//! Splits the inbound µ-law stream into utterances using frame energy.

use crate::utils::mulaw_frame_energy;

use std::collections::VecDeque;
use tracing::trace;

/// 20 ms of 8 kHz µ-law
pub const FRAME_BYTES: usize = 160;
const FRAME_MS: u32 = 20;

#[derive(Clone, Debug)]
pub struct UtteranceSettings {
    /// Normalized mean amplitude above which a frame counts as speech
    pub energy_threshold: f32,
    pub min_speech_ms: u32,
    pub trailing_silence_ms: u32,
    pub max_utterance_ms: u32,
    /// Silent frames kept ahead of speech onset so the first syllable survives
    pub pre_roll_frames: usize,
}

impl Default for UtteranceSettings {
    fn default() -> Self {
        Self {
            energy_threshold: 0.02,
            min_speech_ms: 200,
            trailing_silence_ms: 700,
            max_utterance_ms: 15_000,
            pre_roll_frames: 10,
        }
    }
}

pub struct UtteranceBuffer {
    settings: UtteranceSettings,
    /// Bytes not yet making up a whole frame
    partial: Vec<u8>,
    pre_roll: VecDeque<Vec<u8>>,
    audio: Vec<u8>,
    speaking: bool,
    speech_ms: u32,
    silence_ms: u32,
    utterance_ms: u32,
}

impl UtteranceBuffer {
    pub fn new(settings: UtteranceSettings) -> Self {
        Self {
            pre_roll: VecDeque::with_capacity(settings.pre_roll_frames + 1),
            settings,
            partial: Vec::with_capacity(FRAME_BYTES),
            audio: vec![],
            speaking: false,
            speech_ms: 0,
            silence_ms: 0,
            utterance_ms: 0,
        }
    }

    /// Feed raw media bytes. Returns every utterance completed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut completed = vec![];
        self.partial.extend_from_slice(chunk);
        while self.partial.len() >= FRAME_BYTES {
            let frame: Vec<u8> = self.partial.drain(..FRAME_BYTES).collect();
            if let Some(utterance) = self.push_frame(frame) {
                completed.push(utterance);
            }
        }
        completed
    }

    fn push_frame(&mut self, frame: Vec<u8>) -> Option<Vec<u8>> {
        let voiced = mulaw_frame_energy(&frame) >= self.settings.energy_threshold;

        if !self.speaking {
            if !voiced {
                self.pre_roll.push_back(frame);
                while self.pre_roll.len() > self.settings.pre_roll_frames {
                    self.pre_roll.pop_front();
                }
                return None;
            }
            trace!("speech onset");
            self.speaking = true;
            for f in self.pre_roll.drain(..) {
                self.audio.extend_from_slice(&f);
                self.utterance_ms += FRAME_MS;
            }
        }

        self.audio.extend_from_slice(&frame);
        self.utterance_ms += FRAME_MS;
        if voiced {
            self.speech_ms += FRAME_MS;
            self.silence_ms = 0;
        } else {
            self.silence_ms += FRAME_MS;
        }

        if self.utterance_ms >= self.settings.max_utterance_ms {
            return Some(self.take());
        }
        if self.silence_ms >= self.settings.trailing_silence_ms {
            if self.speech_ms >= self.settings.min_speech_ms {
                return Some(self.take());
            }
            // A click or cough; discard and go back to listening.
            trace!(speech_ms = self.speech_ms, "discarding short burst");
            self.reset();
        }
        None
    }

    fn take(&mut self) -> Vec<u8> {
        let utterance = std::mem::take(&mut self.audio);
        trace!(
            bytes = utterance.len(),
            speech_ms = self.speech_ms,
            "utterance complete"
        );
        self.reset();
        utterance
    }

    /// Drop any buffered audio and return to listening.
    pub fn reset(&mut self) {
        self.audio.clear();
        self.pre_roll.clear();
        self.speaking = false;
        self.speech_ms = 0;
        self.silence_ms = 0;
        self.utterance_ms = 0;
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }
}
