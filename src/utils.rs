use crate::consts::MIN_WAV_HEADER_SZ;

use base64::{engine, Engine};

pub fn b64_encode(bytes: &[u8]) -> String {
    engine::general_purpose::STANDARD.encode(bytes)
}

pub fn b64_decode(enc: &str) -> Result<Vec<u8>, base64::DecodeError> {
    engine::general_purpose::STANDARD.decode(enc)
}

/// Google returns µ-law audio wrapped in a WAV container; the media stream wants
/// raw samples.
pub fn strip_wav_header(audio: &[u8]) -> &[u8] {
    if audio.len() < MIN_WAV_HEADER_SZ || !audio.starts_with(b"RIFF") {
        return audio;
    }
    // Walk the chunk list to the `data` chunk; headers are not always 44 bytes.
    let mut offset = 12;
    while offset + 8 <= audio.len() {
        let id = &audio[offset..offset + 4];
        let size = u32::from_le_bytes([
            audio[offset + 4],
            audio[offset + 5],
            audio[offset + 6],
            audio[offset + 7],
        ]) as usize;
        if id == b"data" {
            return &audio[offset + 8..];
        }
        offset += 8 + size + (size & 1);
    }
    audio
}

/// G.711 µ-law to 16-bit linear PCM.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let b = !byte;
    let sign = b & 0x80;
    let exponent = (b >> 4) & 0x07;
    let mantissa = b & 0x0f;
    let magnitude = ((((mantissa as i32) << 3) + 0x84) << exponent) - 0x84;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Mean absolute amplitude of a µ-law frame, normalized to 0.0..=1.0.
pub fn mulaw_frame_energy(frame: &[u8]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: u64 = frame
        .iter()
        .map(|b| (mulaw_to_linear(*b) as i32).unsigned_abs() as u64)
        .sum();
    (sum as f32 / frame.len() as f32) / i16::MAX as f32
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
