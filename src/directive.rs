//! Structured directives embedded in AI replies.
//!
//! The assistant is asked to append a JSON object such as
//! `{"action": "create_booking", ...}` after its spoken sentence. Everything
//! before the object is voiced; the object itself drives a data mutation.

use serde::Deserialize;
use tracing::warn;

const ACTION_KEY: &str = "\"action\"";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CreateBooking {
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub booking_date: String,
    pub booking_time: String,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EditBooking {
    pub customer_name: String,
    pub old_time: String,
    pub new_time: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Directive {
    CreateBooking(CreateBooking),
    EditBooking(EditBooking),
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug)]
pub enum ExtractedAction {
    None,
    Parsed(Directive),
    /// A directive marker was present but the object did not parse. The raw
    /// reply is spoken unchanged in this case.
    Malformed(serde_json::Error),
}

#[derive(Debug)]
pub struct ExtractedResponse {
    /// Text to synthesize
    pub spoken: String,
    pub action: ExtractedAction,
}

/// Byte offset of the first `{` whose first key is `"action"`.
fn find_directive_start(text: &str) -> Option<usize> {
    text.match_indices('{')
        .map(|(idx, _)| idx)
        .find(|idx| text[idx + 1..].trim_start().starts_with(ACTION_KEY))
}

/// Drop a dangling code fence the model sometimes opens before the object.
fn trim_spoken_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end();
    let trimmed = trimmed
        .strip_suffix("```json")
        .or_else(|| trimmed.strip_suffix("```"))
        .unwrap_or(trimmed);
    trimmed.trim().to_string()
}

/// Split an AI reply into its spoken text and its directive, if any.
pub fn extract_directive(response: &str) -> ExtractedResponse {
    let Some(start) = find_directive_start(response) else {
        return ExtractedResponse {
            spoken: response.trim().to_string(),
            action: ExtractedAction::None,
        };
    };

    // Parse only the first JSON value; trailing text (a closing fence, a
    // sign-off) is ignored.
    let mut values = serde_json::Deserializer::from_str(&response[start..]).into_iter::<Directive>();
    match values.next() {
        Some(Ok(directive)) => ExtractedResponse {
            spoken: trim_spoken_prefix(&response[..start]),
            action: ExtractedAction::Parsed(directive),
        },
        Some(Err(e)) => {
            warn!(error=%e, "failed to parse action directive");
            ExtractedResponse {
                spoken: response.trim().to_string(),
                action: ExtractedAction::Malformed(e),
            }
        }
        None => ExtractedResponse {
            spoken: response.trim().to_string(),
            action: ExtractedAction::None,
        },
    }
}
