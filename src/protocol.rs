//! Wire format for the Gemini web chat endpoint.
//!
//! The browser front end double-JSON-encodes its request envelope, and the
//! service replies with a newline-delimited body whose real payload hides
//! behind a second, string-encoded JSON layer. That is an upstream protocol
//! detail, not a choice of this crate; every positional offset lives here
//! so a shape change upstream touches one module.

use crate::conversation::ConversationState;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;
use thiserror::Error;

/// Production origin of the web interface.
pub const BASE_URL: &str = "https://gemini.google.com";
/// Landing page that embeds the anti-forgery token for authenticated
/// sessions.
pub const LANDING_PATH: &str = "/app";
/// Internal chat endpoint. Despite the name, the full body is read before
/// parsing; no streaming.
pub const CHAT_PATH: &str = "/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate";

/// Backend build the request format targets.
pub const BUILD_ID: &str = "boq_assistant-bard-web-server_20230713.13_p0";

/// Fixed query parameters for every chat request. `_reqid` stays at "0";
/// the service accepts it without a per-call increment.
pub const QUERY_PARAMS: [(&str, &str); 3] = [("bl", BUILD_ID), ("_reqid", "0"), ("rt", "c")];

static AT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""SNlM0e":"(.*?)""#).expect("token regex must be valid"));

/// Scrape the per-session anti-forgery token from the landing-page HTML.
#[must_use]
pub fn extract_at_token(html: &str) -> Option<String> {
    AT_TOKEN.captures(html).map(|c| c[1].to_string())
}

/// Build the `f.req` form value: the message struct
/// `[[question], null, [conversationId, responseId, choiceId]]` serialized,
/// wrapped as `[null, <serialized>]`, and serialized again.
pub fn encode_envelope(
    question: &str,
    state: &ConversationState,
) -> serde_json::Result<String> {
    let message = json!([
        [question],
        null,
        [state.conversation_id, state.response_id, state.choice_id],
    ]);
    let inner = serde_json::to_string(&message)?;
    serde_json::to_string(&json!([null, inner]))
}

/// Unexpected response shape. Recovered by the client into a result with
/// null content; never propagated to `ask` callers.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response body has no payload line at index 3")]
    MissingPayloadLine,

    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload path {0} is missing or has the wrong type")]
    MissingField(&'static str),
}

/// Decoded inner payload of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPayload {
    /// Primary text answer. `None` when the service returned no answer
    /// (e.g. a safety filter) despite a well-formed payload.
    pub content: Option<String>,
    /// Image URLs; malformed descriptors are skipped individually.
    pub images: Vec<String>,
    pub conversation_id: String,
    pub response_id: String,
    pub choice_id: String,
}

/// Decode a chat response body.
///
/// Line index 3 holds a JSON array whose element `[0][2]` is a
/// string-encoded second JSON document, the real payload. Returns
/// `Ok(None)` when that inner document is absent or empty, which the
/// service uses to signal "no answer"; conversation state must then stay
/// unchanged.
pub fn decode_response(body: &str) -> Result<Option<ChatPayload>, DecodeError> {
    let line = body.lines().nth(3).ok_or(DecodeError::MissingPayloadLine)?;
    let outer: Value = serde_json::from_str(line)?;

    let inner = match outer.get(0).and_then(|v| v.get(2)) {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => return Ok(None),
    };
    let payload: Value = serde_json::from_str(inner)?;

    let ids = payload.get(1).ok_or(DecodeError::MissingField("[1]"))?;
    let conversation_id = ids
        .get(0)
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("[1][0]"))?
        .to_string();
    let response_id = ids
        .get(1)
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("[1][1]"))?
        .to_string();

    let choice = payload
        .get(4)
        .and_then(|v| v.get(0))
        .ok_or(DecodeError::MissingField("[4][0]"))?;
    let choice_id = choice
        .get(0)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let content = choice
        .get(1)
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut images = Vec::new();
    if let Some(descriptors) = choice.get(4).and_then(Value::as_array) {
        for descriptor in descriptors {
            match image_url(descriptor) {
                Some(url) => images.push(url),
                None => tracing::warn!("skipping malformed image descriptor"),
            }
        }
    }

    Ok(Some(ChatPayload {
        content,
        images,
        conversation_id,
        response_id,
        choice_id,
    }))
}

/// Image URL at descriptor path `[0][0][0]`.
fn image_url(descriptor: &Value) -> Option<String> {
    descriptor
        .get(0)?
        .get(0)?
        .get(0)?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wrap an inner payload the way the service does: string-encode it,
    /// place it at `[0][2]` of the outer array on line index 3.
    fn wrap_body(inner: &Value) -> String {
        let inner_str = serde_json::to_string(inner).unwrap();
        let line = serde_json::to_string(&json!([["wrb.fr", null, inner_str]])).unwrap();
        format!(")]}}'\n\n42\n{line}\n25\n")
    }

    fn answer_payload() -> Value {
        json!([
            null,
            ["c_abc123", "r_def456"],
            null,
            null,
            [[
                "rc_ghi789",
                ["Hello there!", "alternate chunk"],
                null,
                null,
                [
                    [[["https://img.example/one.png"]]],
                    [[["https://img.example/two.png"]]]
                ]
            ]]
        ])
    }

    #[test]
    fn test_extract_at_token() {
        let html = r#"<script>window.WIZ = {"SNlM0e":"AQvTok3n:1234","other":1};</script>"#;
        assert_eq!(extract_at_token(html).as_deref(), Some("AQvTok3n:1234"));
    }

    #[test]
    fn test_extract_at_token_absent() {
        assert_eq!(extract_at_token("<html>please sign in</html>"), None);
    }

    #[test]
    fn test_envelope_first_exchange_sends_empty_triple() {
        let envelope = encode_envelope("hi", &ConversationState::default()).unwrap();

        // Undo the double encoding and check the message struct.
        let outer: Value = serde_json::from_str(&envelope).unwrap();
        assert!(outer[0].is_null());
        let message: Value = serde_json::from_str(outer[1].as_str().unwrap()).unwrap();
        assert_eq!(message[0][0], "hi");
        assert!(message[1].is_null());
        assert_eq!(message[2], json!(["", "", ""]));
    }

    #[test]
    fn test_envelope_carries_conversation_triple() {
        let mut state = ConversationState::default();
        state.update("c_1", "r_1", "rc_1");
        let envelope = encode_envelope("next question", &state).unwrap();

        let outer: Value = serde_json::from_str(&envelope).unwrap();
        let message: Value = serde_json::from_str(outer[1].as_str().unwrap()).unwrap();
        assert_eq!(message[2], json!(["c_1", "r_1", "rc_1"]));
    }

    #[test]
    fn test_decode_answer_with_images() {
        let payload = decode_response(&wrap_body(&answer_payload()))
            .unwrap()
            .unwrap();
        assert_eq!(payload.content.as_deref(), Some("Hello there!"));
        assert_eq!(
            payload.images,
            vec![
                "https://img.example/one.png".to_string(),
                "https://img.example/two.png".to_string()
            ]
        );
        assert_eq!(payload.conversation_id, "c_abc123");
        assert_eq!(payload.response_id, "r_def456");
        assert_eq!(payload.choice_id, "rc_ghi789");
    }

    #[test]
    fn test_decode_empty_inner_payload_is_no_answer() {
        let line = serde_json::to_string(&json!([["wrb.fr", null, null]])).unwrap();
        let body = format!(")]}}'\n\n42\n{line}\n");
        assert_eq!(decode_response(&body).unwrap(), None);

        let line = serde_json::to_string(&json!([["wrb.fr", null, ""]])).unwrap();
        let body = format!(")]}}'\n\n42\n{line}\n");
        assert_eq!(decode_response(&body).unwrap(), None);
    }

    #[test]
    fn test_decode_empty_content_array_yields_null_content() {
        let payload = json!([
            null,
            ["c_abc123", "r_def456"],
            null,
            null,
            [["rc_ghi789", [], null, null, null]]
        ]);
        let decoded = decode_response(&wrap_body(&payload)).unwrap().unwrap();
        assert_eq!(decoded.content, None);
        assert!(decoded.images.is_empty());
        assert_eq!(decoded.conversation_id, "c_abc123");
    }

    #[test]
    fn test_decode_skips_malformed_image_descriptors() {
        let payload = json!([
            null,
            ["c_1", "r_1"],
            null,
            null,
            [[
                "rc_1",
                ["text"],
                null,
                null,
                [
                    [[["https://img.example/good.png"]]],
                    42,
                    [[]],
                    [[["https://img.example/also-good.png"]]]
                ]
            ]]
        ]);
        let decoded = decode_response(&wrap_body(&payload)).unwrap().unwrap();
        assert_eq!(
            decoded.images,
            vec![
                "https://img.example/good.png".to_string(),
                "https://img.example/also-good.png".to_string()
            ]
        );
        assert_eq!(decoded.content.as_deref(), Some("text"));
    }

    #[test]
    fn test_decode_short_body_fails() {
        let err = decode_response(")]}'\n\n42\n").unwrap_err();
        assert!(matches!(err, DecodeError::MissingPayloadLine));
    }

    #[test]
    fn test_decode_garbage_payload_line_fails() {
        let err = decode_response(")]}'\n\n42\nnot json\n").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_missing_ids_fails() {
        let payload = json!([null, null]);
        let err = decode_response(&wrap_body(&payload)).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField(_)));
    }
}
