//! Gemini provider wire format tests.

use serde_json::json;
use astranote::providers::gemini::{build_request, parse_response, GeminiProvider};
use astranote::providers::{CompletionRequest, LlmProvider, Message, ProviderError, Role};

fn simple_request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::user("kal shaam chai")],
        system: None,
        max_tokens: Some(200),
        temperature: Some(0.0),
    }
}

#[test]
fn build_request_uses_camel_case_wire_names() {
    let wire = serde_json::to_value(build_request(&simple_request())).expect("should serialize");
    assert_eq!(wire["contents"][0]["role"], "user");
    assert_eq!(wire["contents"][0]["parts"][0]["text"], "kal shaam chai");
    assert_eq!(wire["generationConfig"]["maxOutputTokens"], 200);
    assert_eq!(wire["generationConfig"]["responseMimeType"], "application/json");
    assert!(wire.get("systemInstruction").is_none());
}

#[test]
fn assistant_turns_become_model_turns() {
    let mut request = simple_request();
    request.messages.push(Message {
        role: Role::Assistant,
        content: "ok".to_owned(),
    });
    let req = build_request(&request);
    assert_eq!(req.contents[1].role.as_deref(), Some("model"));
}

#[test]
fn system_prompt_becomes_system_instruction() {
    let mut request = simple_request();
    request.system = Some("Answer in JSON.".to_owned());
    let wire = serde_json::to_value(build_request(&request)).expect("should serialize");
    assert_eq!(wire["systemInstruction"]["parts"][0]["text"], "Answer in JSON.");
    assert!(wire["systemInstruction"].get("role").is_none());
}

#[test]
fn parse_response_reads_first_candidate() {
    let body = json!({
        "candidates": [
            {"content": {"role": "model", "parts": [{"text": "{\"date\": "}, {"text": "null}"}]}, "finishReason": "STOP"},
            {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
        ],
        "usageMetadata": {"promptTokenCount": 40, "candidatesTokenCount": 7},
        "modelVersion": "gemini-2.0-flash-001"
    });
    let resp = parse_response("gemini-2.0-flash", &body.to_string()).expect("should parse");
    assert_eq!(resp.text, "{\"date\": null}");
    assert_eq!(resp.usage.input_tokens, 40);
    assert_eq!(resp.usage.output_tokens, 7);
    assert_eq!(resp.model, "gemini-2.0-flash-001");
}

#[test]
fn parse_response_falls_back_to_requested_model() {
    let body = json!({"candidates": [{"content": {"parts": [{"text": "{}"}]}}]});
    let resp = parse_response("gemini-2.0-flash", &body.to_string()).expect("should parse");
    assert_eq!(resp.model, "gemini-2.0-flash");
    assert_eq!(resp.usage.input_tokens, 0);
}

#[test]
fn blocked_candidate_is_a_parse_error() {
    let body = json!({"candidates": [{"finishReason": "SAFETY"}]});
    match parse_response("m", &body.to_string()) {
        Err(ProviderError::Parse(reason)) => assert!(reason.contains("SAFETY")),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn no_candidates_is_a_parse_error() {
    assert!(matches!(
        parse_response("m", r#"{"candidates": []}"#),
        Err(ProviderError::Parse(_))
    ));
}

#[test]
fn endpoint_names_the_model() {
    let provider = GeminiProvider::new(
        "gemini/gemini-2.0-flash".to_owned(),
        "gemini-2.0-flash".to_owned(),
        "AIza-test".to_owned(),
    );
    assert_eq!(
        provider.endpoint(),
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
    );
    assert_eq!(provider.model_id(), "gemini/gemini-2.0-flash");
}

#[test]
fn debug_output_hides_the_key() {
    let provider = GeminiProvider::new(
        "gemini/gemini-2.0-flash".to_owned(),
        "gemini-2.0-flash".to_owned(),
        "AIzaSecretValue".to_owned(),
    );
    let debug = format!("{provider:?}");
    assert!(!debug.contains("AIzaSecretValue"));
    assert!(debug.contains("[REDACTED]"));
}
