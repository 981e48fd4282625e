//! Ollama provider wire format and transport tests.

use serde_json::json;
use astranote::providers::ollama::{
    build_request, parse_response, OllamaProvider, DEFAULT_OLLAMA_URL,
};
use astranote::providers::{CompletionRequest, LlmProvider, Message, ProviderError, Role};

use crate::support::serve_once;

fn simple_request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::user("Hello")],
        system: Some("Answer in JSON.".to_owned()),
        max_tokens: Some(200),
        temperature: Some(0.0),
    }
}

#[test]
fn build_request_injects_system_message() {
    let req = build_request("qwen3:8b", &simple_request());
    assert_eq!(req.model, "qwen3:8b");
    assert_eq!(req.messages.len(), 2);
    assert_eq!(req.messages[0].role, "system");
    assert_eq!(req.messages[0].content, "Answer in JSON.");
    assert_eq!(req.messages[1].role, "user");
    assert!(!req.stream);
    assert_eq!(req.format.as_deref(), Some("json"));
}

#[test]
fn build_request_no_system_when_absent() {
    let mut request = simple_request();
    request.system = None;
    let req = build_request("model", &request);
    assert_eq!(req.messages.len(), 1);
    assert_eq!(req.messages[0].role, "user");
}

#[test]
fn build_request_sets_options() {
    let req = build_request("model", &simple_request());
    let opts = req.options.expect("options should exist");
    assert_eq!(opts.num_predict, Some(200));
    assert_eq!(opts.temperature, Some(0.0));
}

#[test]
fn build_request_omits_empty_options() {
    let mut request = simple_request();
    request.max_tokens = None;
    request.temperature = None;
    assert!(build_request("model", &request).options.is_none());
}

#[test]
fn build_request_maps_roles() {
    let request = CompletionRequest {
        messages: vec![
            Message::user("usr"),
            Message {
                role: Role::Assistant,
                content: "ast".to_owned(),
            },
        ],
        system: None,
        max_tokens: None,
        temperature: None,
    };
    let req = build_request("model", &request);
    assert_eq!(req.messages[0].role, "user");
    assert_eq!(req.messages[1].role, "assistant");
}

#[test]
fn parse_response_text_only() {
    let body = json!({
        "message": {"role": "assistant", "content": "{\"date\": null}"},
        "model": "qwen3:8b",
        "prompt_eval_count": 10,
        "eval_count": 5
    });
    let resp = parse_response(&body.to_string()).expect("should parse");
    assert_eq!(resp.text, "{\"date\": null}");
    assert_eq!(resp.usage.input_tokens, 10);
    assert_eq!(resp.usage.output_tokens, 5);
    assert_eq!(resp.model, "qwen3:8b");
}

#[test]
fn parse_response_no_usage() {
    let body = json!({
        "message": {"role": "assistant", "content": "Hi"},
        "model": "m"
    });
    let resp = parse_response(&body.to_string()).expect("should parse");
    assert_eq!(resp.usage.input_tokens, 0);
    assert_eq!(resp.usage.output_tokens, 0);
}

#[test]
fn parse_response_invalid_json() {
    assert!(parse_response("not json").is_err());
}

#[test]
fn ollama_provider_trims_trailing_slash() {
    let provider = OllamaProvider::new(
        "ollama/qwen3:8b".to_owned(),
        "qwen3:8b".to_owned(),
        format!("{DEFAULT_OLLAMA_URL}/"),
    );
    assert_eq!(provider.model, "qwen3:8b");
    assert_eq!(provider.base_url, DEFAULT_OLLAMA_URL);
    assert_eq!(provider.model_id(), "ollama/qwen3:8b");
}

#[tokio::test]
async fn complete_posts_to_chat_endpoint() {
    let reply = json!({
        "message": {"role": "assistant", "content": "{\"date\": \"2025-06-01 20:00\", \"message\": \"chai\"}"},
        "model": "qwen3:8b",
        "prompt_eval_count": 3,
        "eval_count": 2
    })
    .to_string();
    let (base_url, seen) = serve_once("200 OK", "application/json", &reply).await;

    let provider = OllamaProvider::new("ollama/qwen3:8b".to_owned(), "qwen3:8b".to_owned(), base_url);
    let response = provider
        .complete(simple_request())
        .await
        .expect("completion should succeed");
    assert!(response.text.contains("chai"));

    let request = seen.await.expect("request should be captured");
    assert!(request.head.starts_with("POST /api/chat"));
    let body: serde_json::Value = serde_json::from_str(&request.body).expect("body is JSON");
    assert_eq!(body["model"], "qwen3:8b");
    assert_eq!(body["stream"], false);
    assert_eq!(body["format"], "json");
}

#[tokio::test]
async fn complete_surfaces_error_status() {
    let (base_url, _seen) = serve_once("404 Not Found", "application/json", r#"{"error":"model not found"}"#).await;

    let provider = OllamaProvider::new("ollama/missing".to_owned(), "missing".to_owned(), base_url);
    match provider.complete(simple_request()).await {
        Err(ProviderError::HttpStatus { status, body }) => {
            assert_eq!(status, 404);
            assert!(body.contains("model not found"));
        }
        other => panic!("expected http status error, got {other:?}"),
    }
}
