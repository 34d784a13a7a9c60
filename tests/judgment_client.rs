use scam_detector::config::JudgmentConfig;
use scam_detector::judgment::{AnthropicClient, JudgmentClient, ModelEvaluator, ScamEvaluator};
use scam_detector::{EmailRecord, EvaluationError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> JudgmentConfig {
    JudgmentConfig {
        endpoint: format!("{}/v1/messages", server.uri()),
        timeout_seconds: 2,
        ..Default::default()
    }
}

fn text_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn"
    }))
}

#[tokio::test]
async fn test_client_sends_prompt_and_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_string_contains("claude-sonnet-4-20250514"))
        .and(body_string_contains("SUBJECT: Hello"))
        .respond_with(text_reply("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnthropicClient::new(&config_for(&server), "test-key".to_string()).unwrap();
    let text = client.complete("SUBJECT: Hello").await.unwrap();
    assert_eq!(text, "ok");
}

#[tokio::test]
async fn test_http_error_is_call_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let client = AnthropicClient::new(&config_for(&server), "bad".to_string()).unwrap();
    let err = client.complete("prompt").await.unwrap_err();
    match err {
        EvaluationError::ModelCallFailed(message) => assert!(message.contains("401")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(text_reply("late").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.timeout_seconds = 1;
    let client = AnthropicClient::new(&config, "test-key".to_string()).unwrap();
    assert!(matches!(
        client.complete("prompt").await,
        Err(EvaluationError::ModelCallFailed(_))
    ));
}

#[tokio::test]
async fn test_response_without_text_is_call_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": [] })))
        .mount(&server)
        .await;

    let client = AnthropicClient::new(&config_for(&server), "test-key".to_string()).unwrap();
    assert!(matches!(
        client.complete("prompt").await,
        Err(EvaluationError::ModelCallFailed(_))
    ));
}

#[tokio::test]
async fn test_evaluator_over_http_strips_fences() {
    let server = MockServer::start().await;
    let fenced = "```json\n{\"scam_score\": 91, \"is_scam\": true, \"red_flags\": [\"Lookalike domain\"], \"explanation\": \"Impersonates PayPal\"}\n```";
    Mock::given(method("POST"))
        .respond_with(text_reply(fenced))
        .mount(&server)
        .await;

    let client = Arc::new(
        AnthropicClient::new(&config_for(&server), "test-key".to_string()).unwrap(),
    );
    let evaluator = ModelEvaluator::new(client, 70);
    let email = EmailRecord::new(
        "Account locked",
        "service@paypa1.com",
        "Verify your identity",
        1000,
    );

    let result = evaluator.evaluate(&email).await.unwrap();
    assert_eq!(result.scam_score, 91);
    assert!(result.is_scam);
    assert_eq!(result.red_flags, vec!["Lookalike domain"]);
    assert_eq!(result.explanation, "Impersonates PayPal");
}

#[tokio::test]
async fn test_evaluator_over_http_rejects_truncated_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(text_reply("{\"scam_score\": 91, \"is_scam\": tr"))
        .mount(&server)
        .await;

    let client = Arc::new(
        AnthropicClient::new(&config_for(&server), "test-key".to_string()).unwrap(),
    );
    let evaluator = ModelEvaluator::new(client, 70);
    let email = EmailRecord::new("Hi", "a@example.com", "", 1000);

    assert!(matches!(
        evaluator.evaluate(&email).await,
        Err(EvaluationError::ModelResponseMalformed(_))
    ));
}
