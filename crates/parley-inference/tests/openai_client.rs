//! Drives `OpenAiClient` against a local axum server speaking the
//! OpenAI-compatible wire format.

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use parley_core::config::InferenceConfig;
use parley_core::types::Sentiment;
use parley_inference::{InferenceClient, InferenceError, OpenAiClient};

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

/// Routes the chat reply on the system prompt so one server covers all
/// three text operations.
async fn chat(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }

    let system = body["messages"][0]["content"].as_str().unwrap_or_default();
    let content = if system.contains("extract structured information") {
        "```json\n{\"topics\": [\"launch\"], \"action_items\": [{\"text\": \"Write notes\", \
         \"assignee\": \"Ada\", \"due_date\": \"2024-04-01\", \"priority\": \"high\"}], \
         \"decisions\": [\"Launch in April\"], \"sentiment\": \"positive\"}\n```"
    } else if system.contains("JSON array") {
        "[\"Team is aligned\", \"Timeline is tight\"]"
    } else {
        "The team planned the April launch."
    };
    (StatusCode::OK, Json(completion(content)))
}

async fn embeddings(Json(body): Json<Value>) -> Json<Value> {
    let dims = if body["input"] == "wrong size" { 2 } else { 4 };
    Json(json!({
        "object": "list",
        "data": [{"object": "embedding", "index": 0, "embedding": vec![0.5f32; dims]}]
    }))
}

async fn spawn_provider(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

fn config(base_url: String) -> InferenceConfig {
    InferenceConfig {
        base_url,
        embedding_dim: 4,
        request_timeout_secs: 5,
        ..InferenceConfig::default()
    }
}

async fn make_client() -> OpenAiClient {
    let router = Router::new()
        .route("/v1/chat/completions", post(chat))
        .route("/v1/embeddings", post(embeddings));
    let base_url = spawn_provider(router).await;
    OpenAiClient::new(&config(base_url), "sk-test").unwrap()
}

#[tokio::test]
async fn test_extract_entities_over_http() {
    let client = make_client().await;
    let entities = client.extract_entities("Ada: let's launch in April.").await.unwrap();

    assert_eq!(entities.topics, vec!["launch"]);
    assert_eq!(entities.sentiment, Sentiment::Positive);
    assert_eq!(entities.action_items[0].assignee.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn test_summary_and_insights_over_http() {
    let client = make_client().await;

    let summary = client.summarize("transcript").await.unwrap();
    assert_eq!(summary, "The team planned the April launch.");

    let entities = client.extract_entities("transcript").await.unwrap();
    let insights = client.derive_insights("transcript", &entities).await.unwrap();
    assert_eq!(insights.len(), 2);
}

#[tokio::test]
async fn test_embed_checks_dimensions() {
    let client = make_client().await;

    assert_eq!(client.embed("hello").await.unwrap().len(), 4);
    let err = client.embed("wrong size").await.unwrap_err();
    assert!(matches!(err, InferenceError::Malformed(_)));
}

#[tokio::test]
async fn test_bad_key_is_api_error() {
    let router = Router::new().route("/v1/chat/completions", post(chat));
    let base_url = spawn_provider(router).await;
    let client = OpenAiClient::new(&config(base_url), "sk-wrong").unwrap();

    let err = client.summarize("transcript").await.unwrap_err();
    assert!(matches!(err, InferenceError::Api { status: 401, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
    );
    let base_url = spawn_provider(router).await;
    let client = OpenAiClient::new(&config(base_url), "sk-test").unwrap();

    let err = client.summarize("transcript").await.unwrap_err();
    assert!(matches!(err, InferenceError::Api { status: 503, ref body } if body == "overloaded"));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_empty_choices_is_malformed() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(json!({"choices": []})) }),
    );
    let base_url = spawn_provider(router).await;
    let client = OpenAiClient::new(&config(base_url), "sk-test").unwrap();

    let err = client.summarize("transcript").await.unwrap_err();
    assert!(matches!(err, InferenceError::Malformed(_)));
}

#[tokio::test]
async fn test_unreachable_provider_is_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        OpenAiClient::new(&config(format!("http://{}/v1", addr)), "sk-test").unwrap();
    let err = client.embed("hello").await.unwrap_err();
    assert!(matches!(err, InferenceError::Transport(_)));
}
