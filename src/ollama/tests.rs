use super::*;
use crate::generator::{Role, ToolCall};
use serde_json::json;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "embed-model".to_string(),
        chat_model: "chat-model".to_string(),
        batch_size: 128,
        max_tokens: 256,
        timeout_secs: 30,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model, "embed-model");
    assert_eq!(client.chat_model, "chat-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.max_tokens, 256);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let config = OllamaConfig::default();
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn chat_request_declares_tools_as_functions() {
    let schema = json!({"type": "object", "properties": {"query": {"type": "string"}}});
    let messages = vec![ChatMessage::user("What is covered in lesson 2?")];
    let request = ChatRequest {
        model: "chat-model",
        messages: &messages,
        tools: vec![ToolSpec {
            kind: "function",
            function: FunctionSpec {
                name: "search_course_content",
                description: "Search course materials",
                parameters: &schema,
            },
        }],
        stream: false,
        options: ChatOptions {
            temperature: 0.0,
            num_predict: 800,
        },
    };

    let value = serde_json::to_value(&request).expect("request should serialize");

    assert_eq!(value["tools"][0]["type"], "function");
    assert_eq!(value["tools"][0]["function"]["name"], "search_course_content");
    assert_eq!(value["tools"][0]["function"]["parameters"], schema);
    assert_eq!(value["messages"][0]["role"], "user");
    assert_eq!(value["stream"], false);
    assert_eq!(value["options"]["num_predict"], 800);
}

#[test]
fn chat_request_omits_empty_tool_list() {
    let messages = vec![ChatMessage::user("hello")];
    let request = ChatRequest {
        model: "chat-model",
        messages: &messages,
        tools: Vec::new(),
        stream: false,
        options: ChatOptions {
            temperature: 0.0,
            num_predict: 10,
        },
    };

    let value = serde_json::to_value(&request).expect("request should serialize");
    assert!(value.get("tools").is_none());
}

#[test]
fn chat_response_body_with_tool_calls() {
    let body = r#"{
        "model": "chat-model",
        "message": {
            "role": "assistant",
            "content": "",
            "tool_calls": [
                {"function": {"name": "search_course_content", "arguments": {"query": "agents", "lesson_number": 2}}}
            ]
        },
        "done": true
    }"#;

    let parsed: ChatResponseBody = serde_json::from_str(body).expect("body should parse");

    assert_eq!(parsed.message.role, Role::Assistant);
    assert_eq!(
        parsed.message.tool_calls,
        vec![ToolCall::new(
            "search_course_content",
            json!({"query": "agents", "lesson_number": 2})
        )]
    );
}

#[test]
fn models_response_parsing() {
    let body = r#"{"models": [{"name": "llama3.1:8b", "size": 4661224676, "digest": "abc"}]}"#;
    let parsed: ModelsResponse = serde_json::from_str(body).expect("body should parse");
    assert_eq!(parsed.models.len(), 1);
    assert_eq!(parsed.models[0].name, "llama3.1:8b");

    let bare: ModelsResponse =
        serde_json::from_str(r#"{"models": [{"name": "nomic-embed-text:latest"}]}"#)
            .expect("only the name is required");
    assert_eq!(bare.models[0].name, "nomic-embed-text:latest");
}

#[test]
fn empty_batch_needs_no_server() {
    let client = OllamaClient::new(&OllamaConfig::default()).expect("Failed to create client");
    let results = client
        .generate_embeddings_batch(&[])
        .expect("empty batch should succeed");
    assert!(results.is_empty());
}
