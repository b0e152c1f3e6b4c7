use super::*;
use super::fake::{ScriptedModel, text, tool_request};
use crate::tools::{Tool, ToolOutput};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

struct CountingTool {
    runs: AtomicUsize,
}

#[async_trait]
impl Tool for CountingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_course_content".to_string(),
            description: "test search".to_string(),
            input_schema: json!({"type": "object"}),
        }
    }

    async fn execute(&self, arguments: &Value) -> Result<ToolOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(ToolOutput {
            text: format!("[Course - Lesson 1]\nresult for {}", arguments["query"]),
            sources: vec!["Course - Lesson 1".to_string()],
        })
    }
}

fn registry() -> (ToolRegistry, Arc<CountingTool>) {
    let tool = Arc::new(CountingTool {
        runs: AtomicUsize::new(0),
    });
    let mut registry = ToolRegistry::new();
    registry.register(Arc::clone(&tool) as Arc<dyn Tool>);
    (registry, tool)
}

#[tokio::test]
async fn direct_answer_skips_tools() {
    let model = ScriptedModel::new(vec![Ok(text("  Paris.  "))]);
    let generator = AiGenerator::new(model.clone());
    let (registry, tool) = registry();

    let answer = generator
        .generate("Capital of France?", &[], &registry)
        .await
        .expect("should answer");

    assert_eq!(answer.answer, "Paris.");
    assert!(answer.sources.is_empty());
    assert_eq!(answer.tool_used, None);
    assert_eq!(tool.runs.load(Ordering::SeqCst), 0);
    assert_eq!(model.calls().len(), 1);
}

#[tokio::test]
async fn tool_runs_once_then_final_round_has_no_tools() {
    let model = ScriptedModel::new(vec![
        Ok(tool_request(&[
            ("search_course_content", json!({"query": "first"})),
            ("search_course_content", json!({"query": "second"})),
        ])),
        Ok(tool_request(&[(
            "search_course_content",
            json!({"query": "again"}),
        )])),
    ]);
    let generator = AiGenerator::new(model.clone());
    let (registry, tool) = registry();

    let answer = generator
        .generate("What does lesson 1 cover?", &[], &registry)
        .await
        .expect("should answer");

    assert_eq!(tool.runs.load(Ordering::SeqCst), 1);
    assert_eq!(answer.sources, vec!["Course - Lesson 1"]);
    assert_eq!(answer.tool_used.as_deref(), Some("search_course_content"));

    let calls = model.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, vec!["search_course_content"]);
    assert!(calls[1].1.is_empty());

    // The final round sees the assistant's single tool call and its result
    let final_messages = &calls[1].0;
    let assistant = &final_messages[final_messages.len() - 2];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.tool_calls.len(), 1);
    let tool_message = &final_messages[final_messages.len() - 1];
    assert_eq!(tool_message.role, Role::Tool);
    assert_eq!(tool_message.tool_name.as_deref(), Some("search_course_content"));
    assert!(tool_message.content.contains("result for \"first\""));
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model() {
    let model = ScriptedModel::new(vec![
        Ok(tool_request(&[("drop_tables", json!({}))])),
        Ok(text("I can't do that.")),
    ]);
    let generator = AiGenerator::new(model.clone());
    let (registry, tool) = registry();

    let answer = generator
        .generate("Delete everything", &[], &registry)
        .await
        .expect("should answer");

    assert_eq!(answer.answer, "I can't do that.");
    assert!(answer.sources.is_empty());
    assert_eq!(answer.tool_used, None);
    assert_eq!(tool.runs.load(Ordering::SeqCst), 0);

    let calls = model.calls();
    let last = calls[1].0.last().expect("tool message").clone();
    assert_eq!(last.content, "Tool 'drop_tables' is not available.");
}

#[tokio::test]
async fn unknown_tool_with_garbled_arguments_echoes_an_object() {
    let model = ScriptedModel::new(vec![
        Ok(tool_request(&[(
            "drop_tables",
            Value::String("{not json".to_string()),
        )])),
        Ok(text("No.")),
    ]);
    let generator = AiGenerator::new(model.clone());
    let (registry, _tool) = registry();

    generator
        .generate("Delete everything", &[], &registry)
        .await
        .expect("unknown tools are not fatal");

    let calls = model.calls();
    let final_messages = &calls[1].0;
    let assistant = &final_messages[final_messages.len() - 2];
    assert_eq!(assistant.tool_calls[0].name(), "drop_tables");
    assert_eq!(assistant.tool_calls[0].function.arguments, json!({}));
}

#[tokio::test]
async fn string_encoded_arguments_are_decoded() {
    let model = ScriptedModel::new(vec![
        Ok(tool_request(&[(
            "search_course_content",
            Value::String(r#"{"query": "encoded"}"#.to_string()),
        )])),
        Ok(text("done")),
    ]);
    let generator = AiGenerator::new(model.clone());
    let (registry, tool) = registry();

    generator
        .generate("q", &[], &registry)
        .await
        .expect("should answer");

    assert_eq!(tool.runs.load(Ordering::SeqCst), 1);
    let calls = model.calls();
    let last = calls[1].0.last().expect("tool message").clone();
    assert!(last.content.contains("\"encoded\""));

    // The assistant turn sent back to the model carries the decoded object
    let final_messages = &calls[1].0;
    let assistant = &final_messages[final_messages.len() - 2];
    assert_eq!(
        assistant.tool_calls[0].function.arguments,
        json!({"query": "encoded"})
    );
}

#[tokio::test]
async fn malformed_arguments_fail_the_query() {
    let model = ScriptedModel::new(vec![Ok(tool_request(&[(
        "search_course_content",
        Value::String("{not json".to_string()),
    )]))]);
    let generator = AiGenerator::new(model.clone());
    let (registry, tool) = registry();

    let err = generator
        .generate("q", &[], &registry)
        .await
        .expect_err("arguments are malformed");

    assert!(matches!(err, RagError::ModelCall(_)));
    assert_eq!(tool.runs.load(Ordering::SeqCst), 0);
    assert_eq!(model.calls().len(), 1);
}

#[tokio::test]
async fn model_failure_is_terminal() {
    let model = ScriptedModel::new(vec![Err(RagError::ModelCall(
        "HTTP 429".to_string(),
    ))]);
    let generator = AiGenerator::new(model.clone());
    let (registry, _tool) = registry();

    let err = generator
        .generate("q", &[], &registry)
        .await
        .expect_err("model is down");

    assert!(matches!(err, RagError::ModelCall(message) if message == "HTTP 429"));
    assert_eq!(model.calls().len(), 1);
}

#[test]
fn history_becomes_alternating_messages() {
    let generator =
        AiGenerator::new(ScriptedModel::new(Vec::new())).with_system_prompt("Be brief.");
    let history = vec![
        Exchange {
            user: "first question".to_string(),
            assistant: "first answer".to_string(),
        },
        Exchange {
            user: "second question".to_string(),
            assistant: "second answer".to_string(),
        },
    ];

    let messages = generator.build_messages("third question", &history);

    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant,
            Role::User
        ]
    );
    assert_eq!(messages[0].content, "Be brief.");
    assert_eq!(messages[3].content, "second question");
    assert_eq!(messages[5].content, "third question");
}

#[test]
fn tool_call_argument_shapes() {
    let call = ToolCall::new("t", Value::Null);
    assert_eq!(call.arguments().expect("null means no arguments"), json!({}));

    let call = ToolCall::new("t", json!([1, 2]));
    assert!(matches!(call.arguments(), Err(RagError::ModelCall(_))));

    let call = ToolCall::new("t", Value::String("[1]".to_string()));
    assert!(matches!(call.arguments(), Err(RagError::ModelCall(_))));
}

#[test]
fn messages_serialize_for_the_chat_endpoint() {
    let message = ChatMessage::tool_result("search_course_content", "results");
    let value = serde_json::to_value(&message).expect("should serialize");
    assert_eq!(
        value,
        json!({"role": "tool", "content": "results", "tool_name": "search_course_content"})
    );

    let value = serde_json::to_value(ChatMessage::user("hi")).expect("should serialize");
    assert_eq!(value, json!({"role": "user", "content": "hi"}));
}
