#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::session::Exchange;
use crate::tools::{ToolDefinition, ToolRegistry};
use crate::{RagError, Result};

const SYSTEM_PROMPT: &str = "You answer questions about a library of course materials.

Tools:
- search_course_content: searches lesson text. Use it for questions about what a course or lesson teaches.
- get_course_outline: returns a course's title, link, instructor and numbered lessons. Use it for questions about course structure or lesson lists.

Rules:
- Call at most one tool per question, and only when the question needs course material.
- Answer general knowledge questions directly without a tool.
- If a tool returns nothing useful, say that the materials do not cover it.
- When presenting an outline, include the course title, course link and every lesson number with its title.

Answers must be short and factual. Do not describe your search process or mention tools.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a chat transcript, in the shape the chat endpoint expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant turn that requested a tool
    #[inline]
    pub fn assistant_tool_call(content: impl Into<String>, call: ToolCall) -> Self {
        Self {
            tool_calls: vec![call],
            ..Self::assistant(content)
        }
    }

    /// Output of a tool, fed back to the model
    #[inline]
    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    #[inline]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Arguments as a JSON object; some models send them as an encoded string
    #[inline]
    pub fn arguments(&self) -> Result<Value> {
        match &self.function.arguments {
            Value::Object(_) => Ok(self.function.arguments.clone()),
            Value::Null => Ok(Value::Object(serde_json::Map::new())),
            Value::String(encoded) => {
                let decoded: Value = serde_json::from_str(encoded).map_err(|e| {
                    RagError::ModelCall(format!(
                        "malformed arguments for tool '{}': {}",
                        self.function.name, e
                    ))
                })?;
                if decoded.is_object() {
                    Ok(decoded)
                } else {
                    Err(RagError::ModelCall(format!(
                        "arguments for tool '{}' are not an object",
                        self.function.name
                    )))
                }
            }
            _ => Err(RagError::ModelCall(format!(
                "arguments for tool '{}' are not an object",
                self.function.name
            ))),
        }
    }
}

/// A model reply: text, plus any tool invocations it requested
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// A chat model that can be offered tools
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One round trip; an empty `tools` slice disables tool use for the round
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition])
    -> Result<ChatResponse>;
}

/// Final answer of one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub sources: Vec<String>,
    /// Name of the tool that ran, if any
    pub tool_used: Option<String>,
}

enum LoopState {
    AwaitInitialResponse,
    ExecutingTool { content: String, call: ToolCall },
    AwaitFinalResponse,
    Done(String),
}

/// Drives the model through at most one tool invocation per query
pub struct AiGenerator {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
}

impl AiGenerator {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    #[inline]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[inline]
    pub fn build_messages(&self, query: &str, history: &[Exchange]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        for exchange in history {
            messages.push(ChatMessage::user(exchange.user.clone()));
            messages.push(ChatMessage::assistant(exchange.assistant.clone()));
        }
        messages.push(ChatMessage::user(query));
        messages
    }

    /// Answer a query, letting the model call one tool from `tools`
    #[inline]
    pub async fn generate(
        &self,
        query: &str,
        history: &[Exchange],
        tools: &ToolRegistry,
    ) -> Result<GeneratedAnswer> {
        let mut messages = self.build_messages(query, history);
        let mut sources = Vec::new();
        let mut tool_used = None;
        let mut state = LoopState::AwaitInitialResponse;

        loop {
            state = match state {
                LoopState::AwaitInitialResponse => {
                    let response = self.model.chat(&messages, &tools.definitions()).await?;
                    let mut calls = response.tool_calls.into_iter();

                    match calls.next() {
                        None => LoopState::Done(response.content),
                        Some(call) => {
                            if calls.len() > 0 {
                                warn!(
                                    "Model requested {} extra tool calls; only '{}' will run",
                                    calls.len(),
                                    call.name()
                                );
                            }
                            LoopState::ExecutingTool {
                                content: response.content,
                                call,
                            }
                        }
                    }
                }
                LoopState::ExecutingTool { content, call } => {
                    let name = call.name().to_string();

                    let (echoed, output_text) = match tools.get(&name) {
                        Some(tool) => {
                            let arguments = call.arguments()?;
                            debug!("Executing tool '{}' with {}", name, arguments);
                            let output = tool.execute(&arguments).await?;
                            sources = output.sources;
                            tool_used = Some(name.clone());
                            (ToolCall::new(name.clone(), arguments), output.text)
                        }
                        None => {
                            warn!("Model requested unknown tool '{}'", name);
                            let arguments = call
                                .arguments()
                                .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
                            (
                                ToolCall::new(name.clone(), arguments),
                                format!("Tool '{}' is not available.", name),
                            )
                        }
                    };

                    // Echoed arguments are always an object, whatever encoding the model used
                    messages.push(ChatMessage::assistant_tool_call(content, echoed));
                    messages.push(ChatMessage::tool_result(name, output_text));
                    LoopState::AwaitFinalResponse
                }
                LoopState::AwaitFinalResponse => {
                    let response = self.model.chat(&messages, &[]).await?;
                    if !response.tool_calls.is_empty() {
                        warn!(
                            "Ignoring {} tool calls in the final round",
                            response.tool_calls.len()
                        );
                    }
                    LoopState::Done(response.content)
                }
                LoopState::Done(answer) => {
                    info!(
                        "Answered query with {} sources (tool: {})",
                        sources.len(),
                        tool_used.as_deref().unwrap_or("none")
                    );
                    return Ok(GeneratedAnswer {
                        answer: answer.trim().to_string(),
                        sources,
                        tool_used,
                    });
                }
            };
        }
    }
}
