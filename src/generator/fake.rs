use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{ChatMessage, ChatModel, ChatResponse, ToolCall};
use crate::Result;
use crate::tools::ToolDefinition;

/// Replays canned responses and records what it was sent
#[derive(Default)]
pub(crate) struct ScriptedModel {
    responses: Mutex<VecDeque<Result<ChatResponse>>>,
    calls: Mutex<Vec<(Vec<ChatMessage>, Vec<String>)>>,
}

impl ScriptedModel {
    pub(crate) fn new(responses: Vec<Result<ChatResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::default(),
        })
    }

    pub(crate) fn calls(&self) -> Vec<(Vec<ChatMessage>, Vec<String>)> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        self.calls.lock().expect("lock").push((
            messages.to_vec(),
            tools.iter().map(|t| t.name.clone()).collect(),
        ));
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(text("script exhausted")))
    }
}

pub(crate) fn text(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        tool_calls: Vec::new(),
    }
}

pub(crate) fn tool_request(calls: &[(&str, serde_json::Value)]) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: calls
            .iter()
            .map(|(name, args)| ToolCall::new(*name, args.clone()))
            .collect(),
    }
}
