use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ──────────────────── Conversation Types ────────────────────

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Guidance for the model (system prompt, injected skill instructions).
    System,
    /// The caller's message.
    User,
    /// Model output; carries the requested tool call when there is one.
    Assistant,
    /// Observation produced by a tool dispatch.
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back on the observation turn.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Raw arguments, validated by the tool registry before invocation.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// One entry of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Set on assistant turns that request a tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// Set on tool turns: the id of the call this observation answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Unix millis.
    pub timestamp: i64,
}

impl Turn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn recording a requested tool call.
    pub fn tool_request(call: ToolCall) -> Self {
        let mut turn = Self::new(Role::Assistant, String::new());
        turn.tool_call = Some(call);
        turn
    }

    /// Observation turn answering `call_id`.
    pub fn observation(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut turn = Self::new(Role::Tool, content);
        turn.tool_call_id = Some(call_id.into());
        turn
    }
}

/// What the model produced for one reasoning cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// The model is done; this is the answer for the caller.
    FinalAnswer(String),
    /// The model wants a tool to run before it continues.
    ToolCall(ToolCall),
}

/// Evolving context of a single agent invocation.
///
/// Owned by exactly one loop instance. Turns are append-only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
    /// Reasoning/acting cycles executed so far.
    pub step_count: usize,
    /// Skills whose instructions were already injected.
    pub skills_injected: BTreeSet<String>,
}

impl ConversationState {
    /// Seed a conversation from the caller's message.
    pub fn new(system_prompt: Option<&str>, user_message: &str) -> Self {
        let mut state = Self::default();
        if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
            state.push(Turn::system(prompt));
        }
        state.push(Turn::user(user_message));
        state
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Index of the most recent user-authored turn.
    pub fn latest_user_index(&self) -> Option<usize> {
        self.turns.iter().rposition(|t| t.role == Role::User)
    }

    /// Text of the latest user turn plus every tool observation after it.
    ///
    /// This is what skill triggers are matched against.
    pub fn match_text(&self) -> String {
        let Some(start) = self.latest_user_index() else {
            return String::new();
        };
        self.turns[start..]
            .iter()
            .filter(|t| matches!(t.role, Role::User | Role::Tool))
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ──────────────────── Auth Types ────────────────────

/// Per-request identity produced by the auth gate.
///
/// Passed explicitly down the call chain; never stored globally.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    token: String,
    principal: Option<String>,
}

impl AuthContext {
    pub fn new(token: impl Into<String>, principal: Option<String>) -> Self {
        Self {
            token: token.into(),
            principal,
        }
    }

    /// Context for in-process callers that bypass the gate (the local REPL).
    pub fn local(principal: impl Into<String>) -> Self {
        Self {
            token: String::new(),
            principal: Some(principal.into()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"<redacted>")
            .field("principal", &self.principal)
            .finish()
    }
}
