//! Request/response shapes for the RPC surface (§3, §4.2, §6).

use std::collections::HashMap;

use buckley_registry::ServiceInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ---- Agent lifecycle ----

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterAgentResponse {
    pub session_token: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DiscoverQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub services: Vec<ServiceInfo>,
}

// ---- Capability management ----

#[derive(Debug, Deserialize)]
pub struct RequestGrantRequest {
    pub agent_id: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub context: JsonValue,
    pub expires_at: Option<DateTime<Utc>>,
}

// ---- Session management ----

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub agent_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateContextHandleRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload_base64: String,
}

// ---- Messaging ----

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub agent_id: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub routed_to: String,
}

// ---- Tool execution ----

#[derive(Debug, Deserialize)]
pub struct StartToolExecutionRequest {
    pub agent_id: String,
    pub tool: String,
    #[serde(default)]
    pub parameters: JsonValue,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalDecisionRequest {
    pub approved: bool,
    #[serde(default)]
    pub remember: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ToolExecutionEvent {
    Started { execution_id: String },
    PolicyDenied { execution_id: String, reason: String },
    NeedsApproval { execution_id: String },
    Approved { execution_id: String },
    Rejected { execution_id: String, reason: String },
    Timeout { execution_id: String },
    Completed { execution_id: String, result: JsonValue },
    Failed { execution_id: String, reason: String },
}

// ---- Streaming task ----

#[derive(Debug, Deserialize)]
pub struct StartTaskRequest {
    pub agent_id: String,
    pub goal: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TaskEvent {
    Planning { task_id: String },
    Executing { task_id: String, iteration: u32, summary: String },
    Completed { task_id: String },
}

// ---- P2P brokerage ----

#[derive(Debug, Deserialize)]
pub struct GetP2pEndpointRequest {
    pub requester_id: String,
    pub target_id: String,
}

#[derive(Debug, Serialize)]
pub struct GetP2pEndpointResponse {
    pub address: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct EstablishP2pConnectionRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct EstablishP2pConnectionResponse {
    pub requester_id: String,
    pub target_id: String,
}

// ---- Editor integrations ----

#[derive(Debug, Deserialize)]
pub struct EditRequestDto {
    pub uri: String,
    pub range: Option<crate::domain::edit::Range>,
    pub new_text: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplyEditsRequest {
    pub edits: Vec<EditRequestDto>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct ApplyEditsResponse {
    pub applied: bool,
    pub applied_files: Vec<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEditorStateRequest {
    pub uri: String,
    pub cursor_line: u32,
    pub cursor_character: u32,
}

#[derive(Debug, Deserialize)]
pub struct StreamInlineCompletionsRequest {
    pub uri: String,
    pub position: crate::domain::edit::Position,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InlineCompletionEvent {
    Suggestion { text: String },
    Done,
}
