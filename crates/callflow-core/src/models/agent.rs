//! AI voice agent reference

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An agent configured on the external voice engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub name: String,

    /// Identifier of the agent on the voice engine
    pub external_agent_id: String,

    /// Prompt overrides, first message, voice settings
    pub metadata: serde_json::Value,
}

/// Everything the voice engine needs to start a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub call_logs_id: uuid::Uuid,
    pub agent: Agent,
    pub to_number: String,
    pub from_number: String,
    pub dynamic_variables: serde_json::Value,
}
