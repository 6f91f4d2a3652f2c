use callflow_core::models::ConversationRecord;
use serde::Deserialize;
use validator::Validate;

/// Sent by the voice engine when a conversation ends
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordConversationRequest {
    #[validate(length(min = 1, max = 255))]
    pub conversation_id: String,
    pub transcript: Option<serde_json::Value>,
    pub summary: Option<String>,
}

impl From<RecordConversationRequest> for ConversationRecord {
    fn from(req: RecordConversationRequest) -> Self {
        Self {
            conversation_id: req.conversation_id,
            transcript: req.transcript,
            summary: req.summary,
        }
    }
}
