use serde::{Deserialize, Serialize};

/// A single role-tagged message from an intake conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
}

/// Conversation section of the webhook payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationData {
    pub id: String,
    pub agent_id: String,
    pub transcript: Vec<TranscriptMessage>,
}

/// Payload delivered by the conversation platform when an intake call ends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub data: ConversationData,
}

/// Flatten a transcript into a single `role: content` text block.
///
/// Message order is conversational order and must survive flattening; the
/// downstream prompts rely on it.
pub fn flatten_transcript(messages: &[TranscriptMessage]) -> String {
    messages
        .iter()
        .map(|msg| format!("{}: {}", msg.role, msg.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> TranscriptMessage {
        TranscriptMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn flatten_preserves_order_and_format() {
        let messages = vec![msg("user", "hi"), msg("agent", "hello")];
        assert_eq!(flatten_transcript(&messages), "user: hi\nagent: hello");
    }

    #[test]
    fn flatten_empty_transcript() {
        assert_eq!(flatten_transcript(&[]), "");
    }

    #[test]
    fn webhook_payload_deserializes() {
        let raw = serde_json::json!({
            "event": "conversation.completed",
            "data": {
                "id": "test123",
                "agent_id": "agent456",
                "transcript": [
                    {"role": "user", "content": "I need help with AI compliance for a hiring tool."},
                    {"role": "agent", "content": "What features does it have?"}
                ]
            }
        });

        let payload: WebhookPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.event, "conversation.completed");
        assert_eq!(payload.data.transcript.len(), 2);
        assert_eq!(payload.data.transcript[0].role, "user");
    }
}
