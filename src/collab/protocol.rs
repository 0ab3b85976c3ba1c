use serde::{Deserialize, Serialize};

use super::document::DocumentState;

/// A room member as seen by other clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
}

/// Output of an execution round-trip: plain stdout text on success,
/// a structured object carrying stderr on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutput {
    Text(String),
    Failure { stderr: String },
}

impl RunOutput {
    /// The text a client should display for this output
    pub fn display_text(&self) -> &str {
        match self {
            RunOutput::Text(text) => text,
            RunOutput::Failure { stderr } => stderr,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CollabMessage {
    /// Client -> server: enter a room
    #[serde(rename_all = "camelCase")]
    Join {
        room_id: String,
        display_name: String,
    },

    /// Server -> joining client: join ack with the roster and document
    /// snapshot, so a late joiner converges without waiting for traffic
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        client_id: String,
        room_id: String,
        members: Vec<Member>,
        document: DocumentState,
    },

    /// Server -> other members: roster add
    #[serde(rename_all = "camelCase")]
    MemberJoined { member: Member },

    /// Server -> remaining members: roster remove
    #[serde(rename_all = "camelCase")]
    MemberLeft { client_id: String },

    /// Client -> server -> other members: broadcast the shared buffer.
    /// Code and language tag apply atomically on receipt.
    #[serde(rename_all = "camelCase")]
    CodeChange {
        room_id: String,
        code: String,
        language_tag: String,
    },

    /// Client -> server: request execution
    #[serde(rename_all = "camelCase")]
    Run {
        code: String,
        extension: String,
        request_id: u64,
    },

    /// Server -> requesting client: execution outcome. Timestamps are epoch
    /// milliseconds and are absent when the run never produced timing.
    #[serde(rename_all = "camelCase")]
    RunResult {
        request_id: u64,
        success: bool,
        output: RunOutput,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ended_at: Option<u64>,
    },

    /// Server -> client: request-level failure surfaced as a message
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_wire_shape() {
        let msg = CollabMessage::Join {
            room_id: "room-1".to_string(),
            display_name: "Ada".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "join");
        assert_eq!(json["roomId"], "room-1");
        assert_eq!(json["displayName"], "Ada");
    }

    #[test]
    fn test_code_change_round_trip() {
        let text = r#"{"type":"codeChange","roomId":"r","code":"x=2","languageTag":"Python"}"#;
        let msg: CollabMessage = serde_json::from_str(text).unwrap();
        match msg {
            CollabMessage::CodeChange {
                room_id,
                code,
                language_tag,
            } => {
                assert_eq!(room_id, "r");
                assert_eq!(code, "x=2");
                assert_eq!(language_tag, "Python");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_run_result_success_wire_shape() {
        let msg = CollabMessage::RunResult {
            request_id: 7,
            success: true,
            output: RunOutput::Text("Hello World!\n".to_string()),
            started_at: Some(1000),
            ended_at: Some(1250),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["requestId"], 7);
        assert_eq!(json["success"], true);
        assert_eq!(json["output"], "Hello World!\n");
        assert_eq!(json["startedAt"], 1000);
        assert_eq!(json["endedAt"], 1250);
    }

    #[test]
    fn test_run_result_failure_output_is_structured() {
        let text = r#"{"type":"runResult","requestId":3,"success":false,"output":{"stderr":"SyntaxError"}}"#;
        let msg: CollabMessage = serde_json::from_str(text).unwrap();
        match msg {
            CollabMessage::RunResult {
                success,
                output,
                started_at,
                ended_at,
                ..
            } => {
                assert!(!success);
                assert_eq!(output.display_text(), "SyntaxError");
                assert_eq!(started_at, None);
                assert_eq!(ended_at, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_run_output_untagged_variants() {
        let text: RunOutput = serde_json::from_str(r#""ok""#).unwrap();
        assert_eq!(text, RunOutput::Text("ok".to_string()));

        let failure: RunOutput = serde_json::from_str(r#"{"stderr":"boom"}"#).unwrap();
        assert_eq!(
            failure,
            RunOutput::Failure {
                stderr: "boom".to_string()
            }
        );
    }
}
