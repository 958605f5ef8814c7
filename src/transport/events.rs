//! Wire-level event enums crossing the transport boundary.
//!
//! `TransportEvent` is what the transport delivers (already reduced from the
//! engine's raw frames to the shapes the orchestrator consumes);
//! `ClientEvent` is what the orchestrator sends back. Both are internally
//! tagged so connectors can serialize them straight onto a JSON channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transcript::{Role, SnapshotItem};

/// Events delivered by the transport, in exactly delivery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// A new conversation item entered the engine's history.
    ItemAdded {
        item_id: String,
        role: Role,
        /// Text the transport resolved from the item's content parts; may be
        /// empty for audio turns still being transcribed.
        #[serde(default)]
        text: String,
    },
    /// Authoritative item-list snapshot (history update).
    Snapshot { items: Vec<SnapshotItem> },
    /// Incremental transcription of user input audio.
    InputTranscriptionDelta { item_id: String, delta: String },
    /// Final transcription of user input audio.
    InputTranscriptionCompleted {
        item_id: String,
        #[serde(default)]
        transcript: String,
    },
    /// Incremental transcript of assistant output audio.
    OutputTranscriptDelta { item_id: String, delta: String },
    /// Final transcript of assistant output audio.
    OutputTranscriptDone {
        item_id: String,
        #[serde(default)]
        transcript: String,
    },
    /// Assistant audio frame produced (payload handled by the transport).
    OutputAudioDelta,
    /// Assistant audio finished streaming.
    OutputAudioDone,
    /// Server-side voice activity detection: user started speaking.
    SpeechStarted,
    /// Server-side voice activity detection: user stopped speaking.
    SpeechStopped,
    /// The engine requests execution of one of the exposed tools.
    ToolCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    /// Transport-level error report.
    Error { message: String },
}

/// Events the orchestrator sends to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Discard buffered input audio (push-to-talk press).
    InputAudioBufferClear,
    /// Commit buffered input audio as a user turn (push-to-talk release).
    InputAudioBufferCommit,
    /// Ask the engine to produce a response.
    ResponseCreate,
    /// Cancel the in-flight assistant utterance.
    ResponseCancel,
    /// Hand a tool result (or tool-level error) back to the engine.
    ToolOutput { call_id: String, output: Value },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transport_event_deserializes_from_tagged_json() {
        let event: TransportEvent = serde_json::from_value(json!({
            "type": "input_transcription_delta",
            "item_id": "m1",
            "delta": "pepper"
        }))
        .expect("deserialize delta event");
        match event {
            TransportEvent::InputTranscriptionDelta { item_id, delta } => {
                assert_eq!(item_id, "m1");
                assert_eq!(delta, "pepper");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn tool_call_arguments_default_to_null() {
        let event: TransportEvent = serde_json::from_value(json!({
            "type": "tool_call",
            "call_id": "c1",
            "name": "readMenu"
        }))
        .expect("deserialize tool call");
        match event {
            TransportEvent::ToolCall { name, arguments, .. } => {
                assert_eq!(name, "readMenu");
                assert_eq!(arguments, Value::Null);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn client_event_serializes_with_snake_case_tag() {
        let json = serde_json::to_value(ClientEvent::InputAudioBufferCommit)
            .expect("serialize client event");
        assert_eq!(json["type"], "input_audio_buffer_commit");

        let json = serde_json::to_value(ClientEvent::ToolOutput {
            call_id: "c1".into(),
            output: json!({ "spoken": "done" }),
        })
        .expect("serialize tool output");
        assert_eq!(json["type"], "tool_output");
        assert_eq!(json["call_id"], "c1");
    }
}
