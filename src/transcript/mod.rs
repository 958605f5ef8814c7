//! Transcript reconciliation.
//!
//! The transport delivers a noisy, partially-ordered mix of add / snapshot /
//! delta / completion / tool-result events. `TranscriptLog` reconciles them
//! into one append-only, insertion-ordered log. Every mutation goes through
//! the reducer methods here; nothing else writes the log.
//!
//! Reducer rules:
//! - snapshot text overwrites, deltas append, completion overwrites with an
//!   `"[inaudible]"` fallback for empty finals;
//! - message creation is idempotent per item id (add/update races for the
//!   same id must not duplicate);
//! - artifact items are never deduplicated — one tool call reports one
//!   artifact regardless of message framing;
//! - deltas for unknown item ids are dropped with a diagnostic, not
//!   synthesized into items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ProntoError, Result};

/// Substituted when a completed transcription is empty or a lone newline.
pub const INAUDIBLE_TEXT: &str = "[inaudible]";

/// Placeholder shown while a user utterance is still being transcribed.
pub const TRANSCRIBING_PLACEHOLDER: &str = "[Transcribing...]";

/// Who produced a message item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// What a transcript item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    /// A spoken or typed conversational turn.
    Message,
    /// Structured menu payload surfaced inline by `readMenu`.
    MenuArtifact,
    /// Structured order payload surfaced inline by `getOrder`.
    OrderArtifact,
}

/// Whether an item is still accumulating text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    InProgress,
    Done,
}

/// One logical turn or artifact in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptItem {
    pub item_id: String,
    pub kind: ItemKind,
    /// Only meaningful for `Message` items; artifacts report `Assistant`.
    pub role: Role,
    /// Mutable text accumulator (delta appends, snapshot/final overwrites).
    pub text: String,
    /// Decoded payload for artifact kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,
    pub status: ItemStatus,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}

/// One entry of an item-list snapshot update, already reduced to the text the
/// transport resolved for that item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotItem {
    pub item_id: String,
    pub text: String,
}

/// The append-only transcript log.
///
/// Insertion order is the only order; items are never removed or resorted.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    items: Vec<TranscriptItem>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TranscriptItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a new message item.
    ///
    /// Idempotent per `item_id`: when a message with this id already exists
    /// (add and update events racing for the same id) the call is a no-op
    /// with a diagnostic. An empty user message gets a transcribing
    /// placeholder until deltas or the final transcript arrive.
    ///
    /// Returns a snapshot of the appended item, or `None` when deduplicated.
    pub fn add_message(
        &mut self,
        item_id: &str,
        role: Role,
        text: &str,
        hidden: bool,
    ) -> Option<TranscriptItem> {
        if self
            .items
            .iter()
            .any(|i| i.item_id == item_id && i.kind == ItemKind::Message)
        {
            warn!(item_id, ?role, "skipping add; message already exists");
            return None;
        }

        let text = if text.is_empty() && role == Role::User {
            TRANSCRIBING_PLACEHOLDER.to_string()
        } else {
            text.to_string()
        };

        let item = TranscriptItem {
            item_id: item_id.to_string(),
            kind: ItemKind::Message,
            role,
            text,
            structured_data: None,
            status: ItemStatus::InProgress,
            hidden,
            created_at: Utc::now(),
        };
        self.items.push(item.clone());
        Some(item)
    }

    /// Append a text fragment to an existing message item.
    ///
    /// A delta referencing an unknown item id is dropped with a diagnostic —
    /// the reconciler never synthesizes items from deltas.
    pub fn apply_delta(&mut self, item_id: &str, fragment: &str) -> Option<TranscriptItem> {
        match self.message_mut(item_id) {
            Some(item) => {
                if item.text == TRANSCRIBING_PLACEHOLDER {
                    item.text.clear();
                }
                item.text.push_str(fragment);
                Some(item.clone())
            }
            None => {
                warn!(item_id, "dropping delta for unknown item");
                None
            }
        }
    }

    /// Apply an authoritative item-list snapshot.
    ///
    /// For every entry resolving to non-empty text, overwrite the live
    /// message's text (corrects speculative partial renderings). Never
    /// creates or reorders items. Returns snapshots of the changed items.
    pub fn apply_snapshot(&mut self, entries: &[SnapshotItem]) -> Vec<TranscriptItem> {
        let mut changed = Vec::new();
        for entry in entries {
            if entry.text.is_empty() {
                continue;
            }
            if let Some(item) = self.message_mut(&entry.item_id) {
                if item.text != entry.text {
                    item.text = entry.text.clone();
                    changed.push(item.clone());
                }
            }
        }
        changed
    }

    /// Finalize a transcription: overwrite the text and mark the item done.
    ///
    /// An empty or newline-only final transcript becomes the literal
    /// `"[inaudible]"` marker.
    pub fn complete_transcription(
        &mut self,
        item_id: &str,
        final_text: &str,
    ) -> Option<TranscriptItem> {
        let text = if final_text.is_empty() || final_text == "\n" {
            INAUDIBLE_TEXT
        } else {
            final_text
        };
        match self.message_mut(item_id) {
            Some(item) => {
                item.text = text.to_string();
                item.status = ItemStatus::Done;
                Some(item.clone())
            }
            None => {
                warn!(item_id, "dropping completion for unknown item");
                None
            }
        }
    }

    /// Fold a completed tool invocation into the log.
    ///
    /// `result` may arrive as encoded text or already-decoded structured
    /// data; it is normalised with one decode-if-text step here. A recognised
    /// tool reporting a menu or order appends a fresh artifact item carrying
    /// the decoded payload — independent of any message items, so repeated
    /// calls yield repeated artifacts. Unrecognised tool names are ignored.
    ///
    /// # Errors
    /// `ProntoError::MalformedEvent` when the payload is serialized text that
    /// does not parse; the log is left untouched.
    pub fn on_tool_result(
        &mut self,
        tool_name: &str,
        result: &Value,
    ) -> Result<Option<TranscriptItem>> {
        let decoded = match result {
            Value::String(s) => serde_json::from_str::<Value>(s).map_err(|e| {
                ProntoError::MalformedEvent(format!("tool {tool_name} result: {e}"))
            })?,
            other => other.clone(),
        };

        let (kind, payload) = match tool_name {
            "readMenu" => match decoded.get("menu") {
                Some(menu) => (ItemKind::MenuArtifact, menu.clone()),
                None => return Ok(None),
            },
            "getOrder" => match decoded.get("order") {
                Some(order) => (ItemKind::OrderArtifact, order.clone()),
                None => return Ok(None),
            },
            other => {
                debug!(tool = other, "no artifact for tool result");
                return Ok(None);
            }
        };

        let item = TranscriptItem {
            item_id: Uuid::new_v4().to_string(),
            kind,
            role: Role::Assistant,
            text: String::new(),
            structured_data: Some(payload),
            status: ItemStatus::InProgress,
            hidden: false,
            created_at: Utc::now(),
        };
        self.items.push(item.clone());
        Ok(Some(item))
    }

    fn message_mut(&mut self, item_id: &str) -> Option<&mut TranscriptItem> {
        self.items
            .iter_mut()
            .find(|i| i.item_id == item_id && i.kind == ItemKind::Message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_message_is_idempotent_per_item_id() {
        let mut log = TranscriptLog::new();
        assert!(log.add_message("m1", Role::User, "hi", false).is_some());
        assert!(log.add_message("m1", Role::User, "hi again", false).is_none());
        assert_eq!(log.len(), 1);
        assert_eq!(log.items()[0].text, "hi");
    }

    #[test]
    fn empty_user_message_gets_transcribing_placeholder() {
        let mut log = TranscriptLog::new();
        log.add_message("m1", Role::User, "", false);
        assert_eq!(log.items()[0].text, TRANSCRIBING_PLACEHOLDER);

        // Assistant items stay empty — their text streams in via deltas.
        log.add_message("m2", Role::Assistant, "", false);
        assert_eq!(log.items()[1].text, "");
    }

    #[test]
    fn delta_appends_and_clears_placeholder() {
        let mut log = TranscriptLog::new();
        log.add_message("m1", Role::User, "", false);
        log.apply_delta("m1", "one ");
        log.apply_delta("m1", "large");
        assert_eq!(log.items()[0].text, "one large");
    }

    #[test]
    fn delta_for_unknown_item_is_dropped() {
        let mut log = TranscriptLog::new();
        assert!(log.apply_delta("ghost", "text").is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn snapshot_overwrites_only_non_empty_entries() {
        let mut log = TranscriptLog::new();
        log.add_message("m1", Role::Assistant, "speculat", false);
        log.add_message("m2", Role::Assistant, "kept", false);

        let changed = log.apply_snapshot(&[
            SnapshotItem {
                item_id: "m1".into(),
                text: "authoritative copy".into(),
            },
            SnapshotItem {
                item_id: "m2".into(),
                text: String::new(),
            },
            SnapshotItem {
                item_id: "never-added".into(),
                text: "ignored".into(),
            },
        ]);

        assert_eq!(changed.len(), 1);
        assert_eq!(log.items()[0].text, "authoritative copy");
        assert_eq!(log.items()[1].text, "kept");
        // Snapshots never create items.
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn completion_overwrites_and_marks_done() {
        let mut log = TranscriptLog::new();
        log.add_message("m1", Role::User, "", false);
        log.apply_delta("m1", "partial");

        let item = log.complete_transcription("m1", "final words").unwrap();
        assert_eq!(item.text, "final words");
        assert_eq!(item.status, ItemStatus::Done);
    }

    #[test]
    fn empty_or_newline_final_becomes_inaudible() {
        let mut log = TranscriptLog::new();
        log.add_message("m1", Role::User, "", false);
        log.add_message("m2", Role::User, "", false);

        assert_eq!(log.complete_transcription("m1", "").unwrap().text, INAUDIBLE_TEXT);
        assert_eq!(log.complete_transcription("m2", "\n").unwrap().text, INAUDIBLE_TEXT);
    }

    #[test]
    fn interleaved_add_delta_snapshot_complete_settles_to_final() {
        let mut log = TranscriptLog::new();
        log.add_message("m1", Role::User, "", false);
        log.apply_delta("m1", "pepp");
        log.apply_snapshot(&[SnapshotItem {
            item_id: "m1".into(),
            text: "pepperoni".into(),
        }]);
        log.apply_delta("m1", " please");
        log.complete_transcription("m1", "pepperoni please");
        assert_eq!(log.items()[0].text, "pepperoni please");
        assert_eq!(log.items()[0].status, ItemStatus::Done);
    }

    #[test]
    fn read_menu_result_appends_menu_artifact() {
        let mut log = TranscriptLog::new();
        let result = json!({ "spoken": "Here's our menu", "menu": { "margherita": { "id": 1 } } });
        let item = log.on_tool_result("readMenu", &result).unwrap().unwrap();
        assert_eq!(item.kind, ItemKind::MenuArtifact);
        assert_eq!(item.structured_data, Some(json!({ "margherita": { "id": 1 } })));
    }

    #[test]
    fn tool_result_decodes_serialized_text() {
        let mut log = TranscriptLog::new();
        let encoded = json!(r#"{"spoken":"Order #7","order":{"order_id":7}}"#);
        let item = log.on_tool_result("getOrder", &encoded).unwrap().unwrap();
        assert_eq!(item.kind, ItemKind::OrderArtifact);
        assert_eq!(item.structured_data, Some(json!({ "order_id": 7 })));
    }

    #[test]
    fn undecodable_tool_result_is_malformed_and_skipped() {
        let mut log = TranscriptLog::new();
        let garbled = json!("{not json at all");
        let err = log.on_tool_result("getOrder", &garbled).unwrap_err();
        assert!(matches!(err, ProntoError::MalformedEvent(_)));
        assert!(log.is_empty());
    }

    #[test]
    fn unrecognized_tool_names_are_ignored() {
        let mut log = TranscriptLog::new();
        let result = json!({ "anything": true });
        assert!(log.on_tool_result("placeOrder", &result).unwrap().is_none());
        assert!(log.on_tool_result("transferToHuman", &result).unwrap().is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn artifacts_are_never_deduplicated() {
        let mut log = TranscriptLog::new();
        let result = json!({ "menu": { "margherita": { "id": 1 } } });
        log.on_tool_result("readMenu", &result).unwrap();
        log.on_tool_result("readMenu", &result).unwrap();
        assert_eq!(log.len(), 2);
        assert_ne!(log.items()[0].item_id, log.items()[1].item_id);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut log = TranscriptLog::new();
        log.add_message("b", Role::Assistant, "second?", false);
        log.add_message("a", Role::User, "first?", false);
        log.on_tool_result("readMenu", &json!({ "menu": {} })).unwrap();
        let ids: Vec<&str> = log.items().iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(&ids[..2], &["b", "a"]);
        assert_eq!(log.items()[2].kind, ItemKind::MenuArtifact);
    }

    #[test]
    fn transcript_item_serializes_with_camel_case() {
        let mut log = TranscriptLog::new();
        let item = log.add_message("m1", Role::User, "hello", false).unwrap();
        let json = serde_json::to_value(&item).expect("serialize transcript item");
        assert_eq!(json["itemId"], "m1");
        assert_eq!(json["kind"], "message");
        assert_eq!(json["role"], "user");
        assert_eq!(json["status"], "inProgress");
        assert_eq!(json["hidden"], false);
    }
}
