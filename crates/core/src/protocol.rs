//! Realtime lock protocol shared by clients, the board channel, and the
//! WebSocket relay.
//!
//! Broadcast events are serialized as JSON with an internally-tagged `"type"`
//! discriminator and camelCase fields, matching what browser peers send.

use serde::{Deserialize, Serialize};

use crate::types::{BoardId, EpochMillis, ObjectId, UserId};

// ---------------------------------------------------------------------------
// Broadcast events (fast path)
// ---------------------------------------------------------------------------

/// A best-effort lock announcement published on a board's broadcast channel.
///
/// When `all_ids` is present the event describes a batch and `object_id` is
/// its first element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    #[serde(rename_all = "camelCase")]
    LockAcquired {
        object_id: ObjectId,
        user_id: UserId,
        user_name: String,
        last_active: EpochMillis,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        all_ids: Option<Vec<ObjectId>>,
    },

    #[serde(rename_all = "camelCase")]
    LockReleased {
        object_id: ObjectId,
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        all_ids: Option<Vec<ObjectId>>,
    },
}

impl BroadcastEvent {
    /// Build a `lock_acquired` event for one or more objects.
    ///
    /// Returns `None` for an empty id list.
    pub fn acquired(
        ids: &[ObjectId],
        user_id: &str,
        user_name: &str,
        last_active: EpochMillis,
    ) -> Option<Self> {
        let (first, all_ids) = split_batch(ids)?;
        Some(Self::LockAcquired {
            object_id: first,
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            last_active,
            all_ids,
        })
    }

    /// Build a `lock_released` event for one or more objects.
    ///
    /// Returns `None` for an empty id list.
    pub fn released(ids: &[ObjectId], user_id: &str) -> Option<Self> {
        let (first, all_ids) = split_batch(ids)?;
        Some(Self::LockReleased {
            object_id: first,
            user_id: user_id.to_string(),
            all_ids,
        })
    }

    /// The user that originated the event.
    pub fn user_id(&self) -> &str {
        match self {
            Self::LockAcquired { user_id, .. } | Self::LockReleased { user_id, .. } => user_id,
        }
    }

    /// The effective list of object ids this event refers to.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let (object_id, all_ids) = match self {
            Self::LockAcquired {
                object_id, all_ids, ..
            }
            | Self::LockReleased {
                object_id, all_ids, ..
            } => (object_id, all_ids),
        };
        match all_ids {
            Some(ids) if !ids.is_empty() => ids.clone(),
            _ => vec![object_id.clone()],
        }
    }

    /// Reject payloads no well-behaved peer would produce.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id().is_empty() {
            return Err("userId must not be empty".into());
        }
        let (object_id, all_ids) = match self {
            Self::LockAcquired {
                object_id, all_ids, ..
            }
            | Self::LockReleased {
                object_id, all_ids, ..
            } => (object_id, all_ids),
        };
        if object_id.is_empty() {
            return Err("objectId must not be empty".into());
        }
        if let Some(ids) = all_ids {
            if ids.iter().any(String::is_empty) {
                return Err("allIds must not contain empty ids".into());
            }
            if ids.first() != Some(object_id) {
                return Err("objectId must be the first element of allIds".into());
            }
        }
        Ok(())
    }
}

/// Split an id list into the compatibility `objectId` and the optional batch.
fn split_batch(ids: &[ObjectId]) -> Option<(ObjectId, Option<Vec<ObjectId>>)> {
    let first = ids.first()?.clone();
    let all_ids = (ids.len() > 1).then(|| ids.to_vec());
    Some((first, all_ids))
}

// ---------------------------------------------------------------------------
// Store change feed (durable path)
// ---------------------------------------------------------------------------

/// The kind of row mutation reported by the store change feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification for one board's lock table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockChange {
    pub kind: ChangeKind,
    pub board_id: BoardId,
    pub object_id: ObjectId,
    pub user_id: UserId,
}

// ---------------------------------------------------------------------------
// Realtime frames (server -> browser)
// ---------------------------------------------------------------------------

/// Outbound frames written to a board's realtime WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeFrame {
    /// A peer's broadcast event relayed verbatim.
    Broadcast { event: BroadcastEvent },
    /// A durable store change; clients re-fetch the board snapshot.
    LockChange { change: LockChange },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<ObjectId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_acquire_has_no_all_ids() {
        let event = BroadcastEvent::acquired(&ids(&["a"]), "u1", "Anne", 10).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "lock_acquired");
        assert_eq!(json["objectId"], "a");
        assert_eq!(json["userName"], "Anne");
        assert_eq!(json["lastActive"], 10);
        assert!(json.get("allIds").is_none());
    }

    #[test]
    fn batch_release_carries_all_ids() {
        let event = BroadcastEvent::released(&ids(&["a", "b", "c"]), "u1").unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "lock_released");
        assert_eq!(json["objectId"], "a");
        assert_eq!(json["allIds"], serde_json::json!(["a", "b", "c"]));
        assert_eq!(event.object_ids(), ids(&["a", "b", "c"]));
    }

    #[test]
    fn empty_batch_builds_nothing() {
        assert!(BroadcastEvent::acquired(&[], "u1", "Anne", 1).is_none());
        assert!(BroadcastEvent::released(&[], "u1").is_none());
    }

    #[test]
    fn parse_browser_payload() {
        let raw = r#"{"type":"lock_acquired","objectId":"x","userId":"U2","userName":"Mary","lastActive":1700000000000}"#;
        let event: BroadcastEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.user_id(), "U2");
        assert_eq!(event.object_ids(), ids(&["x"]));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = r#"{"type":"lock_stolen","objectId":"x","userId":"U2"}"#;
        assert!(serde_json::from_str::<BroadcastEvent>(raw).is_err());
    }

    #[test]
    fn validate_rejects_mismatched_batch_head() {
        let event = BroadcastEvent::LockReleased {
            object_id: "z".into(),
            user_id: "u1".into(),
            all_ids: Some(ids(&["a", "b"])),
        };
        assert!(event.validate().unwrap_err().contains("first element"));
    }

    #[test]
    fn validate_rejects_blank_user() {
        let event = BroadcastEvent::LockReleased {
            object_id: "a".into(),
            user_id: String::new(),
            all_ids: None,
        };
        assert!(event.validate().is_err());
    }

    #[test]
    fn empty_all_ids_falls_back_to_object_id() {
        let event = BroadcastEvent::LockReleased {
            object_id: "a".into(),
            user_id: "u1".into(),
            all_ids: Some(Vec::new()),
        };
        assert_eq!(event.object_ids(), ids(&["a"]));
    }

    #[test]
    fn lock_change_frame_shape() {
        let frame = RealtimeFrame::LockChange {
            change: LockChange {
                kind: ChangeKind::Delete,
                board_id: "b1".into(),
                object_id: "a".into(),
                user_id: "u1".into(),
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "lock_change");
        assert_eq!(json["change"]["kind"], "delete");
        assert_eq!(json["change"]["boardId"], "b1");
    }
}
