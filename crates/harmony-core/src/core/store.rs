//! Authoritative in-memory message collection for the active room, plus the
//! pagination window over backend history.

use std::collections::HashMap;

use crate::backend::{SubscriptionParams, WireMessage};
use crate::state::{ChatMessage, MessageStatus};

use super::grouping::format_display_timestamp;

/// Everything scoped to the currently open room. Rebuilt from scratch on
/// every room change; nothing survives a switch.
#[derive(Debug)]
pub(crate) struct RoomSession {
    pub(crate) room_id: String,
    /// Stamped into every outstanding backend request; responses carrying a
    /// different generation are discarded instead of cancelled.
    pub(crate) generation: u64,
    pub(crate) offset: usize,
    pub(crate) limit: usize,
    pub(crate) has_more: bool,
    pub(crate) is_fetching: bool,
    pub(crate) is_initial_load: bool,
    pub(crate) room_name: Option<String>,
    pub(crate) draft: String,
    /// Store order: newest first.
    pub(crate) messages: Vec<ChatMessage>,
}

impl RoomSession {
    pub(crate) fn new(room_id: String, generation: u64, limit: usize) -> Self {
        Self {
            room_id,
            generation,
            offset: 0,
            limit,
            has_more: true,
            is_fetching: false,
            is_initial_load: true,
            room_name: None,
            draft: String::new(),
            messages: Vec::new(),
        }
    }

    pub(crate) fn subscription_params(&self) -> SubscriptionParams {
        SubscriptionParams {
            room_id: self.room_id.clone(),
            limit: self.limit,
            offset: self.offset,
            generation: self.generation,
        }
    }

    /// Fold one pushed page into the store. `raw_page_len` is the wire batch
    /// length before hygiene filtering; it drives the `has_more` heuristic
    /// (one full page followed by an empty next page is the only way the
    /// flag clears).
    pub(crate) fn apply_page(&mut self, incoming: Vec<ChatMessage>, raw_page_len: usize) {
        self.messages = merge_messages(&self.messages, &incoming);
        self.has_more = raw_page_len == self.limit;
        self.is_fetching = false;
        self.is_initial_load = false;
    }
}

/// Convert one wire message for storage. Whitespace-only text is dropped at
/// the door: the store never holds empty text.
pub(crate) fn from_wire(room_id: &str, wire: WireMessage) -> Option<ChatMessage> {
    let text = wire.text.trim();
    if text.is_empty() {
        return None;
    }
    Some(ChatMessage {
        id: wire.id,
        room_id: room_id.to_string(),
        author_id: wire.author.id,
        author_username: wire.author.username,
        author_avatar_url: wire.author.avatar_url,
        text: text.to_string(),
        display_timestamp: format_display_timestamp(wire.timestamp),
        timestamp: wire.timestamp,
        status: MessageStatus::Confirmed,
    })
}

/// Merge a pushed page into the held messages.
///
/// Optimistic (`Pending`/`Failed`) entries are provisional and are
/// superseded wholesale by any fresh batch; they are never matched
/// individually against the incoming page. On a duplicate id the incoming
/// entry wins ("freshest batch wins"), so a stale held copy can never shadow
/// a freshly pushed one. Result is timestamp-descending, ties broken by id,
/// making the merge deterministic and idempotent.
pub(crate) fn merge_messages(
    current: &[ChatMessage],
    incoming: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut by_id: HashMap<&str, &ChatMessage> = HashMap::new();
    for msg in incoming {
        by_id.insert(msg.id.as_str(), msg);
    }
    for msg in current {
        if msg.status.is_temporary() {
            continue;
        }
        by_id.entry(msg.id.as_str()).or_insert(msg);
    }

    let mut merged: Vec<ChatMessage> = by_id.into_values().cloned().collect();
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
    merged
}
