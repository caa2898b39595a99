//! Seam to the managed real-time backend.
//!
//! The engine never talks HTTP/WebSocket itself; a [`ChatBackend`]
//! implementation (GraphQL subscription client, test fake, ...) owns the
//! transport and reports everything through one event channel, the way the
//! core consumes relay notifications rather than awaiting calls inline.

use chrono::{DateTime, Utc};

/// Parameters of the message subscription window.
///
/// The window covers `offset .. offset + limit` of the room's history in
/// timestamp-descending order. Calling [`ChatBackend::subscribe`] again
/// replaces the previous window; every push for a window is a full page
/// snapshot (at most `limit` messages), not a delta. `generation` is opaque
/// to the backend and must be echoed on every event produced for this
/// window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionParams {
    pub room_id: String,
    pub limit: usize,
    pub offset: usize,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub room_id: String,
    pub author_id: String,
    pub text: String,
    /// Client-assigned id of the optimistic message (`temp-<epoch-ms>`),
    /// echoed in [`BackendEvent::SendResult`]. The send does NOT return the
    /// stored canonical message; confirmation arrives only via the next
    /// subscription push.
    pub local_id: String,
}

/// One message as delivered by the transport.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub author: WireAuthor,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAuthor {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug)]
pub enum BackendEvent {
    /// A full page for the active window.
    Page {
        room_id: String,
        generation: u64,
        offset: usize,
        messages: Vec<WireMessage>,
    },
    /// The transport failed to deliver a page. Reconnection is the
    /// transport's responsibility; the engine only unblocks backfill.
    SubscriptionError {
        room_id: String,
        generation: u64,
        error: BackendError,
    },
    SendResult {
        room_id: String,
        local_id: String,
        ok: bool,
        error: Option<String>,
    },
    RoomName {
        room_id: String,
        name: Option<String>,
        error: Option<BackendError>,
    },
}

pub trait ChatBackend: Send + Sync + 'static {
    /// The push stream. The engine drains this from a single pump task; the
    /// receiver is cloned once at startup.
    fn events(&self) -> flume::Receiver<BackendEvent>;

    /// Replace the active subscription window. At most one window is live
    /// per backend; a new call supersedes the previous one.
    fn subscribe(&self, params: SubscriptionParams);

    /// Tear down the active window (room closed).
    fn unsubscribe(&self);

    /// Fire a send. Must not block; resolution arrives as
    /// [`BackendEvent::SendResult`]. The engine enforces its own timeout on
    /// top, so an implementation may simply never resolve.
    fn send_message(&self, request: SendRequest);

    /// Resolve a room's display name, reported as [`BackendEvent::RoomName`].
    fn fetch_room_name(&self, room_id: String);
}
