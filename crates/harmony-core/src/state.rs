use chrono::{DateTime, NaiveDate, Utc};

/// The authenticated user, as resolved by the external identity provider.
/// The engine never authenticates; it only stamps outgoing messages.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    /// Held by the backend; arrived through the subscription channel.
    Confirmed,
    /// Local optimistic entry, send still in flight.
    Pending,
    /// Local optimistic entry whose send failed; shown with a retry affordance.
    Failed { reason: String },
}

impl MessageStatus {
    /// Temporary entries are superseded wholesale by the next merged page;
    /// they are never upgraded in place.
    pub fn is_temporary(&self) -> bool {
        matches!(self, MessageStatus::Pending | MessageStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Canonical backend id, or `temp-<epoch-ms>` for unconfirmed sends.
    pub id: String,
    pub room_id: String,
    pub author_id: String,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
    /// Stored trimmed; never empty.
    pub text: String,
    /// For temporary messages, the local send instant.
    pub timestamp: DateTime<Utc>,
    /// 12-hour `h:MM AM/PM` rendering in the local timezone.
    pub display_timestamp: String,
    pub status: MessageStatus,
}

/// A contiguous run of messages from one author within one calendar day,
/// with inter-message gaps of at most five minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRun {
    pub author_id: String,
    pub messages: Vec<ChatMessage>,
}

/// One date divider's worth of messages. Derived, stateless projection of
/// the store; recomputed on every store change, never mutated directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGroup {
    /// Local calendar day of every message in the group.
    pub day: NaiveDate,
    /// "Today", "Yesterday", or a long-form date.
    pub label: String,
    pub runs: Vec<AuthorRun>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomViewState {
    pub room_id: String,
    /// Resolved asynchronously; `None` until the lookup lands (or forever if
    /// it fails, in which case the header shows the bare room id).
    pub room_name: Option<String>,
    pub draft: String,
    /// Store order: newest first. Consumers reverse for chronological display.
    pub messages: Vec<ChatMessage>,
    /// Mirrors `messages` order (newest group first).
    pub groups: Vec<DateGroup>,
    /// Page-size heuristic, not a true end-of-history signal. `false` renders
    /// the "start of room" marker.
    pub has_more: bool,
    pub is_fetching: bool,
    pub is_initial_load: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub rev: u64,
    pub current_room: Option<RoomViewState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            current_room: None,
            toast: None,
        }
    }
}
