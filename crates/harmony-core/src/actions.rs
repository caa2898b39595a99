#[derive(Debug, Clone)]
pub enum AppAction {
    // Room lifecycle
    OpenRoom {
        room_id: String,
    },
    CloseRoom,

    // Composer
    SetDraft {
        text: String,
    },
    SendMessage {
        room_id: String,
        text: String,
    },
    RetryMessage {
        room_id: String,
        message_id: String,
    },

    /// Fired by the UI whenever the top-of-scroll sentinel becomes visible.
    /// All gating (initial load, fetch in flight, start of history) lives in
    /// the core, so redundant signals are harmless.
    LoadOlderMessages {
        room_id: String,
    },

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message text or drafts).
    pub fn tag(&self) -> &'static str {
        match self {
            // Room lifecycle
            AppAction::OpenRoom { .. } => "OpenRoom",
            AppAction::CloseRoom => "CloseRoom",

            // Composer
            AppAction::SetDraft { .. } => "SetDraft",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",

            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}
