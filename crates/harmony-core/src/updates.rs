use crate::backend::WireMessage;
use crate::state::AppState;
use crate::AppAction;

#[derive(Debug, Clone)]
pub enum AppUpdate {
    /// Primary update stream: always send a full state snapshot.
    ///
    /// Simplest reconciliation story for any front-end; can be made more
    /// granular later.
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Subscription receive path. `generation` is echoed from the request so
    // late pages for a previous room or window can be discarded.
    SubscriptionPage {
        room_id: String,
        generation: u64,
        offset: usize,
        messages: Vec<WireMessage>,
    },
    SubscriptionFailed {
        room_id: String,
        generation: u64,
        error: String,
    },

    // Async send results
    PublishMessageResult {
        room_id: String,
        local_id: String,
        ok: bool,
        error: Option<String>,
    },
    SendTimedOut {
        room_id: String,
        local_id: String,
    },

    // Room metadata
    RoomNameFetched {
        room_id: String,
        name: Option<String>,
        error: Option<String>,
    },

    // UI timers
    ToastAutoDismiss {
        token: u64,
    },
}
