//! harmony-core: the chat message synchronization engine behind the Harmony
//! front-end. Owns the active room's message store, offset-based backfill,
//! optimistic sends, and date/author grouping; everything else (identity,
//! room/server CRUD, rendering, the transport itself) lives outside the
//! crate behind [`ChatBackend`] and [`UserProfile`].

mod actions;
mod backend;
mod config;
mod core;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use backend::{
    BackendError, BackendEvent, ChatBackend, SendRequest, SubscriptionParams, WireAuthor,
    WireMessage,
};
pub use config::{load_app_config, AppConfig, CONFIG_FILE_NAME};
pub use state::{
    AppState, AuthorRun, ChatMessage, DateGroup, MessageStatus, RoomViewState, UserProfile,
};
pub use updates::{AppUpdate, CoreMsg, InternalEvent};

/// Receives every state snapshot emitted by the core actor.
pub trait UpdateListener: Send + 'static {
    fn reconcile(&self, update: AppUpdate);
}

pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl ChatApp {
    pub fn new(profile: UserProfile, config: AppConfig, backend: Arc<dyn ChatBackend>) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(user_id = %profile.user_id, "ChatApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                profile,
                config,
                backend,
                shared_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, listener: Box<dyn UpdateListener>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                listener.reconcile(update);
            }
        });
    }
}
