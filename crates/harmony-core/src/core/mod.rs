// Chat room synchronization core: a single-threaded actor fed by `CoreMsg`.
// All store mutation happens inside `handle_message`; network side effects
// run on the owned tokio runtime and report back as internal events.

mod grouping;
mod store;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{Local, Utc};
use flume::Sender;

use crate::actions::AppAction;
use crate::backend::{BackendEvent, ChatBackend, SendRequest, WireMessage};
use crate::config::AppConfig;
use crate::state::{AppState, ChatMessage, MessageStatus, RoomViewState, UserProfile};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use store::RoomSession;

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    backend: Arc<dyn ChatBackend>,
    config: AppConfig,
    profile: UserProfile,
    runtime: tokio::runtime::Runtime,

    session: Option<RoomSession>,
    /// Monotonic across room switches; outstanding responses carrying an
    /// older generation are discarded on arrival.
    next_generation: u64,
    /// Guards against two sends landing inside one millisecond.
    last_temp_ms: i64,
    toast_dismiss_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        profile: UserProfile,
        config: AppConfig,
        backend: Arc<dyn ChatBackend>,
        shared_state: Arc<RwLock<AppState>>,
    ) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            backend,
            config,
            profile,
            runtime,
            session: None,
            next_generation: 0,
            last_temp_ms: 0,
            toast_dismiss_token: 0,
        };
        this.start_backend_pump();

        // Ensure ChatApp::state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    /// Drain the backend's push stream into the actor inbox. The pump is the
    /// only reader; it dies with either channel.
    fn start_backend_pump(&self) {
        let rx = self.backend.events();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            while let Ok(event) = rx.recv_async().await {
                let internal = match event {
                    BackendEvent::Page {
                        room_id,
                        generation,
                        offset,
                        messages,
                    } => InternalEvent::SubscriptionPage {
                        room_id,
                        generation,
                        offset,
                        messages,
                    },
                    BackendEvent::SubscriptionError {
                        room_id,
                        generation,
                        error,
                    } => InternalEvent::SubscriptionFailed {
                        room_id,
                        generation,
                        error: error.to_string(),
                    },
                    BackendEvent::SendResult {
                        room_id,
                        local_id,
                        ok,
                        error,
                    } => InternalEvent::PublishMessageResult {
                        room_id,
                        local_id,
                        ok,
                        error,
                    },
                    BackendEvent::RoomName {
                        room_id,
                        name,
                        error,
                    } => InternalEvent::RoomNameFetched {
                        room_id,
                        name,
                        error: error.map(|e| e.to_string()),
                    },
                };
                if tx.send(CoreMsg::Internal(Box::new(internal))).is_err() {
                    break;
                }
            }
        });
    }

    // ── Snapshot plumbing ───────────────────────────────────────────────

    fn next_rev(&mut self) {
        self.rev += 1;
        self.state.rev = self.rev;
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Rebuild the render-ready room projection from the session and emit.
    /// Recomputed on every store change so grouping never drifts from the
    /// store contents.
    fn refresh_current_room(&mut self) {
        let today = Local::now().date_naive();
        self.state.current_room = self.session.as_ref().map(|sess| RoomViewState {
            room_id: sess.room_id.clone(),
            room_name: sess.room_name.clone(),
            draft: sess.draft.clone(),
            groups: grouping::group_messages(&sess.messages, today),
            messages: sess.messages.clone(),
            has_more: sess.has_more,
            is_fetching: sess.is_fetching,
            is_initial_load: sess.is_initial_load,
        });
        self.emit_state();
    }

    fn toast(&mut self, msg: impl Into<String>) {
        self.state.toast = Some(msg.into());
        self.toast_dismiss_token = self.toast_dismiss_token.wrapping_add(1);
        self.schedule_toast_auto_dismiss(self.toast_dismiss_token);
        self.emit_state();
    }

    fn schedule_toast_auto_dismiss(&self, token: u64) {
        let tx = self.core_sender.clone();
        let delay = Duration::from_millis(self.config.toast_auto_dismiss_ms);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ToastAutoDismiss {
                token,
            })));
        });
    }

    // ── Message pump ────────────────────────────────────────────────────

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::debug!(action = action.tag(), "handle_action");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::OpenRoom { room_id } => self.open_room(room_id),
            AppAction::CloseRoom => self.close_room(),
            AppAction::SetDraft { text } => {
                if let Some(sess) = self.session.as_mut() {
                    sess.draft = text;
                    self.refresh_current_room();
                }
            }
            AppAction::SendMessage { room_id, text } => self.send_message(room_id, text),
            AppAction::RetryMessage {
                room_id,
                message_id,
            } => self.retry_message(&room_id, &message_id),
            AppAction::LoadOlderMessages { room_id } => self.load_older_messages(&room_id),
            AppAction::ClearToast => {
                self.state.toast = None;
                self.emit_state();
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::SubscriptionPage {
                room_id,
                generation,
                offset,
                messages,
            } => self.handle_subscription_page(room_id, generation, offset, messages),
            InternalEvent::SubscriptionFailed {
                room_id,
                generation,
                error,
            } => self.handle_subscription_failed(room_id, generation, error),
            InternalEvent::PublishMessageResult {
                room_id,
                local_id,
                ok,
                error,
            } => self.handle_publish_message_result(room_id, local_id, ok, error),
            InternalEvent::SendTimedOut { room_id, local_id } => {
                self.handle_send_timed_out(room_id, local_id)
            }
            InternalEvent::RoomNameFetched {
                room_id,
                name,
                error,
            } => self.handle_room_name_fetched(room_id, name, error),
            InternalEvent::ToastAutoDismiss { token } => self.handle_toast_auto_dismiss(token),
        }
    }

    // ── Room lifecycle ──────────────────────────────────────────────────

    fn open_room(&mut self, room_id: String) {
        if self.session.as_ref().is_some_and(|s| s.room_id == room_id) {
            // Re-opening the active room keeps its state; just refresh.
            self.refresh_current_room();
            return;
        }

        self.next_generation += 1;
        let sess = RoomSession::new(room_id.clone(), self.next_generation, self.config.page_size);
        let params = sess.subscription_params();
        tracing::info!(%room_id, generation = sess.generation, "open_room");
        self.session = Some(sess);

        self.backend.subscribe(params);
        self.backend.fetch_room_name(room_id);
        self.refresh_current_room();
    }

    fn close_room(&mut self) {
        if self.session.take().is_some() {
            self.backend.unsubscribe();
            self.refresh_current_room();
        }
    }

    fn handle_room_name_fetched(
        &mut self,
        room_id: String,
        name: Option<String>,
        error: Option<String>,
    ) {
        if let Some(error) = error {
            // The header degrades to the bare room id.
            tracing::warn!(%room_id, %error, "room name fetch failed");
            return;
        }
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.room_id != room_id {
            return;
        }
        sess.room_name = name;
        self.refresh_current_room();
    }

    // ── Subscription ingest ─────────────────────────────────────────────

    fn handle_subscription_page(
        &mut self,
        room_id: String,
        generation: u64,
        offset: usize,
        messages: Vec<WireMessage>,
    ) {
        let raw_page_len = messages.len();
        let Some(sess) = self.session.as_mut() else {
            tracing::debug!(%room_id, "page with no open room, dropping");
            return;
        };
        if sess.room_id != room_id || sess.generation != generation {
            // Late response for a previous room or window; it must not
            // populate the active store.
            tracing::debug!(
                %room_id,
                generation,
                active = sess.generation,
                "stale page dropped"
            );
            return;
        }

        let incoming: Vec<ChatMessage> = messages
            .into_iter()
            .filter_map(|wire| store::from_wire(&room_id, wire))
            .collect();
        sess.apply_page(incoming, raw_page_len);
        tracing::debug!(
            %room_id,
            offset,
            raw_page_len,
            total = sess.messages.len(),
            has_more = sess.has_more,
            "page merged"
        );
        self.refresh_current_room();
    }

    fn handle_subscription_failed(&mut self, room_id: String, generation: u64, error: String) {
        tracing::warn!(%room_id, generation, %error, "subscription error");
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.room_id != room_id || sess.generation != generation {
            return;
        }
        // Keep last-known messages and never leave the room locked out of
        // backfill.
        sess.is_fetching = false;
        self.refresh_current_room();
        self.toast("Couldn't load messages. Scroll up to retry.");
    }

    // ── Backfill pagination ─────────────────────────────────────────────

    fn load_older_messages(&mut self, room_id: &str) {
        let params = {
            let Some(sess) = self.session.as_mut() else {
                return;
            };
            if sess.room_id != room_id {
                return;
            }
            // The is_fetching flag is the sole debounce; repeated viewport
            // signals while a fetch is outstanding are no-ops.
            if sess.is_initial_load || !sess.has_more || sess.is_fetching {
                return;
            }
            sess.is_fetching = true;
            sess.offset += sess.limit;
            sess.subscription_params()
        };

        tracing::debug!(room_id, offset = params.offset, "load_older_messages");
        self.backend.subscribe(params);
        self.refresh_current_room();
    }

    // ── Optimistic send ─────────────────────────────────────────────────

    fn next_temp_id(&mut self, now_ms: i64) -> String {
        let ms = now_ms.max(self.last_temp_ms + 1);
        self.last_temp_ms = ms;
        format!("temp-{ms}")
    }

    fn send_message(&mut self, room_id: String, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if self.session.as_ref().map(|s| s.room_id.as_str()) != Some(room_id.as_str()) {
            tracing::warn!(%room_id, "send for a room that is not open, dropping");
            return;
        }

        let now = Utc::now();
        let local_id = self.next_temp_id(now.timestamp_millis());
        let message = ChatMessage {
            id: local_id.clone(),
            room_id: room_id.clone(),
            author_id: self.profile.user_id.clone(),
            author_username: self.profile.username.clone(),
            author_avatar_url: self.profile.avatar_url.clone(),
            text: text.clone(),
            timestamp: now,
            display_timestamp: grouping::format_display_timestamp(now),
            status: MessageStatus::Pending,
        };

        if let Some(sess) = self.session.as_mut() {
            // Visually newest regardless of true sort position until the
            // next merge supersedes it.
            sess.messages.insert(0, message);
            sess.draft.clear();
        }

        tracing::info!(%room_id, %local_id, "send_message");
        self.backend.send_message(SendRequest {
            room_id: room_id.clone(),
            author_id: self.profile.user_id.clone(),
            text,
            local_id: local_id.clone(),
        });
        self.schedule_send_timeout(room_id, local_id);
        self.refresh_current_room();
    }

    /// An indefinitely hanging send must not leave a message pending
    /// forever; past the deadline it is treated as failed. A late result is
    /// still applied normally when it eventually arrives.
    fn schedule_send_timeout(&self, room_id: String, local_id: String) {
        let tx = self.core_sender.clone();
        let delay = Duration::from_millis(self.config.send_timeout_ms);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendTimedOut {
                room_id,
                local_id,
            })));
        });
    }

    fn retry_message(&mut self, room_id: &str, message_id: &str) {
        let legacy = self.config.retry_matches_by_timestamp;

        let request = {
            let Some(sess) = self.session.as_mut() else {
                return;
            };
            if sess.room_id != room_id {
                return;
            }
            match sess.messages.iter_mut().find(|m| m.id == message_id) {
                Some(msg) if matches!(msg.status, MessageStatus::Failed { .. }) => {
                    if !legacy {
                        // Default mode: the retried message goes back in
                        // flight under its stable local id.
                        msg.status = MessageStatus::Pending;
                    }
                    Some(SendRequest {
                        room_id: sess.room_id.clone(),
                        author_id: msg.author_id.clone(),
                        text: msg.text.clone(),
                        local_id: msg.id.clone(),
                    })
                }
                _ => None,
            }
        };

        let Some(request) = request else {
            self.toast("Nothing to retry");
            return;
        };

        tracing::info!(room_id, message_id, legacy, "retry_message");
        self.backend.send_message(request.clone());
        self.schedule_send_timeout(request.room_id, request.local_id);
        self.refresh_current_room();
    }

    fn handle_publish_message_result(
        &mut self,
        room_id: String,
        local_id: String,
        ok: bool,
        error: Option<String>,
    ) {
        tracing::info!(ok, ?error, %room_id, %local_id, "message_publish_result");
        let legacy = self.config.retry_matches_by_timestamp;
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.room_id != room_id {
            return;
        }

        let mut changed = false;
        if ok {
            // Success never promotes the optimistic entry in place: it stays
            // pending until the next merged page replaces it with the
            // canonical echo.
            if legacy {
                // Compatibility contract: clear the failed flag on every
                // message sharing the retried message's exact timestamp.
                let retried_ts = sess
                    .messages
                    .iter()
                    .find(|m| m.id == local_id)
                    .map(|m| m.timestamp);
                if let Some(ts) = retried_ts {
                    for msg in sess.messages.iter_mut().filter(|m| m.timestamp == ts) {
                        if matches!(msg.status, MessageStatus::Failed { .. }) {
                            msg.status = MessageStatus::Pending;
                            changed = true;
                        }
                    }
                }
            }
        } else if let Some(msg) = sess.messages.iter_mut().find(|m| m.id == local_id) {
            if legacy && matches!(msg.status, MessageStatus::Failed { .. }) {
                // Legacy retry failure: logs only, state untouched.
            } else {
                msg.status = MessageStatus::Failed {
                    reason: error.unwrap_or_else(|| "send failed".into()),
                };
                changed = true;
            }
        }

        if changed {
            self.refresh_current_room();
        }
    }

    fn handle_send_timed_out(&mut self, room_id: String, local_id: String) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.room_id != room_id {
            return;
        }
        let Some(msg) = sess.messages.iter_mut().find(|m| m.id == local_id) else {
            return;
        };
        if msg.status != MessageStatus::Pending {
            return;
        }
        tracing::warn!(%room_id, %local_id, "send unresolved past deadline, marking failed");
        msg.status = MessageStatus::Failed {
            reason: "send timed out".into(),
        };
        self.refresh_current_room();
    }

    // ── Toast ───────────────────────────────────────────────────────────

    fn handle_toast_auto_dismiss(&mut self, token: u64) {
        if token != self.toast_dismiss_token {
            // Superseded by a newer toast.
            return;
        }
        if self.state.toast.take().is_some() {
            self.emit_state();
        }
    }
}
