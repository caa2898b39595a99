//! End-to-end engine tests through the `ChatApp` facade: room open, page
//! ingest, optimistic send/retry, backfill, and room switching against a
//! scripted backend.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use harmony_core::{
    AppAction, AppConfig, AppUpdate, BackendEvent, ChatApp, ChatBackend, MessageStatus,
    SendRequest, SubscriptionParams, UpdateListener, UserProfile, WireAuthor, WireMessage,
};

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

struct ScriptedBackend {
    events_tx: flume::Sender<BackendEvent>,
    events_rx: flume::Receiver<BackendEvent>,
    subscriptions: Mutex<Vec<SubscriptionParams>>,
    sends: Mutex<Vec<SendRequest>>,
}

impl ScriptedBackend {
    fn new() -> Arc<Self> {
        let (events_tx, events_rx) = flume::unbounded();
        Arc::new(Self {
            events_tx,
            events_rx,
            subscriptions: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
        })
    }

    fn push(&self, event: BackendEvent) {
        self.events_tx.send(event).unwrap();
    }

    fn last_subscription(&self) -> Option<SubscriptionParams> {
        self.subscriptions.lock().unwrap().last().cloned()
    }

    fn last_send(&self) -> Option<SendRequest> {
        self.sends.lock().unwrap().last().cloned()
    }
}

impl ChatBackend for ScriptedBackend {
    fn events(&self) -> flume::Receiver<BackendEvent> {
        self.events_rx.clone()
    }

    fn subscribe(&self, params: SubscriptionParams) {
        self.subscriptions.lock().unwrap().push(params);
    }

    fn unsubscribe(&self) {}

    fn send_message(&self, request: SendRequest) {
        self.sends.lock().unwrap().push(request);
    }

    fn fetch_room_name(&self, _room_id: String) {}
}

fn profile() -> UserProfile {
    UserProfile {
        user_id: "u-self".to_string(),
        username: "me".to_string(),
        avatar_url: None,
    }
}

fn wire(id: &str, author: &str, secs: i64) -> WireMessage {
    WireMessage {
        id: id.to_string(),
        text: format!("message {id}"),
        timestamp: Utc.timestamp_opt(1_715_680_000 + secs, 0).single().unwrap(),
        author: WireAuthor {
            id: author.to_string(),
            username: author.to_string(),
            avatar_url: None,
        },
    }
}

fn wire_page(count: usize, start_secs: i64) -> Vec<WireMessage> {
    (0..count)
        .map(|i| wire(&format!("m{i}"), "alice", start_secs - i as i64))
        .collect()
}

fn open_and_settle(app: &ChatApp, backend: &ScriptedBackend, room_id: &str) -> SubscriptionParams {
    app.dispatch(AppAction::OpenRoom {
        room_id: room_id.to_string(),
    });
    wait_until("subscription issued", Duration::from_secs(2), || {
        backend
            .last_subscription()
            .is_some_and(|p| p.room_id == room_id)
    });
    backend.last_subscription().unwrap()
}

#[test]
fn open_room_ingests_first_page() {
    let backend = ScriptedBackend::new();
    let app = ChatApp::new(profile(), AppConfig::default(), backend.clone());

    let params = open_and_settle(&app, &backend, "r1");
    backend.push(BackendEvent::Page {
        room_id: "r1".to_string(),
        generation: params.generation,
        offset: 0,
        messages: wire_page(20, 1_000),
    });

    wait_until("page ingested", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| r.messages.len() == 20)
    });

    let room = app.state().current_room.unwrap();
    assert!(room.has_more);
    assert!(!room.is_fetching);
    assert!(!room.is_initial_load);
    assert_eq!(room.groups.len(), 1);
    assert_eq!(room.messages[0].id, "m0");
}

#[test]
fn optimistic_send_confirms_via_next_page() {
    let backend = ScriptedBackend::new();
    let app = ChatApp::new(profile(), AppConfig::default(), backend.clone());

    let params = open_and_settle(&app, &backend, "r1");
    backend.push(BackendEvent::Page {
        room_id: "r1".to_string(),
        generation: params.generation,
        offset: 0,
        messages: wire_page(3, 1_000),
    });
    wait_until("first page", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| !r.is_initial_load)
    });

    app.dispatch(AppAction::SendMessage {
        room_id: "r1".to_string(),
        text: "hi".to_string(),
    });
    wait_until("optimistic message visible", Duration::from_secs(2), || {
        app.state().current_room.is_some_and(|r| {
            r.messages
                .first()
                .is_some_and(|m| m.status == MessageStatus::Pending && m.text == "hi")
        })
    });

    let request = backend.last_send().unwrap();
    assert_eq!(request.room_id, "r1");
    assert_eq!(request.author_id, "u-self");
    assert!(request.local_id.starts_with("temp-"));

    backend.push(BackendEvent::SendResult {
        room_id: "r1".to_string(),
        local_id: request.local_id.clone(),
        ok: true,
        error: None,
    });
    let mut canonical = wire("srv-hi", "u-self", 5_000);
    canonical.text = "hi".to_string();
    let mut page = wire_page(3, 1_000);
    page.insert(0, canonical);
    backend.push(BackendEvent::Page {
        room_id: "r1".to_string(),
        generation: params.generation,
        offset: 0,
        messages: page,
    });

    wait_until("temp replaced by canonical", Duration::from_secs(2), || {
        app.state().current_room.is_some_and(|r| {
            let hits: Vec<_> = r.messages.iter().filter(|m| m.text == "hi").collect();
            hits.len() == 1
                && hits[0].id == "srv-hi"
                && hits[0].status == MessageStatus::Confirmed
        })
    });
}

#[test]
fn failed_send_can_be_retried() {
    let backend = ScriptedBackend::new();
    let app = ChatApp::new(profile(), AppConfig::default(), backend.clone());

    let params = open_and_settle(&app, &backend, "r1");
    backend.push(BackendEvent::Page {
        room_id: "r1".to_string(),
        generation: params.generation,
        offset: 0,
        messages: vec![],
    });
    wait_until("first page", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| !r.is_initial_load)
    });

    app.dispatch(AppAction::SendMessage {
        room_id: "r1".to_string(),
        text: "hi".to_string(),
    });
    wait_until("send issued", Duration::from_secs(2), || {
        backend.last_send().is_some()
    });
    let request = backend.last_send().unwrap();

    backend.push(BackendEvent::SendResult {
        room_id: "r1".to_string(),
        local_id: request.local_id.clone(),
        ok: false,
        error: Some("insert rejected".to_string()),
    });
    wait_until("message marked failed", Duration::from_secs(2), || {
        app.state().current_room.is_some_and(|r| {
            r.messages
                .iter()
                .any(|m| matches!(m.status, MessageStatus::Failed { .. }))
        })
    });

    app.dispatch(AppAction::RetryMessage {
        room_id: "r1".to_string(),
        message_id: request.local_id.clone(),
    });
    wait_until("retry back in flight", Duration::from_secs(2), || {
        app.state().current_room.is_some_and(|r| {
            r.messages
                .iter()
                .any(|m| m.id == request.local_id && m.status == MessageStatus::Pending)
        })
    });
    assert_eq!(backend.sends.lock().unwrap().len(), 2);
}

#[test]
fn hanging_send_times_out_to_failed() {
    let backend = ScriptedBackend::new();
    let config = AppConfig {
        send_timeout_ms: 50,
        ..AppConfig::default()
    };
    let app = ChatApp::new(profile(), config, backend.clone());

    let params = open_and_settle(&app, &backend, "r1");
    backend.push(BackendEvent::Page {
        room_id: "r1".to_string(),
        generation: params.generation,
        offset: 0,
        messages: vec![],
    });
    wait_until("first page", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| !r.is_initial_load)
    });

    app.dispatch(AppAction::SendMessage {
        room_id: "r1".to_string(),
        text: "hello?".to_string(),
    });
    // The backend never resolves the send.
    wait_until("timeout marks failed", Duration::from_secs(2), || {
        app.state().current_room.is_some_and(|r| {
            r.messages.iter().any(|m| {
                m.status
                    == MessageStatus::Failed {
                        reason: "send timed out".to_string(),
                    }
            })
        })
    });
}

#[test]
fn backfill_requests_older_window() {
    let backend = ScriptedBackend::new();
    let app = ChatApp::new(profile(), AppConfig::default(), backend.clone());

    let params = open_and_settle(&app, &backend, "r1");
    backend.push(BackendEvent::Page {
        room_id: "r1".to_string(),
        generation: params.generation,
        offset: 0,
        messages: wire_page(20, 1_000),
    });
    wait_until("first page", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| !r.is_initial_load)
    });

    app.dispatch(AppAction::LoadOlderMessages {
        room_id: "r1".to_string(),
    });
    wait_until("older window requested", Duration::from_secs(2), || {
        backend.last_subscription().is_some_and(|p| p.offset == 20)
    });
    wait_until("fetch flag raised", Duration::from_secs(2), || {
        app.state().current_room.is_some_and(|r| r.is_fetching)
    });
}

#[test]
fn room_switch_discards_stale_page() {
    let backend = ScriptedBackend::new();
    let app = ChatApp::new(profile(), AppConfig::default(), backend.clone());

    let params_r1 = open_and_settle(&app, &backend, "r1");
    backend.push(BackendEvent::Page {
        room_id: "r1".to_string(),
        generation: params_r1.generation,
        offset: 0,
        messages: wire_page(20, 1_000),
    });
    wait_until("r1 loaded", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| r.messages.len() == 20)
    });

    let params_r2 = open_and_settle(&app, &backend, "r2");
    assert_ne!(params_r1.generation, params_r2.generation);

    // A late page for the old room, then a marker event for the new room so
    // the test can tell both were processed in order.
    backend.push(BackendEvent::Page {
        room_id: "r1".to_string(),
        generation: params_r1.generation,
        offset: 20,
        messages: wire_page(20, 500),
    });
    backend.push(BackendEvent::RoomName {
        room_id: "r2".to_string(),
        name: Some("general".to_string()),
        error: None,
    });
    wait_until("marker applied", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| r.room_name.as_deref() == Some("general"))
    });

    let room = app.state().current_room.unwrap();
    assert_eq!(room.room_id, "r2");
    assert!(room.messages.is_empty());
    assert!(room.is_initial_load);
}

#[test]
fn update_stream_delivers_monotonic_revs() {
    struct Collector {
        revs: Arc<Mutex<Vec<u64>>>,
    }
    impl UpdateListener for Collector {
        fn reconcile(&self, update: AppUpdate) {
            self.revs.lock().unwrap().push(update.rev());
        }
    }

    let backend = ScriptedBackend::new();
    let app = ChatApp::new(profile(), AppConfig::default(), backend.clone());
    let revs = Arc::new(Mutex::new(Vec::new()));
    app.listen_for_updates(Box::new(Collector { revs: revs.clone() }));

    let params = open_and_settle(&app, &backend, "r1");
    backend.push(BackendEvent::Page {
        room_id: "r1".to_string(),
        generation: params.generation,
        offset: 0,
        messages: wire_page(5, 1_000),
    });

    wait_until("updates observed", Duration::from_secs(2), || {
        revs.lock().unwrap().len() >= 2
    });
    let seen = revs.lock().unwrap().clone();
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}
