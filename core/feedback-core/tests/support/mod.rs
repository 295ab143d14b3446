//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use feedback_core::{
    AppContext, ClientConfig, ClientError, ConnectionState, CurrentSessionInfo, FeedbackApp,
    FeedbackView, LifecycleState, ManualClock, MemoryStore, MessageLevel, Result, ServerApi,
    Settings, Transport, TransportEvent,
};

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TransportLog {
    pub opened: Vec<String>,
    pub sent: Vec<String>,
    pub closed: Vec<u16>,
}

impl TransportLog {
    /// Sent frames whose `type` field equals `kind`.
    pub fn sent_of_kind(&self, kind: &str) -> Vec<serde_json::Value> {
        self.sent
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|value| value["type"] == kind)
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    pub log: Arc<Mutex<TransportLog>>,
}

impl FakeTransport {
    pub fn log(&self) -> std::sync::MutexGuard<'_, TransportLog> {
        self.log.lock().expect("transport log")
    }
}

impl Transport for FakeTransport {
    fn open(&mut self, url: &str) -> Result<()> {
        self.log().opened.push(url.to_string());
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<()> {
        self.log().sent.push(text.to_string());
        Ok(())
    }

    fn close(&mut self, code: u16, _reason: &str) {
        self.log().closed.push(code);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server API
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeApi {
    pub current: Mutex<CurrentSessionInfo>,
    pub settings: Mutex<Option<Settings>>,
    pub registered: Mutex<Vec<String>>,
    pub saved: Mutex<Vec<Settings>>,
}

impl ServerApi for FakeApi {
    fn register_tab(&self, tab_id: &str) -> Result<()> {
        self.registered.lock().expect("registered").push(tab_id.to_string());
        Ok(())
    }

    fn current_session(&self) -> Result<CurrentSessionInfo> {
        Ok(self.current.lock().expect("current").clone())
    }

    fn load_settings(&self) -> Result<Settings> {
        self.settings
            .lock()
            .expect("settings")
            .clone()
            .ok_or_else(|| ClientError::ApiStatus {
                endpoint: "/api/load-settings".to_string(),
                status: 404,
            })
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.saved.lock().expect("saved").push(settings.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// View
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ViewLog {
    pub messages: Vec<(MessageLevel, String)>,
    pub output: String,
    pub connection: Vec<ConnectionState>,
    pub lifecycle: Vec<(LifecycleState, Option<String>)>,
    pub refreshed: Vec<CurrentSessionInfo>,
}

impl ViewLog {
    pub fn has_message(&self, level: MessageLevel, fragment: &str) -> bool {
        self.messages
            .iter()
            .any(|(l, text)| *l == level && text.contains(fragment))
    }
}

#[derive(Clone, Default)]
pub struct RecordingView {
    pub log: Arc<Mutex<ViewLog>>,
}

impl RecordingView {
    pub fn log(&self) -> std::sync::MutexGuard<'_, ViewLog> {
        self.log.lock().expect("view log")
    }
}

impl FeedbackView for RecordingView {
    fn show_message(&mut self, level: MessageLevel, text: &str) {
        self.log().messages.push((level, text.to_string()));
    }

    fn append_command_output(&mut self, text: &str) {
        self.log().output.push_str(text);
    }

    fn connection_changed(&mut self, state: &ConnectionState) {
        self.log().connection.push(state.clone());
    }

    fn lifecycle_changed(&mut self, state: LifecycleState, session_id: Option<&str>) {
        self.log()
            .lifecycle
            .push((state, session_id.map(str::to_string)));
    }

    fn session_refreshed(&mut self, info: &CurrentSessionInfo) {
        self.log().refreshed.push(info.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub app: FeedbackApp,
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
    pub api: Arc<FakeApi>,
    pub transport: FakeTransport,
    pub view: RecordingView,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_store(config, MemoryStore::new())
    }

    pub fn with_store(config: ClientConfig, store: MemoryStore) -> Self {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let api = Arc::new(FakeApi::default());
        let transport = FakeTransport::default();
        let view = RecordingView::default();
        let ctx = AppContext {
            config,
            store: Arc::new(store.clone()),
            api: api.clone(),
            clock: clock.clone(),
        };
        let app = FeedbackApp::new(ctx, Box::new(transport.clone()), Box::new(view.clone()))
            .expect("app");
        Self {
            app,
            clock,
            store,
            api,
            transport,
            view,
        }
    }

    /// Starts the app and delivers the open event.
    pub fn start_open(&mut self) {
        self.app.start();
        self.app.handle_transport_event(TransportEvent::Opened);
    }

    pub fn frame(&mut self, value: serde_json::Value) {
        self.app
            .handle_transport_event(TransportEvent::Message(value.to_string()));
    }

    pub fn advance(&mut self, ms: i64) {
        self.clock.advance(ms);
        self.app.tick();
    }

    /// Ticks until `done` holds, for results produced on background threads.
    pub fn tick_until(&mut self, mut done: impl FnMut(&Self) -> bool) -> bool {
        for _ in 0..200 {
            self.app.tick();
            if done(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}
