//! End-to-end behavior of the controller against fake transport, API and view.

mod support;

use feedback_core::{
    ClientConfig, ConnectionState, FeedbackPayload, LifecycleState, MessageLevel, SessionStatus,
    SubmitOutcome, SubmitRejection, TransportEvent,
};
use serde_json::json;
use support::Harness;

fn status_frame(session_id: &str, status: &str, created_at: f64) -> serde_json::Value {
    json!({
        "type": "status_update",
        "status_info": {
            "session_id": session_id,
            "status": status,
            "created_at": created_at,
            "project_directory": "/work/app",
        }
    })
}

#[test]
fn open_requests_status() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();

    let log = h.transport.log();
    assert_eq!(log.opened, vec!["ws://127.0.0.1:8765/ws".to_string()]);
    assert_eq!(log.sent_of_kind("get_status").len(), 1);
    drop(log);
    assert_eq!(*h.app.connection_state(), ConnectionState::Open);
}

#[test]
fn new_session_resets_submitted_state_and_retires_the_old_one() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();

    h.frame(status_frame("A", "waiting", 1_000.0));
    assert_eq!(h.app.lifecycle().session_id(), Some("A"));
    assert_eq!(h.app.sessions().current().map(|s| s.created_at), Some(1_000.0));

    assert_eq!(
        h.app.submit_feedback(FeedbackPayload::text("ship it")),
        SubmitOutcome::Sent
    );
    assert_eq!(h.app.lifecycle().state(), LifecycleState::Processing);

    h.frame(json!({"type": "feedback_received", "message": "Thanks"}));
    assert_eq!(h.app.lifecycle().state(), LifecycleState::FeedbackSubmitted);
    assert!(h.view.log().has_message(MessageLevel::Success, "Thanks"));

    assert_eq!(
        h.app.submit_feedback(FeedbackPayload::text("again")),
        SubmitOutcome::Rejected(SubmitRejection::AlreadySubmitted)
    );

    h.frame(status_frame("B", "waiting", 2_000.0));
    assert_eq!(h.app.lifecycle().state(), LifecycleState::WaitingForFeedback);
    assert_eq!(h.app.lifecycle().session_id(), Some("B"));
    assert_eq!(h.app.lifecycle().last_submission_at(), None);

    let current = h.app.sessions().current().expect("current");
    assert_eq!(current.session_id, "B");
    assert_eq!(current.created_at, 2_000.0);

    let history = h.app.sessions().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].session.session_id, "A");
    assert_eq!(history[0].session.status, SessionStatus::Completed);

    assert_eq!(
        h.app.submit_feedback(FeedbackPayload::text("for B")),
        SubmitOutcome::Sent
    );
    assert_eq!(h.transport.log().sent_of_kind("submit_feedback").len(), 2);
}

#[test]
fn same_session_status_keeps_created_at_and_processing() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();
    h.frame(status_frame("A", "waiting", 1_000.0));
    h.app.submit_feedback(FeedbackPayload::text("first"));

    h.frame(status_frame("A", "active", 5_000.0));

    assert_eq!(h.app.lifecycle().state(), LifecycleState::Processing);
    assert_eq!(h.app.sessions().current().map(|s| s.created_at), Some(1_000.0));
}

#[test]
fn feedback_submitted_status_counts_as_ack() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();
    h.frame(status_frame("A", "waiting", 1_000.0));
    h.app.submit_feedback(FeedbackPayload::text("first"));

    h.frame(status_frame("A", "feedback_submitted", 1_000.0));
    assert_eq!(h.app.lifecycle().state(), LifecycleState::FeedbackSubmitted);
    assert!(h.app.lifecycle().last_submission_at().is_some());
}

#[test]
fn submission_while_disconnected_is_replayed_once_on_open() {
    let mut h = Harness::new(ClientConfig::default());
    h.app.start();
    assert_eq!(*h.app.connection_state(), ConnectionState::Connecting);

    assert_eq!(
        h.app.submit_feedback(FeedbackPayload::text("draft 1")),
        SubmitOutcome::Queued
    );
    assert_eq!(
        h.app.submit_feedback(FeedbackPayload::text("draft 2")),
        SubmitOutcome::Queued
    );
    assert!(h.transport.log().sent_of_kind("submit_feedback").is_empty());

    h.app.handle_transport_event(TransportEvent::Opened);
    let submitted = h.transport.log().sent_of_kind("submit_feedback");
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["feedback"], json!("draft 2"));
    assert_eq!(h.app.lifecycle().state(), LifecycleState::Processing);

    // A reconnect must not resend it.
    h.app.handle_transport_event(TransportEvent::Closed {
        code: 1006,
        reason: String::new(),
    });
    h.advance(3_000);
    h.app.handle_transport_event(TransportEvent::Opened);
    assert_eq!(h.transport.log().sent_of_kind("submit_feedback").len(), 1);
}

#[test]
fn empty_submission_is_rejected() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();
    assert_eq!(
        h.app.submit_feedback(FeedbackPayload::text("   ")),
        SubmitOutcome::Rejected(SubmitRejection::Empty)
    );
    assert!(h.transport.log().sent_of_kind("submit_feedback").is_empty());
}

#[test]
fn no_active_session_close_does_not_reconnect() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();

    h.app.handle_transport_event(TransportEvent::Closed {
        code: 4004,
        reason: "no active session".to_string(),
    });
    h.advance(10_000);

    assert_eq!(h.transport.log().opened.len(), 1);
    assert_eq!(h.app.reconnect_attempts(), 0);
    assert!(h
        .view
        .log()
        .has_message(MessageLevel::Warning, "No active feedback session"));
}

#[test]
fn abnormal_close_reconnects_once_after_delay() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();
    h.frame(status_frame("A", "waiting", 1_000.0));
    h.app.submit_feedback(FeedbackPayload::text("in flight"));

    h.app.handle_transport_event(TransportEvent::Closed {
        code: 1006,
        reason: String::new(),
    });
    assert_eq!(h.app.lifecycle().state(), LifecycleState::WaitingForFeedback);

    // A second close while the reconnect is pending does not stack another.
    h.app.handle_transport_event(TransportEvent::Closed {
        code: 1006,
        reason: String::new(),
    });

    h.advance(2_999);
    assert_eq!(h.transport.log().opened.len(), 1);
    h.advance(1);
    assert_eq!(h.transport.log().opened.len(), 2);
    h.advance(10_000);
    assert_eq!(h.transport.log().opened.len(), 2);
    assert_eq!(h.app.reconnect_attempts(), 1);

    h.app.handle_transport_event(TransportEvent::Opened);
    assert_eq!(h.app.reconnect_attempts(), 0);
}

#[test]
fn transport_error_while_open_clears_processing_and_reconnects() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();
    h.frame(status_frame("A", "waiting", 1_000.0));
    assert_eq!(
        h.app.submit_feedback(FeedbackPayload::text("in flight")),
        SubmitOutcome::Sent
    );

    h.app
        .handle_transport_event(TransportEvent::Error("reset".to_string()));
    assert_eq!(h.app.lifecycle().state(), LifecycleState::WaitingForFeedback);
    assert_eq!(*h.app.connection_state(), ConnectionState::Errored);
    assert!(h.view.log().has_message(MessageLevel::Warning, "Connection error"));

    h.advance(3_000);
    assert_eq!(h.transport.log().opened.len(), 2);
    assert_eq!(*h.app.connection_state(), ConnectionState::Connecting);

    h.advance(60_000);
    assert_eq!(h.transport.log().opened.len(), 2);
}

#[test]
fn reconnect_cap_reports_giving_up() {
    let mut config = ClientConfig::default();
    config.connection.max_reconnect_attempts = Some(1);
    let mut h = Harness::new(config);
    h.start_open();

    h.app.handle_transport_event(TransportEvent::Closed {
        code: 1006,
        reason: String::new(),
    });
    h.advance(3_000);
    h.app.handle_transport_event(TransportEvent::Error("refused".to_string()));

    assert!(h.view.log().has_message(MessageLevel::Error, "Could not reconnect"));
    h.advance(10_000);
    assert_eq!(h.transport.log().opened.len(), 2);
}

#[test]
fn heartbeat_carries_tab_id() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();
    let tab_id = h.app.tabs().tab_id().expect("tab id").to_string();

    h.advance(30_000);
    let heartbeats = h.transport.log().sent_of_kind("heartbeat");
    assert_eq!(heartbeats.len(), 1);
    assert_eq!(heartbeats[0]["tabId"], json!(tab_id));
}

#[test]
fn session_updated_resets_and_refreshes_content() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();
    h.frame(status_frame("A", "waiting", 1_000.0));
    h.app.submit_feedback(FeedbackPayload::text("done"));
    h.frame(json!({"type": "feedback_received"}));

    h.api.current.lock().expect("current").session_id = Some("B".to_string());
    h.api.current.lock().expect("current").summary = Some("Next task".to_string());
    h.frame(json!({
        "type": "session_updated",
        "message": "New session",
        "session_info": {"session_id": "B", "summary": "Next task", "created_at": 2000.0}
    }));

    assert_eq!(h.app.lifecycle().state(), LifecycleState::WaitingForFeedback);
    assert_eq!(h.app.lifecycle().session_id(), Some("B"));
    assert_eq!(h.app.sessions().history()[0].session.session_id, "A");

    assert!(h.tick_until(|h| !h.view.log().refreshed.is_empty()));
    let log = h.view.log();
    assert_eq!(log.refreshed[0].summary.as_deref(), Some("Next task"));
    assert!(log.has_message(MessageLevel::Success, "New session"));
}

#[test]
fn command_output_is_forwarded() {
    let mut h = Harness::new(ClientConfig::default());
    assert!(!h.app.run_command("ls"));
    assert!(h.view.log().output.contains("Not connected"));

    h.start_open();
    assert!(h.app.run_command("  ls -la  "));
    let commands = h.transport.log().sent_of_kind("run_command");
    assert_eq!(commands[0]["command"], json!("ls -la"));

    h.frame(json!({"type": "command_output", "output": "file.txt\n"}));
    h.frame(json!({"type": "command_complete", "exit_code": 0}));
    let output = h.view.log().output.clone();
    assert!(output.contains("$ ls -la"));
    assert!(output.contains("file.txt"));
    assert!(output.contains("exit code: 0"));
}

#[test]
fn unknown_frames_are_ignored() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();
    h.frame(json!({"type": "something_new", "data": 1}));
    h.app
        .handle_transport_event(TransportEvent::Message("{not json".to_string()));
    assert_eq!(*h.app.connection_state(), ConnectionState::Open);
}

#[test]
fn shutdown_is_idempotent_and_clears_tab() {
    let mut h = Harness::new(ClientConfig::default());
    h.start_open();
    h.app.shutdown();
    h.app.shutdown();

    assert_eq!(h.transport.log().closed, vec![1000]);
    assert!(h.app.tabs().tab_id().is_none());
}

#[test]
fn server_settings_drive_retention() {
    let mut h = Harness::new(ClientConfig::default());
    *h.api.settings.lock().expect("settings") = Some(feedback_core::Settings {
        session_history_retention_hours: 24,
        ..Default::default()
    });
    h.app.start();
    assert_eq!(h.app.sessions().retention_hours(), 24);

    h.app.apply_settings(feedback_core::Settings {
        session_history_retention_hours: 48,
        ..Default::default()
    });
    assert_eq!(h.app.sessions().retention_hours(), 48);
    assert!(h.tick_until(|h| !h.api.saved.lock().expect("saved").is_empty()));
}
