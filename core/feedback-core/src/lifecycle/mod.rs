//! Feedback lifecycle: when may the user submit?
//!
//! ```text
//! waiting_for_feedback ──submit──▶ processing ──ack──▶ feedback_submitted
//!          ▲                          │                       │
//!          └──── send failed / transport lost ─┘              │
//!          └──────────────── new session id ──────────────────┘
//! ```
//!
//! Transitions are computed by the pure [`next_state`]; the machine around it
//! tracks the session the state belongs to, the provisional submission time,
//! and an at-most-one pending submission queued while disconnected.

mod transition;
mod types;

pub use transition::next_state;
pub use types::{FeedbackPayload, LifecycleEvent, LifecycleState, SubmitRejection};

use crate::status::SessionStatus;

#[derive(Debug, Default)]
pub struct FeedbackStateMachine {
    state: LifecycleState,
    session_id: Option<String>,
    last_submission_at: Option<i64>,
    pending: Option<FeedbackPayload>,
}

impl FeedbackStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Session the current state belongs to.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn last_submission_at(&self) -> Option<i64> {
        self.last_submission_at
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn can_submit(&self, transport_open: bool) -> bool {
        self.check_submit(transport_open).is_ok()
    }

    pub fn check_submit(&self, transport_open: bool) -> Result<(), SubmitRejection> {
        match self.state {
            LifecycleState::FeedbackSubmitted => Err(SubmitRejection::AlreadySubmitted),
            LifecycleState::Processing => Err(SubmitRejection::Processing),
            LifecycleState::WaitingForFeedback if !transport_open => {
                Err(SubmitRejection::NotConnected)
            }
            LifecycleState::WaitingForFeedback => Ok(()),
        }
    }

    /// Moves to processing. Returns false if the gate was not open.
    pub fn begin_submit(&mut self, transport_open: bool) -> bool {
        if !self.can_submit(transport_open) {
            return false;
        }
        self.apply(LifecycleEvent::SubmitStarted)
    }

    /// The submission left the client; the timestamp is provisional until the
    /// server acknowledges.
    pub fn on_sent(&mut self, now: i64) {
        self.last_submission_at = Some(now);
    }

    pub fn on_send_failed(&mut self) -> bool {
        self.last_submission_at = None;
        self.apply(LifecycleEvent::SendFailed)
    }

    pub fn on_feedback_received(&mut self, now: i64) -> bool {
        self.last_submission_at.get_or_insert(now);
        self.apply(LifecycleEvent::Acknowledged)
    }

    /// Applies a server status push. A differing session id always resets to
    /// waiting; `feedback_submitted` for the tracked session counts as an ack.
    /// Other statuses for the tracked session change nothing.
    pub fn apply_status(
        &mut self,
        status: Option<SessionStatus>,
        session_id: Option<&str>,
        now: i64,
    ) -> bool {
        if let Some(id) = session_id {
            match self.session_id.as_deref() {
                Some(tracked) if tracked != id => return self.on_session_replaced(id),
                Some(_) => {}
                None => self.session_id = Some(id.to_string()),
            }
        }

        match status {
            Some(SessionStatus::FeedbackSubmitted) => self.on_feedback_received(now),
            _ => false,
        }
    }

    /// A new session took over: back to waiting with the submission marker
    /// cleared, whatever the prior state.
    pub fn on_session_replaced(&mut self, session_id: &str) -> bool {
        let previous = self.session_id.replace(session_id.to_string());
        self.last_submission_at = None;
        tracing::info!(
            session_id = %session_id,
            previous = previous.as_deref().unwrap_or("none"),
            "Lifecycle reset for new session"
        );
        self.apply(LifecycleEvent::SessionReplaced)
    }

    pub fn on_transport_closed(&mut self) -> bool {
        if self.state == LifecycleState::Processing {
            self.last_submission_at = None;
        }
        self.apply(LifecycleEvent::TransportLost)
    }

    /// Keeps the latest attempt made while disconnected. Returns true if it
    /// replaced an older one.
    pub fn stash_pending(&mut self, payload: FeedbackPayload) -> bool {
        self.pending.replace(payload).is_some()
    }

    pub fn take_pending(&mut self) -> Option<FeedbackPayload> {
        self.pending.take()
    }

    fn apply(&mut self, event: LifecycleEvent) -> bool {
        let next = next_state(self.state, event);
        if next == self.state {
            return false;
        }
        tracing::info!(from = %self.state, to = %next, ?event, "Feedback state changed");
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted_machine() -> FeedbackStateMachine {
        let mut machine = FeedbackStateMachine::new();
        machine.apply_status(Some(SessionStatus::Waiting), Some("A"), 0);
        assert!(machine.begin_submit(true));
        machine.on_sent(10);
        machine.on_feedback_received(20);
        machine
    }

    #[test]
    fn submit_then_ack_then_new_session() {
        let mut machine = submitted_machine();
        assert_eq!(machine.state(), LifecycleState::FeedbackSubmitted);
        assert_eq!(machine.last_submission_at(), Some(10));

        assert!(machine.apply_status(Some(SessionStatus::Waiting), Some("B"), 30));
        assert_eq!(machine.state(), LifecycleState::WaitingForFeedback);
        assert_eq!(machine.session_id(), Some("B"));
        assert_eq!(machine.last_submission_at(), None);
    }

    #[test]
    fn can_submit_only_when_waiting_and_open() {
        let mut machine = FeedbackStateMachine::new();
        assert!(machine.can_submit(true));
        assert_eq!(machine.check_submit(false), Err(SubmitRejection::NotConnected));

        machine.begin_submit(true);
        assert!(!machine.can_submit(true));
        assert_eq!(machine.check_submit(true), Err(SubmitRejection::Processing));

        machine.on_feedback_received(1);
        assert!(!machine.can_submit(true));
        assert_eq!(machine.check_submit(true), Err(SubmitRejection::AlreadySubmitted));
    }

    #[test]
    fn transport_loss_resets_processing() {
        let mut machine = FeedbackStateMachine::new();
        machine.begin_submit(true);
        machine.on_sent(5);

        assert!(machine.on_transport_closed());
        assert_eq!(machine.state(), LifecycleState::WaitingForFeedback);
        assert_eq!(machine.last_submission_at(), None);
    }

    #[test]
    fn transport_loss_keeps_submitted() {
        let mut machine = submitted_machine();
        assert!(!machine.on_transport_closed());
        assert_eq!(machine.state(), LifecycleState::FeedbackSubmitted);
    }

    #[test]
    fn same_session_waiting_status_changes_nothing() {
        let mut machine = submitted_machine();
        assert!(!machine.apply_status(Some(SessionStatus::Waiting), Some("A"), 40));
        assert!(!machine.apply_status(Some(SessionStatus::Active), Some("A"), 41));
        assert_eq!(machine.state(), LifecycleState::FeedbackSubmitted);

        let mut processing = FeedbackStateMachine::new();
        processing.apply_status(None, Some("A"), 0);
        processing.begin_submit(true);
        assert!(!processing.apply_status(Some(SessionStatus::Active), Some("A"), 1));
        assert_eq!(processing.state(), LifecycleState::Processing);
    }

    #[test]
    fn submitted_status_counts_as_ack() {
        let mut machine = FeedbackStateMachine::new();
        machine.apply_status(None, Some("A"), 0);
        machine.begin_submit(true);

        assert!(machine.apply_status(Some(SessionStatus::FeedbackSubmitted), Some("A"), 7));
        assert_eq!(machine.state(), LifecycleState::FeedbackSubmitted);
        assert_eq!(machine.last_submission_at(), Some(7));
    }

    #[test]
    fn first_session_id_is_adopted_without_reset() {
        let mut machine = FeedbackStateMachine::new();
        machine.begin_submit(true);
        assert!(!machine.apply_status(Some(SessionStatus::Active), Some("A"), 1));
        assert_eq!(machine.state(), LifecycleState::Processing);
        assert_eq!(machine.session_id(), Some("A"));
    }

    #[test]
    fn send_failure_reopens_the_gate() {
        let mut machine = FeedbackStateMachine::new();
        machine.begin_submit(true);
        assert!(machine.on_send_failed());
        assert!(machine.can_submit(true));
    }

    #[test]
    fn pending_slot_holds_latest_attempt() {
        let mut machine = FeedbackStateMachine::new();
        assert!(!machine.stash_pending(FeedbackPayload::text("first")));
        assert!(machine.stash_pending(FeedbackPayload::text("second")));

        let pending = machine.take_pending().expect("pending");
        assert_eq!(pending.feedback, "second");
        assert!(machine.take_pending().is_none());
    }
}
