//! Maps lifecycle events to feedback states.
//! Only an acknowledgement may move a submission forward; everything that
//! invalidates it falls back to waiting.

use super::types::{LifecycleEvent, LifecycleState};

pub fn next_state(current: LifecycleState, event: LifecycleEvent) -> LifecycleState {
    match event {
        LifecycleEvent::SubmitStarted if current == LifecycleState::WaitingForFeedback => {
            LifecycleState::Processing
        }
        LifecycleEvent::SubmitStarted => current,
        LifecycleEvent::SendFailed if current == LifecycleState::Processing => {
            LifecycleState::WaitingForFeedback
        }
        LifecycleEvent::SendFailed => current,
        LifecycleEvent::Acknowledged => LifecycleState::FeedbackSubmitted,
        LifecycleEvent::SessionReplaced => LifecycleState::WaitingForFeedback,
        LifecycleEvent::TransportLost if current == LifecycleState::Processing => {
            LifecycleState::WaitingForFeedback
        }
        LifecycleEvent::TransportLost => current,
    }
}
