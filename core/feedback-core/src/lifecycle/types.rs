use feedback_protocol::{ClientMessage, ImageAttachment, SubmitSettings};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The submission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    WaitingForFeedback,
    Processing,
    FeedbackSubmitted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::WaitingForFeedback => "waiting_for_feedback",
            LifecycleState::Processing => "processing",
            LifecycleState::FeedbackSubmitted => "feedback_submitted",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Local submit accepted by the gate.
    SubmitStarted,
    /// The submission never left the client.
    SendFailed,
    /// Server confirmed receipt.
    Acknowledged,
    /// A different session took over.
    SessionReplaced,
    TransportLost,
}

/// Why a submit was refused. These are expected outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    AlreadySubmitted,
    Processing,
    NotConnected,
    Empty,
}

impl SubmitRejection {
    pub fn message(&self) -> &'static str {
        match self {
            SubmitRejection::AlreadySubmitted => "Feedback already submitted for this session",
            SubmitRejection::Processing => "Feedback is being submitted, please wait",
            SubmitRejection::NotConnected => {
                "Not connected; feedback will be sent when the connection is restored"
            }
            SubmitRejection::Empty => "Nothing to submit: enter text or attach an image",
        }
    }
}

impl fmt::Display for SubmitRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// What the user submitted. Images arrive already encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackPayload {
    pub feedback: String,
    pub images: Vec<ImageAttachment>,
    pub settings: SubmitSettings,
}

impl FeedbackPayload {
    pub fn text(feedback: impl Into<String>) -> Self {
        Self {
            feedback: feedback.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.feedback.trim().is_empty() && self.images.is_empty()
    }

    pub fn to_message(&self) -> ClientMessage {
        ClientMessage::SubmitFeedback {
            feedback: self.feedback.clone(),
            images: self.images.clone(),
            settings: self.settings.clone(),
        }
    }
}
