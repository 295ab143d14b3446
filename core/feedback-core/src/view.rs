//! The UI surface the controller talks to. Rendering lives outside this crate.

use crate::api::CurrentSessionInfo;
use crate::connection::ConnectionState;
use crate::lifecycle::LifecycleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

pub trait FeedbackView: Send {
    fn show_message(&mut self, level: MessageLevel, text: &str);
    fn append_command_output(&mut self, text: &str);
    fn connection_changed(&mut self, state: &ConnectionState);
    fn lifecycle_changed(&mut self, state: LifecycleState, session_id: Option<&str>);
    fn session_refreshed(&mut self, info: &CurrentSessionInfo);
}

/// Discards everything. Used by headless subcommands.
#[derive(Debug, Default)]
pub struct NullView;

impl FeedbackView for NullView {
    fn show_message(&mut self, _level: MessageLevel, _text: &str) {}
    fn append_command_output(&mut self, _text: &str) {}
    fn connection_changed(&mut self, _state: &ConnectionState) {}
    fn lifecycle_changed(&mut self, _state: LifecycleState, _session_id: Option<&str>) {}
    fn session_refreshed(&mut self, _info: &CurrentSessionInfo) {}
}
