//! # feedback-core
//!
//! Client-side logic for interactive feedback sessions: tab coordination,
//! the reconnecting server connection, the feedback lifecycle, and session
//! history with retention and export.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Time is passed in as
//!   milliseconds and timers are polled, so hosts pick their own event loop.
//! - **Graceful degradation**: Missing or corrupt persisted data loads as empty,
//!   and storage failures are logged rather than surfaced to the user.
//! - **Pluggable edges**: Storage, transport, the REST API and the UI are traits.
//!   In-memory implementations make every component testable without I/O.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use feedback_core::{AppContext, FeedbackApp, FeedbackPayload};
//!
//! let mut app = FeedbackApp::new(ctx, transport, view)?;
//! app.start();
//! app.submit_feedback(FeedbackPayload::text("Looks good"));
//! ```

// Public modules
pub mod api;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod kv;
pub mod lifecycle;
pub mod session;
pub mod settings;
pub mod status;
pub mod storage;
pub mod tabs;
pub mod time;
pub mod timer;
pub mod view;

// Re-export commonly used items at crate root
pub use api::{CurrentSessionInfo, ServerApi};
pub use config::{ClientConfig, ConnectionConfig, HistoryConfig, TabsConfig};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, Transport, TransportEvent};
pub use controller::{AppContext, FeedbackApp, SubmitOutcome};
pub use error::{ClientError, Result};
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use lifecycle::{FeedbackPayload, FeedbackStateMachine, LifecycleState, SubmitRejection};
pub use session::{FeedbackSession, SessionDataManager, SessionHistoryEntry, SessionStats, SessionUpdate};
pub use settings::Settings;
pub use status::SessionStatus;
pub use storage::StorageConfig;
pub use tabs::{TabCoordinator, TabRecord};
pub use time::{Clock, ManualClock, SystemClock};
pub use view::{FeedbackView, MessageLevel, NullView};
