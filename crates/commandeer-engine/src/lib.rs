//! The execution and rollback engine.
//!
//! Given a validated [`CommandPlan`](commandeer_core::CommandPlan) and a set
//! of target devices, the engine drives one state machine per device under a
//! bounded worker pool, enforces the stop-on-failure policy, offers rollback
//! for partially applied changes, and aggregates everything into a single
//! [`RunResult`] — it never surfaces an unhandled failure.
//!
//! External collaborators are consumed through trait seams:
//! - [`Connector`] opens device sessions and sends commands
//! - [`commandeer_safety::PlanValidator`] produces safety findings
//! - [`ConfirmationGate`] resolves approve/deny decisions
//! - [`EventSink`] receives the ordered lifecycle event stream

mod confirm;
mod connector;
mod error;
mod events;
mod metrics;
mod orchestrator;
mod retry;
mod rollback;
mod session;

pub use confirm::{AutoApprove, ConfirmationGate, ConfirmationKind, ConfirmationRequest, Decision};
pub use connector::{Connector, ConnectorError, DeviceShell};
pub use error::{SessionError, SessionErrorKind};
pub use events::{EngineEvent, EventBus, EventSink, MemorySink, TracingSink};
pub use metrics::{DeviceMetrics, RunMetrics};
pub use orchestrator::{Orchestrator, RunOptions, RunResult, RunStatus};
pub use retry::RetryPolicy;
pub use rollback::{RollbackError, RollbackOutcome, RollbackPlan};
pub use session::{DeviceSession, SessionState};
