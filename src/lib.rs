//! winddown: signal-driven process-exit coordination
//!
//! Applications register named cleanup actions (a callable plus its bound
//! arguments) during startup, then block on [`Coordinator::wait`]. When the
//! first qualifying termination signal arrives, every registered action runs
//! exactly once, in no particular order, followed by the optional run-last
//! action. All waiters then unblock with an [`ExitStatus`] whose code is the
//! signal's raw number.
//!
//! Arguments are bound as JSON values and checked against the callable's
//! signature at invocation time, so action definitions may be late-bound;
//! an action whose arguments no longer fit is skipped, never allowed to
//! break the exit path.
//!
//! ```no_run
//! use serde_json::json;
//! use winddown::{default_signals, Coordinator};
//!
//! # async fn run() -> Result<(), winddown::SignalError> {
//! let coordinator = Coordinator::new();
//!
//! coordinator.register(
//!     "remove-pidfile",
//!     |path: String| {
//!         let _ = std::fs::remove_file(path);
//!     },
//!     vec![json!("/var/run/app.pid")],
//! );
//! coordinator.register_last(|| println!("goodbye"), vec![]);
//!
//! let status = coordinator.wait(&default_signals()).await?;
//! status.exit()
//! # }
//! ```

pub mod invoke;
pub mod lifecycle;
pub mod registry;

pub use invoke::{
    invoke, ArgType, Handler, IntoHandler, IntoVariadicHandler, InvokeError, ParamSpec, ParamType,
    Signature,
};
pub use lifecycle::{default_signals, Coordinator, ExitStatus, LatchState, SignalError, SignalListener};
pub use registry::{Action, Registry};
