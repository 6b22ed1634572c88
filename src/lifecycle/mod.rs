//! Process lifecycle: signal subscription and exit coordination

mod coordinator;
mod signal;

pub use coordinator::{Coordinator, ExitStatus, LatchState};
pub use signal::{default_signals, SignalError, SignalListener};
