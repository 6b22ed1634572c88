//! Exit coordination: the one-shot latch and the run-all sequence
//!
//! The coordinator owns the registry and guarantees the cleanup sequence
//! runs at most once per process, no matter how many tasks wait or how
//! many qualifying signals arrive after the first. Every waiter unblocks
//! only once the sequence has completed, all with the same exit status.

use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::invoke::{invoke, IntoHandler, IntoVariadicHandler};
use crate::registry::{Action, Registry};

use super::signal::{SignalError, SignalListener};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

/// The three possible states of the one-shot latch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    /// No qualifying signal observed yet
    Idle,
    /// The run-all sequence is executing
    Running,
    /// The run-all sequence has completed
    Done,
}

impl fmt::Display for LatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatchState::Idle => write!(f, "Idle"),
            LatchState::Running => write!(f, "Running"),
            LatchState::Done => write!(f, "Done"),
        }
    }
}

/// The exit code the process should terminate with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    code: i32,
}

impl ExitStatus {
    /// Exit code derived from the triggering signal, 0 for a synthetic
    /// trigger
    pub fn code(self) -> i32 {
        self.code
    }

    /// Terminate the process with this code
    pub fn exit(self) -> ! {
        std::process::exit(self.code)
    }
}

/// Process-wide cleanup coordinator
///
/// Created once at startup and shared (typically as an `Arc`) with
/// whatever registers actions or waits for the exit path.
pub struct Coordinator {
    registry: Registry,
    state: AtomicU8,
    exit_code: AtomicI32,
    done: watch::Sender<LatchState>,
}

impl Coordinator {
    /// Create a coordinator with an empty registry
    pub fn new() -> Self {
        let (done, _) = watch::channel(LatchState::Idle);
        Self {
            registry: Registry::new(),
            state: AtomicU8::new(IDLE),
            exit_code: AtomicI32::new(0),
            done,
        }
    }

    /// Register a cleanup action under a unique name
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered.
    pub fn register<Args, F>(&self, name: impl Into<String>, callable: F, args: Vec<Value>)
    where
        F: IntoHandler<Args>,
    {
        self.registry.register(name, callable, args);
    }

    /// Register a cleanup action with a variable-length argument tail
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered.
    pub fn register_variadic<Args, F>(&self, name: impl Into<String>, callable: F, args: Vec<Value>)
    where
        F: IntoVariadicHandler<Args>,
    {
        self.registry.register_variadic(name, callable, args);
    }

    /// Register an opaque callable target under a unique name
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered.
    pub fn register_dyn(
        &self,
        name: impl Into<String>,
        callable: Arc<dyn Any + Send + Sync>,
        args: Vec<Value>,
    ) {
        self.registry.register_dyn(name, callable, args);
    }

    /// Set the action that runs after all others
    ///
    /// # Panics
    ///
    /// Panics if a run-last action is already set.
    pub fn register_last<Args, F>(&self, callable: F, args: Vec<Value>)
    where
        F: IntoHandler<Args>,
    {
        self.registry.register_last(callable, args);
    }

    /// Set an opaque callable target as the run-last action
    ///
    /// # Panics
    ///
    /// Panics if a run-last action is already set.
    pub fn register_last_dyn(&self, callable: Arc<dyn Any + Send + Sync>, args: Vec<Value>) {
        self.registry.register_last_dyn(callable, args);
    }

    /// The underlying action registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current latch state
    pub fn state(&self) -> LatchState {
        match self.state.load(Ordering::SeqCst) {
            IDLE => LatchState::Idle,
            RUNNING => LatchState::Running,
            _ => LatchState::Done,
        }
    }

    /// Block until a qualifying signal arrives and cleanup has completed
    ///
    /// Subscribes to the given signal kinds, then behaves as
    /// [`wait_on`](Self::wait_on) with the subscription as the trigger
    /// source. The returned status carries the raw number of the signal
    /// that fired first.
    pub async fn wait(&self, kinds: &[SignalKind]) -> Result<ExitStatus, SignalError> {
        let listener = SignalListener::subscribe(kinds)?;
        Ok(self.wait_on(listener.recv()).await)
    }

    /// Block on an arbitrary trigger source until cleanup has completed
    ///
    /// The first source (across all concurrent waiters) to resolve fires
    /// the latch and executes the run-all sequence; every other waiter,
    /// and every later caller, unblocks once the sequence completes and
    /// observes the same status. A source resolving to `None` counts as a
    /// synthetic trigger with code 0.
    pub async fn wait_on(&self, source: impl Future<Output = Option<i32>>) -> ExitStatus {
        let mut done = self.done.subscribe();

        tokio::select! {
            number = source => {
                self.run_all(number.unwrap_or(0));
            }
            _ = done.wait_for(|state| *state == LatchState::Done) => {}
        }

        let mut done = self.done.subscribe();
        let _ = done.wait_for(|state| *state == LatchState::Done).await;

        ExitStatus {
            code: self.exit_code.load(Ordering::SeqCst),
        }
    }

    /// Run the cleanup sequence now, without waiting for a signal
    ///
    /// The synthetic trigger carries code 0. Safe to call concurrently
    /// with waiters; the at-most-once guarantee holds.
    pub async fn run_now(&self) -> ExitStatus {
        self.wait_on(std::future::ready(Some(0))).await
    }

    /// Wait for a qualifying signal, run cleanup, then exit the process
    ///
    /// Never returns on the success path; the process terminates with the
    /// signal's raw number as its exit code.
    pub async fn wait_and_exit(&self, kinds: &[SignalKind]) -> Result<Infallible, SignalError> {
        let status = self.wait(kinds).await?;
        info!(code = status.code(), "cleanup complete, terminating process");
        status.exit()
    }

    /// Fire the latch and execute the run-all sequence
    ///
    /// Exactly one call ever wins the `Idle -> Running` transition; all
    /// others are no-ops whose callers unblock via the completion channel.
    fn run_all(&self, code: i32) {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("cleanup already triggered");
            return;
        }

        let _ = self.done.send(LatchState::Running);

        let actions = self.registry.snapshot();
        info!(code, actions = actions.len(), "running cleanup actions");

        for action in &actions {
            self.run_action(action);
        }

        if let Some(last) = self.registry.last_action() {
            self.run_action(&last);
        }

        self.exit_code.store(code, Ordering::SeqCst);
        self.state.store(DONE, Ordering::SeqCst);
        let _ = self.done.send(LatchState::Done);

        info!(code, "cleanup complete");
    }

    /// Invoke one action, logging and discarding any failure
    fn run_action(&self, action: &Action) {
        match invoke(action.callable(), action.args()) {
            Ok(_) => debug!(name = %action.name(), "cleanup action finished"),
            Err(e) => warn!(name = %action.name(), error = %e, "cleanup action skipped"),
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
