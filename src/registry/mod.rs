//! Name-keyed storage for cleanup actions
//!
//! Registration is a startup-phase activity: duplicate names and a second
//! run-last registration are programmer errors and abort the process.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, error};

use crate::invoke::{IntoHandler, IntoVariadicHandler};

/// A named cleanup callable with its bound arguments
#[derive(Clone)]
pub struct Action {
    name: String,
    callable: Arc<dyn Any + Send + Sync>,
    args: Vec<Value>,
}

impl Action {
    /// Name the action was registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments bound at registration time
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The type-erased callable target
    pub fn callable(&self) -> &(dyn Any + Send + Sync) {
        self.callable.as_ref()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Registry of cleanup actions plus the single run-last slot
pub struct Registry {
    actions: Mutex<HashMap<String, Action>>,
    last: Mutex<Option<Action>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(HashMap::new()),
            last: Mutex::new(None),
        }
    }

    /// Register a cleanup action under a unique name
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered. Re-registering a name is a
    /// configuration mistake, not a runtime condition.
    pub fn register<Args, F>(&self, name: impl Into<String>, callable: F, args: Vec<Value>)
    where
        F: IntoHandler<Args>,
    {
        self.register_dyn(name, Arc::new(callable.into_handler()), args);
    }

    /// Register a cleanup action whose final `Vec<T>` parameter binds a
    /// variable-length argument tail
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered.
    pub fn register_variadic<Args, F>(&self, name: impl Into<String>, callable: F, args: Vec<Value>)
    where
        F: IntoVariadicHandler<Args>,
    {
        self.register_dyn(name, Arc::new(callable.into_handler()), args);
    }

    /// Register an opaque callable target under a unique name
    ///
    /// The target is only checked for callability when the cleanup sequence
    /// runs; a non-handler target is skipped at that point.
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
        let name = name.into();
        let mut actions = lock(&self.actions);

        if actions.contains_key(&name) {
            error!(name = %name, "cleanup action name already registered");
            panic!("cleanup action {:?} is already registered", name);
        }

        debug!(name = %name, args = args.len(), "cleanup action registered");
        actions.insert(
            name.clone(),
            Action {
                name,
                callable,
                args,
            },
        );
    }

    /// Set the action that runs after all others
    ///
    /// # Panics
    ///
    /// Panics if a run-last action is already set. At most one may exist
    /// per process.
    pub fn register_last<Args, F>(&self, callable: F, args: Vec<Value>)
    where
        F: IntoHandler<Args>,
    {
        self.register_last_dyn(Arc::new(callable.into_handler()), args);
    }

    /// Set an opaque callable target as the run-last action
    ///
    /// # Panics
    ///
    /// Panics if a run-last action is already set.
    pub fn register_last_dyn(&self, callable: Arc<dyn Any + Send + Sync>, args: Vec<Value>) {
        let mut last = lock(&self.last);

        if last.is_some() {
            error!("run-last cleanup action already registered");
            panic!("a run-last cleanup action is already registered");
        }

        debug!(args = args.len(), "run-last cleanup action registered");
        *last = Some(Action {
            name: "last".to_string(),
            callable,
            args,
        });
    }

    /// Whether an action is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.actions).contains_key(name)
    }

    /// Number of registered actions, excluding the run-last slot
    pub fn len(&self) -> usize {
        lock(&self.actions).len()
    }

    /// Whether no actions are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all registered actions, in no particular order
    pub fn names(&self) -> Vec<String> {
        lock(&self.actions).keys().cloned().collect()
    }

    /// Clone the registered actions out for the run-all sequence
    pub(crate) fn snapshot(&self) -> Vec<Action> {
        lock(&self.actions).values().cloned().collect()
    }

    /// Clone the run-last action out, if set
    pub(crate) fn last_action(&self) -> Option<Action> {
        lock(&self.last).clone()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// The registry is write-once-per-name and read on the exit path; a panic
// while holding the lock must not wedge the remaining cleanup actions.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
