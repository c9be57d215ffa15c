//! Ordered steps with compensations.
//!
//! Each forward step that leaves a durable effect registers a compensation.
//! When a later step fails, the registered compensations run newest first.
//! A failing compensation is logged and the walk continues; the caller sees
//! the error that triggered the rollback.

use tracing::{debug, error, info};

use crate::error::{ProvisionError, Result};

type Compensation<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

/// A compensation that failed during rollback.
#[derive(Debug)]
pub struct CompensationFailure {
    /// Step whose compensation failed.
    pub step: &'static str,
    /// What went wrong.
    pub error: ProvisionError,
}

/// A running saga.
pub struct Saga<'a> {
    name: &'static str,
    completed: Vec<(&'static str, Compensation<'a>)>,
}

impl std::fmt::Debug for Saga<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saga")
            .field("name", &self.name)
            .field("completed", &self.completed_steps())
            .finish()
    }
}

impl<'a> Saga<'a> {
    /// Starts an empty saga.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            completed: Vec::new(),
        }
    }

    /// Runs `body`, compensating every registered step if it fails.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `body`.
    pub fn execute<T>(name: &'static str, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mut saga = Self::new(name);
        match body(&mut saga) {
            Ok(value) => {
                debug!(saga = name, steps = saga.completed.len(), "saga completed");
                Ok(value)
            }
            Err(e) => {
                error!(saga = name, error = %e, "saga failed, compensating");
                saga.compensate();
                Err(e)
            }
        }
    }

    /// Runs a forward step. On success `undo` is registered with a copy of
    /// the step's output.
    ///
    /// # Errors
    ///
    /// Returns the forward step's error; nothing is registered in that case.
    pub fn step<T, F, U>(&mut self, step: &'static str, forward: F, undo: U) -> Result<T>
    where
        T: Clone + 'a,
        F: FnOnce() -> Result<T>,
        U: FnOnce(T) -> Result<()> + 'a,
    {
        let output = forward()?;
        let captured = output.clone();
        self.completed.push((step, Box::new(move || undo(captured))));
        debug!(saga = self.name, step, "step completed");
        Ok(output)
    }

    /// Names of the steps that registered a compensation, oldest first.
    #[must_use]
    pub fn completed_steps(&self) -> Vec<&'static str> {
        self.completed.iter().map(|(step, _)| *step).collect()
    }

    /// Runs every registered compensation, newest first.
    pub fn compensate(self) -> Vec<CompensationFailure> {
        let mut failures = Vec::new();
        for (step, undo) in self.completed.into_iter().rev() {
            match undo() {
                Ok(()) => info!(saga = self.name, step, "compensated step"),
                Err(e) => {
                    error!(saga = self.name, step, error = %e, "compensation failed");
                    failures.push(CompensationFailure { step, error: e });
                }
            }
        }
        failures
    }
}
