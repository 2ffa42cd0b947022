use std::future::Future;

use tokio::task::JoinHandle;

/// Result of one unit of work: a closure that applies the unit's outcome to
/// the caller's state.
pub type Apply<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Fan-out/fan-in executor.
///
/// Every unit added starts running at once on its own task. [`FanOut::run`]
/// then applies each unit's closure to the caller's state one at a time, in
/// the order the units were added. State touched only from inside those
/// closures needs no locking.
///
/// Units never fail from the executor's point of view; a unit turns its own
/// error into a closure that records it.
pub struct FanOut<S> {
    pending: Vec<JoinHandle<Apply<S>>>,
}

impl<S: 'static> Default for FanOut<S> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<S: 'static> FanOut<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a unit. Must be called from within a tokio runtime.
    pub fn add<F>(&mut self, unit: F)
    where
        F: Future<Output = Apply<S>> + Send + 'static,
    {
        self.pending.push(tokio::spawn(unit));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for every unit and apply its closure, in submission order.
    ///
    /// Returns the number of closures applied. A hung unit blocks the whole
    /// batch; deadlines belong inside the unit.
    pub async fn run(self, state: &mut S) -> usize {
        let mut applied = 0;
        for handle in self.pending {
            match handle.await {
                Ok(apply) => {
                    apply(state);
                    applied += 1;
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => tracing::warn!(error = %e, "fan-out unit cancelled"),
            }
        }
        applied
    }
}

/// Aggregated outcome of a batch of remote mutations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub ok: usize,
    pub failed: usize,
    /// Text of the most recent failure, naming the message it hit.
    pub last_error: Option<String>,
    /// IDs the batch succeeded for, in submission order.
    pub succeeded: Vec<String>,
}

impl BatchReport {
    pub fn record_ok(&mut self, id: impl Into<String>) {
        self.ok += 1;
        self.succeeded.push(id.into());
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.failed += 1;
        self.last_error = Some(error.into());
    }

    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }

    /// One-line status, e.g. "3 archiving OK, 1 failed: ...".
    pub fn summary(&self, verb: &str) -> String {
        match &self.last_error {
            Some(err) if self.failed > 0 => {
                format!("{} {} OK, {} failed: {}", self.ok, verb, self.failed, err)
            }
            _ => format!("OK, {} {} messages", verb, self.ok),
        }
    }
}
