//! Bounded-retry installation of page behaviours.
//!
//! Each task checks its own precondition on every attempt. Tasks run
//! concurrently on the current thread and a task that never becomes ready
//! gives up after its budget without affecting its siblings.

use std::future::Future;
use std::time::Duration;

use artmark_core::{AttemptOutcome, ExhaustReason, TaskState};
use artmark_logging::{artmark_debug, artmark_info, artmark_warn};
use futures_util::future::{join_all, LocalBoxFuture};
use futures_util::FutureExt;

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("selector `{0}` is not defined for this site")]
    UndefinedSelector(String),
}

type AttemptFn<'a> = Box<dyn FnMut() -> LocalBoxFuture<'a, Result<bool, InstallError>> + 'a>;

/// A named behaviour to install. One attempt yields `Ok(true)` once applied
/// and `Ok(false)` while its precondition does not hold yet.
pub struct InstallationTask<'a> {
    name: String,
    retry_budget: u32,
    attempt: AttemptFn<'a>,
}

impl<'a> InstallationTask<'a> {
    pub fn new<F, Fut>(name: impl Into<String>, retry_budget: u32, mut attempt: F) -> Self
    where
        F: FnMut() -> Fut + 'a,
        Fut: Future<Output = Result<bool, InstallError>> + 'a,
    {
        Self {
            name: name.into(),
            retry_budget,
            attempt: Box::new(move || attempt().boxed_local()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub name: String,
    pub state: TaskState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub outcomes: Vec<TaskOutcome>,
}

impl InstallReport {
    pub fn state_of(&self, name: &str) -> Option<&TaskState> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.name == name)
            .map(|outcome| &outcome.state)
    }

    pub fn installed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.state, TaskState::Installed { .. }))
            .count()
    }

    pub fn exhausted(&self) -> usize {
        self.outcomes.len() - self.installed()
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    retry_interval: Duration,
}

impl Scheduler {
    pub fn new(retry_interval: Duration) -> Self {
        Self { retry_interval }
    }

    pub async fn install_all(&self, tasks: Vec<InstallationTask<'_>>) -> InstallReport {
        let outcomes = join_all(tasks.into_iter().map(|task| self.run(task))).await;
        let report = InstallReport { outcomes };
        artmark_info!(
            "installation finished: {} installed, {} gave up",
            report.installed(),
            report.exhausted()
        );
        report
    }

    async fn run(&self, mut task: InstallationTask<'_>) -> TaskOutcome {
        let mut state = TaskState::new(task.retry_budget);
        while !state.is_terminal() {
            if state.attempts() > 0 {
                tokio::time::sleep(self.retry_interval).await;
            }
            let outcome = match (task.attempt)().await {
                Ok(true) => AttemptOutcome::Installed,
                Ok(false) => AttemptOutcome::NotReady,
                Err(err) => AttemptOutcome::Faulted(err.to_string()),
            };
            state = state.advance(outcome, task.retry_budget);
        }

        match &state {
            TaskState::Installed { attempts } => {
                artmark_debug!("`{}` installed after {attempts} attempt(s)", task.name);
            }
            TaskState::Exhausted {
                attempts,
                reason: ExhaustReason::BudgetSpent,
            } => {
                artmark_warn!(
                    "`{}` never became ready, gave up after {attempts} attempt(s)",
                    task.name
                );
            }
            TaskState::Exhausted {
                reason: ExhaustReason::Faulted(message),
                ..
            } => {
                artmark_warn!("`{}` failed: {message}", task.name);
            }
            TaskState::Pending { .. } => {}
        }

        TaskOutcome {
            name: task.name,
            state,
        }
    }
}
