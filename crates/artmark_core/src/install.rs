/// Result of one attempt of an installation task.
///
/// An attempt checks its precondition first; `NotReady` means nothing was
/// applied and the attempt may be repeated. `Faulted` means the action itself
/// failed, possibly half-way, so it is never repeated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    NotReady,
    Installed,
    Faulted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExhaustReason {
    BudgetSpent,
    Faulted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending { attempts: u32 },
    Installed { attempts: u32 },
    Exhausted { attempts: u32, reason: ExhaustReason },
}

impl TaskState {
    pub fn new(budget: u32) -> Self {
        if budget == 0 {
            TaskState::Exhausted {
                attempts: 0,
                reason: ExhaustReason::BudgetSpent,
            }
        } else {
            TaskState::Pending { attempts: 0 }
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            TaskState::Pending { attempts }
            | TaskState::Installed { attempts }
            | TaskState::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending { .. })
    }

    /// Terminal states absorb every further outcome.
    pub fn advance(self, outcome: AttemptOutcome, budget: u32) -> TaskState {
        let TaskState::Pending { attempts } = self else {
            return self;
        };
        let attempts = attempts + 1;
        match outcome {
            AttemptOutcome::Installed => TaskState::Installed { attempts },
            AttemptOutcome::Faulted(message) => TaskState::Exhausted {
                attempts,
                reason: ExhaustReason::Faulted(message),
            },
            AttemptOutcome::NotReady if attempts >= budget => TaskState::Exhausted {
                attempts,
                reason: ExhaustReason::BudgetSpent,
            },
            AttemptOutcome::NotReady => TaskState::Pending { attempts },
        }
    }
}
