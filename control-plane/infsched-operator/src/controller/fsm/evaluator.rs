use std::time::Duration;

use kube::runtime::controller::Action;

use crate::crd::Phase;

/// What the engine learned at one decision point of a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    FirstObserved,
    DeletionRequested,
    PrerequisitesMissing,
    PrerequisitesSatisfied,
    WorkloadNotReady,
    StepFailed,
    Converged,
}

/// When the controller runtime should look at the object again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requeue {
    /// Only on the next watch event.
    Never,
    After(Duration),
}

impl Requeue {
    pub fn into_action(self) -> Action {
        match self {
            Requeue::Never => Action::await_change(),
            Requeue::After(d) => Action::requeue(d),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Keep going within this pass.
    Continue,
    /// Stop the pass and come back later.
    Requeue(Requeue),
    /// Stop the pass and surface the error.
    Fail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub phase: Phase,
    pub directive: Directive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequeueTiming {
    pub prerequisites_missing: Duration,
    pub not_ready: Duration,
    pub steady: Duration,
}

impl Default for RequeueTiming {
    fn default() -> Self {
        Self {
            prerequisites_missing: Duration::from_secs(60),
            not_ready: Duration::from_secs(30),
            steady: Duration::from_secs(300),
        }
    }
}

/// Pure phase transition. Never touches the store.
pub fn transition(
    current: Option<Phase>,
    outcome: Outcome,
    timing: &RequeueTiming,
) -> Transition {
    let (phase, directive) = match outcome {
        Outcome::FirstObserved => {
            (current.unwrap_or(Phase::Initializing), Directive::Continue)
        }
        Outcome::DeletionRequested => (Phase::Finalizing, Directive::Continue),
        Outcome::PrerequisitesMissing => (
            Phase::PrerequisitesMissing,
            Directive::Requeue(Requeue::After(timing.prerequisites_missing)),
        ),
        Outcome::PrerequisitesSatisfied => (Phase::Deploying, Directive::Continue),
        Outcome::WorkloadNotReady => (
            Phase::Deploying,
            Directive::Requeue(Requeue::After(timing.not_ready)),
        ),
        // A failed step leaves the phase where it was.
        Outcome::StepFailed => {
            (current.unwrap_or(Phase::Initializing), Directive::Fail)
        }
        Outcome::Converged => (
            Phase::Ready,
            Directive::Requeue(Requeue::After(timing.steady)),
        ),
    };
    Transition { phase, directive }
}
