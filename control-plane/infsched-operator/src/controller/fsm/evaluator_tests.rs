#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::controller::fsm::{
        Directive, Outcome, Requeue, RequeueTiming, Transition, transition,
    };
    use crate::crd::Phase;

    use crate::controller::fsm::Outcome as O;
    use crate::crd::Phase as P;

    const FAIL: Directive = Directive::Fail;
    const GO: Directive = Directive::Continue;
    const PREREQ: Directive = Directive::Requeue(Requeue::After(Duration::from_secs(60)));
    const NOT_READY: Directive = Directive::Requeue(Requeue::After(Duration::from_secs(30)));
    const STEADY: Directive = Directive::Requeue(Requeue::After(Duration::from_secs(300)));

    #[rustfmt::skip]
    const TABLE: [(Option<Phase>, Outcome, Phase, Directive); 42] = [
        (None,                       O::FirstObserved,          P::Initializing,          GO),
        (None,                       O::DeletionRequested,      P::Finalizing,            GO),
        (None,                       O::PrerequisitesMissing,   P::PrerequisitesMissing,  PREREQ),
        (None,                       O::PrerequisitesSatisfied, P::Deploying,             GO),
        (None,                       O::WorkloadNotReady,       P::Deploying,             NOT_READY),
        (None,                       O::StepFailed,             P::Initializing,          FAIL),
        (None,                       O::Converged,              P::Ready,                 STEADY),
        (Some(P::Initializing),      O::FirstObserved,          P::Initializing,          GO),
        (Some(P::Initializing),      O::DeletionRequested,      P::Finalizing,            GO),
        (Some(P::Initializing),      O::PrerequisitesMissing,   P::PrerequisitesMissing,  PREREQ),
        (Some(P::Initializing),      O::PrerequisitesSatisfied, P::Deploying,             GO),
        (Some(P::Initializing),      O::WorkloadNotReady,       P::Deploying,             NOT_READY),
        (Some(P::Initializing),      O::StepFailed,             P::Initializing,          FAIL),
        (Some(P::Initializing),      O::Converged,              P::Ready,                 STEADY),
        (Some(P::PrerequisitesMissing), O::FirstObserved,          P::PrerequisitesMissing,  GO),
        (Some(P::PrerequisitesMissing), O::DeletionRequested,      P::Finalizing,            GO),
        (Some(P::PrerequisitesMissing), O::PrerequisitesMissing,   P::PrerequisitesMissing,  PREREQ),
        (Some(P::PrerequisitesMissing), O::PrerequisitesSatisfied, P::Deploying,             GO),
        (Some(P::PrerequisitesMissing), O::WorkloadNotReady,       P::Deploying,             NOT_READY),
        (Some(P::PrerequisitesMissing), O::StepFailed,             P::PrerequisitesMissing,  FAIL),
        (Some(P::PrerequisitesMissing), O::Converged,              P::Ready,                 STEADY),
        (Some(P::Deploying),         O::FirstObserved,          P::Deploying,             GO),
        (Some(P::Deploying),         O::DeletionRequested,      P::Finalizing,            GO),
        (Some(P::Deploying),         O::PrerequisitesMissing,   P::PrerequisitesMissing,  PREREQ),
        (Some(P::Deploying),         O::PrerequisitesSatisfied, P::Deploying,             GO),
        (Some(P::Deploying),         O::WorkloadNotReady,       P::Deploying,             NOT_READY),
        (Some(P::Deploying),         O::StepFailed,             P::Deploying,             FAIL),
        (Some(P::Deploying),         O::Converged,              P::Ready,                 STEADY),
        (Some(P::Ready),             O::FirstObserved,          P::Ready,                 GO),
        (Some(P::Ready),             O::DeletionRequested,      P::Finalizing,            GO),
        (Some(P::Ready),             O::PrerequisitesMissing,   P::PrerequisitesMissing,  PREREQ),
        (Some(P::Ready),             O::PrerequisitesSatisfied, P::Deploying,             GO),
        (Some(P::Ready),             O::WorkloadNotReady,       P::Deploying,             NOT_READY),
        (Some(P::Ready),             O::StepFailed,             P::Ready,                 FAIL),
        (Some(P::Ready),             O::Converged,              P::Ready,                 STEADY),
        (Some(P::Finalizing),        O::FirstObserved,          P::Finalizing,            GO),
        (Some(P::Finalizing),        O::DeletionRequested,      P::Finalizing,            GO),
        (Some(P::Finalizing),        O::PrerequisitesMissing,   P::PrerequisitesMissing,  PREREQ),
        (Some(P::Finalizing),        O::PrerequisitesSatisfied, P::Deploying,             GO),
        (Some(P::Finalizing),        O::WorkloadNotReady,       P::Deploying,             NOT_READY),
        (Some(P::Finalizing),        O::StepFailed,             P::Finalizing,            FAIL),
        (Some(P::Finalizing),        O::Converged,              P::Ready,                 STEADY),
    ];

    #[test]
    fn every_state_outcome_pair() {
        let timing = RequeueTiming::default();
        for (current, outcome, phase, directive) in TABLE {
            assert_eq!(
                transition(current, outcome, &timing),
                Transition { phase, directive },
                "state {current:?} outcome {outcome:?}"
            );
        }
    }

    #[test]
    fn ready_object_with_dropped_workload_returns_to_deploying() {
        let t = RequeueTiming::default();
        let tr = transition(Some(Phase::Ready), Outcome::WorkloadNotReady, &t);
        assert_eq!(tr.phase, Phase::Deploying);
        assert_eq!(tr.directive, NOT_READY);
        let back = transition(Some(tr.phase), Outcome::Converged, &t);
        assert_eq!(back.phase, Phase::Ready);
    }

    #[test]
    fn default_delays() {
        let t = RequeueTiming::default();
        assert_eq!(
            transition(Some(Phase::Initializing), Outcome::PrerequisitesMissing, &t).directive,
            Directive::Requeue(Requeue::After(Duration::from_secs(60)))
        );
        assert_eq!(
            transition(Some(Phase::Deploying), Outcome::WorkloadNotReady, &t).directive,
            Directive::Requeue(Requeue::After(Duration::from_secs(30)))
        );
        assert_eq!(
            transition(Some(Phase::Deploying), Outcome::Converged, &t).directive,
            Directive::Requeue(Requeue::After(Duration::from_secs(300)))
        );
    }

    #[test]
    fn first_observation_only_initializes_fresh_objects() {
        let t = RequeueTiming::default();
        assert_eq!(transition(None, Outcome::FirstObserved, &t).phase, Phase::Initializing);
        assert_eq!(
            transition(Some(Phase::Ready), Outcome::FirstObserved, &t).phase,
            Phase::Ready
        );
    }

    #[test]
    fn ready_object_with_missing_prerequisites_regresses() {
        let t = RequeueTiming::default();
        let tr = transition(Some(Phase::Ready), Outcome::PrerequisitesMissing, &t);
        assert_eq!(tr.phase, Phase::PrerequisitesMissing);
    }

    #[test]
    fn custom_timing_is_honoured() {
        let t = RequeueTiming {
            prerequisites_missing: Duration::from_secs(7),
            not_ready: Duration::from_secs(3),
            steady: Duration::from_secs(11),
        };
        assert_eq!(
            transition(None, Outcome::PrerequisitesMissing, &t).directive,
            Directive::Requeue(Requeue::After(Duration::from_secs(7)))
        );
    }
}
