#[cfg(test)]
mod tests {
    use super::super::status::StatusAggregator;
    use crate::crd::{ConditionStatus, ConditionType, InferenceSchedulerStatus, Phase};
    use chrono::{TimeZone, Utc};

    #[test]
    fn fresh_status_reports_change_once_generation_is_recorded() {
        let agg = StatusAggregator::new(None, Some(1));
        assert!(agg.changed());
        assert_eq!(agg.current().observed_generation, Some(1));
    }

    #[test]
    fn unchanged_pass_is_not_a_change() {
        let stored = InferenceSchedulerStatus {
            phase: Some(Phase::Ready),
            observed_generation: Some(3),
            ..Default::default()
        };
        let mut agg = StatusAggregator::new(Some(&stored), Some(3));
        agg.set_phase(Phase::Ready);
        assert!(!agg.changed());
    }

    #[test]
    fn same_status_keeps_first_transition_time() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap();
        let mut agg = StatusAggregator::new(None, Some(1));
        agg.set_condition_at(
            ConditionType::ModelServerReady,
            ConditionStatus::False,
            "NotReady",
            "0/2 replicas ready",
            t0,
        );
        agg.set_condition_at(
            ConditionType::ModelServerReady,
            ConditionStatus::False,
            "NotReady",
            "1/2 replicas ready",
            t1,
        );
        let conds = &agg.current().conditions;
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].last_transition_time.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(conds[0].message.as_deref(), Some("1/2 replicas ready"));
    }

    #[test]
    fn status_flip_moves_transition_time() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap();
        let mut agg = StatusAggregator::new(None, Some(1));
        agg.set_condition_at(ConditionType::EppReady, ConditionStatus::False, "NotReady", "", t0);
        agg.set_condition_at(ConditionType::EppReady, ConditionStatus::True, "Ready", "", t1);
        let c = &agg.current().conditions[0];
        assert_eq!(c.status, ConditionStatus::True);
        assert_eq!(c.reason.as_deref(), Some("Ready"));
        assert_eq!(c.last_transition_time.as_deref(), Some("2025-01-01T00:05:00Z"));
    }

    #[test]
    fn conditions_keep_insertion_order_and_unique_types() {
        let mut agg = StatusAggregator::new(None, Some(1));
        for t in [
            ConditionType::SpecValid,
            ConditionType::PrerequisitesValidated,
            ConditionType::SpecValid,
        ] {
            agg.set_condition(t, ConditionStatus::True, "Ok", "");
        }
        let types: Vec<_> = agg.current().conditions.iter().map(|c| c.type_).collect();
        assert_eq!(types, vec![ConditionType::SpecValid, ConditionType::PrerequisitesValidated]);
    }

    #[test]
    fn mark_flushed_resets_change_tracking() {
        let mut agg = StatusAggregator::new(None, Some(2));
        agg.set_phase(Phase::Initializing);
        assert!(agg.changed());
        agg.mark_flushed();
        assert!(!agg.changed());
        assert_eq!(agg.stored_phase(), Some(Phase::Initializing));
        agg.set_prerequisites(false, Some("missing prerequisites: x".into()));
        assert!(agg.changed());
    }
}
