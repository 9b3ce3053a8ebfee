//! Sample-size progress derived from an experiment's counters.
//!
//! Counting itself lives in the Store (`insert_assignment_counted`); these
//! are read-only views.

use cohort_core::models::Experiment;

/// `min(100, current / minimum * 100)`, 0 when no positive minimum is set.
pub fn completion_percentage(experiment: &Experiment) -> f64 {
    match experiment.minimum_sample_size {
        Some(minimum) if minimum > 0 => {
            let pct = experiment.current_sample_size as f64 / minimum as f64 * 100.0;
            pct.min(100.0)
        }
        _ => 0.0,
    }
}

/// True when the minimum is met, or when no minimum is configured.
pub fn has_reached_minimum(experiment: &Experiment) -> bool {
    match experiment.minimum_sample_size {
        Some(minimum) => experiment.current_sample_size >= minimum,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_counts(current: u64, minimum: Option<u64>) -> Experiment {
        let mut exp = Experiment::draft("sample");
        exp.current_sample_size = current;
        exp.minimum_sample_size = minimum;
        exp
    }

    #[test]
    fn completion_is_capped_at_100() {
        assert_eq!(completion_percentage(&with_counts(250, Some(100))), 100.0);
        assert_eq!(completion_percentage(&with_counts(25, Some(100))), 25.0);
    }

    #[test]
    fn missing_or_zero_minimum_is_zero_percent() {
        assert_eq!(completion_percentage(&with_counts(10, None)), 0.0);
        assert_eq!(completion_percentage(&with_counts(10, Some(0))), 0.0);
    }

    #[test]
    fn no_minimum_counts_as_reached() {
        assert!(has_reached_minimum(&with_counts(0, None)));
        assert!(!has_reached_minimum(&with_counts(99, Some(100))));
        assert!(has_reached_minimum(&with_counts(100, Some(100))));
    }
}
