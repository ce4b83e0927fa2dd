//! Exit code logic for the paperfetch process.
//!
//! Single responsibility: map the batch counters to the process exit outcome.

use paperfetch_core::batch::BatchCounts;

use crate::ProcessExit;

/// Determines the process exit outcome from succeeded and unsuccessful entry counts.
pub(crate) fn determine_exit_outcome(succeeded: usize, unsuccessful: usize) -> ProcessExit {
    if unsuccessful == 0 {
        ProcessExit::Success
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// Exit outcome for a finished batch.
pub(crate) fn exit_for_counts(counts: &BatchCounts) -> ProcessExit {
    determine_exit_outcome(counts.succeeded(), counts.unsuccessful())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_success_when_nothing_failed() {
        assert_eq!(determine_exit_outcome(3, 0), ProcessExit::Success);
        assert_eq!(determine_exit_outcome(0, 0), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_partial_when_mixed() {
        assert_eq!(determine_exit_outcome(2, 1), ProcessExit::Partial);
    }

    #[test]
    fn test_exit_outcome_failure_when_nothing_succeeded() {
        assert_eq!(determine_exit_outcome(0, 2), ProcessExit::Failure);
    }

    #[test]
    fn test_exit_for_counts_treats_invalid_as_unsuccessful() {
        let counts = BatchCounts {
            already_present: 1,
            invalid: 1,
            ..BatchCounts::default()
        };
        assert_eq!(exit_for_counts(&counts), ProcessExit::Partial);
    }
}
