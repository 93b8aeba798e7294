//! Error handling policy applied to failed polling iterations.
//!
//! The evaluator is a pure function: it takes the configured mode and the current
//! failure state and returns what the polling loop should do next. It never touches
//! the resource, the reporter or the clock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Consecutive failures tolerated before suppression starts.
///
/// Fixed at 1: only the first failure of a run is reported.
pub const FAILURE_THRESHOLD: u32 = 1;

/// How the polling loop reacts to a failed iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorHandlingMode {
    /// Report the failure and stop polling
    StopPollingOnError,
    /// Report the first failure of a run, stay silent until polling succeeds again
    #[default]
    SuppressConsecutiveErrors,
    /// Report every failure
    ReportAllErrors,
}

impl FromStr for ErrorHandlingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stoppollingonerror" | "stop" => Ok(Self::StopPollingOnError),
            "suppressconsecutiveerrors" | "suppress" => Ok(Self::SuppressConsecutiveErrors),
            "reportallerrors" | "report_all" => Ok(Self::ReportAllErrors),
            other => Err(format!("Unknown error handling mode: {}", other)),
        }
    }
}

/// Run-of-failures state carried between iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureState {
    pub consecutive_failures: u32,
    pub suppressed: bool,
}

impl FailureState {
    /// State after a successful iteration
    pub fn reset() -> Self {
        Self::default()
    }
}

/// Extra sentence appended to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The loop stops after this failure
    Disconnecting,
    /// Further failures of this run will not be reported
    Suppressing,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Disconnecting => write!(f, "The adapter will now be disconnected."),
            Notice::Suppressing => write!(
                f,
                "Further errors will be suppressed until polling succeeds again."
            ),
        }
    }
}

/// Outcome of evaluating one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    pub stop: bool,
    pub report: bool,
    pub notice: Option<Notice>,
    pub next: FailureState,
}

/// Decide what to do about a failed iteration
pub fn evaluate(mode: ErrorHandlingMode, current: FailureState) -> PolicyDecision {
    let consecutive_failures = current.consecutive_failures.saturating_add(1);

    match mode {
        ErrorHandlingMode::StopPollingOnError => PolicyDecision {
            stop: true,
            report: true,
            notice: Some(Notice::Disconnecting),
            next: FailureState {
                consecutive_failures,
                suppressed: current.suppressed,
            },
        },
        ErrorHandlingMode::SuppressConsecutiveErrors => {
            let first_of_run = consecutive_failures >= FAILURE_THRESHOLD && !current.suppressed;
            PolicyDecision {
                stop: false,
                report: first_of_run,
                notice: first_of_run.then_some(Notice::Suppressing),
                next: FailureState {
                    consecutive_failures,
                    suppressed: current.suppressed || first_of_run,
                },
            }
        }
        ErrorHandlingMode::ReportAllErrors => PolicyDecision {
            stop: false,
            report: true,
            notice: None,
            next: FailureState {
                consecutive_failures,
                suppressed: current.suppressed,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_on_error() {
        let decision = evaluate(ErrorHandlingMode::StopPollingOnError, FailureState::reset());

        assert!(decision.stop);
        assert!(decision.report);
        assert_eq!(decision.notice, Some(Notice::Disconnecting));
        assert_eq!(decision.next.consecutive_failures, 1);
    }

    #[test]
    fn test_suppress_reports_first_failure_only() {
        let mode = ErrorHandlingMode::SuppressConsecutiveErrors;

        let first = evaluate(mode, FailureState::reset());
        assert!(first.report);
        assert!(!first.stop);
        assert_eq!(first.notice, Some(Notice::Suppressing));
        assert!(first.next.suppressed);

        let second = evaluate(mode, first.next);
        assert!(!second.report);
        assert!(!second.stop);
        assert_eq!(second.notice, None);
        assert!(second.next.suppressed);
        assert_eq!(second.next.consecutive_failures, 2);

        // A success in between resets the run
        let after_success = evaluate(mode, FailureState::reset());
        assert!(after_success.report);
    }

    #[test]
    fn test_report_all() {
        let mode = ErrorHandlingMode::ReportAllErrors;
        let mut state = FailureState::reset();

        for expected in 1..=5 {
            let decision = evaluate(mode, state);
            assert!(decision.report);
            assert!(!decision.stop);
            assert_eq!(decision.notice, None);
            assert_eq!(decision.next.consecutive_failures, expected);
            state = decision.next;
        }
    }

    #[test]
    fn test_count_saturates() {
        let state = FailureState {
            consecutive_failures: u32::MAX,
            suppressed: true,
        };
        let decision = evaluate(ErrorHandlingMode::SuppressConsecutiveErrors, state);
        assert_eq!(decision.next.consecutive_failures, u32::MAX);
        assert!(!decision.report);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(
            "ReportAllErrors".parse::<ErrorHandlingMode>().unwrap(),
            ErrorHandlingMode::ReportAllErrors
        );
        assert_eq!(
            "stop".parse::<ErrorHandlingMode>().unwrap(),
            ErrorHandlingMode::StopPollingOnError
        );
        assert_eq!(
            ErrorHandlingMode::default(),
            ErrorHandlingMode::SuppressConsecutiveErrors
        );
    }
}
