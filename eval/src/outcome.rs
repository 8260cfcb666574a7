use serde::{Deserialize, Serialize};

use crate::judge::Judgment;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Fail,
    Error,
}

/// `None` means the controller aborted with an invariant violation.
pub fn classify_outcome(judgment: Option<&Judgment>) -> Outcome {
    match judgment {
        Some(judgment) if judgment.all_passed() => Outcome::Success,
        Some(_) => Outcome::Fail,
        None => Outcome::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::CheckOutcome;
    use voyage::core::types::TerminationReason;

    fn judgment(pass: bool) -> Judgment {
        Judgment {
            checks: vec![CheckOutcome::Termination {
                expected: TerminationReason::Finalized,
                actual: TerminationReason::Finalized,
                passed: pass,
            }],
        }
    }

    #[test]
    fn success_when_checks_pass() {
        assert_eq!(classify_outcome(Some(&judgment(true))), Outcome::Success);
    }

    #[test]
    fn fail_when_any_check_fails() {
        assert_eq!(classify_outcome(Some(&judgment(false))), Outcome::Fail);
    }

    #[test]
    fn error_without_judgment() {
        assert_eq!(classify_outcome(None), Outcome::Error);
    }
}
