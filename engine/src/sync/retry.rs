use crate::domain::Promoter;
use nix::errno::Errno;

/// Result of one call into a domain-restricted primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    /// The caller is not a domain member (or the domain is not initialized).
    RetryNeeded,
    PermanentFailure(Errno),
}

impl From<Result<(), Errno>> for Outcome {
    fn from(r: Result<(), Errno>) -> Self {
        match r {
            Ok(()) => Self::Success,
            Err(e) => Self::PermanentFailure(e),
        }
    }
}

/// Final result after the one-shot retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    Done,
    Failed(Errno),
    /// Still not a member after promotion; the operation did nothing.
    NotMember,
}

impl Completion {
    fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => Self::Done,
            Outcome::PermanentFailure(e) => Self::Failed(e),
            Outcome::RetryNeeded => Self::NotMember,
        }
    }
}

/// How the retry state machine recovers from `RetryNeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    /// Promote the calling thread into the domain.
    Promote,
    /// Force domain initialization; used while creating primitives.
    Initialize,
}

enum Step {
    First,
    Retried,
}

pub(crate) fn try_or_retry(
    promoter: &Promoter,
    recovery: Recovery,
    mut call: impl FnMut() -> Outcome,
) -> Completion {
    let mut step = Step::First;
    loop {
        let outcome = call();
        match (step, outcome) {
            (Step::First, Outcome::RetryNeeded) => {
                let recovered = match recovery {
                    Recovery::Promote => promoter.ensure_realtime().is_ok(),
                    Recovery::Initialize => promoter.force_initialize().is_ok(),
                };
                if !recovered {
                    return Completion::NotMember;
                }
                step = Step::Retried;
            }
            (_, outcome) => return Completion::from_outcome(outcome),
        }
    }
}
