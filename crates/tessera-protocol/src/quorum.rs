//! Quorum completion rule shared by every phase.

use chrono::{DateTime, Utc};

/// Where a single quorum entry stands in the current stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    /// Still expected to answer
    Awaiting,
    /// Answered successfully
    Done,
    /// Declined or reported an error
    Failed,
}

/// Decision taken by an auto-validate event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deadline passed
    TimedOut,
    /// Someone declined or failed
    Failed,
    /// Still waiting on someone
    Pending,
    /// Everyone answered successfully
    Complete,
}

/// Evaluate a quorum.
///
/// The deadline wins over everything else, then failures, then missing
/// answers.
pub fn verdict(
    entries: impl IntoIterator<Item = Standing>,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Verdict {
    if now > expires_at {
        return Verdict::TimedOut;
    }

    let mut awaiting = false;
    for standing in entries {
        match standing {
            Standing::Failed => return Verdict::Failed,
            Standing::Awaiting => awaiting = true,
            Standing::Done => {}
        }
    }

    if awaiting {
        Verdict::Pending
    } else {
        Verdict::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_all_done_before_deadline_completes() {
        let now = Utc::now();
        let verdict = verdict(
            [Standing::Done, Standing::Done],
            now + Duration::hours(1),
            now,
        );
        assert_eq!(verdict, Verdict::Complete);
    }

    #[test]
    fn test_deadline_beats_everything() {
        let now = Utc::now();
        let expired = now - Duration::seconds(1);
        assert_eq!(verdict([Standing::Done], expired, now), Verdict::TimedOut);
        assert_eq!(
            verdict([Standing::Failed, Standing::Awaiting], expired, now),
            Verdict::TimedOut
        );
    }

    #[test]
    fn test_failure_beats_waiting() {
        let now = Utc::now();
        let later = now + Duration::days(1);
        assert_eq!(
            verdict([Standing::Awaiting, Standing::Failed], later, now),
            Verdict::Failed
        );
        assert_eq!(
            verdict([Standing::Awaiting, Standing::Done], later, now),
            Verdict::Pending
        );
    }
}
