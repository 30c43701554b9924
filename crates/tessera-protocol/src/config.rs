//! Fixed protocol parameters.
//!
//! These are not negotiated per round: every node must use the same values or
//! their machines diverge.

use chrono::Duration;

/// Smallest quorum a round may be started with
pub const MIN_PARTICIPANTS: usize = 2;

/// Largest quorum a round may be started with
pub const MAX_PARTICIPANTS: usize = 64;

/// Shortest accepted participant title
pub const TITLE_MIN_LEN: usize = 3;

/// Longest accepted participant title
pub const TITLE_MAX_LEN: usize = 150;

/// Length in bytes of the random invitation secret
pub const INVITATION_SECRET_LEN: usize = 16;

/// How long invitations stay open
pub fn signature_proposal_window() -> Duration {
    Duration::days(7)
}

/// How long each DKG stage stays open
pub fn dkg_stage_window() -> Duration {
    Duration::days(3)
}

/// How long each signing stage stays open
pub fn signing_stage_window() -> Duration {
    Duration::days(1)
}
