//! Result analysis

pub mod metrics;
pub mod summary;

pub use metrics::{accuracy, majority_vote, wilson_ci, Z_95};
pub use summary::{
    AccuracySummary, GroupAccuracy, GroupSummary, GroupVote, NullPolicy, PositionAccuracy,
    VoteSummary,
};
