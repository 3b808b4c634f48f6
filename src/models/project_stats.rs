//! Secondary project statistics.

use serde::{Deserialize, Serialize};

/// Issue counts for the configured tracker project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    /// All issues in the project.
    pub total_issues: u64,

    /// Issues whose status category is done.
    pub done_issues: u64,
}

impl ProjectStats {
    /// Issues not yet done.
    pub fn open_issues(&self) -> u64 {
        self.total_issues.saturating_sub(self.done_issues)
    }
}
