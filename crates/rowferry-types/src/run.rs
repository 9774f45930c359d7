//! Run-log state machine types.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a pipeline run, persisted as a small integer.
///
/// Transitions go strictly forward (`Open` → `Extracted` → `Transformed`
/// → `Loaded`); `Error` is reachable from any non-terminal state and is
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Open,
    Extracted,
    Transformed,
    Loaded,
    Error,
}

impl RunStatus {
    pub fn code(self) -> i64 {
        match self {
            RunStatus::Open => 0,
            RunStatus::Extracted => 1,
            RunStatus::Transformed => 2,
            RunStatus::Loaded => 3,
            RunStatus::Error => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<RunStatus> {
        match code {
            0 => Some(RunStatus::Open),
            1 => Some(RunStatus::Extracted),
            2 => Some(RunStatus::Transformed),
            3 => Some(RunStatus::Loaded),
            4 => Some(RunStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Loaded | RunStatus::Error)
    }

    /// Whether `self` → `to` is a legal transition.
    pub fn can_transition(self, to: RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == RunStatus::Error {
            return true;
        }
        to.code() == self.code() + 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Open => "open",
            RunStatus::Extracted => "extracted",
            RunStatus::Transformed => "transformed",
            RunStatus::Loaded => "loaded",
            RunStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row counters stamped into the run log when the load phase finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub records_loaded: i64,
    /// Only stamped when an update or merge write ran.
    pub records_updated: Option<i64>,
    /// Only stamped when the reconciler routed rows aside.
    pub records_error: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        assert!(RunStatus::Open.can_transition(RunStatus::Extracted));
        assert!(RunStatus::Extracted.can_transition(RunStatus::Transformed));
        assert!(RunStatus::Transformed.can_transition(RunStatus::Loaded));
        assert!(!RunStatus::Open.can_transition(RunStatus::Transformed));
        assert!(!RunStatus::Extracted.can_transition(RunStatus::Open));
        assert!(!RunStatus::Loaded.can_transition(RunStatus::Extracted));
    }

    #[test]
    fn error_is_reachable_and_absorbing() {
        assert!(RunStatus::Open.can_transition(RunStatus::Error));
        assert!(RunStatus::Transformed.can_transition(RunStatus::Error));
        assert!(!RunStatus::Error.can_transition(RunStatus::Open));
        assert!(!RunStatus::Error.can_transition(RunStatus::Error));
        assert!(!RunStatus::Loaded.can_transition(RunStatus::Error));
    }

    #[test]
    fn codes_round_trip() {
        for s in [
            RunStatus::Open,
            RunStatus::Extracted,
            RunStatus::Transformed,
            RunStatus::Loaded,
            RunStatus::Error,
        ] {
            assert_eq!(RunStatus::from_code(s.code()), Some(s));
        }
        assert_eq!(RunStatus::from_code(9), None);
    }
}
