//! Status - コントローラの状態
//!
//! # 状態遷移
//! - stopped → running: start()
//! - running → stopped: stop()
//! - それ以外の呼び出しは no-op（エラーにしない）

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Stopped,
    Running,
}

/// Result of a start/stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The request changed the status.
    Applied,
    /// The controller was already in the requested status.
    Ignored,
}

impl Transition {
    pub fn is_applied(self) -> bool {
        self == Transition::Applied
    }
}

impl Status {
    /// Status after a start (`true`) or stop (`false`) request, plus whether it moved.
    pub fn after(self, start: bool) -> (Status, Transition) {
        let target = if start { Status::Running } else { Status::Stopped };
        if self == target {
            (self, Transition::Ignored)
        } else {
            (target, Transition::Applied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::start_from_stopped(Status::Stopped, true, Status::Running, Transition::Applied)]
    #[case::start_while_running(Status::Running, true, Status::Running, Transition::Ignored)]
    #[case::stop_while_running(Status::Running, false, Status::Stopped, Transition::Applied)]
    #[case::stop_while_stopped(Status::Stopped, false, Status::Stopped, Transition::Ignored)]
    fn transitions_are_idempotent(
        #[case] from: Status,
        #[case] start: bool,
        #[case] to: Status,
        #[case] transition: Transition,
    ) {
        assert_eq!(from.after(start), (to, transition));
    }

    #[test]
    fn only_applied_transitions_report_applied() {
        assert!(Transition::Applied.is_applied());
        assert!(!Transition::Ignored.is_applied());
        assert!(!Status::Running.after(true).1.is_applied());
    }

    #[test]
    fn default_is_stopped() {
        assert_eq!(Status::default(), Status::Stopped);
    }
}
