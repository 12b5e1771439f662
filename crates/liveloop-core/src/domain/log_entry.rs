use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the append-only log, stamped when the log writer stored it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub line: String,
}

impl LogEntry {
    pub fn new(at: DateTime<Utc>, line: impl Into<String>) -> Self {
        Self {
            at,
            line: line.into(),
        }
    }
}

pub const STARTING_LINE: &str = "starting thread...";
pub const STARTED_LINE: &str = "thread started living";
pub const ENDED_LINE: &str = "thread living ended.";

/// Line a dispatched task appends from the worker it ran on.
pub fn running_line(label: &str) -> String {
    format!("thread({label}) is running.")
}

/// Extract the label from a line produced by [`running_line`].
pub fn parse_running_line(line: &str) -> Option<&str> {
    line.strip_prefix("thread(")?.strip_suffix(") is running.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_line_round_trips_label() {
        let line = running_line("aB3dE");
        assert_eq!(line, "thread(aB3dE) is running.");
        assert_eq!(parse_running_line(&line), Some("aB3dE"));
    }

    #[test]
    fn lifecycle_lines_are_not_running_lines() {
        for line in [STARTING_LINE, STARTED_LINE, ENDED_LINE] {
            assert_eq!(parse_running_line(line), None);
        }
    }
}
