//! Notification priority levels.

use serde::{Deserialize, Serialize};

/// Delivery priority of a notification.
///
/// Within a single channel-poll batch, rows are processed in descending
/// priority, then ascending creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    /// The database/string representation of the priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    /// Parse a priority, defaulting to [`Priority::Normal`] for unknown
    /// values (a malformed row must never stall the poller).
    pub fn parse_or_normal(s: &str) -> Self {
        match s {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Normal,
        }
    }

    /// Numeric rank used by `ORDER BY` clauses (higher sorts first).
    pub fn rank(&self) -> i16 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_rank() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert!(Priority::High.rank() > Priority::Low.rank());
    }

    #[test]
    fn unknown_priority_defaults_to_normal() {
        assert_eq!(Priority::parse_or_normal("urgent"), Priority::Normal);
        assert_eq!(Priority::parse_or_normal("high"), Priority::High);
    }
}
