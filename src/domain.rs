//! Status, priority and grade keywords stored in the workspace database.
//!
//! Each enum round-trips through its lowercase keyword, both as SQL text and
//! on the command line.

use crate::error::ParseValueError;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! keyword_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseValueError {
                        kind: $kind,
                        value: s.to_string(),
                        expected: [$($text),+].join(", "),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value.as_str()?.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

keyword_enum!(
    /// Lifecycle of an extracted idea.
    IdeaStatus, "idea status" {
        Extracted => "extracted",
        Reviewed => "reviewed",
    }
);

keyword_enum!(
    /// Lifecycle of a proposal. `Converted` and `Rejected` are terminal.
    ProposalStatus, "proposal status" {
        Submitted => "submitted",
        NeedsReview => "needs_review",
        Approved => "approved",
        Validated => "validated",
        NeedsRevision => "needs_revision",
        Rejected => "rejected",
        Converted => "converted",
    }
);

impl ProposalStatus {
    /// Statuses from which a proposal may become a todo.
    pub fn is_convertible(self) -> bool {
        matches!(self, ProposalStatus::Approved | ProposalStatus::Validated)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProposalStatus::Converted | ProposalStatus::Rejected)
    }
}

keyword_enum!(
    /// Decision a reviewer can record on a proposal.
    ReviewOutcome, "review decision" {
        Approved => "approved",
        NeedsRevision => "needs_revision",
        Rejected => "rejected",
    }
);

impl From<ReviewOutcome> for ProposalStatus {
    fn from(outcome: ReviewOutcome) -> Self {
        match outcome {
            ReviewOutcome::Approved => ProposalStatus::Approved,
            ReviewOutcome::NeedsRevision => ProposalStatus::NeedsRevision,
            ReviewOutcome::Rejected => ProposalStatus::Rejected,
        }
    }
}

keyword_enum!(
    TodoStatus, "todo status" {
        Todo => "todo",
        InProgress => "in_progress",
        Done => "done",
    }
);

keyword_enum!(
    /// Todo priority. Ordering of `rank` is urgent first.
    Priority, "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
);

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

keyword_enum!(
    Impact, "impact" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
);

impl Impact {
    /// Todo priority a proposal of this impact turns into.
    pub fn priority(self) -> Priority {
        match self {
            Impact::Low => Priority::Low,
            Impact::Medium => Priority::Medium,
            Impact::High => Priority::High,
            Impact::Critical => Priority::Urgent,
        }
    }
}

keyword_enum!(
    Effort, "effort" {
        Low => "low",
        Medium => "medium",
        High => "high",
        VeryHigh => "very_high",
    }
);

keyword_enum!(
    DiscussionStatus, "discussion status" {
        Open => "open",
        Closed => "closed",
    }
);

keyword_enum!(
    ToolStatus, "tool status" {
        Active => "active",
        Disabled => "disabled",
    }
);

keyword_enum!(
    SessionStatus, "session status" {
        Active => "active",
        Ended => "ended",
    }
);

keyword_enum!(
    /// Outcome of running an external command.
    ExecutionStatus, "execution status" {
        Success => "success",
        Failed => "failed",
        Timeout => "timeout",
        Error => "error",
    }
);

keyword_enum!(
    Grade, "grade" {
        A => "a",
        B => "b",
        C => "c",
        D => "d",
        F => "f",
    }
);

impl Grade {
    pub fn from_score(score: i64) -> Self {
        match score {
            s if s >= 90 => Grade::A,
            s if s >= 80 => Grade::B,
            s if s >= 70 => Grade::C,
            s if s >= 60 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Grade::A => 'A',
            Grade::B => 'B',
            Grade::C => 'C',
            Grade::D => 'D',
            Grade::F => 'F',
        }
    }

    pub fn is_poor(self) -> bool {
        matches!(self, Grade::D | Grade::F)
    }
}

keyword_enum!(
    Severity, "severity" {
        Warning => "warning",
        Critical => "critical",
    }
);

keyword_enum!(
    /// Direction of a metric over a recent window.
    Trend, "trend" {
        Improving => "improving",
        Stable => "stable",
        Degrading => "degrading",
    }
);

keyword_enum!(
    /// Run order of a maintenance task.
    TaskPriority, "task priority" {
        High => "high",
        Normal => "normal",
        Low => "low",
    }
);

keyword_enum!(
    /// Overall result of a workspace health check.
    HealthStatus, "health status" {
        Healthy => "healthy",
        Warning => "warning",
        Critical => "critical",
    }
);

keyword_enum!(
    ComplexityLevel, "complexity level" {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

impl ComplexityLevel {
    pub fn from_score(score: i64) -> Self {
        match score {
            s if s < 50 => ComplexityLevel::Low,
            s if s < 150 => ComplexityLevel::Medium,
            _ => ComplexityLevel::High,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_parse_case_insensitively() {
        assert_eq!("Needs_Review".parse::<ProposalStatus>(), Ok(ProposalStatus::NeedsReview));
        assert_eq!("very_high".parse::<Effort>(), Ok(Effort::VeryHigh));
        let err = "sometime".parse::<Priority>().expect_err("unknown priority");
        assert!(err.to_string().contains("low, medium, high, urgent"));
    }

    #[test]
    fn grade_bands() {
        assert_eq!(Grade::from_score(95), Grade::A);
        assert_eq!(Grade::from_score(80), Grade::B);
        assert_eq!(Grade::from_score(79), Grade::C);
        assert_eq!(Grade::from_score(60), Grade::D);
        assert_eq!(Grade::from_score(12), Grade::F);
    }

    #[test]
    fn complexity_levels() {
        assert_eq!(ComplexityLevel::from_score(49), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_score(50), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_score(150), ComplexityLevel::High);
    }

    #[test]
    fn critical_impact_becomes_urgent() {
        assert_eq!(Impact::Critical.priority(), Priority::Urgent);
        assert!(Priority::Urgent.rank() < Priority::Low.rank());
    }
}
