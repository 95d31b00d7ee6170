//! Error types shared by the library modules.
//!
//! The CLI layer wraps these in `anyhow` with extra context; library code
//! returns [`Result`] so callers can match on the failure kind.

use serde::Serialize;

/// Library-level error.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error(transparent)]
    Parse(#[from] ParseValueError),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Illegal proposal status change from '{from}' to '{to}'")]
    Transition { from: String, to: String },

    #[error("Process '{command}' failed: {message}")]
    Process { command: String, message: String },

    #[error("Unsupported workspace schema version {found}; expected {expected}")]
    SchemaVersion { found: i64, expected: i64 },
}

impl WsError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        WsError::NotFound { entity, key: key.to_string() }
    }
}

/// Failure to parse a status or priority keyword.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseValueError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

pub type Result<T> = std::result::Result<T, WsError>;

/// Outcome of a single report metric.
///
/// Report generators compute each metric independently. A metric that has
/// no rows yet, depends on something not set up, or fails outright is kept
/// in the report with its state instead of being dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Reading<T> {
    Ready(T),
    NoData,
    NotConfigured(String),
    Failed(String),
}

impl<T> Reading<T> {
    /// Run a query whose `None` means "no rows yet". Errors are logged and
    /// kept as [`Reading::Failed`].
    pub fn capture(name: &str, f: impl FnOnce() -> Result<Option<T>>) -> Self {
        match f() {
            Ok(Some(value)) => Reading::Ready(value),
            Ok(None) => Reading::NoData,
            Err(e) => {
                tracing::warn!(metric = name, error = %e, "metric reading failed");
                Reading::Failed(e.to_string())
            }
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Reading::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Reading::Failed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        match self {
            Reading::Ready(value) => Reading::Ready(f(value)),
            Reading::NoData => Reading::NoData,
            Reading::NotConfigured(why) => Reading::NotConfigured(why),
            Reading::Failed(why) => Reading::Failed(why),
        }
    }

    /// Human-readable rendering used by the text reports.
    pub fn render(&self, f: impl FnOnce(&T) -> String) -> String {
        match self {
            Reading::Ready(value) => f(value),
            Reading::NoData => "N/A (no data)".to_string(),
            Reading::NotConfigured(why) => format!("not configured: {why}"),
            Reading::Failed(why) => format!("FAILED: {why}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_capture_distinguishes_states() {
        let ready = Reading::capture("a", || Ok(Some(3)));
        let empty: Reading<i32> = Reading::capture("b", || Ok(None));
        let failed: Reading<i32> =
            Reading::capture("c", || Err(WsError::not_found("tool", "git")));

        assert_eq!(ready, Reading::Ready(3));
        assert_eq!(empty, Reading::NoData);
        assert!(failed.is_failed());
        assert_eq!(empty.render(|v| v.to_string()), "N/A (no data)");
        assert!(failed.render(|v| v.to_string()).starts_with("FAILED:"));
    }

    #[test]
    fn reading_serializes_with_state_tag() {
        let json = serde_json::to_value(Reading::Ready(5)).expect("json");
        assert_eq!(json["state"], "ready");
        assert_eq!(json["value"], 5);

        let json = serde_json::to_value(Reading::<i32>::NoData).expect("json");
        assert_eq!(json["state"], "no_data");
    }
}
