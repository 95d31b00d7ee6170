//! Shared CLI utilities.

use anyhow::Result;
use serde::Serialize;

/// Parse a comma-separated string into a `Vec<String>`, trimming whitespace and
/// discarding empty segments.  Returns an empty list when `value` is `None`.
pub fn parse_csv(value: &Option<String>) -> Vec<String> {
    value
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| part.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse an optional JSON argument.
pub fn parse_json(value: Option<&str>) -> Result<Option<serde_json::Value>> {
    value
        .map(|raw| serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid JSON '{}': {}", raw, e)))
        .transpose()
}

/// First line of `text`, cut to `max` characters.
pub fn preview(text: &str, max: usize) -> String {
    let first = text.lines().next().unwrap_or_default();
    let cut = crate::store::truncate(first, max);
    if cut.len() < text.len() {
        format!("{cut}…")
    } else {
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_trims_and_drops_empty_parts() {
        assert_eq!(parse_csv(&Some(" a, ,b ".to_string())), vec!["a", "b"]);
        assert!(parse_csv(&None).is_empty());
    }

    #[test]
    fn preview_marks_truncation() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("line one\nline two", 20), "line one…");
        assert_eq!(preview("abcdefghij", 4), "abcd…");
    }
}
