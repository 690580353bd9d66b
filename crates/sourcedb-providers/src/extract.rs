//! Defensive extraction helpers for the raw JSON payloads the scraper
//! providers return. Field names drift between actor versions, so every
//! lookup takes an ordered list of candidate paths and the first usable
//! value wins.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Walk a dot-separated path into a JSON value. Numeric segments index into
/// arrays, e.g. `"edges.0.node.text"`.
#[must_use]
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// First non-empty string among the candidate paths. Numbers are rendered
/// as strings; empty and whitespace-only strings are skipped.
#[must_use]
pub fn pick_str(value: &Value, paths: &[&str]) -> String {
    for path in paths {
        match lookup(value, path) {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    String::new()
}

/// First usable engagement count among the candidate paths. Accepts JSON
/// numbers and numeric strings; anything else counts as absent. Defaults
/// to zero.
#[must_use]
pub fn pick_count(value: &Value, paths: &[&str]) -> i64 {
    for path in paths {
        match lookup(value, path) {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return i;
                }
                if let Some(f) = n.as_f64() {
                    #[allow(clippy::cast_possible_truncation)]
                    return f as i64;
                }
            }
            Some(Value::String(s)) => {
                if let Ok(i) = s.trim().parse::<i64>() {
                    return i;
                }
            }
            _ => {}
        }
    }
    0
}

/// Coerce the mess of provider timestamp encodings into UTC.
///
/// - integers and all-digit strings are Unix timestamps: 10 digits means
///   seconds, anything longer means milliseconds;
/// - other strings are tried as RFC 3339;
/// - everything else is treated as absent.
#[must_use]
pub fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => from_unix(n.as_i64()?),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if s.chars().all(|c| c.is_ascii_digit()) {
                return from_unix(s.parse::<i64>().ok()?);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .ok()
        }
        _ => None,
    }
}

/// First parseable timestamp among the candidate paths.
#[must_use]
pub fn pick_timestamp(value: &Value, paths: &[&str]) -> Option<DateTime<Utc>> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(coerce_timestamp)
}

fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    let millis = if ts.to_string().len() == 10 {
        ts.checked_mul(1000)?
    } else {
        ts
    };
    DateTime::from_timestamp_millis(millis)
}

/// Truncate to at most `max` characters, respecting char boundaries.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pick_str_takes_first_non_empty() {
        let v = json!({"a": "", "b": "  ", "c": "hello", "d": "later"});
        assert_eq!(pick_str(&v, &["a", "b", "c", "d"]), "hello");
    }

    #[test]
    fn pick_str_walks_nested_paths() {
        let v = json!({"authorMeta": {"uniqueId": "someone"}});
        assert_eq!(pick_str(&v, &["username", "authorMeta.uniqueId"]), "someone");
    }

    #[test]
    fn pick_str_indexes_arrays() {
        let v = json!({"edges": [{"node": {"text": "caption text"}}]});
        assert_eq!(pick_str(&v, &["edges.0.node.text"]), "caption text");
    }

    #[test]
    fn pick_str_missing_yields_empty() {
        let v = json!({"a": null});
        assert_eq!(pick_str(&v, &["a", "b.c"]), "");
    }

    #[test]
    fn pick_count_accepts_numbers_and_numeric_strings() {
        assert_eq!(pick_count(&json!({"likes": 42}), &["likes"]), 42);
        assert_eq!(pick_count(&json!({"likes": "42"}), &["likes"]), 42);
        assert_eq!(pick_count(&json!({"likes": "n/a"}), &["likes"]), 0);
        assert_eq!(pick_count(&json!({}), &["likes"]), 0);
    }

    #[test]
    fn coerce_timestamp_handles_seconds_and_millis() {
        let secs = coerce_timestamp(&json!(1_700_000_000)).unwrap();
        let millis = coerce_timestamp(&json!(1_700_000_000_000_i64)).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs.timestamp(), 1_700_000_000);

        let from_str = coerce_timestamp(&json!("1700000000")).unwrap();
        assert_eq!(from_str, secs);
    }

    #[test]
    fn coerce_timestamp_parses_rfc3339() {
        let t = coerce_timestamp(&json!("2024-05-01T12:00:00Z")).unwrap();
        assert_eq!(t.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn coerce_timestamp_rejects_garbage() {
        assert!(coerce_timestamp(&json!("not a date")).is_none());
        assert!(coerce_timestamp(&json!(null)).is_none());
        assert!(coerce_timestamp(&json!("")).is_none());
        assert!(coerce_timestamp(&json!({"nested": true})).is_none());
    }

    #[test]
    fn pick_timestamp_skips_unparseable_candidates() {
        let v = json!({"createTime": "oops", "timestamp": 1_700_000_000});
        let t = pick_timestamp(&v, &["createTime", "timestamp"]).unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("短视频内容标题", 3), "短视频");
        assert_eq!(truncate_chars("abc", 80), "abc");
    }
}
