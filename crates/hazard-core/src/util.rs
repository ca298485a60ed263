//! Small helpers shared by config parsing and the record stores.

const DIAGNOSTIC_CHARS: usize = 180;

/// Trimmed text, or `None` when nothing but whitespace remains.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_owned)
}

/// Clip a payload so it can be quoted in an error message.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(DIAGNOSTIC_CHARS).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
