//! Small helpers shared by the queue, sync and configuration code.

const BODY_EXCERPT_CHARS: usize = 180;

/// Trimmed text, or `None` when only whitespace is left
pub fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Log server base URL: trimmed, `http://` or `https://` only, no trailing slash
pub fn server_base_url(value: &str) -> Option<String> {
    let value = value.trim().trim_end_matches('/');
    let host = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))?;
    (!host.is_empty()).then(|| value.to_string())
}

/// Start of a response body on one line, for error messages
pub fn body_excerpt(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(BODY_EXCERPT_CHARS)
        .collect()
}

/// Unix time in milliseconds, the unit of every log timestamp
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_blank_trims_and_rejects_whitespace() {
        assert_eq!(non_blank("  store-1 "), Some("store-1".to_string()));
        assert_eq!(non_blank(" \t\n"), None);
    }

    #[test]
    fn server_base_url_requires_scheme_and_host() {
        assert_eq!(
            server_base_url(" https://logs.example.com/ "),
            Some("https://logs.example.com".to_string())
        );
        assert_eq!(
            server_base_url("http://127.0.0.1:8080"),
            Some("http://127.0.0.1:8080".to_string())
        );
        assert_eq!(server_base_url("logs.example.com"), None);
        assert_eq!(server_base_url("ftp://logs.example.com"), None);
        assert_eq!(server_base_url("https://"), None);
    }

    #[test]
    fn body_excerpt_is_single_line_and_bounded() {
        assert_eq!(body_excerpt("  bad\n gateway  "), "bad gateway");
        assert_eq!(body_excerpt(&"x".repeat(400)).len(), BODY_EXCERPT_CHARS);
    }

    #[test]
    fn timestamps_are_in_milliseconds() {
        // Any time after 2001 has 13 digits in milliseconds
        assert!(unix_millis_now() > 1_000_000_000_000);
    }
}
