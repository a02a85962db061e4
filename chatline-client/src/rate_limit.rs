//! Rate-limit snapshot.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

const REMAINING_REQUESTS: &str = "x-ratelimit-remaining-requests";
const REMAINING_TOKENS: &str = "x-ratelimit-remaining-tokens";
const RESET_REQUESTS: &str = "x-ratelimit-reset-requests";

/// Rate-limit counters reported with the last successful response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    /// Requests left in the current window.
    pub remaining_requests: u64,
    /// Tokens left in the current window.
    pub remaining_tokens: u64,
    /// When the request window resets, as sent by the server.
    pub reset_at: Option<String>,
}

impl RateLimitSnapshot {
    /// Read the snapshot from response headers.
    ///
    /// Missing or unparsable counters read as 0; a missing reset is `None`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            remaining_requests: leading_integer(header_str(headers, REMAINING_REQUESTS)),
            remaining_tokens: leading_integer(header_str(headers, REMAINING_TOKENS)),
            reset_at: header_str(headers, RESET_REQUESTS)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Parse the leading decimal digits of a header value (`"59ms"` reads 59).
fn leading_integer(value: Option<&str>) -> u64 {
    let Some(value) = value else {
        return 0;
    };
    let digits: &str = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value, |end| &value[..end]);
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(REMAINING_REQUESTS, HeaderValue::from_static("59"));
        headers.insert(REMAINING_TOKENS, HeaderValue::from_static("149000"));
        headers.insert(RESET_REQUESTS, HeaderValue::from_static("1s"));

        assert_eq!(
            RateLimitSnapshot::from_headers(&headers),
            RateLimitSnapshot {
                remaining_requests: 59,
                remaining_tokens: 149_000,
                reset_at: Some("1s".to_string()),
            }
        );
    }

    #[test]
    fn test_missing_headers_default() {
        assert_eq!(
            RateLimitSnapshot::from_headers(&HeaderMap::new()),
            RateLimitSnapshot::default()
        );
    }

    #[rstest]
    #[case("12", 12)]
    #[case(" 7 ", 7)]
    #[case("30abc", 30)]
    #[case("abc", 0)]
    #[case("-5", 0)]
    #[case("", 0)]
    fn test_leading_integer(#[case] raw: &str, #[case] expected: u64) {
        assert_eq!(leading_integer(Some(raw.trim())), expected);
    }
}
