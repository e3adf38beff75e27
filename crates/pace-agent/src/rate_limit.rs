use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Suggested wait when the provider gives no hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

const RATE_LIMIT_CODES: &[&str] = &[
    "rate_limit",
    "rate_limit_error",
    "rate_limit_exceeded",
    "overloaded_error",
    "RESOURCE_EXHAUSTED",
];

const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "overloaded",
    "quota exceeded",
];

static STATUS_429_RE: OnceLock<Regex> = OnceLock::new();

/// `429` as a status: leading the message or following an HTTP/status/code
/// label. Bare digits elsewhere ("line 4290", "id 1429") do not count.
fn status_429() -> &'static Regex {
    STATUS_429_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^\s*|\b(?:http(?:/[\d.]+)?|status(?:\s+code)?|error|code)\W{0,3})429\b")
            .unwrap()
    })
}

/// A provider error recognised as rate limiting. Informational only; nothing
/// schedules a retry from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub retry_after: Duration,
    /// `true` when `retry_after` came from the error itself.
    pub hinted: bool,
}

impl RateLimitInfo {
    /// Classify an error from its HTTP status, message and provider code.
    pub fn detect(status: Option<u16>, message: &str, code: Option<&str>) -> Option<Self> {
        let lower = message.to_lowercase();
        let by_status = status == Some(429);
        let by_code = code.is_some_and(|c| RATE_LIMIT_CODES.contains(&c));
        let by_message = status_429().is_match(message)
            || RATE_LIMIT_PHRASES.iter().any(|p| lower.contains(p))
            || RATE_LIMIT_CODES.iter().any(|c| message.contains(c));

        if !(by_status || by_code || by_message) {
            return None;
        }
        let hint = extract_retry_after(&lower);
        Some(Self {
            retry_after: hint.unwrap_or(DEFAULT_RETRY_AFTER),
            hinted: hint.is_some(),
        })
    }

    pub fn suggestion(&self) -> String {
        format!(
            "rate limited by the agent provider; consider waiting {}s before retrying",
            self.retry_after.as_secs()
        )
    }
}

fn extract_retry_after(lower: &str) -> Option<Duration> {
    for pattern in ["retry after ", "retry-after: ", "retry_after=", "retry in "] {
        if let Some(idx) = lower.find(pattern) {
            let digits: String = lower[idx + pattern.len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(secs) = digits.parse() {
                return Some(Duration::from_secs(secs));
            }
        }
    }
    None
}
