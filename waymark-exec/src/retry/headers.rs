use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use httpdate::parse_http_date;

/// Parse a server-requested retry delay out of the response headers.
///
/// The header name comes from the rate-limit policy (`Retry-After` by
/// default) and is matched case-insensitively. The value is either
/// non-negative delta-seconds or an HTTP-date; a date already in the past
/// yields a zero delay.
pub fn parse_retry_after(
    headers: &BTreeMap<String, String>,
    header_name: &str,
    now: SystemTime,
) -> Option<Duration> {
    let v = get_header_ci(headers, header_name)?.trim();
    if let Ok(secs) = v.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let dt = parse_http_date(v).ok()?;
    Some(dt.duration_since(now).unwrap_or(Duration::ZERO))
}

fn get_header_ci<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
