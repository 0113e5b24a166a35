//! HTTP cache metadata extraction for OCSP exchanges.
//!
//! OCSP responders sit behind ordinary HTTP caches, so the freshness of
//! a fetched response is bounded both by the OCSP `nextUpdate` field and
//! by the HTTP caching headers (`Cache-Control`, `Expires`, `Date`).
//! This module derives a single absolute expiry instant from those
//! headers and extracts the `ETag`/`Last-Modified` validators used for
//! conditional refetches.

use chrono::{DateTime, NaiveDateTime, Utc};
use http::header::{HeaderMap, CACHE_CONTROL, DATE, EXPIRES, LAST_MODIFIED};

/// Derives the absolute instant at which the HTTP cache entry expires.
///
/// Rules, in order:
/// - any `no-cache` or `max-age=0` directive expires the entry at the
///   server date;
/// - otherwise the smallest non-negative `max-age=N` yields
///   `server date + N seconds`;
/// - otherwise a parseable `Expires` header is used verbatim;
/// - otherwise there is no HTTP expiry (`None`).
///
/// The server date is the `Date` header when present and well-formed,
/// `now` otherwise.
pub fn max_age(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut cache_control = headers.get_all(CACHE_CONTROL).iter().peekable();
    if cache_control.peek().is_some() {
        let date = server_date(headers, now);
        let mut min_age: Option<i64> = None;
        for value in cache_control {
            let Ok(value) = value.to_str() else { continue };
            let mut rest = value;
            while !rest.is_empty() {
                let (key, val, tail) = consume_directive(rest);
                rest = tail;
                match key.as_str() {
                    "max-age" => {
                        if let Ok(n) = val.parse::<i64>() {
                            if n == 0 {
                                return Some(date);
                            }
                            if n > 0 && min_age.map_or(true, |m| n < m) {
                                min_age = Some(n);
                            }
                        }
                    }
                    "no-cache" => return Some(date),
                    _ => {}
                }
            }
        }
        if let Some(n) = min_age {
            return Some(date + chrono::Duration::seconds(n));
        }
    }
    headers
        .get(EXPIRES)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
}

/// The `Date` header, falling back to `now` when absent or malformed.
fn server_date(headers: &HeaderMap, now: DateTime<Utc>) -> DateTime<Utc> {
    headers
        .get(DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
        .unwrap_or(now)
}

/// The `Last-Modified` header as an instant, `None` on absence or
/// parse failure.
pub fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
}

/// Consumes one `Cache-Control` directive from `s`.
///
/// Returns the case-folded directive name, its (possibly quoted) value,
/// and the remainder of the header value. A malformed tail (a value not
/// followed by `,`) truncates the remainder, silently dropping whatever
/// follows.
fn consume_directive(s: &str) -> (String, &str, &str) {
    let (key, mut rest) = consume_key(s);
    let mut value = "";
    if let Some(tail) = rest.strip_prefix('=') {
        let (v, r) = consume_value(tail.trim_start());
        value = v;
        rest = r;
    }
    match rest.strip_prefix(',') {
        Some(tail) => (key, value, tail),
        None => (key, value, ""),
    }
}

fn consume_key(s: &str) -> (String, &str) {
    match s.find([',', '=']) {
        Some(i) => (s[..i].trim().to_ascii_lowercase(), &s[i..]),
        None => (s.trim().to_ascii_lowercase(), ""),
    }
}

fn consume_value(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    if !s.starts_with('"') {
        return match s.find(',') {
            Some(i) => (s[..i].trim(), &s[i..]),
            None => (s, ""),
        };
    }
    // Quoted string with backslash quoted-pairs. The raw content is
    // returned without unescaping, as consumers only care about simple
    // token values.
    let mut in_quoted_pair = false;
    for (i, c) in s[1..].char_indices() {
        match c {
            '\\' if !in_quoted_pair => in_quoted_pair = true,
            _ if in_quoted_pair => in_quoted_pair = false,
            '"' => return (&s[1..=i], s[i + 2..].trim_start()),
            _ => {}
        }
    }
    // Unterminated quoted string.
    (s, "")
}

/// Parses an HTTP date in any of the three formats admitted by
/// RFC 7231: IMF-fixdate (RFC 1123), the obsolete RFC 850 form, and
/// ANSI C `asctime()`.
pub fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc2822(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(t.and_utc());
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%a %b %e %H:%M:%S %Y") {
        return Some(t.and_utc());
    }
    None
}

/// Formats an instant as an IMF-fixdate for use in request headers.
pub fn format_http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
