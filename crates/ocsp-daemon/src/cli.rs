//! Shared command-line helpers for the two binaries.

use std::time::Duration;

/// Parses durations of the form `300`, `90s`, `5m`, `12h`, or
/// concatenations like `1h30m`. A bare number means seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut number = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration: {s}"))?;
        number.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            _ => return Err(format!("invalid duration unit {c:?} in {s:?}")),
        };
        total += Duration::from_secs(value * unit);
    }
    if !number.is_empty() {
        return Err(format!("missing unit in duration {s:?}"));
    }
    Ok(total)
}
