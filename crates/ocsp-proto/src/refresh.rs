//! Refresh-timing heuristic shared by the scheduler and one-shot tools.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::response::OcspResponse;

/// Decides whether a cached OCSP response should be refreshed now.
///
/// A response needs refreshing when it carries no `nextUpdate`, when it
/// is already expired, or when it would expire before the next check
/// (`period` away). Otherwise it is refreshed once it enters the second
/// half of its validity window — `mtime`, the time of the previous
/// refresh check, tells us whether that transition was already acted
/// upon.
pub fn needs_refresh(resp: &OcspResponse, mtime: Option<DateTime<Utc>>, period: Duration) -> bool {
    needs_refresh_at(resp, mtime, period, Utc::now())
}

/// [`needs_refresh`] against an explicit current time.
pub fn needs_refresh_at(
    resp: &OcspResponse,
    mtime: Option<DateTime<Utc>>,
    period: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(next_update) = resp.next_update else {
        return true;
    };
    if next_update < now {
        return true;
    }
    let expires_before_next_check = chrono::Duration::from_std(period)
        .ok()
        .and_then(|p| now.checked_add_signed(p))
        .map_or(true, |next_check| next_check > next_update);
    if expires_before_next_check {
        return true;
    }
    let halfway = resp.this_update + (next_update - resp.this_update) / 2;
    if halfway > now {
        // Still in the first half of the validity period.
        return false;
    }
    // Refresh only on the first check after the halfway point.
    mtime.map_or(true, |m| halfway > m)
}
