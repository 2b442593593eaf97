// Token inspection
// Pure claim decoding and expiry checks, no I/O

use base64::Engine;
use chrono::{DateTime, Utc};

use super::types::Claims;

/// Decode the payload segment of an access token
///
/// Returns None for anything that is not a three-segment token carrying a
/// base64url JSON payload. Callers treat an undecodable token as expired;
/// malformation is never surfaced as an error.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    let _signature = segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Check whether the token is expired or within `buffer_ms` of expiring
pub fn is_expired(token: &str, buffer_ms: i64) -> bool {
    is_expired_at(token, buffer_ms, Utc::now())
}

/// Expiry check against an explicit "now"
///
/// A token with no decodable claims or no `exp` claim counts as expired.
pub fn is_expired_at(token: &str, buffer_ms: i64, now: DateTime<Utc>) -> bool {
    let Some(claims) = decode(token) else {
        return true;
    };
    let Some(exp) = claims.exp else {
        return true;
    };
    // An exp claim too large for millisecond math is garbage, not a token
    // valid until the year 292 billion
    let Some(threshold_ms) = exp
        .checked_mul(1000)
        .and_then(|exp_ms| exp_ms.checked_sub(buffer_ms))
    else {
        return true;
    };
    now.timestamp_millis() >= threshold_ms
}
