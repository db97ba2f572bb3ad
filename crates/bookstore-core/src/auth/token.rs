//! Credential token inspection.
//!
//! Tokens are JWTs. The client never verifies the signature (the backend
//! does); it only reads the `exp` claim from the payload segment to know
//! when the session has to be dropped.

use std::time::Duration;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

const MILLIS_PER_SECOND: i64 = 1000;

/// Standard alphabet, padding optional. URL-safe input is mapped onto it
/// before decoding so both alphabets are accepted.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Expiry of `token` in milliseconds since the Unix epoch.
///
/// Returns `None` when the token is malformed, the payload is not JSON,
/// or `exp` is missing, non-numeric, not positive, or too large to be a
/// representable timestamp.
pub fn decode_expiry(token: &str) -> Option<i64> {
    let claims = decode_claims(token)?;
    let exp = claims.get("exp")?;

    let millis = match exp.as_i64() {
        Some(seconds) => seconds.checked_mul(MILLIS_PER_SECOND)?,
        None => {
            let millis = exp.as_f64()? * MILLIS_PER_SECOND as f64;
            // `as` saturates, so out-of-range floats must be rejected first
            if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
                return None;
            }
            millis as i64
        }
    };

    if millis <= 0 || DateTime::from_timestamp_millis(millis).is_none() {
        return None;
    }
    Some(millis)
}

/// `decode_expiry` as a timestamp.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    decode_expiry(token).and_then(DateTime::from_timestamp_millis)
}

/// Payload claims of `token`, if it has a decodable JSON object payload.
pub fn decode_claims(token: &str) -> Option<Map<String, Value>> {
    let payload = token.split('.').nth(1)?;
    let normalized: String = payload
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    let bytes = match PAYLOAD_ENGINE.decode(normalized.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Token payload is not base64");
            return None;
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Some(claims),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Token payload is not JSON");
            None
        }
    }
}

/// Time left until `expires_at_ms`, clamped at zero.
pub fn delay_until(expires_at_ms: i64, now_ms: i64) -> Duration {
    let remaining = expires_at_ms.saturating_sub(now_ms).max(0);
    Duration::from_millis(remaining as u64)
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
