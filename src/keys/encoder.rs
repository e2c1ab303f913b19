//! Deterministic byte encoding of cell values
//!
//! All multi-byte integers are written little-endian. The encoding is part of
//! the surrogate-key contract: changing it changes every key.

use crate::value::Value;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;

/// `0001-01-01T00:00:00`, the origin of the tick count
static TICKS_ORIGIN: Lazy<NaiveDateTime> = Lazy::new(|| {
    chrono::NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
});

const TICKS_PER_SECOND: i64 = 10_000_000;

/// Number of 100ns ticks since `0001-01-01T00:00:00`
pub fn ticks(dt: &NaiveDateTime) -> i64 {
    let delta = dt.signed_duration_since(*TICKS_ORIGIN);
    let whole_seconds = delta.num_seconds();
    let remainder = delta - chrono::Duration::seconds(whole_seconds);
    let sub_ticks = remainder.num_nanoseconds().unwrap_or(0) / 100;
    whole_seconds
        .wrapping_mul(TICKS_PER_SECOND)
        .wrapping_add(sub_ticks)
}

/// Encode a value into the byte sequence fed to the key hash
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Append the encoding of `value` to `out`
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => {}
        Value::Text(s) => out.extend_from_slice(s.as_bytes()),
        Value::DateTime(dt) => out.extend_from_slice(&ticks(dt).to_le_bytes()),
        Value::Int(n) => out.extend_from_slice(&n.to_le_bytes()),
        // flags, lo, mid, hi; each part little-endian
        Value::Decimal(d) => out.extend_from_slice(&d.serialize()),
        Value::Guid(id) => out.extend_from_slice(&id.to_bytes()),
        Value::Float(f) => out.extend_from_slice(&f.to_le_bytes()),
        Value::Bool(_) | Value::Date(_) => {
            out.extend_from_slice(&value.generic_hash32().to_le_bytes())
        }
    }
}
