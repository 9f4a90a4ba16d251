use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Datelike, Utc};
use getrandom::fill;

use crate::error::{Error, Result};

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

pub fn ts_to_rfc3339(ts: i64) -> String {
    ts_to_datetime(ts).to_rfc3339()
}

/// `dd/mm/yyyy`, as rendered in exports.
pub fn ts_to_fr_date(ts: i64) -> String {
    ts_to_datetime(ts).format("%d/%m/%Y").to_string()
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    fill(&mut out).map_err(|e| Error::Internal(format!("failed to generate random bytes: {e}")))?;
    Ok(out)
}

fn hex_encode(bytes: &[u8]) -> String {
    const LUT: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(LUT[(b >> 4) as usize] as char);
        out.push(LUT[(b & 0x0f) as usize] as char);
    }
    out
}

pub fn generate_session_token() -> Result<String> {
    // 256-bit, URL-safe so it fits in a cookie unquoted.
    Ok(URL_SAFE_NO_PAD.encode(random_bytes(32)?))
}

pub fn uuid_v4() -> Result<String> {
    let mut b = random_bytes(16)?;

    // Set version = 4.
    b[6] = (b[6] & 0x0f) | 0x40;
    // Set variant = RFC4122.
    b[8] = (b[8] & 0x3f) | 0x80;

    let hex = hex_encode(&b);
    Ok(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

/// Integer percentage rounded half up, 0 when `total` is 0.
pub fn percent(part: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (2 * part * 100 + total) / (2 * total)
}
