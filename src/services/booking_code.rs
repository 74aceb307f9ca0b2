//! Human-readable booking codes of the form `PREFIX-TIMESTAMP36-RANDOM4`,
//! plus the QR payload that wraps a code for scanning.

use std::sync::atomic::{AtomicI64, Ordering};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Last stamp handed out by this process. Stamps are strictly increasing so two
/// codes from one process never share a timestamp segment.
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

pub fn generate(prefix: &str, now_millis: i64) -> String {
    let stamp = next_stamp(now_millis);
    let random = uuid::Uuid::new_v4();
    let suffix: String = random.as_bytes()[..4]
        .iter()
        .map(|b| ALPHABET[(*b as usize) % 36] as char)
        .collect();

    format!("{}-{}-{}", prefix, to_base36(stamp), suffix)
}

fn next_stamp(now_millis: i64) -> i64 {
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let candidate = now_millis.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

fn to_base36(mut n: i64) -> String {
    if n <= 0 {
        return "0".to_string();
    }
    let mut digits = vec![];
    while n > 0 {
        digits.push(ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Upper-cases and trims user input, then checks the three segments.
/// Returns the normalized code.
pub fn normalize(code: &str) -> Option<String> {
    let code = code.trim().to_ascii_uppercase();
    let mut parts = code.split('-');
    let (prefix, stamp, random) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let is_base36 = |s: &str| s.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase());

    let valid = (2..=5).contains(&prefix.len())
        && prefix.bytes().all(|b| b.is_ascii_uppercase())
        && (1..=13).contains(&stamp.len())
        && is_base36(stamp)
        && random.len() == 4
        && is_base36(random);

    valid.then_some(code)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QrPayload {
    pub v: u8,
    pub code: String,
    pub salon_id: String,
}

pub fn encode_qr(code: &str, salon_id: &str) -> anyhow::Result<String> {
    let payload = QrPayload {
        v: 1,
        code: code.to_string(),
        salon_id: salon_id.to_string(),
    };
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?))
}

pub fn decode_qr(payload: &str) -> Option<QrPayload> {
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generated_code_is_well_formed() {
        let code = generate("WLK", 1_750_000_000_000);
        assert!(code.starts_with("WLK-"));
        assert_eq!(normalize(&code), Some(code.clone()));
    }

    #[test]
    fn test_ten_thousand_codes_unique() {
        let now = chrono::Utc::now().timestamp_millis();
        let codes: HashSet<String> = (0..10_000).map(|_| generate("WLK", now)).collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn test_normalize_accepts_lowercase() {
        assert_eq!(normalize(" wlk-lz3k9q-a1b2 "), Some("WLK-LZ3K9Q-A1B2".to_string()));
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("WLK"), None);
        assert_eq!(normalize("WLK-LZ3K9Q"), None);
        assert_eq!(normalize("WLK-LZ3K9Q-A1B"), None);
        assert_eq!(normalize("WLK-LZ3K9Q-A1B2-X"), None);
        assert_eq!(normalize("W1K-LZ3K9Q-A1B2"), None);
        assert_eq!(normalize("WLK-LZ_K9Q-A1B2"), None);
        assert_eq!(normalize("'; DROP TABLE bookings; --"), None);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_qr_payload_decodes() {
        let encoded = encode_qr("WLK-LZ3K9Q-A1B2", "salon-1").unwrap();
        let decoded = decode_qr(&encoded).unwrap();
        assert_eq!(decoded.code, "WLK-LZ3K9Q-A1B2");
        assert_eq!(decoded.salon_id, "salon-1");
        assert!(decode_qr("not base64!").is_none());
    }
}
