//! Rotating check-in codes.
//!
//! A code is derived from the session secret and the 30-second window the
//! clock falls in, so nothing rotating is ever stored. Every active session
//! shares the same 6-digit space; a submitted code carries no session id and
//! has to be tried against each active secret.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

pub const CODE_PERIOD_MS: i64 = 30_000;
pub const CODE_DIGITS: usize = 6;
const SECRET_BYTES: usize = 32;

/// Per-session HMAC key. Generated once at session start and never changed.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSecret(String);

impl SessionSecret {
    /// 256 bits from the OS RNG, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        SessionSecret(hex::encode(bytes))
    }

    pub fn from_stored(raw: String) -> Self {
        SessionSecret(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

pub fn period_of(time_ms: i64) -> i64 {
    time_ms.div_euclid(CODE_PERIOD_MS)
}

/// `HMAC-SHA256(secret, period)`, first four bytes big-endian, mod 10^6.
pub fn generate(secret: &SessionSecret, time_ms: i64) -> String {
    // HMAC pads or hashes the key, so `new_from_slice` cannot fail for any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_str().as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(period_of(time_ms).to_string().as_bytes());
    let digest = mac.finalize().into_bytes();
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    format!("{:0width$}", head % 1_000_000, width = CODE_DIGITS)
}

/// Accepts the current window and the one before it. Nothing older.
pub fn verify(secret: &SessionSecret, code: &str, now_ms: i64) -> bool {
    code == generate(secret, now_ms) || code == generate(secret, now_ms - CODE_PERIOD_MS)
}

pub fn seconds_until_rotate(now_ms: i64) -> u32 {
    let next_start = (period_of(now_ms) + 1) * CODE_PERIOD_MS;
    let remaining_ms = next_start - now_ms;
    ((remaining_ms + 999) / 1000) as u32
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}
