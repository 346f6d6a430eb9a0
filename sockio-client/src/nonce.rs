//! Cache-busting nonces for polling requests
//!
//! Millisecond timestamps written in the 64-character URL-safe alphabet,
//! bumped when two calls land in the same millisecond so every value is
//! strictly greater than the previous one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const ALPHABET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

static LAST: AtomicU64 = AtomicU64::new(0);

/// Encode a number in the nonce alphabet
pub fn encode(mut value: u64) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(ALPHABET[(value % 64) as usize]);
        value /= 64;
        if value == 0 {
            break;
        }
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Next nonce for this process
pub fn next() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let mut previous = LAST.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(previous + 1);
        match LAST.compare_exchange_weak(previous, candidate, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return encode(candidate),
            Err(actual) => previous = actual,
        }
    }
}
