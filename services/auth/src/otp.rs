//! One-time verification codes
//!
//! Signup (or an explicit request) issues a 6-digit numeric code the user
//! must echo back to prove email ownership. A code is valid for five
//! minutes from issuance and is cleared on first successful use.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Minutes a code stays valid after issuance.
pub const OTP_TTL_MINUTES: i64 = 5;

/// Generate a random 6-digit code.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// Expiry timestamp for a code issued at `issued_at`.
pub fn expiry_from(issued_at: DateTime<Utc>) -> DateTime<Utc> {
    issued_at + Duration::minutes(OTP_TTL_MINUTES)
}

/// A code is expired strictly after its expiry instant.
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at < now
}
