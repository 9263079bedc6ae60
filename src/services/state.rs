//! CSRF state guard for the OAuth handshake.
//!
//! The state value rides to the provider and back in the `state`
//! parameter while a copy is held in a short-lived HTTP-only cookie. The
//! callback compares the two in constant time and removes the cookie
//! whatever the outcome, so a binding validates at most once.

use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// Handshake bindings (state + return-path cookies) live this long.
pub const HANDSHAKE_TTL_MINUTES: i64 = 10;

/// Generate a handshake state value with 128 bits of entropy.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Require exact equality between the presented and stored state.
/// Missing either side is a mismatch, never a pass-through.
pub fn validate_state(presented: Option<&str>, stored: Option<&str>) -> Result<(), AppError> {
    let (presented, stored) = match (presented, stored) {
        (Some(p), Some(s)) if !p.is_empty() && !s.is_empty() => (p, s),
        _ => return Err(AppError::StateMismatch),
    };

    if bool::from(presented.as_bytes().ct_eq(stored.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::StateMismatch)
    }
}
