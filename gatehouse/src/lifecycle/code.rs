//! Verification codes handed to approved visitors.

use rand::prelude::RngExt;
use rand::rng;

/// Smallest code issued, so every code has exactly four digits
pub const CODE_MIN: u16 = 1000;
pub const CODE_MAX: u16 = 9999;

/// Draw a fresh 4-digit code.
///
/// Codes are not unique across visitors; a guard always checks one against a specific
/// visitor id.
pub fn generate_code() -> String {
    rng().random_range(CODE_MIN..=CODE_MAX).to_string()
}

/// Whether `code` has the shape of an issued code
pub fn is_well_formed(code: &str) -> bool {
    code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit())
}
