//! Passcode generation.

use rand::{rngs::OsRng, Rng};

/// Lowest six-digit code; generated codes never need zero padding.
pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

/// Draw a six-digit passcode from the operating system CSPRNG.
///
/// Each call is independent; codes are not predictable from prior outputs.
#[must_use]
pub fn generate() -> u32 {
    OsRng.gen_range(CODE_MIN..=CODE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_stays_in_range() {
        for _ in 0..1_000 {
            let code = generate();
            assert!((CODE_MIN..=CODE_MAX).contains(&code));
        }
    }

    #[test]
    fn generate_is_not_constant() {
        let first = generate();
        let varied = (0..64).map(|_| generate()).any(|code| code != first);
        assert!(varied, "1 in 900000^64 odds say the generator is broken");
    }
}
