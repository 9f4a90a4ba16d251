use std::num::NonZeroU32;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::error::{Error, Result};

const OUTPUT_LEN: usize = 32;
pub const SALT_LEN: usize = 16;

fn check_iterations(iterations: u32) -> Result<NonZeroU32> {
    NonZeroU32::new(iterations)
        .ok_or_else(|| Error::Internal("PBKDF2 iterations must be non-zero".to_string()))
}

/// Derive the stored password hash with a per-account salt.
pub fn hash_password(secret: &[u8], salt: &[u8], iterations: u32) -> Result<Vec<u8>> {
    let iterations = check_iterations(iterations)?;
    let mut out = vec![0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(secret, salt, iterations.get(), &mut out);
    Ok(out)
}

pub fn verify_password_hash(
    secret: &[u8],
    salt: &[u8],
    expected: &[u8],
    iterations: u32,
) -> Result<bool> {
    let iterations = check_iterations(iterations)?;
    if expected.len() != OUTPUT_LEN {
        return Ok(false);
    }

    // Derive and constant-time compare.
    let mut out = vec![0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(secret, salt, iterations.get(), &mut out);
    Ok(subtle::ConstantTimeEq::ct_eq(out.as_ref(), expected).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_right_password() {
        let salt = b"0123456789abcdef";
        let hash = hash_password(b"correct horse", salt, 10).unwrap();

        assert!(verify_password_hash(b"correct horse", salt, &hash, 10).unwrap());
        assert!(!verify_password_hash(b"wrong horse", salt, &hash, 10).unwrap());
        assert!(!verify_password_hash(b"correct horse", b"another-salt....", &hash, 10).unwrap());
        assert!(!verify_password_hash(b"correct horse", salt, &hash[..16], 10).unwrap());
    }

    #[test]
    fn zero_iterations_is_an_error() {
        assert!(hash_password(b"x", b"salt", 0).is_err());
    }
}
