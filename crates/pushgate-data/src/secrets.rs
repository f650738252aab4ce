//! Secret generation and the scrypt password-hash codec.

use rand::RngCore;
use scrypt::Params;
use subtle::ConstantTimeEq;

use crate::error::{DataError, Result};

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const DERIVED_KEY_LEN: usize = 64;
const SALT_LEN: usize = 16;

/// Generate a lowercase hex token from `bytes` random bytes.
#[must_use]
pub fn generate_hex_token(bytes: usize) -> String {
    let mut buffer = vec![0_u8; bytes];
    rand::rng().fill_bytes(&mut buffer);
    hex::encode(buffer)
}

/// Hash a password into the stored `scrypt:<salt_hex>:<dk_hex>` form.
///
/// # Errors
///
/// Returns an error if the scrypt parameters are rejected.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0_u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let derived = derive_key(password, &salt)?;
    Ok(format!("scrypt:{}:{}", hex::encode(salt), hex::encode(derived)))
}

/// Verify a candidate password against a stored hash in constant time.
///
/// # Errors
///
/// Returns an error if the stored hash is structurally invalid.
pub fn verify_password(stored: &str, candidate: &str) -> Result<bool> {
    let mut parts = stored.splitn(3, ':');
    let (scheme, salt_hex, dk_hex) = match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(salt), Some(dk)) => (scheme, salt, dk),
        _ => {
            return Err(DataError::PasswordHash {
                reason: "malformed stored hash",
            });
        }
    };
    if scheme != "scrypt" {
        return Err(DataError::PasswordHash {
            reason: "unsupported hash scheme",
        });
    }
    let salt = hex::decode(salt_hex).map_err(|_| DataError::PasswordHash {
        reason: "invalid salt encoding",
    })?;
    let expected = hex::decode(dk_hex).map_err(|_| DataError::PasswordHash {
        reason: "invalid key encoding",
    })?;
    if expected.len() != DERIVED_KEY_LEN {
        return Err(DataError::PasswordHash {
            reason: "unexpected derived key length",
        });
    }
    let derived = derive_key(candidate, &salt)?;
    Ok(derived.ct_eq(expected.as_slice()).into())
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; DERIVED_KEY_LEN]> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, DERIVED_KEY_LEN).map_err(|_| {
        DataError::PasswordHash {
            reason: "invalid scrypt parameters",
        }
    })?;
    let mut output = [0_u8; DERIVED_KEY_LEN];
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut output).map_err(|_| {
        DataError::PasswordHash {
            reason: "invalid output length",
        }
    })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_tokens_have_requested_width() {
        assert_eq!(generate_hex_token(32).len(), 64);
        assert_eq!(generate_hex_token(12).len(), 24);
        assert_ne!(generate_hex_token(10), generate_hex_token(10));
    }

    #[test]
    fn password_round_trip_verifies() -> Result<()> {
        let stored = hash_password("hunter2")?;
        assert!(stored.starts_with("scrypt:"));
        assert!(verify_password(&stored, "hunter2")?);
        assert!(!verify_password(&stored, "hunter3")?);
        Ok(())
    }

    #[test]
    fn verify_rejects_malformed_hashes() {
        assert!(verify_password("scrypt:zz:zz", "pw").is_err());
        assert!(verify_password("bcrypt:00:00", "pw").is_err());
        assert!(verify_password("scrypt:0011", "pw").is_err());
    }
}
