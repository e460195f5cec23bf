//! Password hashing.
//!
//! PBKDF2-HMAC-SHA256 with a random 16-byte salt. Encoded form:
//! `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`

use crate::error::AuthError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;

/// Default work factor for new hashes
pub const DEFAULT_ITERATIONS: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// Hash with a fresh salt
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt: [u8; SALT_LEN] = rand::random();
        let derived = pbkdf2_sha256(password.as_bytes(), &salt, self.iterations)?;
        Ok(format!(
            "{}${}${}${}",
            SCHEME,
            self.iterations,
            hex::encode(salt),
            hex::encode(derived)
        ))
    }

    /// Check `password` against an encoded hash. The work factor comes from
    /// the encoded value, so hashes survive a configuration change.
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool, AuthError> {
        let mut parts = encoded.split('$');
        let (scheme, iterations, salt, expected) =
            match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(s), Some(i), Some(salt), Some(hash), None) => (s, i, salt, hash),
                _ => return Err(AuthError::Hash("unrecognised hash format".to_string())),
            };
        if scheme != SCHEME {
            return Err(AuthError::Hash(format!("unsupported scheme {}", scheme)));
        }
        let iterations: u32 = iterations
            .parse()
            .map_err(|_| AuthError::Hash("bad iteration count".to_string()))?;
        let salt = hex::decode(salt).map_err(|e| AuthError::Hash(e.to_string()))?;
        let expected = hex::decode(expected).map_err(|e| AuthError::Hash(e.to_string()))?;

        let derived = pbkdf2_sha256(password.as_bytes(), &salt, iterations)?;
        digests_match(&salt, &derived, &expected)
    }
}

/// PBKDF2 with HMAC-SHA256, single output block
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; 32], AuthError> {
    let prf = HmacSha256::new_from_slice(password).map_err(|e| AuthError::Hash(e.to_string()))?;

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u: [u8; 32] = mac.finalize().into_bytes().into();
    let mut result = u;

    for _ in 1..iterations {
        let mut mac = prf.clone();
        mac.update(&u);
        u = mac.finalize().into_bytes().into();
        for (r, b) in result.iter_mut().zip(u.iter()) {
            *r ^= b;
        }
    }
    Ok(result)
}

/// Compare two digests through `Mac::verify_slice`: both are MACed under the
/// salt and the tags checked in constant time.
fn digests_match(salt: &[u8], derived: &[u8], expected: &[u8]) -> Result<bool, AuthError> {
    let keyed = || HmacSha256::new_from_slice(salt).map_err(|e| AuthError::Hash(e.to_string()));

    let mut mac = keyed()?;
    mac.update(expected);
    let tag = mac.finalize().into_bytes();

    let mut mac = keyed()?;
    mac.update(derived);
    Ok(mac.verify_slice(&tag).is_ok())
}
