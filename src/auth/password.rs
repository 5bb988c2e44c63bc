//! Argon2id password hashing with a versioned, self-describing encoding.
//!
//! Hashes are stored as
//! `v=1$t=<time>$m=<memory>$p=<threads>$<base64url(salt)>$<base64url(digest)>`
//! so that every parameter needed for verification travels with the hash
//! itself. Verification re-derives the digest with the parameters parsed
//! from the encoded string, which keeps old hashes verifiable after the
//! defaults below change.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::{AppError, AuthError};

// Cost parameters for newly created hashes. Verification reads the
// parameters out of the encoded string instead of using these.
const ARGON_TIME: u32 = 1;
const ARGON_MEMORY_KIB: u32 = 64 * 1024;
const ARGON_THREADS: u32 = 4;
const ARGON_KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

const VERSION_TAG: u32 = 1;

/// Hash a plaintext password into the versioned encoded form.
///
/// Rejects empty input. A fresh random salt is drawn for every call, so
/// hashing the same plaintext twice never produces the same string.
pub fn hash_password(plain: &str) -> Result<String, AppError> {
    if plain.is_empty() {
        return Err(AuthError::EmptyPassword.into());
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let digest = derive(
        plain.as_bytes(),
        &salt,
        ARGON_TIME,
        ARGON_MEMORY_KIB,
        ARGON_THREADS,
        ARGON_KEY_LEN,
    )
    .map_err(|e| AppError::Internal(format!("argon2: {e}")))?;

    Ok(format!(
        "v={}$t={}$m={}$p={}${}${}",
        VERSION_TAG,
        ARGON_TIME,
        ARGON_MEMORY_KIB,
        ARGON_THREADS,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest),
    ))
}

/// Verify a plaintext password against an encoded hash.
///
/// Never errors: malformed or empty input simply fails verification.
/// The digest comparison is constant-time.
pub fn verify_password(plain: &str, encoded: &str) -> bool {
    if plain.is_empty() || encoded.is_empty() {
        return false;
    }

    let (time, memory, threads, salt, want) = match parse_encoded(encoded) {
        Some(fields) => fields,
        None => return false,
    };

    let got = match derive(plain.as_bytes(), &salt, time, memory, threads, want.len()) {
        Ok(digest) => digest,
        Err(_) => return false,
    };

    got.ct_eq(&want).into()
}

fn derive(
    plain: &[u8],
    salt: &[u8],
    time: u32,
    memory_kib: u32,
    threads: u32,
    key_len: usize,
) -> Result<Vec<u8>, argon2::Error> {
    let params = Params::new(memory_kib, time, threads, Some(key_len))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = vec![0u8; key_len];
    argon2.hash_password_into(plain, salt, &mut out)?;
    Ok(out)
}

/// Split an encoded hash into its parameter, salt, and digest fields.
/// Expects exactly six `$`-separated parts: v=.., t=.., m=.., p=.., salt, digest.
fn parse_encoded(encoded: &str) -> Option<(u32, u32, u32, Vec<u8>, Vec<u8>)> {
    let parts: Vec<&str> = encoded.split('$').collect();
    if parts.len() != 6 {
        return None;
    }

    let version: u32 = parts[0].strip_prefix("v=")?.parse().ok()?;
    if version != VERSION_TAG {
        return None;
    }
    let time: u32 = parts[1].strip_prefix("t=")?.parse().ok()?;
    let memory: u32 = parts[2].strip_prefix("m=")?.parse().ok()?;
    let threads: u32 = parts[3].strip_prefix("p=")?.parse().ok()?;

    let salt = URL_SAFE_NO_PAD.decode(parts[4]).ok()?;
    let digest = URL_SAFE_NO_PAD.decode(parts[5]).ok()?;
    if digest.is_empty() {
        return None;
    }

    Some((time, memory, threads, salt, digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low-cost parameters so the test suite stays fast.
    fn cheap_hash(plain: &str, time: u32, memory: u32, threads: u32) -> String {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let digest = derive(plain.as_bytes(), &salt, time, memory, threads, ARGON_KEY_LEN).unwrap();
        format!(
            "v=1$t={}$m={}$p={}${}${}",
            time,
            memory,
            threads,
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(digest),
        )
    }

    #[test]
    fn hash_then_verify_roundtrip() {
        let encoded = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &encoded));
        assert!(!verify_password("secret2", &encoded));
    }

    #[test]
    fn same_plaintext_hashes_differently() {
        let a = hash_password("secret1").unwrap();
        let b = hash_password("secret1").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("secret1", &a));
        assert!(verify_password("secret1", &b));
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(hash_password("").is_err());
        let encoded = hash_password("secret1").unwrap();
        assert!(!verify_password("", &encoded));
        assert!(!verify_password("secret1", ""));
    }

    #[test]
    fn malformed_encodings_fail_verification() {
        // wrong field count
        assert!(!verify_password("pw", "v=1$t=1$m=1024$p=1$only-five"));
        // wrong prefix
        assert!(!verify_password("pw", "x=1$t=1$m=1024$p=1$AAAA$AAAA"));
        // unknown version
        assert!(!verify_password("pw", "v=2$t=1$m=1024$p=1$AAAA$AAAA"));
        // non-numeric cost
        assert!(!verify_password("pw", "v=1$t=abc$m=1024$p=1$AAAA$AAAA"));
        // invalid base64
        assert!(!verify_password("pw", "v=1$t=1$m=1024$p=1$!!!!$AAAA"));
        // not a hash at all
        assert!(!verify_password("pw", "plainly-not-a-hash"));
    }

    #[test]
    fn tampered_digest_fails_verification() {
        let encoded = cheap_hash("secret1", 1, 1024, 1);
        let mut chars: Vec<char> = encoded.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(!verify_password("secret1", &tampered));
    }

    #[test]
    fn verification_uses_encoded_parameters() {
        // A hash produced under non-default costs must still verify,
        // since the costs are read back out of the string.
        let encoded = cheap_hash("secret1", 2, 2048, 2);
        assert!(verify_password("secret1", &encoded));
        assert!(!verify_password("wrong", &encoded));
    }
}
