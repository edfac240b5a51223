// SPDX-License-Identifier: MIT

//! Credential derivation utilities.
//!
//! Drives accept raw byte credentials; what the host stores and types is
//! policy. The helpers here cover the two common schemes: verbatim
//! password bytes and PBKDF2-HMAC-SHA256 with a per-drive salt.

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};

/// Recommended PBKDF2 iteration floor.
pub const PBKDF2_DEFAULT_ITERATIONS: u32 = 75_000;
/// Derived-key length for C_PIN credentials.
pub const DERIVED_KEY_LEN: usize = 32;

/// A password used verbatim as the credential bytes.
#[must_use]
pub fn password_to_bytes(password: &str) -> Vec<u8> {
    password.as_bytes().to_vec()
}

/// SHA-256 digest.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// PBKDF2-HMAC-SHA256 key derivation.
#[must_use]
pub fn pbkdf2_sha256(password: &str, salt: &[u8], iterations: u32, key_len: usize) -> Vec<u8> {
    let mut key = vec![0u8; key_len];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// Derive a drive credential with the serial number as salt.
#[must_use]
pub fn hash_for_drive(password: &str, serial_number: &str, iterations: u32) -> Vec<u8> {
    pbkdf2_sha256(
        password,
        serial_number.as_bytes(),
        iterations,
        DERIVED_KEY_LEN,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_bytes_are_verbatim() {
        assert_eq!(password_to_bytes("debug"), b"debug".to_vec());
        assert!(password_to_bytes("").is_empty());
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256(b""),
            vec![
                0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99,
                0x6f, 0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95,
                0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55
            ]
        );
    }

    #[test]
    fn pbkdf2_is_deterministic_and_salted() {
        let a = pbkdf2_sha256("password", b"serial-1", 1000, DERIVED_KEY_LEN);
        let b = pbkdf2_sha256("password", b"serial-1", 1000, DERIVED_KEY_LEN);
        let c = pbkdf2_sha256("password", b"serial-2", 1000, DERIVED_KEY_LEN);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), DERIVED_KEY_LEN);
    }

    #[test]
    fn hash_for_drive_uses_serial_as_salt() {
        let direct = pbkdf2_sha256("pw", b"SN12345", 1000, DERIVED_KEY_LEN);
        assert_eq!(hash_for_drive("pw", "SN12345", 1000), direct);
    }
}
