use num_bigint::BigUint;

use crate::error::{AppError, Result};

/// The fixed width, in hex characters, of an encrypted password field as
/// produced by the portal's own login script.
pub const ENCRYPTED_HEX_LEN: usize = 128;

/// An RSA public key as published by the CAS public-key endpoint.
///
/// The portal encrypts the login password with textbook (unpadded) RSA:
/// the plaintext is hex-encoded, read as a base-16 integer and raised to
/// the public exponent modulo the modulus. No padding scheme is applied.
/// This is cryptographically weak, but it is exactly what the remote login
/// form does, so it must be reproduced bit for bit. Adding PKCS padding
/// here would break the login.
#[cfg_attr(test, derive(Debug))]
pub struct PublicKey {
    n: BigUint,
    e: BigUint,
}

impl PublicKey {
    /// Builds a `PublicKey` from the hexadecimal `modulus` and `exponent`
    /// strings of the portal's public-key JSON.
    ///
    /// # Arguments
    ///
    /// * `modulus` - The modulus as a hex string.
    /// * `exponent` - The public exponent as a hex string.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `PublicKey`.
    pub fn from_hex(modulus: &str, exponent: &str) -> Result<Self> {
        let n = BigUint::parse_bytes(modulus.as_bytes(), 16)
            .ok_or_else(|| AppError::Protocol(format!("failed to set modulus '{}'", modulus)))?;
        let e = BigUint::parse_bytes(exponent.as_bytes(), 16)
            .ok_or_else(|| AppError::Protocol(format!("failed to set exponent '{}'", exponent)))?;

        if n.bits() == 0 {
            return Err(AppError::Protocol("RSA modulus must not be zero".to_string()));
        }

        Ok(Self { n, e })
    }

    /// Encrypts `plaintext` the way the portal's client-side script does:
    /// hex-encode the bytes, interpret the digits as a base-16 integer `m`,
    /// compute `m^e mod n` and render the result as a lowercase hex string
    /// left-padded with `'0'` to [`ENCRYPTED_HEX_LEN`] characters.
    ///
    /// # Arguments
    ///
    /// * `plaintext` - The password to encrypt.
    ///
    /// # Returns
    ///
    /// A `Result` containing the fixed-width hex ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let hex_digits = hex::encode(plaintext.as_bytes());
        // hex::encode only emits valid base-16 digits, so the parse can only
        // come back empty for an empty plaintext, which the portal script
        // treats as zero.
        let m = BigUint::parse_bytes(hex_digits.as_bytes(), 16).unwrap_or_default();

        let c = m.modpow(&self.e, &self.n);
        let encrypted = format!("{:x}", c);

        if encrypted.len() > ENCRYPTED_HEX_LEN {
            // Truncating would silently submit garbage to the portal.
            return Err(AppError::Encryption(format!(
                "RSA ciphertext is {} hex characters, wider than the {}-character form field",
                encrypted.len(),
                ENCRYPTED_HEX_LEN
            )));
        }

        Ok(format!("{:0>width$}", encrypted, width = ENCRYPTED_HEX_LEN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_matches_reference_modpow() {
        // m = hex("ab") = 0x6162 = 24930; 24930^3 mod 0xff = 240 = 0xf0.
        let key = PublicKey::from_hex("ff", "3").unwrap();
        let out = key.encrypt("ab").unwrap();
        assert_eq!(out.len(), ENCRYPTED_HEX_LEN);
        assert!(out.ends_with("f0"));
        assert!(out[..ENCRYPTED_HEX_LEN - 2].chars().all(|c| c == '0'));
    }

    #[test]
    fn encrypt_fermat_fixture() {
        // 65537 is prime, so m^65537 ≡ m (mod 65537) by Fermat's little
        // theorem: hex("a") = 0x61 = 97 encrypts back to 0x61.
        let key = PublicKey::from_hex("10001", "10001").unwrap();
        let out = key.encrypt("a").unwrap();
        assert_eq!(out.len(), ENCRYPTED_HEX_LEN);
        assert!(out.ends_with("61"));
    }

    #[test]
    fn output_is_always_padded_to_fixed_width() {
        // c = 0 for an empty plaintext, padded to a full run of zeros.
        let key = PublicKey::from_hex("ff", "3").unwrap();
        let out = key.encrypt("").unwrap();
        assert_eq!(out, "0".repeat(ENCRYPTED_HEX_LEN));
    }

    #[test]
    fn oversized_ciphertext_fails_loudly() {
        // e = 1 keeps c = m; 65 plaintext bytes make 130 hex digits, wider
        // than the 128-character field.
        let modulus = "f".repeat(140);
        let key = PublicKey::from_hex(&modulus, "1").unwrap();
        let plaintext = "x".repeat(65);
        let err = key.encrypt(&plaintext).unwrap_err();
        assert!(matches!(err, AppError::Encryption(_)));
    }

    #[test]
    fn non_hex_key_material_is_a_protocol_error() {
        assert!(matches!(
            PublicKey::from_hex("zz", "3").unwrap_err(),
            AppError::Protocol(_)
        ));
        assert!(matches!(
            PublicKey::from_hex("ff", "zz").unwrap_err(),
            AppError::Protocol(_)
        ));
    }

    #[test]
    fn zero_modulus_is_rejected() {
        assert!(matches!(
            PublicKey::from_hex("0", "3").unwrap_err(),
            AppError::Protocol(_)
        ));
    }
}
