use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AppError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Separates the username from the password inside the token plaintext.
const SEPARATOR: char = ':';

/// A decoded credential pair. Zeroized on drop so the cleartext password
/// does not outlive the request that carried it.
#[derive(Zeroize, ZeroizeOnDrop)]
#[cfg_attr(test, derive(Debug))]
pub struct Credentials {
    /// The portal username (also the student id).
    pub username: String,
    /// The portal password.
    pub password: String,
}

/// Seals and opens credential tokens with AES-256-GCM under the server key.
///
/// The token is the only thing that travels between requests: the server
/// keeps no session or credential state of its own. A token is valid exactly
/// as long as its authentication tag verifies and the embedded credentials
/// still authenticate against the portal.
#[derive(Clone)]
pub struct TokenCodec {
    cipher: Aes256Gcm,
}

impl TokenCodec {
    /// Creates a new `TokenCodec` from the server key.
    ///
    /// # Arguments
    ///
    /// * `key` - The AES-256 key. Must be exactly [`KEY_SIZE`] bytes.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `TokenCodec`.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(AppError::Encryption(format!(
                "token key must be exactly {} bytes, got {}",
                KEY_SIZE,
                key.len()
            )));
        }
        Ok(Self {
            cipher: Aes256Gcm::new(key.into()),
        })
    }

    /// Seals a `(username, password)` pair into a URL-safe token.
    ///
    /// # Arguments
    ///
    /// * `username` - The portal username. Must not contain `':'`.
    /// * `password` - The portal password.
    ///
    /// # Returns
    ///
    /// A `Result` containing the base64 token (`nonce || ciphertext`).
    pub fn encode(&self, username: &str, password: &str) -> Result<String> {
        if username.contains(SEPARATOR) {
            return Err(AppError::Validation(format!(
                "username must not contain '{}'",
                SEPARATOR
            )));
        }

        let mut plaintext = format!("{}{}{}", username, SEPARATOR, password).into_bytes();

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| AppError::Encryption(format!("token encryption failed: {}", e)))?;
        plaintext.zeroize();

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(general_purpose::URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Opens a token back into its credential pair.
    ///
    /// Every malformed input (bad base64, truncation, tag mismatch, missing
    /// separator) comes back as [`AppError::TokenIntegrity`], never as an
    /// empty credential pair.
    ///
    /// # Arguments
    ///
    /// * `token` - The base64 token produced by [`TokenCodec::encode`].
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Credentials`.
    pub fn decode(&self, token: &str) -> Result<Credentials> {
        let sealed = general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| AppError::TokenIntegrity)?;

        if sealed.len() <= NONCE_SIZE {
            return Err(AppError::TokenIntegrity);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce_arr: [u8; NONCE_SIZE] = nonce_bytes
            .try_into()
            .map_err(|_| AppError::TokenIntegrity)?;
        let nonce = Nonce::from(nonce_arr);

        let plaintext = self
            .cipher
            .decrypt(&nonce, ciphertext)
            .map_err(|_| AppError::TokenIntegrity)?;

        let text = String::from_utf8(plaintext).map_err(|_| AppError::TokenIntegrity)?;
        let (username, password) = text.split_once(SEPARATOR).ok_or(AppError::TokenIntegrity)?;

        Ok(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}
