//! Reversible, self-validating public tokens.
//!
//! An internal name such as `3fa9c01b_404img` is sealed with AES-256-GCM under
//! a fixed key and nonce and rendered as unpadded URL-safe base64. The same
//! name always yields the same token, so tokens can be looked up directly,
//! and the authentication tag rejects any token that was not produced by
//! this codec. This is obfuscation, not access control.

use std::fmt;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use imgrelay_core::config::TokenConfig;
use imgrelay_core::{Error, Result};
use rand::{Rng, RngCore};
use serde::Serialize;

/// Suffix appended to every generated base name before encoding.
pub const MARKER: &str = "_404img";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const IV_LEN: usize = 16;

/// Names produced for one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedName {
    /// Random 8 hex character base name.
    pub base: String,
    /// `base[.ext]`, the name used in the cache and on the remote store.
    pub internal_filename: String,
    /// `base` followed by [`MARKER`]; this is what the token encodes.
    pub marked_name: String,
    pub public_token: String,
    /// `public_token[.ext]`, the name handed out in links.
    pub public_filename: String,
}

/// Encoder/decoder for public tokens.
pub struct TokenCodec {
    cipher: Aes256Gcm,
    nonce: [u8; NONCE_LEN],
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from raw key material.
    ///
    /// `iv` must be 12 or 16 bytes; only the first 12 are used as the nonce.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(Error::Config(format!(
                "token.encryption_key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        if iv.len() != NONCE_LEN && iv.len() != IV_LEN {
            return Err(Error::Config(format!(
                "token.encryption_iv must be {NONCE_LEN} or {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::Config(format!("invalid token key: {e}")))?;
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&iv[..NONCE_LEN]);

        Ok(Self { cipher, nonce })
    }

    /// Build a codec from hex-encoded key and IV.
    pub fn from_hex(key: &str, iv: &str) -> Result<Self> {
        let key = hex::decode(key.trim())
            .map_err(|e| Error::Config(format!("token.encryption_key is not valid hex: {e}")))?;
        let iv = hex::decode(iv.trim())
            .map_err(|e| Error::Config(format!("token.encryption_iv is not valid hex: {e}")))?;
        Self::new(&key, &iv)
    }

    pub fn from_config(config: &TokenConfig) -> Result<Self> {
        match (&config.encryption_key, &config.encryption_iv) {
            (Some(key), Some(iv)) => Self::from_hex(key, iv),
            _ => Err(Error::Config(
                "token.encryption_key and token.encryption_iv must both be set".into(),
            )),
        }
    }

    /// Fresh random key (32 bytes) and IV (16 bytes), hex encoded.
    pub fn generate_keys() -> (String, String) {
        let mut rng = rand::thread_rng();
        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut iv);
        (hex::encode(key), hex::encode(iv))
    }

    /// Encode a name into a public token.
    pub fn encode(&self, name: &str) -> Result<String> {
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&self.nonce), name.as_bytes())
            .map_err(|e| Error::Internal(format!("token encryption failed: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Decode a public token back to the name it encodes.
    ///
    /// Any malformed, truncated or tampered token is a validation error.
    pub fn decode(&self, token: &str) -> Result<String> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| Error::Validation("token is not valid base64url".into()))?;
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(&self.nonce), sealed.as_slice())
            .map_err(|_| Error::Validation("token failed authentication".into()))?;
        String::from_utf8(plain).map_err(|_| Error::Validation("token is not valid UTF-8".into()))
    }

    /// Whether `token` decodes to a marked name. Never fails.
    pub fn validate(&self, token: &str) -> bool {
        self.decode(token)
            .map(|name| name.ends_with(MARKER))
            .unwrap_or(false)
    }

    /// Generate a random base name and everything derived from it.
    pub fn generate_name(&self, extension: Option<&str>) -> Result<GeneratedName> {
        let base = hex::encode(rand::thread_rng().gen::<[u8; 4]>());
        let marked_name = format!("{base}{MARKER}");
        let public_token = self.encode(&marked_name)?;

        let (internal_filename, public_filename) = match extension {
            Some(ext) if !ext.is_empty() => {
                (format!("{base}.{ext}"), format!("{public_token}.{ext}"))
            }
            _ => (base.clone(), public_token.clone()),
        };

        Ok(GeneratedName {
            base,
            internal_filename,
            marked_name,
            public_token,
            public_filename,
        })
    }

    /// Drop an optional `.ext` from a public filename. Tokens never contain
    /// a dot, so everything before the first one is the token.
    pub fn strip_extension(public_filename: &str) -> &str {
        public_filename
            .split_once('.')
            .map_or(public_filename, |(token, _)| token)
    }
}
