use crate::error::CodecError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use rand::RngCore;
use tinylink_core::UserId;

/// AES-128 key length in bytes.
pub const KEY_LEN: usize = 16;
/// GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Server-held symmetric key. Generated once per process unless supplied.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_LEN]);

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey([REDACTED])")
    }
}

impl SessionKey {
    /// Draws a key from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

/// Encrypts user ids into session tokens and back.
#[derive(Clone)]
pub struct SessionCodec {
    cipher: Aes128Gcm,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}

impl SessionCodec {
    pub fn new(key: &SessionKey) -> Self {
        Self {
            cipher: Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&key.0)),
        }
    }

    /// Returns `hex(nonce || ciphertext)` using a fresh random nonce.
    pub fn encrypt(&self, user: &UserId) -> Result<String, CodecError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), user.as_str().as_bytes())
            .map_err(|_| CodecError::Encryption)?;

        let mut token = Vec::with_capacity(NONCE_LEN + sealed.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&sealed);
        Ok(hex::encode(token))
    }

    /// Decodes a token produced by [`encrypt`](Self::encrypt) under the same key.
    pub fn decrypt(&self, token: &str) -> Result<UserId, CodecError> {
        let raw = hex::decode(token).map_err(|_| CodecError::InvalidHex)?;
        if raw.len() < NONCE_LEN {
            return Err(CodecError::Truncated);
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CodecError::Authentication)?;

        String::from_utf8(plaintext)
            .map(UserId::new)
            .map_err(|_| CodecError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn codec(byte: u8) -> SessionCodec {
        SessionCodec::new(&SessionKey::from_bytes([byte; KEY_LEN]))
    }

    #[test]
    fn round_trip() {
        let codec = codec(1);
        let user = UserId::mint();
        let token = codec.encrypt(&user).unwrap();
        assert_eq!(codec.decrypt(&token).unwrap(), user);
    }

    #[test]
    fn token_layout_is_hex_nonce_and_ciphertext() {
        let token = codec(1).encrypt(&UserId::new("abc")).unwrap();
        let raw = hex::decode(&token).unwrap();
        // nonce + plaintext + 16-byte GCM tag
        assert_eq!(raw.len(), NONCE_LEN + 3 + 16);
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let codec = codec(1);
        let user = UserId::new("same-user");
        assert_ne!(codec.encrypt(&user).unwrap(), codec.encrypt(&user).unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let token = codec(1).encrypt(&UserId::mint()).unwrap();
        assert_eq!(codec(2).decrypt(&token), Err(CodecError::Authentication));
    }

    #[test]
    fn bad_hex_fails() {
        assert_eq!(codec(1).decrypt("zz-not-hex"), Err(CodecError::InvalidHex));
    }

    #[test]
    fn truncated_nonce_fails() {
        assert_eq!(codec(1).decrypt("00112233"), Err(CodecError::Truncated));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let codec = codec(1);
        let token = codec.encrypt(&UserId::mint()).unwrap();
        let mut raw = hex::decode(&token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert_eq!(
            codec.decrypt(&hex::encode(raw)),
            Err(CodecError::Authentication)
        );
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(SessionKey::generate(), SessionKey::generate());
        assert_eq!(format!("{:?}", SessionKey::generate()), "SessionKey([REDACTED])");
    }

    proptest! {
        #[test]
        fn prop_round_trip(id in "[a-zA-Z0-9-]{0,64}") {
            let codec = codec(7);
            let user = UserId::new(id);
            let token = codec.encrypt(&user).unwrap();
            prop_assert_eq!(codec.decrypt(&token).unwrap(), user);
        }

        #[test]
        fn prop_truncation_fails_closed(id in "[a-zA-Z0-9-]{1,64}", cut in 1usize..40) {
            let codec = codec(7);
            let token = codec.encrypt(&UserId::new(id)).unwrap();
            let keep = token.len().saturating_sub(cut * 2);
            prop_assert!(codec.decrypt(&token[..keep]).is_err());
        }

        #[test]
        fn prop_other_key_fails_closed(id in "[a-zA-Z0-9-]{0,64}", other in 8u8..=255) {
            let token = codec(7).encrypt(&UserId::new(id)).unwrap();
            prop_assert!(codec(other).decrypt(&token).is_err());
        }
    }
}
