use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::AnyPool;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::rows::CredentialRow;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;

fn derive_key() -> Option<[u8; 32]> {
    let passphrase = std::env::var("CREDENTIALS_ENCRYPTION_KEY").ok()?;
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    Some(hasher.finalize().into())
}

/// Encrypts `plaintext` (the secret bundle's JSON form) as `hex(iv):hex(ct)`.
/// Falls back to bare JSON with a logged warning when no key is configured —
/// acceptable for local development, never for a live credential.
pub fn encrypt(plaintext: &str) -> String {
    let Some(key) = derive_key() else {
        tracing::warn!("CREDENTIALS_ENCRYPTION_KEY not set; storing credential in plaintext");
        return plaintext.to_string();
    };

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ct = Encryptor::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    format!("{}:{}", hex::encode(iv), hex::encode(ct))
}

/// Inverse of [`encrypt`]. A ciphertext with no `:` separator is treated as
/// the plaintext fallback and returned verbatim.
pub fn decrypt(ciphertext: &str) -> Result<String, PersistenceError> {
    let Some((iv_hex, ct_hex)) = ciphertext.split_once(':') else {
        return Ok(ciphertext.to_string());
    };

    let key = derive_key().ok_or_else(|| {
        PersistenceError::Crypto("ciphertext is encrypted but CREDENTIALS_ENCRYPTION_KEY is unset".into())
    })?;
    let iv = hex::decode(iv_hex).map_err(|e| PersistenceError::Crypto(format!("bad iv hex: {e}")))?;
    let ct = hex::decode(ct_hex).map_err(|e| PersistenceError::Crypto(format!("bad ciphertext hex: {e}")))?;
    if iv.len() != IV_LEN {
        return Err(PersistenceError::Crypto("iv has wrong length".into()));
    }

    let plaintext = Decryptor::new(&key.into(), iv.as_slice().into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ct)
        .map_err(|e| PersistenceError::Crypto(format!("padding/decrypt failure: {e}")))?;

    String::from_utf8(plaintext).map_err(|e| PersistenceError::Crypto(format!("decrypted bytes not utf8: {e}")))
}

/// The decrypted secret bundle a Broker Gateway session is built from. Kept
/// separate from `core_types::Credential`, which models only what the
/// orchestration core itself needs (broker kind, concurrency, liveness).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CredentialSecrets {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

pub async fn load_credential(pool: &AnyPool, credential_id: Uuid) -> Result<core_types::Credential, PersistenceError> {
    let row: CredentialRow = sqlx::query_as("SELECT * FROM credentials WHERE id = ?")
        .bind(credential_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("credential {credential_id}")))?;
    row.into_domain()
}

pub async fn load_credential_secrets(pool: &AnyPool, credential_id: Uuid) -> Result<CredentialSecrets, PersistenceError> {
    let row: CredentialRow = sqlx::query_as("SELECT * FROM credentials WHERE id = ?")
        .bind(credential_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("credential {credential_id}")))?;

    let plaintext = decrypt(&row.ciphertext)?;
    serde_json::from_str(&plaintext).map_err(|e| PersistenceError::Decode(format!("bad credential secrets json: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encrypt_and_decrypt() {
        std::env::set_var("CREDENTIALS_ENCRYPTION_KEY", "test-only-passphrase");
        let plaintext = r#"{"api_key":"abc","api_secret":"def","base_url":"https://example.test"}"#;
        let ct = encrypt(plaintext);
        assert!(ct.contains(':'));
        let back = decrypt(&ct).unwrap();
        assert_eq!(back, plaintext);
    }

    #[test]
    fn falls_back_to_plaintext_without_a_key() {
        std::env::remove_var("CREDENTIALS_ENCRYPTION_KEY");
        let plaintext = "not actually encrypted";
        let ct = encrypt(plaintext);
        assert_eq!(ct, plaintext);
        assert_eq!(decrypt(&ct).unwrap(), plaintext);
    }
}
