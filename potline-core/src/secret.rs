//! File-backed secret store for the master mnemonic.
//!
//! The settlement engine holds exactly one master secret; at rest it lives
//! sealed under an operator password. ChaCha20Poly1305 with a PBKDF2-derived
//! key, so tampering and wrong passwords both fail authentication.

use crate::error::{EngineError, Result};
use base64::{engine::general_purpose, Engine as _};
use bip39::rand::{rngs::OsRng, RngCore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

const SALT_SIZE: usize = 32;
const PBKDF2_ROUNDS: u32 = 100_000;

/// Sealed master secret as written to disk (JSON envelope, base64 fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedSecret {
    pub version: u32,
    pub encryption_method: String,
    pub salt: String,
    pub nonce: String,
    pub payload: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Seal the master mnemonic under an operator password.
pub fn seal_master(mnemonic: &str, password: &str) -> Result<SealedSecret> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let key = derive_key(password, &salt);
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let cipher = ChaCha20Poly1305::new(&key);

    let payload = cipher
        .encrypt(&nonce, mnemonic.as_bytes())
        .map_err(|e| EngineError::secret(format!("Encryption failed: {}", e)))?;

    let checksum = calculate_checksum(&payload);

    Ok(SealedSecret {
        version: 1,
        encryption_method: "ChaCha20Poly1305".to_string(),
        salt: general_purpose::STANDARD.encode(salt),
        nonce: general_purpose::STANDARD.encode(nonce),
        payload: general_purpose::STANDARD.encode(&payload),
        checksum,
        created_at: Utc::now(),
    })
}

/// Recover the master mnemonic from a sealed envelope.
pub fn unseal_master(sealed: &SealedSecret, password: &str) -> Result<String> {
    let salt = decode_field(&sealed.salt, "salt")?;
    let nonce_bytes = decode_field(&sealed.nonce, "nonce")?;
    let payload = decode_field(&sealed.payload, "payload")?;

    if calculate_checksum(&payload) != sealed.checksum {
        return Err(EngineError::secret("Sealed secret checksum mismatch"));
    }

    let key = derive_key(password, &salt);
    let cipher = ChaCha20Poly1305::new(&key);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let decrypted = cipher
        .decrypt(nonce, payload.as_ref())
        .map_err(|_| EngineError::secret("Decryption failed: wrong password or corrupt file"))?;

    String::from_utf8(decrypted)
        .map_err(|e| EngineError::secret(format!("Sealed secret is not valid UTF-8: {}", e)))
}

pub async fn write_sealed(path: &Path, sealed: &SealedSecret) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(sealed)?;
    tokio::fs::write(path, json).await?;
    tracing::info!("Sealed master secret written to {}", path.display());
    Ok(())
}

pub async fn read_sealed(path: &Path) -> Result<SealedSecret> {
    let json = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&json)?)
}

fn derive_key(password: &str, salt: &[u8]) -> Key {
    use pbkdf2::pbkdf2_hmac;

    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    *Key::from_slice(&key)
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(value)
        .map_err(|e| EngineError::secret(format!("Invalid base64 in {}: {}", field, e)))
}

fn calculate_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
