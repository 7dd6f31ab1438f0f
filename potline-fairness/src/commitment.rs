use crate::{FairnessError, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const SEED_SIZE: usize = 32;

/// Server-side secret for one game instance.
///
/// Generated once before play begins, revealed only after settlement. The
/// published commitment binds the server to this value before any client
/// seed is known.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSeed([u8; SEED_SIZE]);

impl ServerSeed {
    /// Cryptographically secure 256-bit seed.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SEED_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SEED_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s)
            .map_err(|e| FairnessError::invalid_argument(format!("Invalid seed hex: {}", e)))?;
        let bytes: [u8; SEED_SIZE] = raw
            .try_into()
            .map_err(|_| FairnessError::invalid_argument("Seed must be 32 bytes"))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// Debug must not leak the secret before reveal.
impl std::fmt::Debug for ServerSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServerSeed(..)")
    }
}

/// Public commitment to a server seed: SHA-256 of the seed bytes.
///
/// Immutable once published; checked against the revealed seed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub hash: [u8; 32],
}

impl Commitment {
    pub fn of(secret: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret);
        Self {
            hash: hasher.finalize().into(),
        }
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| {
            FairnessError::invalid_argument(format!("Invalid commitment hex: {}", e))
        })?;
        let hash: [u8; 32] = raw
            .try_into()
            .map_err(|_| FairnessError::invalid_argument("Commitment must be 32 bytes"))?;
        Ok(Self { hash })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn matches(&self, secret: &[u8]) -> bool {
        Self::of(secret) == *self
    }
}

/// Commitment to a server seed, published before play begins.
pub fn commit(seed: &ServerSeed) -> Commitment {
    Commitment::of(seed.as_bytes())
}

/// Post-hoc audit: does the revealed seed match the published commitment?
pub fn verify_commitment(seed: &ServerSeed, commitment: &Commitment) -> bool {
    commitment.matches(seed.as_bytes())
}

/// One-way hash of arbitrary client-supplied material (a signed message, an
/// address) into a fixed-length hex seed. Input is untrusted; no format
/// constraints beyond being present.
pub fn derive_client_seed(raw_material: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_material.as_bytes());
    hex::encode(hasher.finalize())
}
