use crate::error::{EngineError, Result};
use bip39::{Language, Mnemonic};
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::key::{CompressedPublicKey, Keypair};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use bitcoin::{Address, Network};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Game-specific coin constant in the derivation path.
pub const COIN_TYPE: u32 = 7747;

const HARDENED_BOUNDARY: u32 = 0x8000_0000;

/// Signing material for one room or seat. Never persisted; re-derived on
/// demand from the master secret and the identifier.
#[derive(Clone)]
pub struct DerivedKeypair {
    pub keypair: Keypair,
    pub public_key: PublicKey,
    pub address: Address,
}

impl std::fmt::Debug for DerivedKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeypair")
            .field("address", &self.address)
            .finish()
    }
}

pub fn generate_mnemonic() -> Result<String> {
    let mut rng = bip39::rand::thread_rng();
    let mnemonic = Mnemonic::generate_in_with(&mut rng, Language::English, 24)
        .map_err(|e| EngineError::internal(format!("Failed to generate mnemonic: {}", e)))?;
    Ok(mnemonic.to_string())
}

/// Identifier namespace for room-level addresses.
pub fn room_identifier(room_id: &str) -> String {
    format!("room:{}", room_id)
}

/// Identifier namespace for seat-level addresses. Folds the room id in so
/// seats never collide across rooms.
pub fn seat_identifier(room_id: &str, seat_index: u32) -> String {
    format!("{}:seat:{}", room_id, seat_index)
}

/// Deterministic hierarchical key derivation from a single master secret.
///
/// Holds the master extended key in memory for the process lifetime, loaded
/// once at startup. Derivation is pure given (master, identifier): the same
/// address comes back after a crash with no private key material persisted.
pub struct KeyService {
    network: Network,
    secp: Secp256k1<All>,
    master: RwLock<Option<Xpriv>>,
    cache: RwLock<HashMap<String, DerivedKeypair>>,
}

impl KeyService {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            secp: Secp256k1::new(),
            master: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_mnemonic(network: Network, mnemonic: &str) -> Result<Self> {
        let service = Self::new(network);
        service.load_mnemonic(mnemonic)?;
        Ok(service)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn is_loaded(&self) -> bool {
        self.master.read().is_some()
    }

    /// Load the master secret from a BIP-39 mnemonic. Replaces any
    /// previously loaded master and drops cached derivations.
    pub fn load_mnemonic(&self, mnemonic: &str) -> Result<()> {
        let mnemonic = Mnemonic::parse_in(Language::English, mnemonic)
            .map_err(|e| EngineError::config(format!("Invalid mnemonic: {}", e)))?;

        let seed = mnemonic.to_seed("");
        let master = Xpriv::new_master(self.network, &seed)
            .map_err(|e| EngineError::internal(format!("Failed to derive master key: {}", e)))?;

        *self.master.write() = Some(master);
        self.cache.write().clear();
        tracing::info!("Master secret loaded");
        Ok(())
    }

    /// Fingerprint of the loaded master key, for operator display.
    pub fn master_fingerprint(&self) -> Result<String> {
        let master = (*self.master.read()).ok_or(EngineError::Uninitialized)?;
        Ok(master.fingerprint(&self.secp).to_string())
    }

    /// Stable, collision-resistant mapping from an arbitrary identifier to a
    /// derivation index: SHA-256 of the identifier, top 32 bits, reduced
    /// below the hardened-index boundary.
    pub fn index_for_identifier(identifier: &str) -> u32 {
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        let digest = hasher.finalize();
        let head: [u8; 4] = digest[..4].try_into().expect("digest is 32 bytes");
        u32::from_be_bytes(head) & (HARDENED_BOUNDARY - 1)
    }

    /// Derive the keypair at `m/84'/7747'/0'/index`.
    pub fn derive_for_path(&self, index: u32) -> Result<DerivedKeypair> {
        if index >= HARDENED_BOUNDARY {
            return Err(EngineError::invalid_argument(format!(
                "Leaf index {} crosses the hardened boundary",
                index
            )));
        }

        let master = (*self.master.read()).ok_or(EngineError::Uninitialized)?;

        let path = DerivationPath::from_str(&format!("m/84'/{}'/0'/{}", COIN_TYPE, index))
            .map_err(|e| EngineError::internal(format!("Invalid derivation path: {}", e)))?;

        let child_key = master
            .derive_priv(&self.secp, &path)
            .map_err(|e| EngineError::internal(format!("Failed to derive child key: {}", e)))?;

        let secret_key = SecretKey::from_slice(&child_key.private_key.secret_bytes())
            .map_err(|e| EngineError::internal(format!("Invalid secret key: {}", e)))?;

        let keypair = Keypair::from_secret_key(&self.secp, &secret_key);
        let public_key = keypair.public_key();

        let wpkh = CompressedPublicKey::from_slice(&public_key.serialize())
            .map_err(|e| EngineError::internal(format!("Failed to create WPKH: {}", e)))?;
        let address = Address::p2wpkh(&wpkh, self.network);

        Ok(DerivedKeypair {
            keypair,
            public_key,
            address,
        })
    }

    /// One parameterized derivation over an opaque identifier string; applies
    /// to any entity needing a deterministic address.
    pub fn derive_for_identifier(&self, identifier: &str) -> Result<DerivedKeypair> {
        if let Some(derived) = self.cache.read().get(identifier) {
            return Ok(derived.clone());
        }

        let derived = self.derive_for_path(Self::index_for_identifier(identifier))?;

        self.cache
            .write()
            .insert(identifier.to_string(), derived.clone());
        Ok(derived)
    }

    pub fn derive_for_room(&self, room_id: &str) -> Result<DerivedKeypair> {
        self.derive_for_identifier(&room_identifier(room_id))
    }

    pub fn derive_for_seat(&self, room_id: &str, seat_index: u32) -> Result<DerivedKeypair> {
        self.derive_for_identifier(&seat_identifier(room_id, seat_index))
    }
}

use std::str::FromStr;

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

    fn loaded_service() -> KeyService {
        KeyService::with_mnemonic(Network::Regtest, TEST_MNEMONIC).unwrap()
    }

    #[test]
    fn test_uninitialized_rejected() {
        let service = KeyService::new(Network::Regtest);
        assert!(matches!(
            service.derive_for_path(0),
            Err(EngineError::Uninitialized)
        ));
        assert!(matches!(
            service.derive_for_room("room-1"),
            Err(EngineError::Uninitialized)
        ));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = loaded_service().derive_for_seat("room-1", 0).unwrap();
        let b = loaded_service().derive_for_seat("room-1", 0).unwrap();

        assert_eq!(a.address, b.address);
        assert_eq!(a.public_key, b.public_key);
    }

    #[test]
    fn test_seats_do_not_collide_across_rooms() {
        let service = loaded_service();
        let a = service.derive_for_seat("room-1", 0).unwrap();
        let b = service.derive_for_seat("room-2", 0).unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn test_room_and_seat_namespaces_are_distinct() {
        let service = loaded_service();
        let room = service.derive_for_room("alpha").unwrap();
        let seat = service.derive_for_seat("alpha", 0).unwrap();
        assert_ne!(room.address, seat.address);
    }

    #[test]
    fn test_index_below_hardened_boundary() {
        for id in ["room-1", "room-1:seat:0", "x", ""] {
            assert!(KeyService::index_for_identifier(id) < HARDENED_BOUNDARY);
        }
    }

    #[test]
    fn test_index_is_stable() {
        assert_eq!(
            KeyService::index_for_identifier("room-1:seat:3"),
            KeyService::index_for_identifier("room-1:seat:3"),
        );
    }

    #[test]
    fn test_hardened_leaf_index_rejected() {
        let service = loaded_service();
        assert!(service.derive_for_path(HARDENED_BOUNDARY).is_err());
    }

    #[test]
    fn test_invalid_mnemonic_rejected() {
        assert!(KeyService::with_mnemonic(Network::Regtest, "not a mnemonic").is_err());
    }
}
