//! Key management seam.
//!
//! The engine never touches raw key material beyond opaque [`KeyRef`]s;
//! derivation and signing live behind the [`KeyStore`] trait. The shipped
//! implementation derives a dense secp256k1 keypair sequence from a BIP-39
//! seed and signs transfer payloads with ECDSA over a SHA-256 digest.

use crate::chain::SignedTransfer;
use bech32::{Bech32m, Hrp};
use bip39::{Language, Mnemonic};
use rand::Rng;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

/// Opaque reference to a private key (hex-encoded secret).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef(pub String);

/// An address derived at a fixed index, with its key reference.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub index: u64,
    pub address: String,
    pub key: KeyRef,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

pub trait KeyStore: Send + Sync {
    /// Recovery phrase backing the derivation sequence.
    fn mnemonic(&self) -> &str;

    /// Derive the keypair at `index`. Index 0 is the master address.
    fn derive(&self, index: u64) -> Result<DerivedKey, KeyError>;

    /// Build and sign a transfer, returning the broadcastable form.
    fn sign_transfer(
        &self,
        key: &KeyRef,
        to: &str,
        amount: u64,
        asset: &str,
    ) -> Result<SignedTransfer, KeyError>;
}

pub struct HdKeyStore {
    mnemonic: String,
    seed: [u8; 64],
    secp: Secp256k1<All>,
    hrp: Hrp,
}

impl HdKeyStore {
    pub fn generate(hrp: &str) -> Result<Self, KeyError> {
        let mnemonic = Mnemonic::generate_in(Language::English, 12)
            .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
        Self::from_parsed(mnemonic, hrp)
    }

    pub fn from_mnemonic(phrase: &str, hrp: &str) -> Result<Self, KeyError> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
            .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
        Self::from_parsed(mnemonic, hrp)
    }

    fn from_parsed(mnemonic: Mnemonic, hrp: &str) -> Result<Self, KeyError> {
        let hrp = Hrp::parse(hrp)
            .map_err(|e| KeyError::InvalidKey(format!("invalid address HRP: {}", e)))?;
        Ok(Self {
            seed: mnemonic.to_seed(""),
            mnemonic: mnemonic.to_string(),
            secp: Secp256k1::new(),
            hrp,
        })
    }

    fn child_secret(&self, index: u64) -> Result<SecretKey, KeyError> {
        // Rejection-sample the hash into the curve order; a retry is
        // astronomically unlikely but must not panic.
        for tweak in 0u8..=255 {
            let mut hasher = Sha256::new();
            hasher.update(self.seed);
            hasher.update(index.to_be_bytes());
            hasher.update([tweak]);
            let digest: [u8; 32] = hasher.finalize().into();
            if let Ok(secret) = SecretKey::from_slice(&digest) {
                return Ok(secret);
            }
        }
        Err(KeyError::InvalidKey(format!(
            "no valid key at index {}",
            index
        )))
    }

    fn address_for(&self, secret: &SecretKey) -> Result<String, KeyError> {
        let pubkey = PublicKey::from_secret_key(&self.secp, secret);
        let digest: [u8; 32] = Sha256::digest(pubkey.serialize()).into();
        bech32::encode::<Bech32m>(self.hrp, &digest[..20])
            .map_err(|e| KeyError::InvalidKey(format!("address encoding failed: {}", e)))
    }
}

impl KeyStore for HdKeyStore {
    fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    fn derive(&self, index: u64) -> Result<DerivedKey, KeyError> {
        let secret = self.child_secret(index)?;
        let address = self.address_for(&secret)?;
        Ok(DerivedKey {
            index,
            address,
            key: KeyRef(hex::encode(secret.secret_bytes())),
        })
    }

    fn sign_transfer(
        &self,
        key: &KeyRef,
        to: &str,
        amount: u64,
        asset: &str,
    ) -> Result<SignedTransfer, KeyError> {
        let secret_bytes =
            hex::decode(&key.0).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let secret = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let from = self.address_for(&secret)?;

        let payload = json!({
            "asset": asset,
            "from": from,
            "to": to,
            "amount": amount,
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "nonce": rand::rng().random::<u64>(),
        });
        let payload_bytes =
            serde_json::to_vec(&payload).map_err(|e| KeyError::Signing(e.to_string()))?;

        let digest: [u8; 32] = Sha256::digest(&payload_bytes).into();
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| KeyError::Signing(e.to_string()))?;
        let signature = self.secp.sign_ecdsa(&message, &secret);

        Ok(SignedTransfer {
            txid: hex::encode(digest),
            raw: hex::encode(payload_bytes),
            signature: hex::encode(signature.serialize_compact()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    fn keystore() -> HdKeyStore {
        HdKeyStore::from_mnemonic(PHRASE, "dw").unwrap()
    }

    #[test]
    fn derivation_is_deterministic_and_dense() {
        let a = keystore();
        let b = keystore();
        for index in 0..5 {
            let left = a.derive(index).unwrap();
            let right = b.derive(index).unwrap();
            assert_eq!(left.address, right.address);
            assert_eq!(left.key, right.key);
            assert!(left.address.starts_with("dw1"));
        }
        assert_ne!(a.derive(1).unwrap().address, a.derive(2).unwrap().address);
    }

    #[test]
    fn signed_transfer_verifies_against_derived_pubkey() {
        let ks = keystore();
        let master = ks.derive(0).unwrap();
        let signed = ks.sign_transfer(&master.key, "dw1destination", 42, "NEO").unwrap();

        let payload = hex::decode(&signed.raw).unwrap();
        let digest: [u8; 32] = Sha256::digest(&payload).into();
        assert_eq!(signed.txid, hex::encode(digest));

        let secp = Secp256k1::new();
        let secret =
            SecretKey::from_slice(&hex::decode(&master.key.0).unwrap()).unwrap();
        let pubkey = PublicKey::from_secret_key(&secp, &secret);
        let message = Message::from_digest_slice(&digest).unwrap();
        let signature = secp256k1::ecdsa::Signature::from_compact(
            &hex::decode(&signed.signature).unwrap(),
        )
        .unwrap();
        assert!(secp.verify_ecdsa(&message, &signature, &pubkey).is_ok());
    }

    #[test]
    fn rejects_garbage_mnemonic() {
        assert!(HdKeyStore::from_mnemonic("not a phrase", "dw").is_err());
    }
}
