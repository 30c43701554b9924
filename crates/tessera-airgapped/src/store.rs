//! Executor key store.
//!
//! Records are addressed by `(Keyspace, key)`. Sealed records keep their salt
//! under [`Keyspace::Salt`] and their nonce and ciphertext under their own
//! keyspace, both with the same key.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::config::KdfConfig;
use crate::error::{AirgappedError, Result};
use crate::sealing::{seal, unseal, SealedBlob};

/// Record namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Keyspace {
    /// Long-term DKG key pair
    KeyPair,
    /// Salts of sealed records
    Salt,
    /// Per-round BLS keyrings
    BlsKeyring,
    /// Serialized round state
    FsmDump,
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KeyPair => "key_pair",
            Self::Salt => "salt",
            Self::BlsKeyring => "bls_keyring",
            Self::FsmDump => "fsm_dump",
        };
        f.write_str(name)
    }
}

/// Byte store behind the executor
pub trait KeyStore: Send {
    /// Read a record
    fn get(&self, keyspace: Keyspace, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a record, replacing any previous value
    fn put(&mut self, keyspace: Keyspace, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove a record
    fn delete(&mut self, keyspace: Keyspace, key: &str) -> Result<()>;
}

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: HashMap<(Keyspace, String), Vec<u8>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KeyStore for MemoryStore {
    fn get(&self, keyspace: Keyspace, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(&(keyspace, key.to_string())).cloned())
    }

    fn put(&mut self, keyspace: Keyspace, key: &str, value: Vec<u8>) -> Result<()> {
        debug!(%keyspace, key, "store put");
        self.records.insert((keyspace, key.to_string()), value);
        Ok(())
    }

    fn delete(&mut self, keyspace: Keyspace, key: &str) -> Result<()> {
        debug!(%keyspace, key, "store delete");
        self.records.remove(&(keyspace, key.to_string()));
        Ok(())
    }
}

/// Seal `plaintext` and write it under `(keyspace, key)`
pub fn put_sealed(
    store: &mut dyn KeyStore,
    keyspace: Keyspace,
    key: &str,
    plaintext: &[u8],
    passphrase: &[u8],
    kdf: &KdfConfig,
) -> Result<()> {
    let blob = seal(passphrase, plaintext, kdf)?;
    store.put(Keyspace::Salt, key, blob.salt.to_vec())?;
    store.put(keyspace, key, blob.body())
}

/// Read and unseal `(keyspace, key)`, `None` if absent
pub fn get_sealed(
    store: &dyn KeyStore,
    keyspace: Keyspace,
    key: &str,
    passphrase: &[u8],
    kdf: &KdfConfig,
) -> Result<Option<Vec<u8>>> {
    let Some(body) = store.get(keyspace, key)? else {
        return Ok(None);
    };
    let salt = store
        .get(Keyspace::Salt, key)?
        .ok_or_else(|| AirgappedError::storage(format!("salt missing for {keyspace}/{key}")))?;
    let blob = SealedBlob::from_parts(&salt, &body)?;
    unseal(passphrase, &blob, kdf).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sealed_record_layout() {
        let kdf = KdfConfig::insecure_for_tests();
        let mut store = MemoryStore::new();
        put_sealed(&mut store, Keyspace::BlsKeyring, "round-1", b"keyring", b"pw", &kdf).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(Keyspace::Salt, "round-1").unwrap().unwrap().len(), 16);
        assert_ne!(
            store.get(Keyspace::BlsKeyring, "round-1").unwrap().unwrap(),
            b"keyring".to_vec()
        );
        assert_eq!(
            get_sealed(&store, Keyspace::BlsKeyring, "round-1", b"pw", &kdf).unwrap(),
            Some(b"keyring".to_vec())
        );
        assert!(get_sealed(&store, Keyspace::BlsKeyring, "round-1", b"other", &kdf).is_err());
        assert_eq!(get_sealed(&store, Keyspace::BlsKeyring, "round-2", b"pw", &kdf).unwrap(), None);
    }

    #[test]
    fn test_missing_salt_is_reported() {
        let kdf = KdfConfig::insecure_for_tests();
        let mut store = MemoryStore::new();
        put_sealed(&mut store, Keyspace::KeyPair, "own", b"secret", b"pw", &kdf).unwrap();
        store.delete(Keyspace::Salt, "own").unwrap();
        let err = get_sealed(&store, Keyspace::KeyPair, "own", b"pw", &kdf).unwrap_err();
        assert!(matches!(err, AirgappedError::Storage { .. }));
    }
}
