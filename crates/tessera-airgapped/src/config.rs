//! Executor configuration.
//!
//! ```toml
//! [kdf]
//! memory_kib = 65536
//! iterations = 3
//! parallelism = 1
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AirgappedError, Result};

/// Argon2id cost parameters for passphrase sealing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl KdfConfig {
    /// Cheap parameters for tests
    pub fn insecure_for_tests() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Configuration of an air-gapped executor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Passphrase key derivation
    pub kdf: KdfConfig,
}

impl ExecutorConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AirgappedError::serialization(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AirgappedError::storage(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject parameters Argon2 cannot run with
    pub fn validate(&self) -> Result<()> {
        let kdf = &self.kdf;
        if kdf.iterations == 0 || kdf.parallelism == 0 || kdf.memory_kib < 8 * kdf.parallelism {
            return Err(AirgappedError::serialization(format!(
                "Invalid kdf parameters: {kdf:?}"
            )));
        }
        Ok(())
    }
}
