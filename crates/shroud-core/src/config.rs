use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::Address;

/// Top-level configuration (loaded from shroud.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShroudConfig {
    pub backend: BackendConfig,
    pub authorization: AuthorizationConfig,
    pub ledger: LedgerConfig,
    pub log: LogConfig,
}

/// Encryption backend (relayer) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Relayer endpoint used for user decryption
    pub relayer_url: String,
    /// Contract the ciphertext is bound to
    pub contract_address: Address,
    /// Chain the contract lives on (default: 11155111, Sepolia)
    pub chain_id: u64,
    /// Per-call timeout for backend operations, in seconds
    pub timeout_secs: u64,
}

/// Authorization handshake policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Validity window of a decryption authorization (default: 10 days)
    pub duration_days: u32,
    /// Typed-data domain name
    pub domain_name: String,
    /// Typed-data domain version
    pub domain_version: String,
    /// Contract that verifies decryption requests
    pub verifying_contract: Address,
}

/// Ledger interaction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Delay between read attempts while waiting for a write to become visible
    pub poll_interval_ms: u64,
    /// Give up waiting for a write to become visible after this long
    pub visibility_timeout_ms: u64,
    /// Maximum encrypted units per record (the ledger stores the count as a u8)
    pub max_units: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            relayer_url: "https://relayer.testnet.zama.cloud".into(),
            contract_address: Address::ZERO,
            chain_id: 11_155_111,
            timeout_secs: 60,
        }
    }
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            duration_days: 10,
            domain_name: "Decryption".into(),
            domain_version: "1".into(),
            verifying_contract: Address::ZERO,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            visibility_timeout_ms: 30_000,
            max_units: 255,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ShroudConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> crate::ShroudResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ShroudConfig = toml::from_str(&contents)
            .map_err(|e| crate::ShroudError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Reject values that would make every operation fail later.
    pub fn validate(&self) -> crate::ShroudResult<()> {
        if self.authorization.duration_days == 0 {
            return Err(crate::ShroudError::Config(
                "authorization.duration_days must be at least 1".into(),
            ));
        }
        if self.backend.timeout_secs == 0 {
            return Err(crate::ShroudError::Config(
                "backend.timeout_secs must be at least 1".into(),
            ));
        }
        if self.ledger.poll_interval_ms == 0 {
            return Err(crate::ShroudError::Config(
                "ledger.poll_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[backend]
relayer_url = "https://relayer.example.com"
contract_address = "0x1111111111111111111111111111111111111111"
chain_id = 1
timeout_secs = 15

[authorization]
duration_days = 3
domain_name = "Decryption"
domain_version = "2"
verifying_contract = "0x2222222222222222222222222222222222222222"

[ledger]
poll_interval_ms = 250
visibility_timeout_ms = 5000
max_units = 64

[log]
level = "debug"
format = "json"
"#;
        let config: ShroudConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.backend.relayer_url, "https://relayer.example.com");
        assert_eq!(
            config.backend.contract_address.to_string(),
            "0x1111111111111111111111111111111111111111"
        );
        assert_eq!(config.backend.chain_id, 1);
        assert_eq!(config.backend.timeout_secs, 15);
        assert_eq!(config.authorization.duration_days, 3);
        assert_eq!(config.authorization.domain_version, "2");
        assert_eq!(config.ledger.poll_interval_ms, 250);
        assert_eq!(config.ledger.max_units, 64);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_defaults() {
        let config: ShroudConfig = toml::from_str("").unwrap();

        assert_eq!(config.backend.chain_id, 11_155_111);
        assert_eq!(config.backend.contract_address, Address::ZERO);
        assert_eq!(config.authorization.duration_days, 10);
        assert_eq!(config.ledger.max_units, 255);
        assert_eq!(config.ledger.poll_interval_ms, 500);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[authorization]
duration_days = 1
"#;
        let config: ShroudConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.authorization.duration_days, 1);
        // Defaults
        assert_eq!(config.authorization.domain_name, "Decryption");
        assert_eq!(config.backend.timeout_secs, 60);
    }

    #[test]
    fn test_invalid_address_rejected() {
        let toml_str = r#"
[backend]
contract_address = "0x1234"
"#;
        assert!(toml::from_str::<ShroudConfig>(toml_str).is_err());
    }

    #[test]
    fn test_zero_duration_fails_validation() {
        let mut config = ShroudConfig::default();
        config.authorization.duration_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shroud.toml");
        std::fs::write(&path, "[ledger]\nmax_units = 32\n").unwrap();

        let config = ShroudConfig::load(&path).unwrap();
        assert_eq!(config.ledger.max_units, 32);
        assert_eq!(config.backend.timeout_secs, 60);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShroudConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, crate::ShroudError::Io(_)));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shroud.toml");
        std::fs::write(&path, "[backend]\ntimeout_secs = 0\n").unwrap();
        assert!(matches!(
            ShroudConfig::load(&path),
            Err(crate::ShroudError::Config(_))
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ShroudConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ShroudConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.backend.relayer_url, parsed.backend.relayer_url);
        assert_eq!(config.backend.contract_address, parsed.backend.contract_address);
        assert_eq!(config.ledger.max_units, parsed.ledger.max_units);
    }
}
