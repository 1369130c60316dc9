//! PromptGuard configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main PromptGuard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptGuardConfig {
    /// Detection pattern selection
    #[serde(default)]
    pub patterns: PatternsConfig,

    /// Initial protection toggles
    #[serde(default)]
    pub protection: ProtectionConfig,

    /// Token store persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Timing of cosmetic sequences and reapply schedule
    #[serde(default)]
    pub timing: TimingConfig,

    /// Local HTTP API
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl PromptGuardConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Which built-in detectors are enabled, plus user-defined ones
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// 13-digit national identifier
    pub thai_id: bool,

    /// Local mobile phone number
    pub mobile: bool,

    /// Titled names and capitalized word pairs
    pub names: bool,

    /// Free-text email addresses
    pub email: bool,

    /// Payment card numbers (Luhn-checked)
    pub payment_card: bool,

    /// Bitcoin and Ethereum wallet addresses
    pub crypto_wallet: bool,

    /// Extra patterns appended after the built-ins
    pub custom: Vec<CustomPattern>,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            thai_id: true,
            mobile: true,
            names: true,
            email: false,
            payment_card: false,
            crypto_wallet: false,
            custom: Vec::new(),
        }
    }
}

/// A user-defined detection pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPattern {
    /// Rule name (for logs)
    pub label: String,

    /// Regular expression source
    pub regex: String,

    /// Token label emitted for matches, e.g. `EMPLOYEE_ID`
    pub token_kind: String,
}

/// Initial values of the protection toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Mask PII in the input box before submission
    pub mask_on_input: bool,

    /// Restore original values in rendered responses
    pub decode_on_output: bool,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            mask_on_input: true,
            decode_on_output: true,
        }
    }
}

/// Token store persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist the token map to disk (false = in-memory only)
    pub enabled: bool,

    /// JSON file holding the key-value document
    pub path: PathBuf,

    /// Key under which the whole token map is stored
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_store_path(),
            key: DEFAULT_STORE_KEY.to_string(),
        }
    }
}

/// Well-known key holding the token map
pub const DEFAULT_STORE_KEY: &str = "piiMapping";

/// Default store location (~/.promptguard/tokens.json)
pub fn default_store_path() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".promptguard")
        .join("tokens.json")
}

/// Timing of scramble/reveal frames and the reapply schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between writing masked text and triggering send
    pub submit_delay_ms: u64,

    /// Filler frames shown over the input before masking
    pub scramble_steps: u32,

    /// Interval between scramble frames
    pub scramble_interval_ms: u64,

    /// Filler frames shown over a token before its value
    pub reveal_steps: u32,

    /// Interval between reveal frames
    pub reveal_interval_ms: u64,

    /// Offsets at which a programmatic write is re-applied
    pub reapply_delays_ms: Vec<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            submit_delay_ms: 100,
            scramble_steps: 20,
            scramble_interval_ms: 50,
            reveal_steps: 10,
            reveal_interval_ms: 50,
            reapply_delays_ms: vec![0, 50, 100, 200, 400, 700, 1000],
        }
    }
}

/// Local HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18791,
            cors_origins: Vec::new(),
        }
    }
}
