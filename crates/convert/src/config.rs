//! Converter configuration.
//!
//! # Example
//!
//! ```toml
//! [module_index]
//! standard_prefixes = ["/usr/lib/python3", "/opt/python/lib/python3.11"]
//!
//! [transport]
//! resend_known = false
//! record_form = "positional"
//! channel_capacity = 16
//! ```
//!
//! Every section and key is optional.

use std::path::Path;

use graphport_core::ModuleIndexConfig;
use graphport_ir::Record;
use serde::{Deserialize, Serialize};

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default)]
    pub module_index: ModuleIndexConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// `[transport]`: what goes into each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Send every record of the closure, including ones an earlier
    /// successful request already carried.
    #[serde(default)]
    pub resend_known: bool,
    #[serde(default)]
    pub record_form: RecordForm,
    /// Queue depth for [`ChannelRemote`](crate::ChannelRemote).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    16
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            resend_known: false,
            record_form: RecordForm::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Which of the two record encodings to send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordForm {
    #[default]
    Keyed,
    Positional,
}

impl RecordForm {
    pub fn encode(self, record: &Record) -> serde_json::Value {
        match self {
            RecordForm::Keyed => record.to_keyed(),
            RecordForm::Positional => record.to_positional(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse converter config: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl ConverterConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
