#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xmlseal_core::Error;

/// Settings for a [`Signer`](crate::Signer).
///
/// Durations are written the way `humantime` prints them (`"15m"`,
/// `"1m 30s"`).  Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignerConfig {
    /// Directory holding signed documents.  Created on demand.
    pub output_dir: PathBuf,
    /// How long a signed document stays downloadable.
    #[serde(with = "humantime_duration")]
    pub retention: Duration,
    /// Period of the background sweep.
    #[serde(with = "humantime_duration")]
    pub sweep_interval: Duration,
    /// Verify every signature before reporting success.
    pub verify_after_sign: bool,
    /// Embed CA certificates after the end-entity certificate.
    pub embed_ca_chain: bool,
    /// Refuse to sign with a certificate outside its validity period.
    pub require_valid_certificate: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            retention: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
            verify_after_sign: true,
            embed_ca_chain: true,
            require_valid_certificate: false,
        }
    }
}

impl SignerConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("invalid signer configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.retention.is_zero() {
            return Err(Error::InvalidInput("retention must be greater than zero".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::InvalidInput("sweep_interval must be greater than zero".into()));
        }
        Ok(())
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
