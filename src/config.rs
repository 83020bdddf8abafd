//! Configuration for the attestation service (spec §6 "Configuration
//! (abstract options)"), loaded from a JSON file whose path comes from a CLI
//! argument with an environment-variable fallback, in the teacher's style.

use clap::Parser;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// CLI arguments for the attestation service.
#[derive(Parser, Debug)]
#[command(name = "attestation-service")]
#[command(about = "Offline payment attestation service HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Ledger network this service issues proofs for (spec §6 `network`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Devnet,
    Testnet,
}

// ============================================================================
// Environment Variable Resolution
// ============================================================================

/// A transparent wrapper that resolves environment variables during
/// deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"0123abcd..."`
/// - Simple env var: `"$VERIFIER_KEY"`
/// - Braced env var: `"${VERIFIER_KEY}"`
#[derive(Debug, Clone)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    /// Returns the referenced variable name if `s` matches `$VAR` or
    /// `${VAR}` syntax.
    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if let Some(inner) = s.strip_prefix("${") {
            inner.strip_suffix('}').map(str::to_string)
        } else if let Some(inner) = s.strip_prefix('$') {
            if !inner.is_empty() && inner.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(inner.to_string())
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?
        } else {
            s
        };
        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse value: {e}")))?;
        Ok(LiteralOrEnv(parsed))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

// ============================================================================
// Verifier signing key
// ============================================================================

/// The service's Ed25519 signing key, parsed from a 64-character hex string
/// (the seed, not the expanded key). The corresponding verifying key is the
/// one deployed to the escrow program as its hard-coded `VerifierKey`
/// (spec §4.3 check 4).
#[derive(Clone)]
pub struct VerifierSigningKey(SigningKey);

impl VerifierSigningKey {
    pub fn as_signing_key(&self) -> &SigningKey {
        &self.0
    }

    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.0.verifying_key().to_bytes()
    }
}

impl std::fmt::Debug for VerifierSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifierSigningKey(verifying_key={})", hex::encode(self.verifying_key_bytes()))
    }
}

impl FromStr for VerifierSigningKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid hex: {e}"))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("verifier signing key must be 32 bytes, got {}", v.len()))?;
        Ok(Self(SigningKey::from_bytes(&seed)))
    }
}

impl Serialize for VerifierSigningKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0.to_bytes()))
    }
}

// ============================================================================
// Config
// ============================================================================

/// Server configuration. Fields use serde defaults that fall back to
/// hardcoded values when absent from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_network")]
    network: Network,
    verifier_signing_key: LiteralOrEnv<VerifierSigningKey>,
    /// URL of the platform attestation authority (spec §4.2 step 2). When
    /// absent, only development tokens are accepted, gated by
    /// `allow_dev_attestation`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    platform_attestation_authority: Option<Url>,
    #[serde(default)]
    allow_dev_attestation: bool,
    #[serde(default = "config_defaults::default_confirmation_timeout_ms")]
    confirmation_timeout_ms: u64,
    #[serde(default = "config_defaults::default_retry_budget_per_bundle")]
    retry_budget_per_bundle: u32,
}

mod config_defaults {
    use super::Network;
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    pub fn default_port() -> u16 {
        env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_PORT)
    }

    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }

    pub fn default_network() -> Network {
        Network::Devnet
    }

    pub fn default_confirmation_timeout_ms() -> u64 {
        30_000
    }

    pub fn default_retry_budget_per_bundle() -> u32 {
        32
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn verifier_signing_key(&self) -> &VerifierSigningKey {
        self.verifier_signing_key.inner()
    }

    pub fn platform_attestation_authority(&self) -> Option<&Url> {
        self.platform_attestation_authority.as_ref()
    }

    pub fn allow_dev_attestation(&self) -> bool {
        self.allow_dev_attestation
    }

    pub fn confirmation_timeout_ms(&self) -> u64 {
        self.confirmation_timeout_ms
    }

    pub fn retry_budget_per_bundle(&self) -> u32 {
        self.retry_budget_per_bundle
    }

    /// Loads configuration from the `--config` CLI argument (or `CONFIG`
    /// env var, or `./config.json`).
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_or_env_parses_plain_hex() {
        let json = "\"0101010101010101010101010101010101010101010101010101010101010101\"";
        let parsed: LiteralOrEnv<VerifierSigningKey> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.inner().verifying_key_bytes().len(), 32);
    }

    #[test]
    fn literal_or_env_resolves_braced_env_var() {
        unsafe {
            std::env::set_var(
                "TEST_VERIFIER_KEY",
                "0202020202020202020202020202020202020202020202020202020202020202",
            );
        }
        let parsed: LiteralOrEnv<VerifierSigningKey> =
            serde_json::from_str("\"${TEST_VERIFIER_KEY}\"").unwrap();
        assert_eq!(parsed.inner().verifying_key_bytes().len(), 32);
    }

    #[test]
    fn literal_or_env_rejects_missing_env_var() {
        let result: Result<LiteralOrEnv<VerifierSigningKey>, _> =
            serde_json::from_str("\"$DOES_NOT_EXIST_xyz\"");
        assert!(result.is_err());
    }
}
