/*
 * Copyright (c) 2026 The NAMIB Project Developers.
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

//! Deployment configuration: SDM key material and verification settings.
//!
//! Configuration fails closed. A missing key is an error unless test mode is switched on
//! explicitly, and only then are predictable all-zero keys used in its place.
//!
//! # Example
//! ```
//! use nfc_sdm::config::SdmConfig;
//!
//! let config = SdmConfig::from_lookup(|name| match name {
//!     "SDM_FILE_READ_KEY_HEX" => Some("000102030405060708090A0B0C0D0E0F".to_string()),
//!     "SDM_META_READ_KEY_HEX" => Some("F0E0D0C0B0A090807060504030201000".to_string()),
//!     _ => None,
//! })?;
//! assert!(!config.test_mode);
//! assert_eq!(config.grace_window_secs, 600);
//!
//! // Without keys and without test mode, loading fails.
//! assert!(SdmConfig::from_lookup(|_| None).is_err());
//! # Ok::<(), nfc_sdm::error::ConfigError>(())
//! ```

use derive_builder::UninitializedFieldError;
use serde::Deserialize;
use tracing::warn;

use crate::crypto::Key128;
use crate::error::ConfigError;
use crate::replay::ReplayGuard;
use crate::sdm::SdmProfile;
use crate::session::{SessionIssuer, SessionSecret};

#[cfg(test)]
mod tests;

/// Environment variable holding the file read key as 32 hex characters.
pub const ENV_FILE_READ_KEY: &str = "SDM_FILE_READ_KEY_HEX";
/// Environment variable holding the meta read key as 32 hex characters.
pub const ENV_META_READ_KEY: &str = "SDM_META_READ_KEY_HEX";
/// Environment variable holding the session credential secret as hex.
pub const ENV_SESSION_SECRET: &str = "SDM_SESSION_SECRET_HEX";
/// Environment variable holding the duplicate-tap grace window in seconds.
pub const ENV_GRACE_WINDOW_SECS: &str = "SDM_GRACE_WINDOW_SECS";
/// Environment variable holding the session credential lifetime in seconds.
pub const ENV_SESSION_TTL_SECS: &str = "SDM_SESSION_TTL_SECS";
/// Environment variable selecting the [`SdmProfile`].
pub const ENV_PROFILE: &str = "SDM_PROFILE";
/// Environment variable enabling test mode.
pub const ENV_TEST_MODE: &str = "SDM_TEST_MODE";

/// Default grace window for duplicate taps: 10 minutes.
pub const DEFAULT_GRACE_WINDOW_SECS: u64 = 600;
/// Default lifetime of an issued session credential: 10 minutes.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 600;

/// The two keys of an SDM deployment.
///
/// Keys are rotated as a whole, never per tag.
#[derive(Debug, Clone)]
pub struct KeySet {
    file_read_key: Key128,
    meta_read_key: Key128,
}

impl KeySet {
    /// Creates a key set from the key used to decrypt PICC data and the key used to
    /// authenticate it.
    #[must_use]
    pub fn new(file_read_key: Key128, meta_read_key: Key128) -> KeySet {
        KeySet {
            file_read_key,
            meta_read_key,
        }
    }

    /// Parses both keys from 32 character hex strings.
    ///
    /// # Errors
    /// If a key is not valid hex or not exactly 16 bytes long.
    pub fn from_hex(file_read_key: &str, meta_read_key: &str) -> Result<KeySet, ConfigError> {
        Ok(KeySet {
            file_read_key: parse_key("file_read_key", file_read_key)?,
            meta_read_key: parse_key("meta_read_key", meta_read_key)?,
        })
    }

    /// Predictable all-zero keys. Must only ever be used in test mode.
    #[must_use]
    pub fn insecure_zero_keys() -> KeySet {
        KeySet::new(Key128::new([0; 16]), Key128::new([0; 16]))
    }

    /// Key used to decrypt the PICC data.
    #[must_use]
    pub fn file_read_key(&self) -> &Key128 {
        &self.file_read_key
    }

    /// Key used to authenticate the PICC data.
    #[must_use]
    pub fn meta_read_key(&self) -> &Key128 {
        &self.meta_read_key
    }

    /// Returns `true` if any of the keys is all-zero.
    #[must_use]
    pub fn is_predictable(&self) -> bool {
        self.file_read_key.is_zero() || self.meta_read_key.is_zero()
    }
}

/// Parses a 16 byte key named `name` from a hex string, ignoring surrounding whitespace.
pub(crate) fn parse_key(name: &'static str, value: &str) -> Result<Key128, ConfigError> {
    let bytes = hex::decode(value.trim()).map_err(|_| ConfigError::InvalidHex(name))?;
    let actual = bytes.len();
    let bytes: [u8; 16] = bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidKeyLength {
            name,
            expected: 16,
            actual,
        })?;
    Ok(Key128::new(bytes))
}

/// Settings for verifying taps of one deployment.
///
/// Use [`SdmConfigBuilder`], [`SdmConfig::from_env`], or deserialize it with `serde`
/// (keys given as hex strings).
#[derive(Debug, Clone, Builder, Deserialize)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigError"))]
#[serde(try_from = "RawSdmConfig")]
pub struct SdmConfig {
    /// Deployment keys. May only be absent in test mode.
    #[builder(setter(strip_option), default)]
    pub keys: Option<KeySet>,

    /// Byte layout configured on the tags.
    #[builder(default)]
    pub profile: SdmProfile,

    /// How long a tap repeating the last accepted counter is still accepted, in seconds.
    #[builder(default = "DEFAULT_GRACE_WINDOW_SECS")]
    pub grace_window_secs: u64,

    /// Lifetime of issued session credentials, in seconds.
    #[builder(default = "DEFAULT_SESSION_TTL_SECS")]
    pub session_ttl_secs: u64,

    /// Secret used to authenticate session credentials. May only be absent in test mode.
    #[builder(setter(strip_option), default)]
    pub session_secret: Option<SessionSecret>,

    /// Allows running without configured secrets, substituting predictable all-zero ones.
    #[builder(default)]
    pub test_mode: bool,
}

impl SdmConfigBuilder {
    fn validate(&self) -> Result<(), ConfigError> {
        let test_mode = self.test_mode.unwrap_or_default();
        if !test_mode {
            match self.keys.as_ref().and_then(Option::as_ref) {
                None => return Err(ConfigError::MissingKey("file_read_key")),
                Some(keys) if keys.is_predictable() => {
                    return Err(ConfigError::InvalidValue {
                        name: "keys",
                        reason: "all-zero keys are only allowed in test mode".to_string(),
                    })
                }
                Some(_) => {}
            }
        }
        if self.session_ttl_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: "session_ttl_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl From<UninitializedFieldError> for ConfigError {
    fn from(value: UninitializedFieldError) -> Self {
        ConfigError::InvalidValue {
            name: value.field_name(),
            reason: "must be set".to_string(),
        }
    }
}

impl SdmConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> SdmConfigBuilder {
        SdmConfigBuilder::default()
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    /// See [`SdmConfig::from_lookup`].
    pub fn from_env() -> Result<SdmConfig, ConfigError> {
        SdmConfig::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name (see the
    /// `ENV_*` constants of this module) to its value.
    ///
    /// Empty values are treated as absent.
    ///
    /// # Errors
    /// - If a key is missing and test mode is off.
    /// - If a key or the session secret is malformed.
    /// - If a numeric setting, the profile or the test mode flag can't be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<SdmConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let raw = RawSdmConfig {
            file_read_key: get(ENV_FILE_READ_KEY),
            meta_read_key: get(ENV_META_READ_KEY),
            session_secret: get(ENV_SESSION_SECRET),
            grace_window_secs: get(ENV_GRACE_WINDOW_SECS)
                .map(|v| parse_secs(ENV_GRACE_WINDOW_SECS, &v))
                .transpose()?,
            session_ttl_secs: get(ENV_SESSION_TTL_SECS)
                .map(|v| parse_secs(ENV_SESSION_TTL_SECS, &v))
                .transpose()?,
            profile: get(ENV_PROFILE)
                .map(|v| {
                    v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                        name: ENV_PROFILE,
                        reason: format!("unknown profile `{v}`"),
                    })
                })
                .transpose()?,
            test_mode: get(ENV_TEST_MODE)
                .map(|v| parse_flag(ENV_TEST_MODE, &v))
                .transpose()?,
        };
        SdmConfig::try_from(raw).map_err(|e| match e {
            ConfigError::MissingKey("file_read_key") => ConfigError::MissingKey(ENV_FILE_READ_KEY),
            ConfigError::MissingKey("meta_read_key") => ConfigError::MissingKey(ENV_META_READ_KEY),
            other => other,
        })
    }

    /// Returns the deployment keys, substituting all-zero keys in test mode if none are
    /// configured.
    ///
    /// Returns `None` if no keys are available, in which case every tap must be rejected.
    #[must_use]
    pub fn resolved_keys(&self) -> Option<KeySet> {
        match (&self.keys, self.test_mode) {
            (Some(keys), _) => Some(keys.clone()),
            (None, true) => {
                warn!("SDM test mode active, using predictable all-zero keys");
                Some(KeySet::insecure_zero_keys())
            }
            (None, false) => None,
        }
    }

    /// Creates a [`ReplayGuard`] with the configured grace window.
    #[must_use]
    pub fn replay_guard(&self) -> ReplayGuard {
        ReplayGuard::new(secs_to_duration(self.grace_window_secs))
    }

    /// Creates a [`SessionIssuer`] with the configured secret and lifetime.
    ///
    /// # Errors
    /// If no session secret is configured and test mode is off.
    pub fn session_issuer(&self) -> Result<SessionIssuer, ConfigError> {
        let ttl = secs_to_duration(self.session_ttl_secs);
        match (&self.session_secret, self.test_mode) {
            (Some(secret), _) => Ok(SessionIssuer::new(secret.clone(), ttl)),
            (None, true) => {
                warn!("SDM test mode active, using predictable session secret");
                Ok(SessionIssuer::new(SessionSecret::insecure_zero(), ttl))
            }
            (None, false) => Err(ConfigError::MissingKey(ENV_SESSION_SECRET)),
        }
    }
}

/// Serialized form of [`SdmConfig`], with keys as hex strings.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSdmConfig {
    file_read_key: Option<String>,
    meta_read_key: Option<String>,
    session_secret: Option<String>,
    grace_window_secs: Option<u64>,
    session_ttl_secs: Option<u64>,
    profile: Option<SdmProfile>,
    test_mode: Option<bool>,
}

impl TryFrom<RawSdmConfig> for SdmConfig {
    type Error = ConfigError;

    fn try_from(raw: RawSdmConfig) -> Result<Self, Self::Error> {
        let mut builder = SdmConfig::builder();
        match (raw.file_read_key, raw.meta_read_key) {
            (Some(file), Some(meta)) => {
                builder.keys(KeySet::new(
                    parse_key("file_read_key", &file)?,
                    parse_key("meta_read_key", &meta)?,
                ));
            }
            (None, Some(_)) => return Err(ConfigError::MissingKey("file_read_key")),
            (Some(_), None) => return Err(ConfigError::MissingKey("meta_read_key")),
            (None, None) => {}
        }
        if let Some(secret) = raw.session_secret {
            builder.session_secret(SessionSecret::from_hex("session_secret", &secret)?);
        }
        if let Some(secs) = raw.grace_window_secs {
            builder.grace_window_secs(secs);
        }
        if let Some(secs) = raw.session_ttl_secs {
            builder.session_ttl_secs(secs);
        }
        if let Some(profile) = raw.profile {
            builder.profile(profile);
        }
        if let Some(test_mode) = raw.test_mode {
            builder.test_mode(test_mode);
        }
        builder.build()
    }
}

/// Converts seconds into a [`chrono::Duration`], saturating at its maximum.
fn secs_to_duration(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

fn parse_secs(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        reason: format!("`{value}` is not a number of seconds"),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            reason: format!("`{value}` is not a boolean"),
        }),
    }
}
