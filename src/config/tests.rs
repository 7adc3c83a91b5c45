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
use std::collections::HashMap;

use chrono::Duration;
use rstest::rstest;

use crate::config::{
    KeySet, SdmConfig, ENV_FILE_READ_KEY, ENV_GRACE_WINDOW_SECS, ENV_META_READ_KEY, ENV_PROFILE,
    ENV_SESSION_SECRET, ENV_SESSION_TTL_SECS, ENV_TEST_MODE,
};
use crate::error::ConfigError;
use crate::sdm::SdmProfile;

const FILE_KEY: &str = "000102030405060708090A0B0C0D0E0F";
const META_KEY: &str = "F0E0D0C0B0A090807060504030201000";

fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<&'static str, String> =
        vars.iter().map(|(k, v)| (*k, (*v).to_string())).collect();
    move |name| vars.get(name).cloned()
}

#[rstest]
fn test_defaults() {
    let config = SdmConfig::from_lookup(lookup(&[
        (ENV_FILE_READ_KEY, FILE_KEY),
        (ENV_META_READ_KEY, META_KEY),
    ]))
    .unwrap();
    assert!(!config.test_mode);
    assert_eq!(config.profile, SdmProfile::UidCounter);
    assert_eq!(config.grace_window_secs, 600);
    assert_eq!(config.session_ttl_secs, 600);
    assert_eq!(config.replay_guard().grace_window(), Duration::minutes(10));
    assert!(config.session_secret.is_none());

    let keys = config.resolved_keys().unwrap();
    assert_eq!(hex::encode_upper(keys.file_read_key().as_bytes()), FILE_KEY);
    assert_eq!(hex::encode_upper(keys.meta_read_key().as_bytes()), META_KEY);
    assert_eq!(
        config.session_issuer().unwrap_err(),
        ConfigError::MissingKey(ENV_SESSION_SECRET)
    );
}

#[rstest]
fn test_all_settings() {
    let secret = "ab".repeat(32);
    let file_key = FILE_KEY.to_lowercase();
    let config = SdmConfig::from_lookup(lookup(&[
        (ENV_FILE_READ_KEY, file_key.as_str()),
        (ENV_META_READ_KEY, META_KEY),
        (ENV_SESSION_SECRET, secret.as_str()),
        (ENV_GRACE_WINDOW_SECS, "30"),
        (ENV_SESSION_TTL_SECS, " 120 "),
        (ENV_PROFILE, "ntag424_sun"),
        (ENV_TEST_MODE, "off"),
    ]))
    .unwrap();
    assert_eq!(config.profile, SdmProfile::Ntag424Sun);
    assert_eq!(config.replay_guard().grace_window(), Duration::seconds(30));
    assert_eq!(
        config.session_issuer().unwrap().ttl(),
        Duration::seconds(120)
    );
}

#[rstest]
#[case::nothing(&[], ConfigError::MissingKey(ENV_FILE_READ_KEY))]
#[case::only_file_key(&[(ENV_FILE_READ_KEY, FILE_KEY)], ConfigError::MissingKey(ENV_META_READ_KEY))]
#[case::only_meta_key(&[(ENV_META_READ_KEY, META_KEY)], ConfigError::MissingKey(ENV_FILE_READ_KEY))]
#[case::empty_values(
    &[(ENV_FILE_READ_KEY, ""), (ENV_META_READ_KEY, "  ")],
    ConfigError::MissingKey(ENV_FILE_READ_KEY)
)]
#[case::bad_hex(
    &[(ENV_FILE_READ_KEY, "zz"), (ENV_META_READ_KEY, META_KEY)],
    ConfigError::InvalidHex("file_read_key")
)]
#[case::short_key(
    &[(ENV_FILE_READ_KEY, FILE_KEY), (ENV_META_READ_KEY, "F0E0D0C0")],
    ConfigError::InvalidKeyLength { name: "meta_read_key", expected: 16, actual: 4 }
)]
fn test_fails_closed(#[case] vars: &[(&'static str, &str)], #[case] expected: ConfigError) {
    assert_eq!(SdmConfig::from_lookup(lookup(vars)).unwrap_err(), expected);
}

#[rstest]
#[case::grace_window(ENV_GRACE_WINDOW_SECS, "ten minutes")]
#[case::negative_ttl(ENV_SESSION_TTL_SECS, "-1")]
#[case::zero_ttl(ENV_SESSION_TTL_SECS, "0")]
#[case::profile(ENV_PROFILE, "ntag213")]
#[case::test_mode(ENV_TEST_MODE, "maybe")]
fn test_invalid_setting(#[case] name: &'static str, #[case] value: &str) {
    let result = SdmConfig::from_lookup(lookup(&[
        (ENV_FILE_READ_KEY, FILE_KEY),
        (ENV_META_READ_KEY, META_KEY),
        (name, value),
    ]));
    assert!(
        matches!(result, Err(ConfigError::InvalidValue { .. })),
        "{result:?}"
    );
}

#[rstest]
fn test_zero_keys_need_test_mode() {
    let zero = "00".repeat(16);
    let vars = [(ENV_FILE_READ_KEY, zero.as_str()), (ENV_META_READ_KEY, META_KEY)];
    assert!(matches!(
        SdmConfig::from_lookup(lookup(&vars)),
        Err(ConfigError::InvalidValue { name: "keys", .. })
    ));
}

#[rstest]
#[case("1")]
#[case("true")]
#[case("YES")]
fn test_test_mode_substitutes_zero_keys(#[case] flag: &str) {
    let config = SdmConfig::from_lookup(lookup(&[(ENV_TEST_MODE, flag)])).unwrap();
    assert!(config.test_mode);
    assert!(config.keys.is_none());
    assert!(config.resolved_keys().unwrap().is_predictable());
    assert!(config.session_issuer().is_ok());
}

#[rstest]
fn test_builder() {
    let config = SdmConfig::builder()
        .keys(KeySet::from_hex(FILE_KEY, META_KEY).unwrap())
        .grace_window_secs(5)
        .build()
        .unwrap();
    assert_eq!(config.replay_guard().grace_window(), Duration::seconds(5));
    assert!(matches!(
        SdmConfig::builder().build(),
        Err(ConfigError::MissingKey("file_read_key"))
    ));
}

#[rstest]
fn test_deserialize() {
    let json = serde_json::json!({
        "file_read_key": FILE_KEY,
        "meta_read_key": META_KEY,
        "profile": "ntag424_sun",
        "grace_window_secs": 60
    });
    let config: SdmConfig = serde_json::from_value(json).unwrap();
    assert_eq!(config.profile, SdmProfile::Ntag424Sun);
    assert_eq!(config.grace_window_secs, 60);

    let unknown = serde_json::json!({"test_mode": true, "fallback_key": "00"});
    assert!(serde_json::from_value::<SdmConfig>(unknown).is_err());
    let missing = serde_json::json!({"profile": "uid_counter"});
    assert!(serde_json::from_value::<SdmConfig>(missing).is_err());
}

#[rstest]
fn test_huge_grace_window_saturates() {
    let config = SdmConfig::builder()
        .keys(KeySet::from_hex(FILE_KEY, META_KEY).unwrap())
        .grace_window_secs(u64::MAX)
        .build()
        .unwrap();
    assert_eq!(config.replay_guard().grace_window(), Duration::MAX);
}

#[rstest]
fn test_key_set_debug_hides_keys() {
    let keys = KeySet::from_hex(FILE_KEY, META_KEY).unwrap();
    let debug = format!("{keys:?}");
    assert!(!debug.contains("0102"));
    assert!(!debug.contains("F0E0"));
}
