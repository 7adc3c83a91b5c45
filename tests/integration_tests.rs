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

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rstest::{fixture, rstest};

use nfc_sdm::config::{ENV_FILE_READ_KEY, ENV_META_READ_KEY, ENV_PROFILE, ENV_SESSION_SECRET};
use nfc_sdm::error::{DiagnosticCode, StoreError};
use nfc_sdm::replay::TapEvent;
use nfc_sdm::sdm::{DecodedTap, ReadCounter, Uid};
use nfc_sdm::{
    MemoryTagStore, RustCryptoContext, SdmConfig, SdmProfile, TagEmulator, TagState,
    TagStateStore, TapError, TapParams, TapVerifier,
};

const FILE_KEY: &str = "1b53525189f66e2e88a3996ae5a87cf3";
const META_KEY: &str = "e4dae5db65c91efdf74ef3eba21b36c3";

/// Store keeping every tag state as a CBOR blob behind a single lock, the way a key-value
/// database would.
#[derive(Default)]
struct BlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    events: Mutex<Vec<TapEvent>>,
}

impl TagStateStore for BlobStore {
    fn provision(&self, tag_id: &str) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock();
        if blobs.contains_key(tag_id) {
            return Err(StoreError::AlreadyExists(tag_id.to_string()));
        }
        blobs.insert(tag_id.to_string(), TagState::new().to_cbor()?);
        Ok(())
    }

    fn load(&self, tag_id: &str) -> Result<TagState, StoreError> {
        let blobs = self.blobs.lock();
        let blob = blobs
            .get(tag_id)
            .ok_or_else(|| StoreError::UnknownTag(tag_id.to_string()))?;
        TagState::from_cbor(blob)
    }

    fn remove(&self, tag_id: &str) -> Result<(), StoreError> {
        self.blobs
            .lock()
            .remove(tag_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UnknownTag(tag_id.to_string()))
    }

    fn transact<T, E, F>(&self, tag_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&TagState) -> Result<(TagState, T), E>,
        E: From<StoreError>,
    {
        let mut blobs = self.blobs.lock();
        let blob = blobs
            .get_mut(tag_id)
            .ok_or_else(|| StoreError::UnknownTag(tag_id.to_string()))?;
        let (updated, value) = f(&TagState::from_cbor(blob)?)?;
        *blob = updated.to_cbor()?;
        Ok(value)
    }

    fn record_event(&self, event: TapEvent) -> Result<(), StoreError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[fixture]
fn config() -> SdmConfig {
    SdmConfig::from_lookup(|name| {
        match name {
            n if n == ENV_FILE_READ_KEY => Some(FILE_KEY),
            n if n == ENV_META_READ_KEY => Some(META_KEY),
            n if n == ENV_PROFILE => Some("ntag424_sun"),
            n if n == ENV_SESSION_SECRET => Some("000102030405060708090a0b0c0d0e0f"),
            _ => None,
        }
        .map(ToString::to_string)
    })
    .expect("valid configuration")
}

#[fixture]
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
}

fn query(tid: &str, e: &str, c: &str) -> String {
    format!("?tid={tid}&e={e}&c={c}")
}

/// URLs captured from a physical NTAG 424 DNA.
#[rstest]
fn test_real_tag_urls(config: SdmConfig, t0: DateTime<Utc>) {
    let store = BlobStore::default();
    store.provision("card-1").unwrap();
    let verifier = TapVerifier::from_config(&config, RustCryptoContext, store);
    let uid: Uid = "048D58D2142290".parse().unwrap();

    let urls = [
        ("7A4D60F5098CDC5EC25D19592DD90F61", "82E278C1118CEE2F"),
        ("3B721FF6E84B8BAB149395CEFDBD465F", "B5939AF5E1DFD702"),
        ("79831D41FEAB2E7F54C26FBBB8C72126", "53A929063D0ACD94"),
    ];
    for (minute, (e, c)) in (0..).zip(urls) {
        let verdict = verifier.verify_query(&query("card-1", e, c), t0 + Duration::minutes(minute));
        assert!(verdict.is_valid, "{:?}", verdict.diagnostic());
        assert_eq!(verdict.uid, Some(uid));
    }
    assert_eq!(
        verifier.store().load("card-1").unwrap().last_counter,
        ReadCounter::new(12).ok()
    );

    // Replaying the first URL after the tag moved on.
    let (e, c) = urls[0];
    let replay = verifier.verify_query(&query("card-1", e, c), t0 + Duration::minutes(3));
    assert_eq!(
        replay.diagnostic().map(TapError::code),
        Some(DiagnosticCode::ReplayDetected)
    );
    assert_eq!(verifier.store().events.lock().len(), 3);
}

#[rstest]
fn test_tap_to_session(config: SdmConfig, t0: DateTime<Utc>) {
    let store = BlobStore::default();
    store.provision("card-2").unwrap();
    let verifier = TapVerifier::from_config(&config, RustCryptoContext, store);
    let issuer = config.session_issuer().unwrap();

    let keys = config.resolved_keys().unwrap();
    let tag = TagEmulator::new(RustCryptoContext, keys, SdmProfile::Ntag424Sun);
    let tap = DecodedTap {
        uid: "04AABBCCDDEEFF".parse().unwrap(),
        counter: ReadCounter::new(1).unwrap(),
    };
    let (e, c) = tag.tap_hex(&tap, &[0x5A; 5]).unwrap();
    let params = TapParams::from_query(&query("card-2", &e, &c)).unwrap();

    let session = verifier.verify_and_issue(&issuer, &params, t0).unwrap();
    assert!(session.verdict.is_valid);
    let claims = issuer
        .verify(&session.token.unwrap(), t0 + Duration::minutes(9))
        .unwrap();
    assert_eq!(claims.tag_id, "card-2");
    assert_eq!(claims.uid, tap.uid);

    // Replay state is kept per logical tag.
    verifier.store().provision("card-3").unwrap();
    let moved = TapParams::from_query(&query("card-3", &e, &c)).unwrap();
    assert!(verifier.verify(&moved, t0).is_valid);
    assert_eq!(
        verifier.store().load("card-3").unwrap().bound_uid,
        Some(tap.uid)
    );
}

#[rstest]
fn test_state_survives_restart(config: SdmConfig, t0: DateTime<Utc>) {
    let keys = config.resolved_keys().unwrap();
    let tag = TagEmulator::new(RustCryptoContext, keys, SdmProfile::Ntag424Sun);
    let tap = DecodedTap {
        uid: "04AABBCCDDEEFF".parse().unwrap(),
        counter: ReadCounter::new(30).unwrap(),
    };
    let (e, c) = tag.tap_hex(&tap, &[]).unwrap();
    let url = query("card-4", &e, &c);

    let store = MemoryTagStore::new();
    store.provision("card-4").unwrap();
    let verifier = TapVerifier::from_config(&config, RustCryptoContext, store);
    assert!(verifier.verify_query(&url, t0).is_valid);
    let snapshot = verifier.store().export_cbor().unwrap();

    let restored = MemoryTagStore::import_cbor(&snapshot).unwrap();
    let verifier = TapVerifier::from_config(&config, RustCryptoContext, restored);
    assert!(verifier.verify_query(&url, t0 + Duration::minutes(1)).is_valid);
    assert!(!verifier.verify_query(&url, t0 + Duration::hours(1)).is_valid);
}
