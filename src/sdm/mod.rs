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

//! Decoding and authentication of Secure Dynamic Messaging payloads.
//!
//! On every tap, an SDM-enabled tag mirrors two values into its URL:
//! - `e`, the PICC data (UID and read counter), AES-128-CBC encrypted under the *file read key*.
//! - `c`, an AES-CMAC over the decrypted identity, computed with the *meta read key* and
//!   presented either truncated to 8 bytes or in full.
//!
//! [`decode`] recovers the identity from `e`, [`authenticate`] recomputes and checks `c`.
//! The exact byte layout of both steps depends on how the physical tag's SDM file settings
//! were configured, which is selected through an [`SdmProfile`].

use core::fmt::{Debug, Display, Formatter};
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::crypto::{CryptoBackend, Key128, BLOCK_SIZE};
use crate::error::{MalformedInput, TapError};

mod emulator;
mod profile;


pub use emulator::TagEmulator;
pub use profile::SdmProfile;

/// Length of a tag UID in bytes.
pub const UID_LEN: usize = 7;

/// Length of the SDM read counter in bytes.
pub const COUNTER_LEN: usize = 3;

/// Largest value the 24-bit SDM read counter can hold.
pub const MAX_COUNTER: u32 = 0x00FF_FFFF;

/// Length of a truncated authentication code in bytes.
pub const TRUNCATED_TAG_LEN: usize = 8;

/// Length of a full authentication code in bytes.
pub const FULL_TAG_LEN: usize = 16;

/// The 7 byte unique identifier of a physical NFC tag.
///
/// Rendered as uppercase hex, e.g. `04112233445566`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid([u8; UID_LEN]);

impl Uid {
    /// Wraps the given raw UID bytes.
    #[must_use]
    pub const fn new(bytes: [u8; UID_LEN]) -> Uid {
        Uid(bytes)
    }

    /// Returns the raw UID bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; UID_LEN] {
        &self.0
    }

    /// Returns the uppercase hex representation of this UID.
    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode_upper(self.0)
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for Uid {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "Uid({})", self.to_hex())
    }
}

/// Error type used when a string can't be parsed as a [`Uid`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("UID must be 7 hex encoded bytes")]
pub struct InvalidUidError;

impl FromStr for Uid {
    type Err = InvalidUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidUidError)?;
        let bytes: [u8; UID_LEN] = bytes.try_into().map_err(|_| InvalidUidError)?;
        Ok(Uid(bytes))
    }
}

impl TryFrom<String> for Uid {
    type Error = InvalidUidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Uid> for String {
    fn from(value: Uid) -> Self {
        value.to_hex()
    }
}

/// The 24-bit SDM read counter, incremented by the tag on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ReadCounter(u32);

/// Error type used when a counter value does not fit into 24 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("read counter {0} exceeds 24 bits")]
pub struct CounterOutOfRangeError(pub u32);

impl ReadCounter {
    /// Creates a counter from `value`.
    ///
    /// # Errors
    /// If `value` is larger than [`MAX_COUNTER`].
    pub fn new(value: u32) -> Result<ReadCounter, CounterOutOfRangeError> {
        if value > MAX_COUNTER {
            Err(CounterOutOfRangeError(value))
        } else {
            Ok(ReadCounter(value))
        }
    }

    /// Reads a counter from its on-tag representation, least significant byte first.
    #[must_use]
    pub fn from_le_bytes(bytes: [u8; COUNTER_LEN]) -> ReadCounter {
        ReadCounter(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }

    /// Returns the on-tag representation of this counter, least significant byte first.
    #[must_use]
    pub fn to_le_bytes(self) -> [u8; COUNTER_LEN] {
        let [b0, b1, b2, _] = self.0.to_le_bytes();
        [b0, b1, b2]
    }

    /// Returns the numeric value of this counter.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for ReadCounter {
    type Error = CounterOutOfRangeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        ReadCounter::new(value)
    }
}

impl From<ReadCounter> for u32 {
    fn from(value: ReadCounter) -> Self {
        value.0
    }
}

impl Display for ReadCounter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity recovered from the encrypted PICC data of a single tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodedTap {
    /// UID of the physical tag.
    pub uid: Uid,
    /// Read counter at the time of the tap.
    pub counter: ReadCounter,
}

/// The raw parameters of a tap, as mirrored into the tag URL.
///
/// `tid` is only a lookup hint: it selects which tag state to check against, but is not
/// covered by any cryptographic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapParams {
    tid: String,
    encrypted: Vec<u8>,
    auth_tag: Vec<u8>,
}

impl TapParams {
    /// Parses the `tid`, `e` and `c` parameters of a tap.
    ///
    /// Hex decoding is case insensitive. The length of `c` is deliberately not checked here,
    /// see [`authenticate`].
    ///
    /// # Errors
    /// - If any parameter is empty.
    /// - If `e` or `c` is not valid hex.
    /// - If `e` does not decode to exactly one block.
    pub fn parse(tid: &str, e: &str, c: &str) -> Result<TapParams, MalformedInput> {
        if tid.is_empty() {
            return Err(MalformedInput::MissingParameter("tid"));
        }
        if e.is_empty() {
            return Err(MalformedInput::MissingParameter("e"));
        }
        if c.is_empty() {
            return Err(MalformedInput::MissingParameter("c"));
        }
        let encrypted =
            hex::decode(e).map_err(|_| MalformedInput::InvalidHex { parameter: "e" })?;
        if encrypted.len() != BLOCK_SIZE {
            return Err(MalformedInput::CiphertextLength(encrypted.len()));
        }
        let auth_tag = hex::decode(c).map_err(|_| MalformedInput::InvalidHex { parameter: "c" })?;
        Ok(TapParams {
            tid: tid.to_string(),
            encrypted,
            auth_tag,
        })
    }

    /// Collects `tid`, `e` and `c` from already decoded query pairs and parses them.
    ///
    /// Unrelated pairs are ignored. If a parameter occurs more than once, the first occurrence
    /// wins.
    ///
    /// # Errors
    /// See [`TapParams::parse`].
    pub fn from_pairs<'a, I>(pairs: I) -> Result<TapParams, MalformedInput>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let (mut tid, mut e, mut c) = (None, None, None);
        for (name, value) in pairs {
            let slot = match name {
                "tid" => &mut tid,
                "e" => &mut e,
                "c" => &mut c,
                _ => continue,
            };
            slot.get_or_insert(value);
        }
        TapParams::parse(
            tid.unwrap_or_default(),
            e.unwrap_or_default(),
            c.unwrap_or_default(),
        )
    }

    /// Parses the raw query string of a tap URL, with or without the leading `?`.
    ///
    /// Names and values are decoded as `application/x-www-form-urlencoded`: `%xx` escapes
    /// are resolved and `+` stands for a space.
    ///
    /// # Errors
    /// - If a `%` is not followed by two hex digits.
    /// - Otherwise see [`TapParams::parse`].
    pub fn from_query(query: &str) -> Result<TapParams, MalformedInput> {
        let query = query.strip_prefix('?').unwrap_or(query);
        check_escapes(query)?;
        let pairs: Vec<_> = form_urlencoded::parse(query.as_bytes()).collect();
        TapParams::from_pairs(pairs.iter().map(|(name, value)| (&**name, &**value)))
    }

    /// The claimed logical tag identifier.
    #[must_use]
    pub fn tid(&self) -> &str {
        &self.tid
    }

    /// The encrypted PICC data (`e`).
    #[must_use]
    pub fn encrypted(&self) -> &[u8] {
        &self.encrypted
    }

    /// The presented authentication code (`c`).
    #[must_use]
    pub fn auth_tag(&self) -> &[u8] {
        &self.auth_tag
    }
}

/// Rejects `%` signs that do not start a complete `%xx` escape.
fn check_escapes(query: &str) -> Result<(), MalformedInput> {
    let bytes = query.as_bytes();
    for (offset, _) in query.match_indices('%') {
        let escape = bytes.get(offset + 1..offset + 3);
        if !escape.is_some_and(|digits| digits.iter().all(u8::is_ascii_hexdigit)) {
            return Err(MalformedInput::InvalidEscape(offset));
        }
    }
    Ok(())
}

/// Decrypts the PICC data `encrypted` with the `file_read_key` and parses it according to
/// `profile`.
///
/// # Errors
/// Returns [`TapError::DecodeError`] if `encrypted` is not exactly one block, or if the
/// decrypted block does not follow the layout of `profile`.
pub fn decode<B: CryptoBackend + ?Sized>(
    backend: &B,
    encrypted: &[u8],
    file_read_key: &Key128,
    profile: SdmProfile,
) -> Result<DecodedTap, TapError> {
    let mut block: [u8; BLOCK_SIZE] = encrypted.try_into().map_err(|_| {
        TapError::DecodeError(format!(
            "expected a single {} byte block, got {} bytes",
            BLOCK_SIZE,
            encrypted.len()
        ))
    })?;
    backend
        .cbc_decrypt_zero_iv(file_read_key, &mut block)
        .map_err(|e| TapError::DecodeError(e.to_string()))?;
    profile.parse_cleartext(&block)
}

/// Result of comparing a presented authentication code against the recomputed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The presented code matches.
    Match,
    /// The presented code has a valid length, but does not match.
    Mismatch,
    /// The presented code is neither 8 nor 16 bytes long. No comparison took place.
    MalformedLength(usize),
}

impl AuthOutcome {
    /// Returns `true` only for [`AuthOutcome::Match`].
    #[must_use]
    pub fn is_match(self) -> bool {
        self == AuthOutcome::Match
    }
}

/// Recomputes the authentication code for `decoded` under the `meta_read_key` and compares it
/// against `presented`.
///
/// The full CMAC is always recomputed, regardless of `presented`, so every call does the same
/// cryptographic work. A `presented` code of 8 bytes is compared against the truncated CMAC
/// (see [`SdmProfile::truncate`]), one of 16 bytes against the full CMAC. Comparison is
/// constant-time. Any other length yields [`AuthOutcome::MalformedLength`] without comparing.
#[must_use]
pub fn authenticate<B: CryptoBackend + ?Sized>(
    backend: &B,
    decoded: &DecodedTap,
    presented: &[u8],
    meta_read_key: &Key128,
    profile: SdmProfile,
) -> AuthOutcome {
    let full = profile.compute_mac(backend, meta_read_key, decoded);
    let truncated = profile.truncate(&full);
    let expected: &[u8] = match presented.len() {
        TRUNCATED_TAG_LEN => &truncated,
        FULL_TAG_LEN => &full,
        other => return AuthOutcome::MalformedLength(other),
    };
    if bool::from(expected.ct_eq(presented)) {
        AuthOutcome::Match
    } else {
        AuthOutcome::Mismatch
    }
}

/// Convenience wrapper around [`authenticate`] which only reports whether the code matched.
#[must_use]
pub fn is_authentic<B: CryptoBackend + ?Sized>(
    backend: &B,
    decoded: &DecodedTap,
    presented: &[u8],
    meta_read_key: &Key128,
    profile: SdmProfile,
) -> bool {
    authenticate(backend, decoded, presented, meta_read_key, profile).is_match()
}
