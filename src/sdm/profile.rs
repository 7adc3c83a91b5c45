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
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::crypto::{cmac, Block, CryptoBackend, Key128, BLOCK_SIZE};
use crate::error::TapError;
use crate::sdm::{DecodedTap, ReadCounter, Uid, COUNTER_LEN, TRUNCATED_TAG_LEN, UID_LEN};

/// PICC data tag byte of an NTAG 424 DNA SUN message with UID and read counter mirroring.
pub const PICC_DATA_TAG: u8 = 0xC7;

/// Prefix of the session vector used to derive the SDM session MAC key (NXP AN12196).
const SV2_PREFIX: [u8; 6] = [0x3C, 0xC3, 0x00, 0x01, 0x00, 0x80];

/// Byte layout of the PICC data and the authenticated message.
///
/// Which profile applies depends on the SDM file settings written to the physical tag, it must
/// be verified against a real tag before deployment.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SdmProfile {
    /// PICC data is `UID(7) ‖ CTR(3) ‖ fill(6)`.
    ///
    /// The authentication code is the CMAC under the meta read key over
    /// `UID ‖ CTR ‖ 0x00 * 6`, truncated codes are its first 8 bytes.
    #[default]
    UidCounter,

    /// NTAG 424 DNA SUN message: PICC data is `0xC7 ‖ UID(7) ‖ CTR(3) ‖ fill(5)`.
    ///
    /// The meta read key is diversified into a session MAC key by computing the CMAC over
    /// `3C C3 00 01 00 80 ‖ UID ‖ CTR`. The authentication code is the CMAC of the empty
    /// message under that session key, truncated codes consist of its odd-indexed bytes.
    Ntag424Sun,
}

impl SdmProfile {
    /// Offset of the UID within the decrypted PICC data.
    fn uid_offset(self) -> usize {
        match self {
            SdmProfile::UidCounter => 0,
            SdmProfile::Ntag424Sun => 1,
        }
    }

    /// Parses a decrypted PICC data `block` into UID and read counter.
    ///
    /// Trailing fill bytes are ignored.
    ///
    /// # Errors
    /// Returns [`TapError::DecodeError`] if the block does not follow this profile's layout.
    pub fn parse_cleartext(self, block: &Block) -> Result<DecodedTap, TapError> {
        if self == SdmProfile::Ntag424Sun && block[0] != PICC_DATA_TAG {
            return Err(TapError::DecodeError(format!(
                "invalid PICC data tag {:#04X}, expected {PICC_DATA_TAG:#04X}",
                block[0]
            )));
        }
        let uid_start = self.uid_offset();
        let counter_start = uid_start + UID_LEN;

        let mut uid = [0u8; UID_LEN];
        uid.copy_from_slice(&block[uid_start..counter_start]);
        let mut counter = [0u8; COUNTER_LEN];
        counter.copy_from_slice(&block[counter_start..counter_start + COUNTER_LEN]);

        Ok(DecodedTap {
            uid: Uid::new(uid),
            counter: ReadCounter::from_le_bytes(counter),
        })
    }

    /// Builds the PICC data block a tag would encrypt for `decoded`, using `fill` for the
    /// trailing bytes (missing fill bytes are zero, surplus ones are ignored).
    #[must_use]
    pub fn build_cleartext(self, decoded: &DecodedTap, fill: &[u8]) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        if self == SdmProfile::Ntag424Sun {
            block[0] = PICC_DATA_TAG;
        }
        let uid_start = self.uid_offset();
        let counter_start = uid_start + UID_LEN;
        let fill_start = counter_start + COUNTER_LEN;

        block[uid_start..counter_start].copy_from_slice(decoded.uid.as_bytes());
        block[counter_start..fill_start].copy_from_slice(&decoded.counter.to_le_bytes());
        for (dst, src) in block[fill_start..].iter_mut().zip(fill) {
            *dst = *src;
        }
        block
    }

    /// Builds the single block `UID ‖ CTR ‖ 0x00 * 6` which [`SdmProfile::UidCounter`]
    /// authenticates.
    #[must_use]
    pub fn uid_counter_mac_input(decoded: &DecodedTap) -> Block {
        let mut input = [0u8; BLOCK_SIZE];
        input[..UID_LEN].copy_from_slice(decoded.uid.as_bytes());
        input[UID_LEN..UID_LEN + COUNTER_LEN].copy_from_slice(&decoded.counter.to_le_bytes());
        input
    }

    /// Computes the full 16 byte authentication code for `decoded`.
    #[must_use]
    pub fn compute_mac<B: CryptoBackend + ?Sized>(
        self,
        backend: &B,
        meta_read_key: &Key128,
        decoded: &DecodedTap,
    ) -> Block {
        match self {
            SdmProfile::UidCounter => cmac(
                backend,
                meta_read_key,
                &Self::uid_counter_mac_input(decoded),
            ),
            SdmProfile::Ntag424Sun => {
                let mut sv2 = [0u8; BLOCK_SIZE];
                sv2[..SV2_PREFIX.len()].copy_from_slice(&SV2_PREFIX);
                sv2[6..6 + UID_LEN].copy_from_slice(decoded.uid.as_bytes());
                sv2[6 + UID_LEN..].copy_from_slice(&decoded.counter.to_le_bytes());
                let session_key = Key128::new(cmac(backend, meta_read_key, &sv2));
                cmac(backend, &session_key, &[])
            }
        }
    }

    /// Truncates a full authentication code to the 8 bytes a tag presents in truncated mode.
    #[must_use]
    pub fn truncate(self, full: &Block) -> [u8; TRUNCATED_TAG_LEN] {
        let mut truncated = [0u8; TRUNCATED_TAG_LEN];
        match self {
            SdmProfile::UidCounter => truncated.copy_from_slice(&full[..TRUNCATED_TAG_LEN]),
            SdmProfile::Ntag424Sun => {
                for (i, byte) in truncated.iter_mut().enumerate() {
                    *byte = full[2 * i + 1];
                }
            }
        }
        truncated
    }
}
