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
use crate::config::KeySet;
use crate::crypto::{BlockAlignmentError, CryptoBackend};
use crate::sdm::{DecodedTap, SdmProfile};

/// Produces the `e` and `c` values a tag configured with the given keys and profile would
/// mirror into its URL.
///
/// Useful to check a provisioned key set against a freshly programmed tag, and for tests.
#[derive(Debug, Clone)]
pub struct TagEmulator<B: CryptoBackend> {
    backend: B,
    keys: KeySet,
    profile: SdmProfile,
    full_length_tags: bool,
}

impl<B: CryptoBackend> TagEmulator<B> {
    /// Creates an emulator presenting truncated (8 byte) authentication codes.
    #[must_use]
    pub fn new(backend: B, keys: KeySet, profile: SdmProfile) -> TagEmulator<B> {
        TagEmulator {
            backend,
            keys,
            profile,
            full_length_tags: false,
        }
    }

    /// Makes the emulator present full 16 byte authentication codes instead.
    #[must_use]
    pub fn with_full_length_tags(mut self) -> TagEmulator<B> {
        self.full_length_tags = true;
        self
    }

    /// Emulates a tap, returning the raw encrypted PICC data and authentication code.
    ///
    /// `fill` is used for the unused trailing bytes of the PICC data.
    ///
    /// # Errors
    /// Only if the backend rejects a single, aligned block, which indicates a faulty backend.
    pub fn tap(
        &self,
        decoded: &DecodedTap,
        fill: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), BlockAlignmentError> {
        let mut encrypted = self.profile.build_cleartext(decoded, fill);
        self.backend
            .cbc_encrypt_zero_iv(self.keys.file_read_key(), &mut encrypted)?;

        let full = self
            .profile
            .compute_mac(&self.backend, self.keys.meta_read_key(), decoded);
        let auth_tag = if self.full_length_tags {
            full.to_vec()
        } else {
            self.profile.truncate(&full).to_vec()
        };
        Ok((encrypted.to_vec(), auth_tag))
    }

    /// Like [`TagEmulator::tap`], but returns uppercase hex strings as they appear in a URL.
    ///
    /// # Errors
    /// See [`TagEmulator::tap`].
    pub fn tap_hex(
        &self,
        decoded: &DecodedTap,
        fill: &[u8],
    ) -> Result<(String, String), BlockAlignmentError> {
        let (e, c) = self.tap(decoded, fill)?;
        Ok((hex::encode_upper(e), hex::encode_upper(c)))
    }
}
