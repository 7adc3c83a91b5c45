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
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::crypto::{Block, BlockAlignmentError, CryptoBackend, Key128, RustCryptoContext};

/// Backend wrapping [`RustCryptoContext`] which counts every primitive invocation.
#[derive(Debug, Default)]
pub(crate) struct CountingBackend {
    inner: RustCryptoContext,
    block_encryptions: AtomicUsize,
    cbc_decryptions: AtomicUsize,
}

impl CountingBackend {
    pub(crate) fn block_encryptions(&self) -> usize {
        self.block_encryptions.load(Ordering::SeqCst)
    }

    pub(crate) fn cbc_decryptions(&self) -> usize {
        self.cbc_decryptions.load(Ordering::SeqCst)
    }
}

impl CryptoBackend for CountingBackend {
    fn encrypt_block(&self, key: &Key128, block: &mut Block) {
        self.block_encryptions.fetch_add(1, Ordering::SeqCst);
        self.inner.encrypt_block(key, block);
    }

    fn cbc_decrypt_zero_iv(
        &self,
        key: &Key128,
        data: &mut [u8],
    ) -> Result<(), BlockAlignmentError> {
        self.cbc_decryptions.fetch_add(1, Ordering::SeqCst);
        self.inner.cbc_decrypt_zero_iv(key, data)
    }

    fn cbc_encrypt_zero_iv(
        &self,
        key: &Key128,
        data: &mut [u8],
    ) -> Result<(), BlockAlignmentError> {
        self.inner.cbc_encrypt_zero_iv(key, data)
    }
}

/// Parses a hex string which is known to be valid.
pub(crate) fn hex_bytes(input: &str) -> Vec<u8> {
    hex::decode(input).expect("test hex must be valid")
}

/// Parses a 16 byte key from a hex string which is known to be valid.
pub(crate) fn hex_key(input: &str) -> Key128 {
    let bytes: [u8; 16] = hex_bytes(input)
        .try_into()
        .expect("test key must be 16 bytes");
    Key128::new(bytes)
}
