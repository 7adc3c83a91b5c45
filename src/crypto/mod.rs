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

//! Block cipher primitives and the AES-CMAC engine.
//!
//! All SDM cryptography is built on two AES-128 operations, which a
//! [`CryptoBackend`] has to provide:
//! - single-block ECB encryption, used by the [`cmac`] engine for subkey derivation and chaining.
//! - CBC with an all-zero IV and no padding, used to decrypt the tag's PICC data.
//!
//! The default backend is [`RustCryptoContext`], which uses the RustCrypto `aes` and `cbc`
//! crates.

use core::fmt::{Debug, Formatter};

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

mod cmac;
mod rustcrypto;

#[cfg(test)]
pub(crate) mod test_helper;
#[cfg(test)]
mod tests;

pub use self::cmac::{cmac, derive_subkeys, Subkeys, CMAC_RB};
pub use self::rustcrypto::RustCryptoContext;

/// Block size of AES in bytes.
pub const BLOCK_SIZE: usize = 16;

/// A single AES block.
pub type Block = [u8; BLOCK_SIZE];

/// A 128-bit AES key.
///
/// The key material is wiped from memory when the value is dropped and is never printed by
/// its [`Debug`] implementation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key128([u8; 16]);

impl Key128 {
    /// Wraps the given raw key bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Key128 {
        Key128(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns `true` if every byte of this key is zero.
    ///
    /// An all-zero key is predictable and must only ever be used in test mode.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().fold(0u8, |acc, b| acc | b) == 0
    }
}

impl From<[u8; 16]> for Key128 {
    fn from(value: [u8; 16]) -> Self {
        Key128::new(value)
    }
}

impl Debug for Key128 {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str("Key128(..)")
    }
}

/// Error returned by CBC operations on data that is not a whole number of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("data length {0} is not a multiple of the 16 byte block size")]
pub struct BlockAlignmentError(pub usize);

/// Provides the AES-128 operations required for SDM verification.
///
/// Implementations must be stateless with respect to the operations themselves, all methods
/// take `&self` so a single backend can be shared between concurrently verified taps.
pub trait CryptoBackend {
    /// Encrypts a single `block` in place using AES-128 in ECB mode.
    fn encrypt_block(&self, key: &Key128, block: &mut Block);

    /// Decrypts `data` in place using AES-128-CBC with an all-zero IV, without removing
    /// any padding.
    ///
    /// # Errors
    /// If `data` is not a multiple of [`BLOCK_SIZE`] bytes long.
    fn cbc_decrypt_zero_iv(
        &self,
        key: &Key128,
        data: &mut [u8],
    ) -> Result<(), BlockAlignmentError>;

    /// Encrypts `data` in place using AES-128-CBC with an all-zero IV, without adding
    /// any padding.
    ///
    /// Verification never needs this, it is used to emulate tags (e.g. for provisioning checks
    /// and tests).
    ///
    /// # Errors
    /// If `data` is not a multiple of [`BLOCK_SIZE`] bytes long.
    fn cbc_encrypt_zero_iv(
        &self,
        key: &Key128,
        data: &mut [u8],
    ) -> Result<(), BlockAlignmentError>;
}

impl<T: CryptoBackend + ?Sized> CryptoBackend for &T {
    fn encrypt_block(&self, key: &Key128, block: &mut Block) {
        (**self).encrypt_block(key, block);
    }

    fn cbc_decrypt_zero_iv(
        &self,
        key: &Key128,
        data: &mut [u8],
    ) -> Result<(), BlockAlignmentError> {
        (**self).cbc_decrypt_zero_iv(key, data)
    }

    fn cbc_encrypt_zero_iv(
        &self,
        key: &Key128,
        data: &mut [u8],
    ) -> Result<(), BlockAlignmentError> {
        (**self).cbc_encrypt_zero_iv(key, data)
    }
}

/// XORs `other` into `block`, byte by byte.
pub(crate) fn xor_into(block: &mut Block, other: &[u8]) {
    for (b, o) in block.iter_mut().zip(other) {
        *b ^= o;
    }
}
