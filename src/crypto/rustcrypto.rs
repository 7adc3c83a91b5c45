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
use cbc::cipher::block_padding::NoPadding;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::Aes128;

use super::{Block, BlockAlignmentError, CryptoBackend, Key128, BLOCK_SIZE};

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;

const ZERO_IV: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Context for the RustCrypto cryptographic backend.
///
/// Can be used as a [`CryptoBackend`] for SDM verification. The context holds no state, a
/// single instance may be shared freely between threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCryptoContext;

impl RustCryptoContext {
    /// Creates a new RustCrypto backend.
    #[must_use]
    pub fn new() -> RustCryptoContext {
        RustCryptoContext
    }
}

impl CryptoBackend for RustCryptoContext {
    fn encrypt_block(&self, key: &Key128, block: &mut Block) {
        let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }

    fn cbc_decrypt_zero_iv(
        &self,
        key: &Key128,
        data: &mut [u8],
    ) -> Result<(), BlockAlignmentError> {
        let len = data.len();
        if len % BLOCK_SIZE != 0 {
            return Err(BlockAlignmentError(len));
        }
        Aes128CbcDec::new(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(&ZERO_IV),
        )
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| BlockAlignmentError(len))?;
        Ok(())
    }

    fn cbc_encrypt_zero_iv(
        &self,
        key: &Key128,
        data: &mut [u8],
    ) -> Result<(), BlockAlignmentError> {
        let len = data.len();
        if len % BLOCK_SIZE != 0 {
            return Err(BlockAlignmentError(len));
        }
        Aes128CbcEnc::new(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(&ZERO_IV),
        )
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|_| BlockAlignmentError(len))?;
        Ok(())
    }
}
