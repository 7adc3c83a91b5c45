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

//! AES-CMAC as specified in [RFC 4493](https://datatracker.ietf.org/doc/html/rfc4493).

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{xor_into, Block, CryptoBackend, Key128, BLOCK_SIZE};

/// The constant `R_b` for 128-bit block ciphers (RFC 4493, section 2.3).
pub const CMAC_RB: u8 = 0x87;

/// The two CMAC subkeys derived from a key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Subkeys {
    /// Subkey applied to a complete final block.
    pub k1: Block,
    /// Subkey applied to a padded final block.
    pub k2: Block,
}

/// Shifts `block` left by one bit and conditionally XORs [`CMAC_RB`] into the last byte if
/// the bit shifted out was set.
fn double(block: &Block) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    let mut carry = 0u8;
    for i in (0..BLOCK_SIZE).rev() {
        out[i] = (block[i] << 1) | carry;
        carry = block[i] >> 7;
    }
    // Branch-free, the result must not leak key bits through timing.
    out[BLOCK_SIZE - 1] ^= CMAC_RB & 0u8.wrapping_sub(carry);
    out
}

/// Derives the subkeys `K1` and `K2` for `key` (RFC 4493, section 2.3).
#[must_use]
pub fn derive_subkeys<B: CryptoBackend + ?Sized>(backend: &B, key: &Key128) -> Subkeys {
    let mut l = [0u8; BLOCK_SIZE];
    backend.encrypt_block(key, &mut l);
    let k1 = double(&l);
    let k2 = double(&k1);
    l.zeroize();
    Subkeys { k1, k2 }
}

/// Computes the AES-CMAC of `message` using `key`.
///
/// The empty message is valid input. The result is always the full 16 byte tag, callers
/// truncate it as required.
#[must_use]
pub fn cmac<B: CryptoBackend + ?Sized>(backend: &B, key: &Key128, message: &[u8]) -> Block {
    let subkeys = derive_subkeys(backend, key);

    let block_count = message.len().div_ceil(BLOCK_SIZE).max(1);
    let last_start = (block_count - 1) * BLOCK_SIZE;
    let tail = &message[last_start..];

    let mut last = [0u8; BLOCK_SIZE];
    if !message.is_empty() && tail.len() == BLOCK_SIZE {
        last.copy_from_slice(tail);
        xor_into(&mut last, &subkeys.k1);
    } else {
        last[..tail.len()].copy_from_slice(tail);
        last[tail.len()] = 0x80;
        xor_into(&mut last, &subkeys.k2);
    }

    let mut state = [0u8; BLOCK_SIZE];
    for chunk in message[..last_start].chunks_exact(BLOCK_SIZE) {
        xor_into(&mut state, chunk);
        backend.encrypt_block(key, &mut state);
    }
    xor_into(&mut state, &last);
    backend.encrypt_block(key, &mut state);
    last.zeroize();
    state
}
