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
use ::cmac::{Cmac, Mac};
use rstest::rstest;

use crate::crypto::test_helper::{hex_bytes, hex_key, CountingBackend};
use crate::crypto::{cmac, derive_subkeys, BlockAlignmentError, CryptoBackend, RustCryptoContext};

const RFC4493_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";

const RFC4493_MESSAGE: &str = "6bc1bee22e409f96e93d7e117393172a\
                               ae2d8a571e03ac9c9eb76fac45af8e51\
                               30c81c46a35ce411e5fbc1191a0a52ef\
                               f69f2445df4f9b17ad2b417be66c3710";

#[rstest]
#[case::empty(0, "bb1d6929e95937287fa37d129b756746")]
#[case::one_block(16, "070a16b46b4d4144f79bdd9dd04a287c")]
#[case::two_and_a_half_blocks(40, "dfa66747de9ae63030ca32611497c827")]
#[case::four_blocks(64, "51f0bebf7e3b9d92fc49741779363cfe")]
fn test_cmac_rfc4493_vectors(#[case] length: usize, #[case] expected: &str) {
    let key = hex_key(RFC4493_KEY);
    let message = hex_bytes(RFC4493_MESSAGE);
    let tag = cmac(&RustCryptoContext, &key, &message[..length]);
    assert_eq!(hex::encode(tag), expected);
}

#[test]
fn test_subkey_derivation_rfc4493() {
    let key = hex_key(RFC4493_KEY);
    let subkeys = derive_subkeys(&RustCryptoContext, &key);
    assert_eq!(hex::encode(subkeys.k1), "fbeed618357133667c85e08f7236a8de");
    assert_eq!(hex::encode(subkeys.k2), "f7ddac306ae266ccf90bc11ee46d513b");
}

#[rstest]
fn test_cmac_matches_rustcrypto_cmac(
    #[values(1, 7, 15, 17, 31, 32, 33, 48, 100)] length: usize,
) {
    let key = hex_key("000102030405060708090a0b0c0d0e0f");
    let message: Vec<u8> = (0..=u8::MAX).cycle().step_by(31).take(length).collect();

    let mut reference = <Cmac<aes::Aes128> as Mac>::new_from_slice(key.as_bytes())
        .expect("key has valid length");
    reference.update(&message);
    let expected: [u8; 16] = reference.finalize().into_bytes().into();

    assert_eq!(cmac(&RustCryptoContext, &key, &message), expected);
}

#[test]
fn test_cmac_block_cipher_invocations() {
    // One encryption for L, then one per message block.
    let backend = CountingBackend::default();
    let key = hex_key(RFC4493_KEY);
    let message = hex_bytes(RFC4493_MESSAGE);

    let _ = cmac(&backend, &key, &[]);
    assert_eq!(backend.block_encryptions(), 2);

    let _ = cmac(&backend, &key, &message[..40]);
    assert_eq!(backend.block_encryptions(), 2 + 4);
}

#[test]
fn test_aes_fips197_block() {
    let key = hex_key("000102030405060708090a0b0c0d0e0f");
    let mut block: [u8; 16] = hex_bytes("00112233445566778899aabbccddeeff")
        .try_into()
        .unwrap();
    RustCryptoContext.encrypt_block(&key, &mut block);
    assert_eq!(hex::encode(block), "69c4e0d86a7b0430d8cdb78070b4c55a");
}

#[test]
fn test_cbc_zero_iv_single_block_is_ecb() {
    // With a zero IV, the first CBC block equals plain ECB.
    let key = hex_key("000102030405060708090a0b0c0d0e0f");
    let mut data = hex_bytes("00112233445566778899aabbccddeeff");
    RustCryptoContext
        .cbc_encrypt_zero_iv(&key, &mut data)
        .unwrap();
    assert_eq!(hex::encode(&data), "69c4e0d86a7b0430d8cdb78070b4c55a");

    RustCryptoContext
        .cbc_decrypt_zero_iv(&key, &mut data)
        .unwrap();
    assert_eq!(hex::encode(&data), "00112233445566778899aabbccddeeff");
}

#[rstest]
fn test_cbc_rejects_unaligned_data(#[values(1, 15, 17, 31)] length: usize) {
    let key = hex_key(RFC4493_KEY);
    let mut data = vec![0u8; length];
    assert_eq!(
        RustCryptoContext.cbc_decrypt_zero_iv(&key, &mut data),
        Err(BlockAlignmentError(length))
    );
    assert_eq!(
        RustCryptoContext.cbc_encrypt_zero_iv(&key, &mut data),
        Err(BlockAlignmentError(length))
    );
}

#[test]
fn test_key_debug_hides_material() {
    let key = hex_key(RFC4493_KEY);
    assert_eq!(format!("{key:?}"), "Key128(..)");
    assert!(!key.is_zero());
    assert!(crate::crypto::Key128::new([0; 16]).is_zero());
}
