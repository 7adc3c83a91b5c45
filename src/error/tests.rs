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
use std::collections::HashSet;

use rstest::rstest;
use strum::IntoEnumIterator;

use crate::error::{DiagnosticCode, MalformedInput, StoreError, TapError};

#[rstest]
#[case(TapError::MalformedInput(MalformedInput::AuthTagLength(9)), "malformed_input")]
#[case(TapError::AuthenticationFailed, "authentication_failed")]
#[case(TapError::ReplayDetected { tag_id: "t".into(), presented: 1, stored: 2 }, "replay_detected")]
#[case(TapError::ReplayTimeout { tag_id: "t".into(), counter: 1 }, "replay_timeout")]
#[case(TapError::DecodeError(String::new()), "decode_error")]
#[case(TapError::UnknownTag("t".into()), "unknown_tag")]
#[case(TapError::KeysUnavailable, "keys_unavailable")]
#[case(TapError::Store("down".into()), "store_failure")]
fn test_diagnostic_codes(#[case] error: TapError, #[case] code: &str) {
    assert_eq!(error.code().to_string(), code);
    let name: &'static str = error.code().into();
    assert_eq!(name, code);
}

#[rstest]
fn test_diagnostic_codes_unique() {
    let codes: HashSet<String> = DiagnosticCode::iter().map(|c| c.to_string()).collect();
    assert_eq!(codes.len(), DiagnosticCode::iter().count());
}

#[rstest]
fn test_store_error_conversion() {
    assert_eq!(
        TapError::from(StoreError::UnknownTag("t".into())),
        TapError::UnknownTag("t".into())
    );
    assert_eq!(
        TapError::from(StoreError::Backend("disk full".into())),
        TapError::Store("disk full".into())
    );
}
