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

//! This module contains common error types used across this crate.
//!
//! The errors in here are *operator-facing*. A tapping party only ever learns
//! whether a tap was accepted, see [`TapVerdict`](crate::TapVerdict) for the
//! public rendering of a rejection.

use strum_macros::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Stable, machine-readable code for every [`TapError`] variant.
///
/// Used as the `code` field in log events and intended for telemetry
/// dashboards, so the string representations must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosticCode {
    /// See [`TapError::MalformedInput`].
    MalformedInput,
    /// See [`TapError::AuthenticationFailed`].
    AuthenticationFailed,
    /// See [`TapError::ReplayDetected`].
    ReplayDetected,
    /// See [`TapError::ReplayTimeout`].
    ReplayTimeout,
    /// See [`TapError::DecodeError`].
    DecodeError,
    /// See [`TapError::UidMismatch`].
    UidMismatch,
    /// See [`TapError::UnknownTag`].
    UnknownTag,
    /// See [`TapError::KeysUnavailable`].
    KeysUnavailable,
    /// See [`TapError::Store`].
    StoreFailure,
}

/// The part of a tap that was malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedInput {
    /// A required query parameter was absent or empty.
    #[error("missing parameter `{0}`")]
    MissingParameter(&'static str),
    /// A parameter was not valid hexadecimal.
    #[error("parameter `{parameter}` is not valid hex")]
    InvalidHex {
        /// Name of the offending parameter.
        parameter: &'static str,
    },
    /// The encrypted payload was not exactly one cipher block.
    #[error("encrypted payload must be 16 bytes, got {0}")]
    CiphertextLength(usize),
    /// The authentication code was neither 8 nor 16 bytes long.
    #[error("authentication code must be 8 or 16 bytes, got {0}")]
    AuthTagLength(usize),
    /// The query string contained a `%` not followed by two hex digits.
    #[error("incomplete percent escape at offset {0}")]
    InvalidEscape(usize),
}

/// Error type used when the verification of a single tap failed.
///
/// Each variant maps to a [`DiagnosticCode`] via [`TapError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TapError {
    /// The tap parameters could not be parsed. No cryptographic comparison was attempted.
    #[error("malformed tap input: {0}")]
    MalformedInput(#[from] MalformedInput),

    /// The input was well-formed, but the recomputed authentication code did not match.
    #[error("authentication code mismatch")]
    AuthenticationFailed,

    /// The presented counter is lower than the stored one.
    ///
    /// This may indicate a cloned tag or a compromised key.
    #[error("replay detected for tag {tag_id}: counter {presented} is below stored {stored}")]
    ReplayDetected {
        /// Logical tag the tap was presented for.
        tag_id: String,
        /// Counter decoded from the tap.
        presented: u32,
        /// Counter persisted in the tag state.
        stored: u32,
    },

    /// The presented counter equals the stored one, but the grace window has elapsed.
    #[error("duplicate counter {counter} for tag {tag_id} outside of grace window")]
    ReplayTimeout {
        /// Logical tag the tap was presented for.
        tag_id: String,
        /// The repeated counter value.
        counter: u32,
    },

    /// The decrypted block could not be parsed as UID and counter.
    #[error("decrypted payload could not be parsed: {0}")]
    DecodeError(String),

    /// The decoded UID differs from the one bound to the logical tag.
    #[error("tag {tag_id} is bound to UID {bound}, but UID {presented} was presented")]
    UidMismatch {
        /// Logical tag the tap was presented for.
        tag_id: String,
        /// UID bound to the tag state.
        bound: String,
        /// UID decoded from the tap.
        presented: String,
    },

    /// No tag state exists for the claimed tag identifier.
    #[error("unknown tag {0}")]
    UnknownTag(String),

    /// The verifier has no usable key material and rejects every tap.
    #[error("no key material configured")]
    KeysUnavailable,

    /// Reading or writing the tag state failed.
    #[error("tag state store failure: {0}")]
    Store(String),
}

impl TapError {
    /// Returns the stable diagnostic code of this error.
    #[must_use]
    pub fn code(&self) -> DiagnosticCode {
        match self {
            TapError::MalformedInput(_) => DiagnosticCode::MalformedInput,
            TapError::AuthenticationFailed => DiagnosticCode::AuthenticationFailed,
            TapError::ReplayDetected { .. } => DiagnosticCode::ReplayDetected,
            TapError::ReplayTimeout { .. } => DiagnosticCode::ReplayTimeout,
            TapError::DecodeError(_) => DiagnosticCode::DecodeError,
            TapError::UidMismatch { .. } => DiagnosticCode::UidMismatch,
            TapError::UnknownTag(_) => DiagnosticCode::UnknownTag,
            TapError::KeysUnavailable => DiagnosticCode::KeysUnavailable,
            TapError::Store(_) => DiagnosticCode::StoreFailure,
        }
    }
}

impl From<StoreError> for TapError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::UnknownTag(tag_id) => TapError::UnknownTag(tag_id),
            other => TapError::Store(other.to_string()),
        }
    }
}

/// Error type used when loading deployment configuration failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required key is absent and test mode is not enabled.
    #[error("missing key `{0}` (set it, or explicitly enable test mode)")]
    MissingKey(&'static str),
    /// A key was present but not valid hexadecimal.
    #[error("key `{0}` is not valid hex")]
    InvalidHex(&'static str),
    /// A key did not have the expected length.
    #[error("key `{name}` must be {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Name of the offending key.
        name: &'static str,
        /// Required length in bytes.
        expected: usize,
        /// Length that was provided.
        actual: usize,
    },
    /// A non-key setting could not be parsed.
    #[error("invalid value for `{name}`: {reason}")]
    InvalidValue {
        /// Name of the offending setting.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Error type used when issuing or validating a session credential failed.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A COSE specific error occurred.
    #[error("COSE error: {0}")]
    Cose(coset::CoseError),
    /// The credential's MAC did not verify.
    #[error("session credential MAC is invalid")]
    InvalidMac,
    /// The credential is protected with an algorithm other than HMAC 256/256.
    #[error("session credential uses an unsupported algorithm")]
    UnsupportedAlgorithm,
    /// The credential is well-formed and authentic, but no longer valid.
    #[error("session credential expired")]
    Expired,
    /// A required claim is missing or of the wrong type.
    #[error("session credential claim `{0}` is missing or malformed")]
    MissingClaim(&'static str),
}

impl From<coset::CoseError> for SessionError {
    fn from(value: coset::CoseError) -> Self {
        SessionError::Cose(value)
    }
}

/// Error type used by [`TagStateStore`](crate::replay::TagStateStore) implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No tag state exists for the given identifier.
    #[error("unknown tag {0}")]
    UnknownTag(String),
    /// A tag with this identifier was already provisioned.
    #[error("tag {0} already exists")]
    AlreadyExists(String),
    /// The stored record could not be (de)serialized.
    #[error("tag state encoding failed: {0}")]
    Encoding(String),
    /// Any other backend specific failure.
    #[error("{0}")]
    Backend(String),
}
