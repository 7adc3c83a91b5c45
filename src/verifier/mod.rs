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

//! End-to-end verification of a single tap.
//!
//! A [`TapVerifier`] runs the whole pipeline for a tap:
//! 1. The encrypted PICC data is decoded into UID and read counter.
//! 2. The presented authentication code is checked.
//! 3. Within one [`TagStateStore::transact`] call, the UID is checked against the one bound to
//!    the logical tag, the [`ReplayGuard`] decides on the counter, and the advanced state is
//!    written back. The first accepted tap binds its UID to the logical tag.
//! 4. An audit [`TapEvent`] is recorded.
//!
//! Every failure is reduced to a rejected [`TapVerdict`]. Its reason is logged and available to
//! operators through [`TapVerdict::diagnostic`], but is never part of what the tapping party
//! gets to see.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{KeySet, SdmConfig};
use crate::crypto::CryptoBackend;
use crate::error::{MalformedInput, SessionError, TapError};
use crate::replay::{ReplayGuard, ReplayOutcome, TagStateStore, TapEvent};
use crate::sdm::{
    authenticate, decode, AuthOutcome, DecodedTap, ReadCounter, SdmProfile, TapParams, Uid,
};
use crate::session::SessionIssuer;


/// Shown to the tapping party for every rejection except [`TapError::ReplayTimeout`].
pub const GENERIC_REJECTION: &str = "This tag could not be verified.";

/// Shown to the tapping party when a tap URL was reused after its grace window.
pub const TAP_AGAIN_REJECTION: &str = "This link has expired. Please tap the tag again.";

/// The verdict on a single tap.
///
/// Serializes to `{"isValid": .., "uid": .., "ctr": ..}`, where `uid` and `ctr` are only
/// present for accepted taps. The reason for a rejection is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TapVerdict {
    /// Whether the tap was accepted.
    pub is_valid: bool,
    /// UID of the tapped tag, if accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
    /// Read counter of the tap, if accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctr: Option<ReadCounter>,
    #[serde(skip)]
    duplicate: bool,
    #[serde(skip)]
    diagnostic: Option<TapError>,
}

impl TapVerdict {
    fn accepted(decoded: DecodedTap, duplicate: bool) -> TapVerdict {
        TapVerdict {
            is_valid: true,
            uid: Some(decoded.uid),
            ctr: Some(decoded.counter),
            duplicate,
            diagnostic: None,
        }
    }

    fn rejected(error: TapError) -> TapVerdict {
        TapVerdict {
            is_valid: false,
            uid: None,
            ctr: None,
            duplicate: false,
            diagnostic: Some(error),
        }
    }

    /// Returns `true` if the tap was accepted as a repetition of the previous one.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.duplicate
    }

    /// The reason for a rejection. Operator-facing only.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&TapError> {
        self.diagnostic.as_ref()
    }

    /// Message to show the tapping party, `None` if the tap was accepted.
    ///
    /// Does not reveal why a tap was rejected, except that a reused URL can be fixed by tapping
    /// again.
    #[must_use]
    pub fn rejection_message(&self) -> Option<&'static str> {
        match &self.diagnostic {
            None => None,
            Some(TapError::ReplayTimeout { .. }) => Some(TAP_AGAIN_REJECTION),
            Some(_) => Some(GENERIC_REJECTION),
        }
    }
}

/// A verdict together with the session credential issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapSession {
    /// The verdict on the tap.
    pub verdict: TapVerdict,
    /// Session credential, present if and only if the tap was accepted.
    pub token: Option<Vec<u8>>,
}

/// Verifies taps against one deployment's keys and a [`TagStateStore`].
///
/// Safe to share between threads if `B` and `S` are. Concurrent taps of the same tag are
/// serialized by the store.
#[derive(Debug)]
pub struct TapVerifier<B: CryptoBackend, S: TagStateStore> {
    backend: B,
    store: S,
    keys: Option<KeySet>,
    profile: SdmProfile,
    guard: ReplayGuard,
}

impl<B: CryptoBackend, S: TagStateStore> TapVerifier<B, S> {
    /// Creates a verifier. Without `keys`, every tap is rejected with
    /// [`TapError::KeysUnavailable`].
    #[must_use]
    pub fn new(
        backend: B,
        store: S,
        keys: Option<KeySet>,
        profile: SdmProfile,
        guard: ReplayGuard,
    ) -> TapVerifier<B, S> {
        TapVerifier {
            backend,
            store,
            keys,
            profile,
            guard,
        }
    }

    /// Creates a verifier using the keys, profile and grace window of `config`.
    #[must_use]
    pub fn from_config(config: &SdmConfig, backend: B, store: S) -> TapVerifier<B, S> {
        TapVerifier::new(
            backend,
            store,
            config.resolved_keys(),
            config.profile,
            config.replay_guard(),
        )
    }

    /// The underlying tag state store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Parses the query string of a tap URL and verifies it, see [`TapVerifier::verify`].
    #[must_use]
    pub fn verify_query(&self, query: &str, now: DateTime<Utc>) -> TapVerdict {
        match TapParams::from_query(query) {
            Ok(params) => self.verify(&params, now),
            Err(malformed) => {
                let error = TapError::from(malformed);
                log_rejection(None, &error);
                TapVerdict::rejected(error)
            }
        }
    }

    /// Verifies a tap presented at `now`.
    ///
    /// If accepted, the tag state has been advanced and the UID bound to the tag before this
    /// returns.
    #[must_use]
    pub fn verify(&self, params: &TapParams, now: DateTime<Utc>) -> TapVerdict {
        match self.try_verify(params, now) {
            Ok((decoded, duplicate)) => {
                if duplicate {
                    info!(
                        event = "tap_duplicate",
                        tag_id = params.tid(),
                        uid = %decoded.uid,
                        counter = decoded.counter.value()
                    );
                } else {
                    debug!(
                        event = "tap_accepted",
                        tag_id = params.tid(),
                        uid = %decoded.uid,
                        counter = decoded.counter.value()
                    );
                }
                TapVerdict::accepted(decoded, duplicate)
            }
            Err(error) => {
                log_rejection(Some(params.tid()), &error);
                TapVerdict::rejected(error)
            }
        }
    }

    /// Verifies a tap and, if it was accepted, issues a session credential for it.
    ///
    /// # Errors
    /// If the tap was accepted but the credential could not be created.
    pub fn verify_and_issue(
        &self,
        issuer: &SessionIssuer,
        params: &TapParams,
        now: DateTime<Utc>,
    ) -> Result<TapSession, SessionError> {
        let verdict = self.verify(params, now);
        let token = match verdict.uid {
            Some(uid) if verdict.is_valid => Some(issuer.issue(params.tid(), &uid, now)?),
            _ => None,
        };
        Ok(TapSession { verdict, token })
    }

    fn try_verify(
        &self,
        params: &TapParams,
        now: DateTime<Utc>,
    ) -> Result<(DecodedTap, bool), TapError> {
        let keys = self.keys.as_ref().ok_or(TapError::KeysUnavailable)?;
        let decoded = decode(
            &self.backend,
            params.encrypted(),
            keys.file_read_key(),
            self.profile,
        )?;
        match authenticate(
            &self.backend,
            &decoded,
            params.auth_tag(),
            keys.meta_read_key(),
            self.profile,
        ) {
            AuthOutcome::Match => {}
            AuthOutcome::Mismatch => return Err(TapError::AuthenticationFailed),
            AuthOutcome::MalformedLength(length) => {
                return Err(MalformedInput::AuthTagLength(length).into())
            }
        }

        let tag_id = params.tid();
        let outcome = self.store.transact(tag_id, |state| {
            if let Some(bound) = state.bound_uid.filter(|bound| *bound != decoded.uid) {
                return Err(TapError::UidMismatch {
                    tag_id: tag_id.to_string(),
                    bound: bound.to_hex(),
                    presented: decoded.uid.to_hex(),
                });
            }
            let decision = self
                .guard
                .check_and_advance(tag_id, decoded.counter, now, state);
            match decision.outcome {
                ReplayOutcome::Rejected(error) => Err(error),
                outcome => {
                    let mut updated = decision.updated;
                    updated.bound_uid.get_or_insert(decoded.uid);
                    Ok((updated, outcome))
                }
            }
        })?;
        let duplicate = outcome == ReplayOutcome::DuplicateInWindow;

        // The state has already advanced, losing the audit entry must not undo the tap.
        if let Err(e) = self.store.record_event(TapEvent {
            tag_id: tag_id.to_string(),
            uid: decoded.uid,
            counter: decoded.counter,
            duplicate,
            at: now,
        }) {
            error!(event = "audit_failed", tag_id, error = %e);
        }
        Ok((decoded, duplicate))
    }
}

fn log_rejection(tag_id: Option<&str>, error: &TapError) {
    let code = error.code();
    match error {
        TapError::ReplayDetected {
            presented, stored, ..
        } => warn!(
            event = "tap_rejected",
            tag_id,
            code = %code,
            presented,
            stored,
            "read counter went backwards, possible cloned tag"
        ),
        TapError::ReplayTimeout { .. }
        | TapError::AuthenticationFailed
        | TapError::UidMismatch { .. } => {
            warn!(event = "tap_rejected", tag_id, code = %code, error = %error);
        }
        TapError::KeysUnavailable | TapError::Store(_) => {
            error!(event = "tap_rejected", tag_id, code = %code, error = %error);
        }
        _ => info!(event = "tap_rejected", tag_id, code = %code, error = %error),
    }
}
