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

//! Short-lived session credentials handed out after an accepted tap.
//!
//! A credential is a CBOR Web Token ([RFC 8392](https://www.rfc-editor.org/rfc/rfc8392))
//! wrapped in a tagged `COSE_Mac0` structure, authenticated with HMAC 256/256. It carries the
//! logical tag identifier as subject and the tag UID in a private claim, and expires after the
//! configured lifetime.
//!
//! # Example
//! ```
//! use chrono::{Duration, Utc};
//! use nfc_sdm::sdm::Uid;
//! use nfc_sdm::session::{SessionIssuer, SessionSecret};
//!
//! let secret = SessionSecret::from_hex("secret", &"2a".repeat(32))?;
//! let issuer = SessionIssuer::new(secret, Duration::minutes(10));
//! let uid: Uid = "04112233445566".parse()?;
//! let now = Utc::now();
//!
//! let token = issuer.issue("poster-7", &uid, now)?;
//! let claims = issuer.verify(&token, now + Duration::minutes(5))?;
//! assert_eq!(claims.tag_id, "poster-7");
//! assert_eq!(claims.uid, uid);
//! assert!(issuer.verify(&token, now + Duration::minutes(11)).is_err());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use core::fmt::{Debug, Formatter};

use chrono::{DateTime, Duration, Utc};
use ciborium::value::Value;
use coset::cwt::{ClaimName, ClaimsSet, ClaimsSetBuilder, Timestamp};
use coset::{
    iana, CborSerializable, CoseMac0, CoseMac0Builder, HeaderBuilder, TaggedCborSerializable,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{ConfigError, SessionError};
use crate::sdm::Uid;


/// Private CWT claim carrying the hex encoded tag UID.
pub const UID_CLAIM: i64 = -65537;

/// Minimum length of a [`SessionSecret`] in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Maximum length of a [`SessionSecret`] in bytes, the block size of SHA-256.
pub const MAX_SECRET_LEN: usize = 64;

const CWT_ID_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Secret key authenticating session credentials.
///
/// Wiped from memory on drop, never printed by [`Debug`].
#[derive(Clone)]
pub struct SessionSecret(Zeroizing<Vec<u8>>);

impl SessionSecret {
    /// Parses a secret of 16 to 64 bytes from hex. `name` is only used for error reporting.
    ///
    /// # Errors
    /// If `value` is not valid hex or has an unsupported length.
    pub fn from_hex(name: &'static str, value: &str) -> Result<SessionSecret, ConfigError> {
        let bytes = Zeroizing::new(
            hex::decode(value.trim()).map_err(|_| ConfigError::InvalidHex(name))?,
        );
        SessionSecret::from_bytes(name, &bytes)
    }

    /// Copies a secret of 16 to 64 bytes.
    ///
    /// # Errors
    /// If `bytes` has an unsupported length.
    pub fn from_bytes(name: &'static str, bytes: &[u8]) -> Result<SessionSecret, ConfigError> {
        if !(MIN_SECRET_LEN..=MAX_SECRET_LEN).contains(&bytes.len()) {
            return Err(ConfigError::InvalidValue {
                name,
                reason: format!(
                    "must be between {MIN_SECRET_LEN} and {MAX_SECRET_LEN} bytes, got {}",
                    bytes.len()
                ),
            });
        }
        Ok(SessionSecret(Zeroizing::new(bytes.to_vec())))
    }

    /// A predictable all-zero secret. Must only ever be used in test mode.
    #[must_use]
    pub fn insecure_zero() -> SessionSecret {
        SessionSecret(Zeroizing::new(vec![0; 32]))
    }

    fn hmac(&self) -> HmacSha256 {
        // Keys shorter than the block size are zero-padded by HMAC anyway.
        let mut key = hmac::digest::Key::<HmacSha256>::default();
        key.as_mut_slice()[..self.0.len()].copy_from_slice(&self.0);
        <HmacSha256 as Mac>::new(&key)
    }
}

impl Debug for SessionSecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

/// Validated contents of a session credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    /// Logical tag the credential was issued for.
    pub tag_id: String,
    /// UID of the physical tag that was tapped.
    pub uid: Uid,
    /// When the credential was issued.
    pub issued_at: DateTime<Utc>,
    /// When the credential stops being valid.
    pub expires_at: DateTime<Utc>,
    /// Random unique identifier of the credential.
    pub cwt_id: Vec<u8>,
}

/// Issues and validates session credentials.
#[derive(Debug, Clone)]
pub struct SessionIssuer {
    secret: SessionSecret,
    ttl: Duration,
}

impl SessionIssuer {
    /// Creates an issuer whose credentials are valid for `ttl`.
    #[must_use]
    pub fn new(secret: SessionSecret, ttl: Duration) -> SessionIssuer {
        SessionIssuer { secret, ttl }
    }

    /// Lifetime of issued credentials.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a credential for a tap of `uid` accepted for `tag_id` at `now`.
    ///
    /// # Errors
    /// If the claims can't be serialized.
    pub fn issue(
        &self,
        tag_id: &str,
        uid: &Uid,
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, SessionError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut cwt_id = vec![0; CWT_ID_LEN];
        rand::thread_rng().fill_bytes(&mut cwt_id);

        let claims = ClaimsSetBuilder::new()
            .subject(tag_id.to_string())
            .issued_at(Timestamp::WholeSeconds(now.timestamp()))
            .expiration_time(Timestamp::WholeSeconds(expires_at.timestamp()))
            .cwt_id(cwt_id)
            .private_claim(UID_CLAIM, Value::Text(uid.to_hex()))
            .build();
        let protected = HeaderBuilder::new()
            .algorithm(iana::Algorithm::HMAC_256_256)
            .build();
        let mac0 = CoseMac0Builder::new()
            .protected(protected)
            .payload(claims.to_vec()?)
            .create_tag(&[], |data| {
                let mut hmac = self.secret.hmac();
                hmac.update(data);
                hmac.finalize().into_bytes().to_vec()
            })
            .build();
        Ok(mac0.to_tagged_vec()?)
    }

    /// Validates `token` at `now` and returns its claims.
    ///
    /// # Errors
    /// - If `token` is not a tagged `COSE_Mac0` structure or uses another algorithm.
    /// - If the MAC does not verify.
    /// - If a claim is missing or malformed.
    /// - If the credential has expired.
    pub fn verify(&self, token: &[u8], now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        let mac0 = CoseMac0::from_tagged_slice(token)?;
        if mac0.protected.header.alg
            != Some(coset::Algorithm::Assigned(iana::Algorithm::HMAC_256_256))
        {
            return Err(SessionError::UnsupportedAlgorithm);
        }
        mac0.verify_tag(&[], |tag, data| {
            let mut hmac = self.secret.hmac();
            hmac.update(data);
            hmac.verify_slice(tag).map_err(|_| SessionError::InvalidMac)
        })?;

        let payload = mac0
            .payload
            .as_deref()
            .ok_or(SessionError::MissingClaim("payload"))?;
        let claims = ClaimsSet::from_slice(payload)?;

        let expires_at = timestamp(claims.expiration_time.as_ref(), "exp")?;
        if now >= expires_at {
            return Err(SessionError::Expired);
        }
        let uid = claims
            .rest
            .iter()
            .find_map(|(name, value)| match (name, value) {
                (ClaimName::PrivateUse(UID_CLAIM), Value::Text(uid)) => uid.parse().ok(),
                _ => None,
            })
            .ok_or(SessionError::MissingClaim("uid"))?;
        Ok(SessionClaims {
            tag_id: claims.subject.ok_or(SessionError::MissingClaim("sub"))?,
            uid,
            issued_at: timestamp(claims.issued_at.as_ref(), "iat")?,
            expires_at,
            cwt_id: claims.cwt_id.ok_or(SessionError::MissingClaim("cti"))?,
        })
    }
}

fn timestamp(
    value: Option<&Timestamp>,
    claim: &'static str,
) -> Result<DateTime<Utc>, SessionError> {
    match value {
        Some(Timestamp::WholeSeconds(secs)) => DateTime::from_timestamp(*secs, 0),
        _ => None,
    }
    .ok_or(SessionError::MissingClaim(claim))
}
