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

//! Verification and anti-replay core for NFC tags using Secure Dynamic Messaging (SDM).
//!
//! An SDM-enabled tag (e.g. an NXP NTAG 424 DNA) rewrites its NDEF URL on every read, mirroring
//! two values into it: `e`, its UID and read counter encrypted under the *file read key*, and
//! `c`, an AES-CMAC over that identity computed with the *meta read key*. Together with a
//! `tid` naming the logical tag, these let a server check that a URL was produced by a genuine
//! tag, and that it is not a replay of an earlier read.
//!
//! This crate implements that check:
//! - [`crypto`] provides the AES-128 primitives and an RFC 4493 AES-CMAC engine.
//! - [`sdm`] decodes the encrypted PICC data and authenticates the presented code, for either
//!   of the byte layouts described by [`SdmProfile`].
//! - [`replay`] decides, based on the read counter and a per-tag [`TagState`], whether a tap is
//!   fresh, a tolerable repetition of the previous tap, or a replay.
//! - [`TapVerifier`] runs all of the above for a tap and reduces the result to a [`TapVerdict`].
//! - [`session`] issues the short-lived credential an accepted tap is exchanged for.
//! - [`config`] loads keys and settings, failing closed if keys are missing.
//!
//! Rendering pages, managing tags and serving content are *out of scope* for this crate.
//! Persisting tag state is left to implementations of [`TagStateStore`], an in-memory one is
//! provided as [`MemoryTagStore`].
//!
//! # Usage
//! ```toml
//! [dependencies]
//! nfc-sdm = { version = "^0.1.0" }
//! ```
//!
//! # Example
//! Verifying taps of a tag provisioned as `poster-7`, with a [`TagEmulator`] standing in for
//! the physical tag:
//! ```
//! # use std::error::Error;
//! use chrono::{Duration, Utc};
//! use nfc_sdm::config::KeySet;
//! use nfc_sdm::sdm::{DecodedTap, ReadCounter};
//! use nfc_sdm::{
//!     MemoryTagStore, ReplayGuard, RustCryptoContext, SdmProfile, TagEmulator, TagStateStore,
//!     TapParams, TapVerifier,
//! };
//!
//! let keys = KeySet::from_hex(
//!     "000102030405060708090A0B0C0D0E0F",
//!     "F0E0D0C0B0A090807060504030201000",
//! )?;
//! let store = MemoryTagStore::new();
//! store.provision("poster-7")?;
//! let verifier = TapVerifier::new(
//!     RustCryptoContext,
//!     store,
//!     Some(keys.clone()),
//!     SdmProfile::UidCounter,
//!     ReplayGuard::default(),
//! );
//!
//! let tag = TagEmulator::new(RustCryptoContext, keys, SdmProfile::UidCounter);
//! let tap = DecodedTap {
//!     uid: "04112233445566".parse()?,
//!     counter: ReadCounter::new(17)?,
//! };
//! let (e, c) = tag.tap_hex(&tap, &[])?;
//! let params = TapParams::parse("poster-7", &e, &c)?;
//!
//! let now = Utc::now();
//! let verdict = verifier.verify(&params, now);
//! assert!(verdict.is_valid);
//! assert_eq!(verdict.uid, Some(tap.uid));
//!
//! // The same URL is still accepted shortly afterwards...
//! assert!(verifier.verify(&params, now + Duration::seconds(5)).is_valid);
//! // ...but not once the grace window has passed.
//! let replayed = verifier.verify(&params, now + Duration::minutes(11));
//! assert!(!replayed.is_valid);
//! assert_eq!(
//!     replayed.rejection_message(),
//!     Some("This link has expired. Please tap the tag again.")
//! );
//! # Ok::<(), Box<dyn Error>>(())
//! ```
//!
//! # Diagnostics
//! A rejected tap is never explained to the tapping party beyond
//! [`TapVerdict::rejection_message`], so that an attacker can't tell a wrong key from a replay.
//! Operators get the reason via [`TapVerdict::diagnostic`] and through `tracing` events, each
//! carrying a stable [`DiagnosticCode`] in its `code` field.
//!
//! # Tag profiles
//! Which bytes a tag encrypts and authenticates depends on its SDM file settings. The default
//! [`SdmProfile::UidCounter`] authenticates `UID ‖ CTR` directly with the meta read key,
//! [`SdmProfile::Ntag424Sun`] follows NXP's SUN message format with a derived session key.
//! The profile has to be checked against a real tag before going into production.

#![deny(rustdoc::broken_intra_doc_links, clippy::pedantic)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]
// These ones are a little too eager
#![allow(clippy::doc_markdown, clippy::module_name_repetitions)]
#[macro_use]
extern crate derive_builder;

#[doc(inline)]
pub use config::{KeySet, SdmConfig};
#[doc(inline)]
pub use crypto::{CryptoBackend, Key128, RustCryptoContext};
#[doc(inline)]
pub use error::{DiagnosticCode, TapError};
#[doc(inline)]
pub use replay::{MemoryTagStore, ReplayGuard, TagState, TagStateStore};
#[doc(inline)]
pub use sdm::{SdmProfile, TagEmulator, TapParams};
#[doc(inline)]
pub use session::{SessionIssuer, SessionSecret};
#[doc(inline)]
pub use verifier::{TapVerdict, TapVerifier};

pub mod config;
pub mod crypto;
pub mod error;
pub mod replay;
pub mod sdm;
pub mod session;
pub mod verifier;
