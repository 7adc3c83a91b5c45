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

//! Replay protection based on the tag's monotonic read counter.
//!
//! For every logical tag, a [`TagState`] remembers the last accepted counter and when it was
//! accepted. [`ReplayGuard::check_and_advance`] then decides for a new tap:
//!
//! - no stored counter: [`Fresh`](ReplayOutcome::Fresh), the state advances.
//! - counter above the stored one: [`Fresh`](ReplayOutcome::Fresh), the state advances.
//! - counter equal to the stored one, at most one grace window after it was stored:
//!   [`DuplicateInWindow`](ReplayOutcome::DuplicateInWindow), the state is left untouched.
//! - counter equal to the stored one, later than that: rejected with [`TapError::ReplayTimeout`].
//! - counter below the stored one: rejected with [`TapError::ReplayDetected`].
//!
//! A duplicate does not move the timestamp, so a repeated URL stays usable for at most one
//! grace window after the original tap.
//!
//! The guard itself is pure. Atomicity of the read-check-write cycle per tag is the job of a
//! [`TagStateStore`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, TapError};
use crate::sdm::{ReadCounter, Uid};

mod store;


pub use store::{MemoryTagStore, TagStateStore, TapEvent, DEFAULT_EVENT_CAPACITY};

/// Persisted replay state of a single logical tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagState {
    /// Counter of the last accepted fresh tap.
    pub last_counter: Option<ReadCounter>,
    /// When the last fresh tap was accepted.
    pub last_counter_at: Option<DateTime<Utc>>,
    /// UID of the physical tag bound to this logical tag by its first accepted tap.
    pub bound_uid: Option<Uid>,
}

impl TagState {
    /// Creates the state of a freshly provisioned tag.
    #[must_use]
    pub fn new() -> TagState {
        TagState::default()
    }

    /// Serializes this state to CBOR.
    ///
    /// # Errors
    /// If serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, StoreError> {
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(self, &mut encoded)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;
        Ok(encoded)
    }

    /// Deserializes a state from CBOR.
    ///
    /// # Errors
    /// If `bytes` is not a CBOR encoded [`TagState`].
    pub fn from_cbor(bytes: &[u8]) -> Result<TagState, StoreError> {
        ciborium::de::from_reader(bytes).map_err(|e| StoreError::Encoding(e.to_string()))
    }
}

/// What the guard decided about a tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The counter is newer than anything seen before.
    Fresh,
    /// The counter repeats the last accepted one within the grace window.
    DuplicateInWindow,
    /// The tap is a replay, either [`TapError::ReplayDetected`] or [`TapError::ReplayTimeout`].
    Rejected(TapError),
}

/// Result of [`ReplayGuard::check_and_advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayDecision {
    /// The decision.
    pub outcome: ReplayOutcome,
    /// The state to persist. Equal to the input state unless the tap was fresh.
    pub updated: TagState,
}

impl ReplayDecision {
    /// Returns `true` if the tap was accepted, fresh or as a duplicate.
    #[must_use]
    pub fn accepted(&self) -> bool {
        !matches!(self.outcome, ReplayOutcome::Rejected(_))
    }
}

/// Decides whether a tap's counter is fresh, a tolerable duplicate, or a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGuard {
    grace_window: Duration,
}

impl Default for ReplayGuard {
    /// A guard with a grace window of 10 minutes.
    fn default() -> Self {
        ReplayGuard::new(Duration::minutes(10))
    }
}

impl ReplayGuard {
    /// Creates a guard accepting duplicate counters for `grace_window` after the original tap.
    #[must_use]
    pub fn new(grace_window: Duration) -> ReplayGuard {
        ReplayGuard { grace_window }
    }

    /// The configured grace window.
    #[must_use]
    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }

    /// Checks `counter`, presented for `tag_id` at `now`, against `record`.
    ///
    /// If the time since the stored tap is negative (the clock went backwards), it counts as
    /// zero. A stored counter without timestamp never admits duplicates.
    #[must_use]
    pub fn check_and_advance(
        &self,
        tag_id: &str,
        counter: ReadCounter,
        now: DateTime<Utc>,
        record: &TagState,
    ) -> ReplayDecision {
        let Some(last) = record.last_counter else {
            return Self::advance(counter, now, record);
        };

        if counter > last {
            return Self::advance(counter, now, record);
        }

        if counter < last {
            return ReplayDecision {
                outcome: ReplayOutcome::Rejected(TapError::ReplayDetected {
                    tag_id: tag_id.to_string(),
                    presented: counter.value(),
                    stored: last.value(),
                }),
                updated: record.clone(),
            };
        }

        let within_window = record
            .last_counter_at
            .is_some_and(|at| (now - at).max(Duration::zero()) <= self.grace_window);
        let outcome = if within_window {
            ReplayOutcome::DuplicateInWindow
        } else {
            ReplayOutcome::Rejected(TapError::ReplayTimeout {
                tag_id: tag_id.to_string(),
                counter: counter.value(),
            })
        };
        ReplayDecision {
            outcome,
            updated: record.clone(),
        }
    }

    fn advance(counter: ReadCounter, now: DateTime<Utc>, record: &TagState) -> ReplayDecision {
        ReplayDecision {
            outcome: ReplayOutcome::Fresh,
            updated: TagState {
                last_counter: Some(counter),
                last_counter_at: Some(now),
                bound_uid: record.bound_uid,
            },
        }
    }
}
