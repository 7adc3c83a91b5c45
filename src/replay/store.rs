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
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::replay::TagState;
use crate::sdm::{ReadCounter, Uid};

/// Audit record of an accepted tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapEvent {
    /// Logical tag the tap was accepted for.
    pub tag_id: String,
    /// UID of the physical tag.
    pub uid: Uid,
    /// Read counter of the tap.
    pub counter: ReadCounter,
    /// Whether the tap repeated the previous counter within the grace window.
    pub duplicate: bool,
    /// When the tap was verified.
    pub at: DateTime<Utc>,
}

/// Persistent storage for [`TagState`] records.
///
/// Implementations must make [`TagStateStore::transact`] atomic per tag: two concurrent
/// transactions on the same tag must behave as if run one after the other. Transactions on
/// different tags must not block each other.
pub trait TagStateStore {
    /// Creates the state record of a newly provisioned logical tag.
    ///
    /// # Errors
    /// If a record with this identifier already exists, or the backend fails.
    fn provision(&self, tag_id: &str) -> Result<(), StoreError>;

    /// Returns a copy of the current state of `tag_id`.
    ///
    /// # Errors
    /// If the tag is unknown, or the backend fails.
    fn load(&self, tag_id: &str) -> Result<TagState, StoreError>;

    /// Deletes the record of `tag_id`, together with the logical tag owning it.
    ///
    /// # Errors
    /// If the tag is unknown, or the backend fails.
    fn remove(&self, tag_id: &str) -> Result<(), StoreError>;

    /// Runs `f` on the current state of `tag_id` as one atomic read-modify-write.
    ///
    /// If `f` returns `Ok((state, value))`, `state` is written back and `value` returned.
    /// If it returns an error, the stored state is left unchanged.
    ///
    /// # Errors
    /// The error of `f`, or a [`StoreError`] converted into `E`.
    fn transact<T, E, F>(&self, tag_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&TagState) -> Result<(TagState, T), E>,
        E: From<StoreError>;

    /// Appends an audit entry for an accepted tap.
    ///
    /// # Errors
    /// If the backend fails.
    fn record_event(&self, event: TapEvent) -> Result<(), StoreError>;
}

/// Number of audit entries [`MemoryTagStore`] keeps per tag unless configured otherwise.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// In-process [`TagStateStore`] with one lock per logical tag.
///
/// The map of tags is only locked for lookups and (de)provisioning, never while a
/// transaction runs.
///
/// Audit entries are kept per tag, up to a fixed capacity. Once it is reached, the oldest
/// entry of that tag is dropped for each new one. Removing a tag discards its entries.
#[derive(Debug)]
pub struct MemoryTagStore {
    tags: RwLock<HashMap<String, Arc<Mutex<TagState>>>>,
    events: Mutex<HashMap<String, VecDeque<TapEvent>>>,
    event_capacity: usize,
}

impl Default for MemoryTagStore {
    fn default() -> Self {
        MemoryTagStore::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl MemoryTagStore {
    /// Creates an empty store keeping [`DEFAULT_EVENT_CAPACITY`] audit entries per tag.
    #[must_use]
    pub fn new() -> MemoryTagStore {
        MemoryTagStore::default()
    }

    /// Creates an empty store keeping at most `capacity` audit entries per tag.
    ///
    /// A capacity of zero disables the audit log.
    #[must_use]
    pub fn with_event_capacity(capacity: usize) -> MemoryTagStore {
        MemoryTagStore {
            tags: RwLock::default(),
            events: Mutex::default(),
            event_capacity: capacity,
        }
    }

    fn entry(&self, tag_id: &str) -> Result<Arc<Mutex<TagState>>, StoreError> {
        self.tags
            .read()
            .get(tag_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownTag(tag_id.to_string()))
    }

    /// Returns the retained audit entries for `tag_id`, oldest first.
    #[must_use]
    pub fn events(&self, tag_id: &str) -> Vec<TapEvent> {
        self.events
            .lock()
            .get(tag_id)
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes and returns the retained audit entries for `tag_id`, oldest first.
    #[must_use]
    pub fn drain_events(&self, tag_id: &str) -> Vec<TapEvent> {
        self.events
            .lock()
            .remove(tag_id)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Serializes all tag states to CBOR, e.g. to persist them across restarts.
    ///
    /// # Errors
    /// If serialization fails.
    pub fn export_cbor(&self) -> Result<Vec<u8>, StoreError> {
        let snapshot: BTreeMap<String, TagState> = self
            .tags
            .read()
            .iter()
            .map(|(id, state)| (id.clone(), state.lock().clone()))
            .collect();
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&snapshot, &mut encoded)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;
        Ok(encoded)
    }

    /// Restores a store from the output of [`MemoryTagStore::export_cbor`].
    ///
    /// Audit entries are not part of the export, the restored store starts with an empty log
    /// and [`DEFAULT_EVENT_CAPACITY`].
    ///
    /// # Errors
    /// If `bytes` is not a valid export.
    pub fn import_cbor(bytes: &[u8]) -> Result<MemoryTagStore, StoreError> {
        let snapshot: BTreeMap<String, TagState> =
            ciborium::de::from_reader(bytes).map_err(|e| StoreError::Encoding(e.to_string()))?;
        let store = MemoryTagStore::new();
        store.tags.write().extend(
            snapshot
                .into_iter()
                .map(|(id, state)| (id, Arc::new(Mutex::new(state)))),
        );
        Ok(store)
    }
}

impl TagStateStore for MemoryTagStore {
    fn provision(&self, tag_id: &str) -> Result<(), StoreError> {
        let mut tags = self.tags.write();
        if tags.contains_key(tag_id) {
            return Err(StoreError::AlreadyExists(tag_id.to_string()));
        }
        tags.insert(tag_id.to_string(), Arc::new(Mutex::new(TagState::new())));
        Ok(())
    }

    fn load(&self, tag_id: &str) -> Result<TagState, StoreError> {
        Ok(self.entry(tag_id)?.lock().clone())
    }

    fn remove(&self, tag_id: &str) -> Result<(), StoreError> {
        let mut tags = self.tags.write();
        if tags.remove(tag_id).is_none() {
            return Err(StoreError::UnknownTag(tag_id.to_string()));
        }
        self.events.lock().remove(tag_id);
        Ok(())
    }

    fn transact<T, E, F>(&self, tag_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&TagState) -> Result<(TagState, T), E>,
        E: From<StoreError>,
    {
        let entry = self.entry(tag_id)?;
        let mut state = entry.lock();
        let (updated, value) = f(&state)?;
        *state = updated;
        Ok(value)
    }

    fn record_event(&self, event: TapEvent) -> Result<(), StoreError> {
        if self.event_capacity == 0 {
            return Ok(());
        }
        let mut events = self.events.lock();
        let log = events.entry(event.tag_id.clone()).or_default();
        while log.len() >= self.event_capacity {
            log.pop_front();
        }
        log.push_back(event);
        Ok(())
    }
}

impl<S: TagStateStore> TagStateStore for Arc<S> {
    fn provision(&self, tag_id: &str) -> Result<(), StoreError> {
        (**self).provision(tag_id)
    }

    fn load(&self, tag_id: &str) -> Result<TagState, StoreError> {
        (**self).load(tag_id)
    }

    fn remove(&self, tag_id: &str) -> Result<(), StoreError> {
        (**self).remove(tag_id)
    }

    fn transact<T, E, F>(&self, tag_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&TagState) -> Result<(TagState, T), E>,
        E: From<StoreError>,
    {
        (**self).transact(tag_id, f)
    }

    fn record_event(&self, event: TapEvent) -> Result<(), StoreError> {
        (**self).record_event(event)
    }
}
