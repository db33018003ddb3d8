// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An in-memory zone store, for tests and local experimentation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::proto::rr::Name;
use crate::store::{zone_key, RecordSet, Zone, ZoneStore};

/// A [`ZoneStore`] holding everything in a `HashMap` behind a mutex.
///
/// Mutation semantics match the remote store: deleting values leaves the set
/// in place even when it becomes empty, reconciliation of empty sets is the
/// store's business.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    zones: Mutex<HashMap<String, Vec<RecordSet>>>,
}

impl InMemoryStore {
    /// A new store hosting no zones.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zone with no record sets; a no-op if it already exists.
    pub fn insert_zone(&self, name: &Name) {
        self.zones
            .lock()
            .unwrap() // poisoning is fatal
            .entry(zone_key(name))
            .or_default();
    }

    /// Put `set` into the zone, replacing any set with the same name and type.
    pub fn insert(&self, zone: &Name, set: RecordSet) {
        let mut zones = self.zones.lock().unwrap();
        let sets = zones.entry(zone_key(zone)).or_default();
        match sets
            .iter_mut()
            .find(|rs| rs.name == set.name && rs.rtype == set.rtype)
        {
            Some(existing) => *existing = set,
            None => sets.push(set),
        }
    }

    /// The current contents of a zone, for assertions.
    pub fn dump(&self, zone: &Name) -> Vec<RecordSet> {
        self.zones
            .lock()
            .unwrap()
            .get(&zone_key(zone))
            .cloned()
            .unwrap_or_default()
    }

    fn with_zone<T>(
        &self,
        zone: &Zone,
        f: impl FnOnce(&mut Vec<RecordSet>) -> T,
    ) -> Result<T, StoreError> {
        let key = zone_key(zone.name());
        let mut zones = self.zones.lock().unwrap();
        let sets = zones
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        Ok(f(sets))
    }
}

#[async_trait]
impl ZoneStore for InMemoryStore {
    async fn find_zone(&self, name: &Name) -> Result<Option<Zone>, StoreError> {
        let hosted = self.zones.lock().unwrap().contains_key(&zone_key(name));
        Ok(hosted.then(|| Zone::new(name.clone())))
    }

    async fn record_sets(&self, zone: &Zone) -> Result<Vec<RecordSet>, StoreError> {
        self.with_zone(zone, |sets| sets.clone())
    }

    async fn create_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError> {
        self.with_zone(zone, |sets| {
            match sets
                .iter_mut()
                .find(|rs| rs.name == set.name && rs.rtype == set.rtype)
            {
                Some(existing) => *existing = set.clone(),
                None => sets.push(set.clone()),
            }
        })
    }

    async fn replace_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError> {
        self.with_zone(zone, |sets| {
            if let Some(existing) = sets
                .iter_mut()
                .find(|rs| rs.name == set.name && rs.rtype == set.rtype)
            {
                existing.values = values.to_vec();
            }
        })
    }

    async fn delete_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError> {
        self.with_zone(zone, |sets| {
            sets.retain(|rs| !(rs.name == set.name && rs.rtype == set.rtype));
        })
    }

    async fn delete_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError> {
        self.with_zone(zone, |sets| {
            if let Some(existing) = sets
                .iter_mut()
                .find(|rs| rs.name == set.name && rs.rtype == set.rtype)
            {
                existing.values.retain(|v| !values.contains(v));
            }
        })
    }
}
