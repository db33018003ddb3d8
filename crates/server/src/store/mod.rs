// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The zone record store: the external system of record for zone contents.
//!
//! The update state machine never touches the wire format of the store; it
//! speaks [`RecordSet`]s of opaque string values through the [`ZoneStore`]
//! trait. [`remote::RemoteStore`] is the production implementation backed by
//! the hosted DNS provider's HTTP API, [`in_memory::InMemoryStore`] backs the
//! tests.

pub mod in_memory;
pub mod remote;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::proto::rr::{LowerName, Name, RecordType};

/// A zone hosted by the record store.
#[derive(Clone, Debug)]
pub struct Zone {
    name: Name,
    origin: LowerName,
}

impl Zone {
    /// Construct a zone from its apex name.
    pub fn new(name: Name) -> Self {
        let origin = LowerName::new(&name);
        Self { name, origin }
    }

    /// The apex name of the zone.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The apex as a case-folded origin, for containment checks.
    pub fn origin(&self) -> &LowerName {
        &self.origin
    }
}

/// One record set as the store keys it: every record sharing an owner name
/// and type.
///
/// `name` is relative to the zone apex; the apex itself is the empty string.
/// Values are the provider's presentation strings and are never reparsed by
/// the update logic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSet {
    /// Owner name relative to the zone apex
    pub name: String,
    /// The record type shared by all values in the set
    pub rtype: RecordType,
    /// TTL shared by all values in the set
    pub ttl: u32,
    /// The record values, one presentation string per record
    pub values: Vec<String>,
}

/// Interface to the system of record for zone contents.
///
/// One update transaction performs exactly one [`record_sets`] snapshot read
/// followed by zero or more mutations; implementations do not need to provide
/// any caching or coherence beyond that.
///
/// [`record_sets`]: Self::record_sets
#[async_trait]
pub trait ZoneStore: Send + Sync + 'static {
    /// Look up a zone by name. `Ok(None)` means the store does not host the
    /// zone, i.e. this server is not authoritative for it.
    async fn find_zone(&self, name: &Name) -> Result<Option<Zone>, StoreError>;

    /// All record sets currently in the zone.
    async fn record_sets(&self, zone: &Zone) -> Result<Vec<RecordSet>, StoreError>;

    /// Create `set` in the zone, replacing any set with the same name and type.
    async fn create_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError>;

    /// Replace the values of an existing set with `values`.
    async fn replace_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError>;

    /// Delete an entire record set.
    async fn delete_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError>;

    /// Delete the given values from an existing set, leaving the rest.
    async fn delete_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError>;
}

/// The store-side key for a zone: lowercase, no trailing dot.
pub(crate) fn zone_key(name: &Name) -> String {
    let ascii = name.to_ascii().to_lowercase();
    ascii.trim_end_matches('.').to_string()
}
