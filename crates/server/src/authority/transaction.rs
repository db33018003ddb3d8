// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! One dynamic update against one zone: prerequisite verification, update
//! prescan, and update application per RFC 2136 section 3.

use tracing::{debug, error, info, warn};

use crate::authority::UpdateResult;
use crate::error::StoreError;
use crate::proto::op::ResponseCode;
use crate::proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordType};
use crate::store::{RecordSet, Zone, ZoneStore};

/// One update request's view of a zone.
///
/// The record-set snapshot is read from the store exactly once, when the
/// transaction begins. Mutations made while applying the update section are
/// mirrored into the snapshot so later update records observe the effects of
/// earlier ones; nothing is re-read from the store mid-transaction.
pub struct UpdateTransaction<'a, S> {
    store: &'a S,
    zone: &'a Zone,
    zone_class: DNSClass,
    record_sets: Vec<RecordSet>,
}

impl<'a, S: ZoneStore> UpdateTransaction<'a, S> {
    /// Begin a transaction by taking a fresh snapshot of the zone.
    pub async fn begin(
        store: &'a S,
        zone: &'a Zone,
        zone_class: DNSClass,
    ) -> Result<UpdateTransaction<'a, S>, StoreError> {
        let record_sets = store.record_sets(zone).await?;
        Ok(UpdateTransaction {
            store,
            zone,
            zone_class,
            record_sets,
        })
    }

    /// Applies the update section, strictly in section order.
    ///
    /// [RFC 2136](https://tools.ietf.org/html/rfc2136), DNS Update, April 1997
    ///
    /// ```text
    /// 3.4.2.7. Pseudocode Summary
    ///
    ///      [rr] for rr in updates
    ///           if (rr.class == zclass)
    ///                if (rr.type == CNAME)
    ///                     if (zone_rrset<rr.name, ~CNAME>)
    ///                          next [rr]
    ///                elsif (zone_rrset<rr.name, CNAME>)
    ///                     next [rr]
    ///                if (rr.type == SOA)
    ///                     if (!zone_rrset<rr.name, SOA> ||
    ///                         zone_rr<rr.name, SOA>.serial > rr.soa.serial)
    ///                          next [rr]
    ///                ...
    /// ```
    ///
    /// At most one store mutation is issued per update record. A store
    /// failure aborts the remainder of the section with SERVFAIL; records
    /// already applied stay applied.
    pub async fn apply(&mut self, updates: &[Record]) -> UpdateResult<()> {
        for rr in updates {
            self.apply_record(rr).await?;
        }
        Ok(())
    }

    async fn apply_record(&mut self, rr: &Record) -> UpdateResult<()> {
        let relative = relative_name(rr.name(), self.zone.name());
        let at_apex = relative.is_empty();

        match rr.dns_class() {
            class if class == self.zone_class => self.add_record(rr, relative).await,
            DNSClass::ANY => match rr.record_type() {
                RecordType::ANY => {
                    // delete all record sets at the name; SOA and NS survive
                    // at the apex
                    let doomed: Vec<RecordSet> = self
                        .record_sets
                        .iter()
                        .filter(|rs| rs.name == relative)
                        .filter(|rs| {
                            !(at_apex && matches!(rs.rtype, RecordType::SOA | RecordType::NS))
                        })
                        .cloned()
                        .collect();
                    for set in doomed {
                        info!("deleting record set ({}, {})", set.name, set.rtype);
                        self.store
                            .delete_record_set(self.zone, &set)
                            .await
                            .map_err(abort)?;
                        self.forget(&set);
                    }
                    Ok(())
                }
                rtype @ (RecordType::SOA | RecordType::NS) if at_apex => {
                    debug!("refusing to delete {rtype} at the apex of {}", self.zone.name());
                    Ok(())
                }
                rtype => {
                    if let Some(set) = self.find(&relative, rtype).cloned() {
                        info!("deleting record set ({}, {})", set.name, set.rtype);
                        self.store
                            .delete_record_set(self.zone, &set)
                            .await
                            .map_err(abort)?;
                        self.forget(&set);
                    }
                    Ok(())
                }
            },
            DNSClass::NONE => {
                // never delete the SOA this way
                if rr.record_type() == RecordType::SOA {
                    return Ok(());
                }
                let Some(value) = rdata_value(rr.data()) else {
                    return Ok(());
                };
                if let Some(set) = self.find(&relative, rr.record_type()).cloned() {
                    if set.values.contains(&value) {
                        info!(
                            "deleting value {value} from record set ({}, {})",
                            set.name, set.rtype
                        );
                        self.store
                            .delete_values(self.zone, &set, std::slice::from_ref(&value))
                            .await
                            .map_err(abort)?;
                        self.remove_value(&set, &value);
                    }
                }
                Ok(())
            }
            // unreachable after pre_scan
            _ => Err(ResponseCode::FormErr),
        }
    }

    async fn add_record(&mut self, rr: &Record, relative: String) -> UpdateResult<()> {
        let rtype = rr.record_type();

        if rtype == RecordType::CNAME {
            if self
                .record_sets
                .iter()
                .any(|rs| rs.name == relative && rs.rtype != RecordType::CNAME)
            {
                info!("skipping CNAME update, other records exist at {}", rr.name());
                return Ok(());
            }
        } else if self.find(&relative, RecordType::CNAME).is_some() {
            info!("skipping update to {}, CNAME exists there", rr.name());
            return Ok(());
        }

        // the provider owns the SOA and its serial
        if rtype == RecordType::SOA {
            debug!("skipping SOA update for {}", rr.name());
            return Ok(());
        }

        let Some(value) = rdata_value(rr.data()) else {
            warn!("zone-class update record carries no rdata: {rr:?}");
            return Err(ResponseCode::FormErr);
        };

        let Some(existing) = self.find(&relative, rtype).cloned() else {
            let set = RecordSet {
                name: relative,
                rtype,
                ttl: rr.ttl(),
                values: vec![value],
            };
            info!("creating record set ({}, {})", set.name, set.rtype);
            self.store
                .create_record_set(self.zone, &set)
                .await
                .map_err(abort)?;
            self.record_sets.push(set);
            return Ok(());
        };

        if existing.values.contains(&value) {
            // adding an identical record is a no-op
            return Ok(());
        }

        // CNAME stays a singleton, everything else accumulates
        let values = if rtype == RecordType::CNAME {
            vec![value]
        } else {
            let mut values = existing.values.clone();
            values.push(value);
            values
        };
        info!("replacing values of record set ({}, {})", existing.name, existing.rtype);
        self.store
            .replace_values(self.zone, &existing, &values)
            .await
            .map_err(abort)?;
        self.set_values(&existing, values);
        Ok(())
    }
}

impl<S> UpdateTransaction<'_, S> {
    /// Verifies the prerequisite section.
    ///
    /// [RFC 2136](https://tools.ietf.org/html/rfc2136), DNS Update, April 1997
    ///
    /// ```text
    /// 3.2.5 - Pseudocode for Prerequisite Section Processing
    ///
    ///      for rr in prerequisites
    ///           if (rr.ttl != 0)
    ///                return (FORMERR)
    ///           if (zone_of(rr.name) != ZNAME)
    ///                return (NOTZONE);
    ///           if (rr.class == ANY)
    ///                if (rr.rdlength != 0)
    ///                     return (FORMERR)
    ///                if (rr.type == ANY)
    ///                     if (!zone_name<rr.name>)
    ///                          return (NXDOMAIN)
    ///                else
    ///                     if (!zone_rrset<rr.name, rr.type>)
    ///                          return (NXRRSET)
    ///           if (rr.class == NONE)
    ///                if (rr.rdlength != 0)
    ///                     return (FORMERR)
    ///                if (rr.type == ANY)
    ///                     if (zone_name<rr.name>)
    ///                          return (YXDOMAIN)
    ///                else
    ///                     if (zone_rrset<rr.name, rr.type>)
    ///                          return (YXRRSET)
    ///           if (rr.class == zclass)
    ///                temp<rr.name, rr.type> += rr
    ///           else
    ///                return (FORMERR)
    ///
    ///      for rrset in temp
    ///           if (zone_rrset<rrset.name, rrset.type> != rrset)
    ///                return (NXRRSET)
    /// ```
    ///
    /// Value-dependent groups are compared against the stored record sets
    /// again each time a prerequisite folds into `temp`, not once at the end.
    pub fn verify_prerequisites(&self, prerequisites: &[Record]) -> UpdateResult<()> {
        let mut temp: Vec<((String, RecordType), Vec<(u32, String)>)> = Vec::new();

        for require in prerequisites {
            if require.ttl() != 0 {
                warn!("prerequisite TTL must be 0: {require:?}");
                return Err(ResponseCode::FormErr);
            }

            if !self.zone.origin().zone_of(&LowerName::from(require.name())) {
                warn!(
                    "prerequisite name {} is outside zone {}",
                    require.name(),
                    self.zone.origin()
                );
                return Err(ResponseCode::NotZone);
            }

            let relative = relative_name(require.name(), self.zone.name());

            match require.dns_class() {
                DNSClass::ANY => {
                    if !is_empty_rdata(require.data()) {
                        warn!("prerequisite with class ANY must have no rdata: {require:?}");
                        return Err(ResponseCode::FormErr);
                    }
                    match require.record_type() {
                        // require a name is in use
                        RecordType::ANY => {
                            if !self.name_in_use(&relative) {
                                return Err(ResponseCode::NXDomain);
                            }
                        }
                        // require a record set exists, any value
                        rtype => {
                            if self.find(&relative, rtype).is_none() {
                                return Err(ResponseCode::NXRRSet);
                            }
                        }
                    }
                }
                DNSClass::NONE => {
                    if !is_empty_rdata(require.data()) {
                        warn!("prerequisite with class NONE must have no rdata: {require:?}");
                        return Err(ResponseCode::FormErr);
                    }
                    match require.record_type() {
                        // require a name is not in use
                        RecordType::ANY => {
                            if self.name_in_use(&relative) {
                                return Err(ResponseCode::YXDomain);
                            }
                        }
                        // require a record set does not exist
                        rtype => {
                            if self.find(&relative, rtype).is_some() {
                                return Err(ResponseCode::YXRRSet);
                            }
                        }
                    }
                }
                class if class == self.zone_class => {
                    let Some(value) = rdata_value(require.data()) else {
                        warn!("zone-class prerequisite carries no rdata: {require:?}");
                        return Err(ResponseCode::FormErr);
                    };
                    let key = (relative, require.record_type());
                    match temp.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, group)) => group.push((require.ttl(), value)),
                        None => temp.push((key, vec![(require.ttl(), value)])),
                    }
                }
                class => {
                    warn!("prerequisite has unsupported class {class}: {require:?}");
                    return Err(ResponseCode::FormErr);
                }
            }

            // every accumulated group is re-checked as each record folds in
            for ((name, rtype), group) in &temp {
                if !rrset_equal(group, self.find(name, *rtype)) {
                    return Err(ResponseCode::NXRRSet);
                }
            }
        }

        Ok(())
    }

    /// Prescan of the update section, the purely syntactic checks that run
    /// before anything is applied.
    ///
    /// [RFC 2136](https://tools.ietf.org/html/rfc2136), DNS Update, April 1997
    ///
    /// ```text
    /// 3.4.1.3 - Pseudocode For Update Section Prescan
    ///
    ///      [rr] for rr in updates
    ///           if (zone_of(rr.name) != ZNAME)
    ///                return (NOTZONE);
    ///           if (rr.class == zclass)
    ///                if (rr.type & ANY|AXFR|MAILA|MAILB)
    ///                     return (FORMERR)
    ///           elsif (rr.class == ANY)
    ///                if (rr.ttl != 0 || rr.rdlength != 0
    ///                    || rr.type & AXFR|MAILA|MAILB)
    ///                     return (FORMERR)
    ///           elsif (rr.class == NONE)
    ///                if (rr.ttl != 0 || rr.type & ANY|AXFR|MAILA|MAILB)
    ///                     return (FORMERR)
    ///           else
    ///                return (FORMERR)
    /// ```
    pub fn pre_scan(&self, updates: &[Record]) -> UpdateResult<()> {
        for rr in updates {
            if !self.zone.origin().zone_of(&LowerName::from(rr.name())) {
                warn!(
                    "update name {} is outside zone {}",
                    rr.name(),
                    self.zone.origin()
                );
                return Err(ResponseCode::NotZone);
            }

            let class = rr.dns_class();
            if class == self.zone_class {
                match rr.record_type() {
                    RecordType::ANY | RecordType::AXFR | RecordType::IXFR => {
                        warn!("update record type must be a real type: {rr:?}");
                        return Err(ResponseCode::FormErr);
                    }
                    _ => (),
                }
            } else {
                match class {
                    DNSClass::ANY => {
                        if rr.ttl() != 0 || !is_empty_rdata(rr.data()) {
                            warn!("class ANY update requires empty rdata and 0 TTL: {rr:?}");
                            return Err(ResponseCode::FormErr);
                        }
                        if let RecordType::AXFR | RecordType::IXFR = rr.record_type() {
                            warn!("update record type must not be a transfer type: {rr:?}");
                            return Err(ResponseCode::FormErr);
                        }
                    }
                    DNSClass::NONE => {
                        if rr.ttl() != 0 {
                            warn!("class NONE update requires a 0 TTL: {rr:?}");
                            return Err(ResponseCode::FormErr);
                        }
                        if let RecordType::ANY | RecordType::AXFR | RecordType::IXFR =
                            rr.record_type()
                        {
                            warn!("update record type must be a real type: {rr:?}");
                            return Err(ResponseCode::FormErr);
                        }
                    }
                    _ => {
                        warn!("update record has unsupported class {class}: {rr:?}");
                        return Err(ResponseCode::FormErr);
                    }
                }
            }
        }

        Ok(())
    }

    fn find(&self, name: &str, rtype: RecordType) -> Option<&RecordSet> {
        self.record_sets
            .iter()
            .find(|rs| rs.name == name && rs.rtype == rtype)
    }

    fn name_in_use(&self, name: &str) -> bool {
        self.record_sets.iter().any(|rs| rs.name == name)
    }

    fn set_values(&mut self, like: &RecordSet, values: Vec<String>) {
        if let Some(set) = self
            .record_sets
            .iter_mut()
            .find(|rs| rs.name == like.name && rs.rtype == like.rtype)
        {
            set.values = values;
        }
    }

    fn forget(&mut self, like: &RecordSet) {
        self.record_sets
            .retain(|rs| !(rs.name == like.name && rs.rtype == like.rtype));
    }

    fn remove_value(&mut self, like: &RecordSet, value: &str) {
        if let Some(set) = self
            .record_sets
            .iter_mut()
            .find(|rs| rs.name == like.name && rs.rtype == like.rtype)
        {
            set.values.retain(|v| v != value);
        }
    }
}

fn abort(error: StoreError) -> ResponseCode {
    error!("aborting update, zone store failure: {error}");
    ResponseCode::ServFail
}

fn is_empty_rdata(data: &RData) -> bool {
    matches!(data, RData::Update0(_) | RData::NULL(..))
}

fn rdata_value(data: &RData) -> Option<String> {
    if is_empty_rdata(data) {
        return None;
    }
    Some(data.to_string())
}

/// The owner name relative to the zone apex, as the record store keys it.
/// The apex itself maps to the empty string. Case is folded.
pub(crate) fn relative_name(name: &Name, zone: &Name) -> String {
    let name = name.to_lowercase();
    let keep = (name.num_labels() as usize).saturating_sub(zone.num_labels() as usize);
    name.iter()
        .take(keep)
        .map(|label| String::from_utf8_lossy(label).into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

/// Value-dependent prerequisite comparison: the stored set must exist, hold
/// as many records as the group, carry the TTL every group record carries,
/// and contain exactly the group's values, in any order.
pub(crate) fn rrset_equal(group: &[(u32, String)], stored: Option<&RecordSet>) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    if group.len() != stored.values.len() {
        return false;
    }
    if group.iter().any(|(ttl, _)| *ttl != stored.ttl) {
        return false;
    }
    let mut expected: Vec<&str> = group.iter().map(|(_, v)| v.as_str()).collect();
    let mut actual: Vec<&str> = stored.values.iter().map(String::as_str).collect();
    expected.sort_unstable();
    actual.sort_unstable();
    expected == actual
}
