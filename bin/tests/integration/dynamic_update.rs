// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Dynamic update battery run against the gateway with an in-memory store.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{update_message, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, CNAME};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};

use zonegate_server::error::StoreError;
use zonegate_server::forwarder::Forwarder;
use zonegate_server::store::in_memory::InMemoryStore;
use zonegate_server::store::{RecordSet, Zone, ZoneStore};
use zonegate_server::Gateway;

fn origin() -> Name {
    Name::from_str("example.com.").unwrap()
}

fn stored_set(name: &str, rtype: RecordType, ttl: u32, values: &[&str]) -> RecordSet {
    RecordSet {
        name: name.to_string(),
        rtype,
        ttl,
        values: values.iter().map(|v| v.to_string()).collect(),
    }
}

fn seeded_store() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    let origin = origin();
    store.insert_zone(&origin);
    store.insert(
        &origin,
        stored_set(
            "",
            RecordType::SOA,
            3600,
            &["ns1.example.com. admin.example.com. 1 3600 600 86400 300"],
        ),
    );
    store.insert(
        &origin,
        stored_set("", RecordType::NS, 3600, &["ns1.example.com."]),
    );
    store.insert(
        &origin,
        stored_set("www", RecordType::A, 300, &["1.2.3.4", "5.6.7.8"]),
    );
    Arc::new(store)
}

fn gateway<S: ZoneStore>(store: Arc<S>) -> Gateway<S> {
    // the update path never reaches the forwarder
    Gateway::new(store, Forwarder::new(vec![], Duration::from_millis(10), 1))
}

async fn send<S: ZoneStore>(gateway: &Gateway<S>, message: Message) -> Message {
    gateway
        .handle_message(message)
        .await
        .expect("expected a response")
}

fn a_record(name: &str, ttl: u32, octets: [u8; 4]) -> Record {
    Record::from_rdata(
        Name::from_str(name).unwrap(),
        ttl,
        RData::A(A::new(octets[0], octets[1], octets[2], octets[3])),
    )
}

fn empty_record(name: &str, rtype: RecordType, class: DNSClass) -> Record {
    let mut record =
        Record::update0(Name::from_str(name).unwrap(), 0, rtype).into_record_of_rdata();
    record.set_dns_class(class);
    record
}

/// A raw update message with `prerequisites` in the answer section and
/// `updates` in the authority section.
fn update_with(prerequisites: Vec<Record>, updates: Vec<Record>) -> Message {
    let mut message = Message::new();
    message
        .set_id(4096)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Update)
        .add_query(Query::query(origin(), RecordType::SOA));
    message.insert_answers(prerequisites);
    message.insert_name_servers(updates);
    message
}

#[tokio::test]
async fn test_zone_section_must_be_one_soa_question() {
    let gateway = gateway(seeded_store());

    let mut message = Message::new();
    message
        .set_id(1)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Update)
        .add_query(Query::query(origin(), RecordType::A));
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::FormErr);

    let mut message = Message::new();
    message
        .set_id(2)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Update)
        .add_query(Query::query(origin(), RecordType::SOA))
        .add_query(Query::query(origin(), RecordType::SOA));
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::FormErr);
}

#[tokio::test]
async fn test_zone_section_class_must_be_in() {
    let gateway = gateway(seeded_store());

    let mut zone = Query::query(origin(), RecordType::SOA);
    zone.set_query_class(DNSClass::ANY);
    let mut message = Message::new();
    message
        .set_id(3)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Update)
        .add_query(zone);
    message.insert_name_servers(vec![a_record("api.example.com.", 60, [9, 9, 9, 9])]);

    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::FormErr);
}

#[tokio::test]
async fn test_unknown_zone_is_not_authoritative() {
    let gateway = gateway(seeded_store());

    let record = a_record("api.other.net.", 60, [9, 9, 9, 9]);
    let message = update_message::create(
        record.into(),
        Name::from_str("other.net.").unwrap(),
        false,
    );
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::NotAuth);
}

#[tokio::test]
async fn test_response_as_request_is_rejected() {
    let gateway = gateway(seeded_store());

    let mut message = Message::new();
    message
        .set_id(77)
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query);
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::FormErr);
    assert_eq!(response.id(), 77);
}

#[tokio::test]
async fn test_update_response_sections_are_zeroed() {
    let store = seeded_store();
    let gateway = gateway(store);

    let record = a_record("api.example.com.", 60, [9, 9, 9, 9]);
    let mut message = update_message::create(record.into(), origin(), false);
    message.set_id(321);
    let response = send(&gateway, message).await;

    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(response.id(), 321);
    assert_eq!(response.op_code(), OpCode::Update);
    assert_eq!(response.message_type(), MessageType::Response);
    assert!(response.queries().is_empty());
    assert!(response.answers().is_empty());
    assert!(response.name_servers().is_empty());
    assert!(response.additionals().is_empty());
}

#[tokio::test]
async fn test_create_record_set() {
    let store = seeded_store();
    let gateway = gateway(store.clone());

    let record = a_record("api.example.com.", 60, [9, 9, 9, 9]);
    let message = update_message::create(record.clone().into(), origin(), false);
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);

    let sets = store.dump(&origin());
    let api = sets.iter().find(|rs| rs.name == "api").expect("api set");
    assert_eq!(api.rtype, RecordType::A);
    assert_eq!(api.ttl, 60);
    assert_eq!(api.values, vec!["9.9.9.9"]);

    // creating again trips the "rrset does not exist" prerequisite
    let message = update_message::create(record.into(), origin(), false);
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::YXRRSet);
}

#[tokio::test]
async fn test_append_record() {
    let store = seeded_store();
    let gateway = gateway(store.clone());

    // must_exist on a missing set fails the prerequisite
    let record = a_record("api.example.com.", 60, [9, 9, 9, 9]);
    let message = update_message::append(record.clone().into(), origin(), true, false);
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::NXRRSet);

    // without it the set is created
    let message = update_message::append(record.into(), origin(), false, false);
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);

    // appending to an existing set accumulates values
    let more = a_record("www.example.com.", 300, [7, 7, 7, 7]);
    let message = update_message::append(more.into(), origin(), true, false);
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);

    let sets = store.dump(&origin());
    let www = sets.iter().find(|rs| rs.name == "www").expect("www set");
    assert_eq!(www.values, vec!["1.2.3.4", "5.6.7.8", "7.7.7.7"]);
}

#[tokio::test]
async fn test_append_is_idempotent() {
    let store = seeded_store();
    let gateway = gateway(store.clone());

    let record = a_record("www.example.com.", 300, [1, 2, 3, 4]);
    let before = store.dump(&origin());

    for _ in 0..2 {
        let message = update_message::append(record.clone().into(), origin(), true, false);
        let response = send(&gateway, message).await;
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(store.dump(&origin()), before);
    }
}

#[tokio::test]
async fn test_delete_by_rdata() {
    let store = seeded_store();
    let gateway = gateway(store.clone());

    let record = a_record("www.example.com.", 0, [1, 2, 3, 4]);
    let message = update_message::delete_by_rdata(record.into(), origin(), false);
    let response = send(&gateway, message).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);

    let sets = store.dump(&origin());
    let www = sets.iter().find(|rs| rs.name == "www").expect("www set");
    assert_eq!(www.values, vec!["5.6.7.8"]);
}

#[tokio::test]
async fn test_delete_rrset() {
    let store = seeded_store();
    let gateway = gateway(store.clone());

    let delete = empty_record("www.example.com.", RecordType::A, DNSClass::ANY);
    let response = send(&gateway, update_with(vec![], vec![delete])).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);

    assert!(!store.dump(&origin()).iter().any(|rs| rs.name == "www"));
}

#[tokio::test]
async fn test_delete_all_at_apex_preserves_soa_and_ns() {
    let store = seeded_store();
    let gateway = gateway(store.clone());

    let delete = empty_record("example.com.", RecordType::ANY, DNSClass::ANY);
    let response = send(&gateway, update_with(vec![], vec![delete])).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);

    let apex: Vec<RecordType> = store
        .dump(&origin())
        .iter()
        .filter(|rs| rs.name.is_empty())
        .map(|rs| rs.rtype)
        .collect();
    assert!(apex.contains(&RecordType::SOA));
    assert!(apex.contains(&RecordType::NS));
}

#[tokio::test]
async fn test_failed_prerequisite_aborts_whole_update() {
    let store = seeded_store();
    let gateway = gateway(store.clone());
    let before = store.dump(&origin());

    // require a name that is not in use, then try to add a record
    let require = empty_record("missing.example.com.", RecordType::ANY, DNSClass::ANY);
    let add = a_record("api.example.com.", 60, [9, 9, 9, 9]);
    let response = send(&gateway, update_with(vec![require], vec![add])).await;

    assert_eq!(response.response_code(), ResponseCode::NXDomain);
    assert_eq!(store.dump(&origin()), before);
}

#[tokio::test]
async fn test_prerequisite_rrset_exists() {
    let gateway = gateway(seeded_store());

    let present = empty_record("www.example.com.", RecordType::A, DNSClass::ANY);
    let response = send(&gateway, update_with(vec![present], vec![])).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);

    let missing = empty_record("www.example.com.", RecordType::AAAA, DNSClass::ANY);
    let response = send(&gateway, update_with(vec![missing], vec![])).await;
    assert_eq!(response.response_code(), ResponseCode::NXRRSet);
}

#[tokio::test]
async fn test_cname_skips_occupied_name_and_continues() {
    let store = seeded_store();
    let gateway = gateway(store.clone());

    let cname = Record::from_rdata(
        Name::from_str("www.example.com.").unwrap(),
        300,
        RData::CNAME(CNAME(Name::from_str("target.example.net.").unwrap())),
    );
    let add = a_record("api.example.com.", 60, [9, 9, 9, 9]);
    let response = send(&gateway, update_with(vec![], vec![cname, add])).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);

    let sets = store.dump(&origin());
    let www = sets.iter().find(|rs| rs.name == "www").expect("www set");
    assert_eq!(www.rtype, RecordType::A);
    assert!(sets.iter().any(|rs| rs.name == "api"));
}

/// A store that starts failing mutations once its budget runs out.
struct FailingStore {
    inner: InMemoryStore,
    mutations_left: AtomicUsize,
}

impl FailingStore {
    fn take_budget(&self) -> Result<(), StoreError> {
        self.mutations_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| StoreError::Status {
                status: 500,
                url: "http://store.invalid/zones".to_string(),
            })
    }
}

#[async_trait]
impl ZoneStore for FailingStore {
    async fn find_zone(&self, name: &Name) -> Result<Option<Zone>, StoreError> {
        self.inner.find_zone(name).await
    }

    async fn record_sets(&self, zone: &Zone) -> Result<Vec<RecordSet>, StoreError> {
        self.inner.record_sets(zone).await
    }

    async fn create_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError> {
        self.take_budget()?;
        self.inner.create_record_set(zone, set).await
    }

    async fn replace_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError> {
        self.take_budget()?;
        self.inner.replace_values(zone, set, values).await
    }

    async fn delete_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError> {
        self.take_budget()?;
        self.inner.delete_record_set(zone, set).await
    }

    async fn delete_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError> {
        self.take_budget()?;
        self.inner.delete_values(zone, set, values).await
    }
}

#[tokio::test]
async fn test_store_failure_mid_update_answers_servfail() {
    let inner = InMemoryStore::new();
    inner.insert_zone(&origin());
    let store = Arc::new(FailingStore {
        inner,
        mutations_left: AtomicUsize::new(1),
    });
    let gateway = gateway(store.clone());

    // the first add lands, the second hits the failing store
    let first = a_record("api.example.com.", 60, [9, 9, 9, 9]);
    let second = a_record("web.example.com.", 60, [8, 8, 8, 8]);
    let response = send(&gateway, update_with(vec![], vec![first, second])).await;
    assert_eq!(response.response_code(), ResponseCode::ServFail);

    // whatever was applied before the failure stays applied
    let sets = store.inner.dump(&origin());
    assert!(sets.iter().any(|rs| rs.name == "api"));
    assert!(!sets.iter().any(|rs| rs.name == "web"));
}

/// A store whose snapshot read blocks until the test releases it, to hold an
/// update in flight.
struct GatedStore {
    inner: InMemoryStore,
    gate: tokio::sync::Semaphore,
}

#[async_trait]
impl ZoneStore for GatedStore {
    async fn find_zone(&self, name: &Name) -> Result<Option<Zone>, StoreError> {
        self.inner.find_zone(name).await
    }

    async fn record_sets(&self, zone: &Zone) -> Result<Vec<RecordSet>, StoreError> {
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        self.inner.record_sets(zone).await
    }

    async fn create_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError> {
        self.inner.create_record_set(zone, set).await
    }

    async fn replace_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError> {
        self.inner.replace_values(zone, set, values).await
    }

    async fn delete_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError> {
        self.inner.delete_record_set(zone, set).await
    }

    async fn delete_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError> {
        self.inner.delete_values(zone, set, values).await
    }
}

#[tokio::test]
async fn test_duplicate_in_flight_update_gets_no_response() {
    let inner = InMemoryStore::new();
    inner.insert_zone(&origin());
    let store = Arc::new(GatedStore {
        inner,
        gate: tokio::sync::Semaphore::new(0),
    });
    let gateway = Arc::new(Gateway::new(
        store.clone(),
        Forwarder::new(vec![], Duration::from_millis(10), 1),
    ));

    let record = a_record("api.example.com.", 60, [9, 9, 9, 9]);
    let mut first = update_message::append(record.into(), origin(), false, false);
    first.set_id(42);
    let duplicate = first.clone();

    let in_flight = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.handle_message(first).await }
    });
    // let the first update reach the gated snapshot read
    tokio::task::yield_now().await;

    // the retransmission is dropped without a response
    assert!(gateway.handle_message(duplicate).await.is_none());

    // release the first update and let it finish
    store.gate.add_permits(1);
    let response = in_flight
        .await
        .expect("task panicked")
        .expect("first update must be answered");
    assert_eq!(response.response_code(), ResponseCode::NoError);

    // the id is free again afterwards
    let record = a_record("web.example.com.", 60, [8, 8, 8, 8]);
    let mut again = update_message::append(record.into(), origin(), false, false);
    again.set_id(42);
    store.gate.add_permits(1);
    let response = gateway.handle_message(again).await;
    assert!(response.is_some());
}
