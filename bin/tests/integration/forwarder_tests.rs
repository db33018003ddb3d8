// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Upstream relaying tests against a mock resolver on a local UDP socket.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::net::UdpSocket;

use zonegate_server::forwarder::Forwarder;
use zonegate_server::store::in_memory::InMemoryStore;
use zonegate_server::Gateway;

/// Binds a mock upstream resolver that answers every query with one A record.
async fn mock_upstream() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let addr = socket.local_addr().expect("local addr");

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(query) = Message::from_bytes(&buf[..len]) else {
                continue;
            };

            let mut reply = Message::new();
            reply
                .set_id(query.id())
                .set_message_type(MessageType::Response)
                .set_op_code(OpCode::Query)
                .set_recursion_available(true)
                .set_response_code(ResponseCode::NoError);
            for q in query.queries() {
                reply.add_query(q.clone());
            }
            if let Some(q) = query.queries().first() {
                reply.insert_answers(vec![Record::from_rdata(
                    q.name().clone(),
                    60,
                    RData::A(A::new(192, 0, 2, 1)),
                )]);
            }

            let bytes = reply.to_bytes().expect("encode");
            let _ = socket.send_to(&bytes, src).await;
        }
    });

    addr
}

fn query_message(id: u16, name: &str) -> Message {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(
            Name::from_str(name).unwrap(),
            RecordType::A,
        ));
    message
}

#[tokio::test]
async fn test_forward_relays_reply() {
    let upstream = mock_upstream().await;
    let forwarder = Forwarder::new(vec![upstream.to_string()], Duration::from_millis(500), 3);

    let query = query_message(100, "www.example.com.");
    let reply = forwarder.forward(&query).await.expect("forward failed");

    assert_eq!(reply.id(), 100);
    assert_eq!(reply.response_code(), ResponseCode::NoError);
    assert_eq!(reply.answers().len(), 1);
    assert_eq!(
        *reply.answers()[0].data(),
        RData::A(A::new(192, 0, 2, 1))
    );
}

#[tokio::test]
async fn test_stale_reply_does_not_consume_the_attempt() {
    // answers first with a foreign transaction id, then with the right one
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let addr = socket.local_addr().expect("local addr");
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        let Ok((len, src)) = socket.recv_from(&mut buf).await else {
            return;
        };
        let Ok(query) = Message::from_bytes(&buf[..len]) else {
            return;
        };

        let mut stale = Message::new();
        stale
            .set_id(query.id().wrapping_add(1))
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_response_code(ResponseCode::NoError);
        let _ = socket
            .send_to(&stale.to_bytes().expect("encode"), src)
            .await;

        let mut reply = Message::new();
        reply
            .set_id(query.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_response_code(ResponseCode::NoError);
        let _ = socket
            .send_to(&reply.to_bytes().expect("encode"), src)
            .await;
    });

    // a single attempt has to survive the mismatched datagram
    let forwarder = Forwarder::new(vec![addr.to_string()], Duration::from_millis(500), 1);
    let query = query_message(33, "www.example.com.");
    let reply = forwarder.forward(&query).await.expect("forward failed");
    assert_eq!(reply.id(), 33);
}

#[tokio::test]
async fn test_forward_gives_up_after_attempt_budget() {
    // bound but never answered
    let silent = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let addr = silent.local_addr().expect("local addr");

    let forwarder = Forwarder::new(vec![addr.to_string()], Duration::from_millis(20), 2);
    let query = query_message(7, "www.example.com.");
    assert!(forwarder.forward(&query).await.is_err());
}

#[tokio::test]
async fn test_gateway_relays_queries_upstream() {
    let upstream = mock_upstream().await;
    let store = Arc::new(InMemoryStore::new());
    let gateway = Gateway::new(
        store,
        Forwarder::new(vec![upstream.to_string()], Duration::from_millis(500), 3),
    );

    let response = gateway
        .handle_message(query_message(55, "www.example.com."))
        .await
        .expect("queries always get a response");

    assert_eq!(response.id(), 55);
    assert_eq!(response.message_type(), MessageType::Response);
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert!(response.recursion_available());
    assert_eq!(response.answers().len(), 1);
    assert_eq!(response.queries().len(), 1);
}

#[tokio::test]
async fn test_gateway_answers_servfail_when_upstream_is_dead() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let addr = silent.local_addr().expect("local addr");

    let store = Arc::new(InMemoryStore::new());
    let gateway = Gateway::new(
        store,
        Forwarder::new(vec![addr.to_string()], Duration::from_millis(20), 2),
    );

    let response = gateway
        .handle_message(query_message(9, "www.example.com."))
        .await
        .expect("queries always get a response");
    assert_eq!(response.response_code(), ResponseCode::ServFail);
}
