// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Request dispatch: dynamic updates run through the RFC 2136 state machine,
//! every other opcode is relayed upstream.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::authority::{PendingRequests, UpdateResult, UpdateTransaction};
use crate::forwarder::Forwarder;
use crate::proto::op::{Message, MessageType, OpCode, ResponseCode};
use crate::proto::rr::{DNSClass, RecordType};
use crate::store::ZoneStore;

/// Routes decoded messages and owns the in-flight update id set.
pub struct Gateway<S> {
    store: Arc<S>,
    forwarder: Forwarder,
    pending: PendingRequests,
}

impl<S: ZoneStore> Gateway<S> {
    /// A gateway applying updates to `store` and relaying everything else
    /// through `forwarder`.
    pub fn new(store: Arc<S>, forwarder: Forwarder) -> Self {
        Self {
            store,
            forwarder,
            pending: PendingRequests::new(),
        }
    }

    /// Handles one decoded request and produces the response to send.
    ///
    /// Returns `None` exactly when the request is a retransmission of an
    /// update that is still in flight; such requests get no response at all.
    pub async fn handle_message(&self, request: Message) -> Option<Message> {
        if request.message_type() == MessageType::Response {
            warn!("got a response as a request from id: {}", request.id());
            return Some(response_with_code(&request, ResponseCode::FormErr));
        }

        match request.op_code() {
            OpCode::Update => {
                let _guard = match self.pending.begin(request.id()) {
                    Some(guard) => guard,
                    None => {
                        debug!(
                            "dropping retransmission of in-flight update {}",
                            request.id()
                        );
                        return None;
                    }
                };

                let code = match self.update(&request).await {
                    Ok(()) => ResponseCode::NoError,
                    Err(code) => code,
                };
                info!("update request {} finished: {code}", request.id());
                Some(update_response(&request, code))
            }
            _ => match self.forwarder.forward(&request).await {
                Ok(reply) => Some(relay_response(&request, &reply)),
                Err(e) => {
                    error!("failed to forward request {}: {e}", request.id());
                    Some(response_with_code(&request, ResponseCode::ServFail))
                }
            },
        }
    }

    /// Processes an update request per RFC 2136 section 3: zone section
    /// check, prerequisite verification, update prescan, then application.
    ///
    /// [RFC 2136](https://tools.ietf.org/html/rfc2136), DNS Update, April 1997
    ///
    /// ```text
    /// 3.1.2 - Pseudocode For Zone Section Processing
    ///
    ///      if (zcount != 1 || ztype != SOA)
    ///           return (FORMERR)
    ///      if (zone_type(zname, zclass) == SLAVE)
    ///           return forward()
    ///      if (zone_type(zname, zclass) == MASTER)
    ///           return update()
    ///      return (NOTAUTH)
    /// ```
    async fn update(&self, request: &Message) -> UpdateResult<()> {
        let zones = request.queries();
        if zones.len() != 1 || zones[0].query_type() != RecordType::SOA {
            warn!(
                "invalid zone section in update request {}: {zones:?}",
                request.id()
            );
            return Err(ResponseCode::FormErr);
        }
        let zone_name = zones[0].name();
        let zone_class = zones[0].query_class();
        // updates are only defined for IN zones; a question class of ANY or
        // NONE would bleed into the per-record class dispatch downstream
        if zone_class != DNSClass::IN {
            warn!(
                "refusing update request {} with zone class {zone_class:?}",
                request.id()
            );
            return Err(ResponseCode::FormErr);
        }

        let zone = self
            .store
            .find_zone(zone_name)
            .await
            .map_err(|e| {
                error!("zone store failure looking up {zone_name}: {e}");
                ResponseCode::ServFail
            })?
            .ok_or_else(|| {
                info!("not authoritative for {zone_name}");
                ResponseCode::NotAuth
            })?;

        let mut transaction = UpdateTransaction::begin(self.store.as_ref(), &zone, zone_class)
            .await
            .map_err(|e| {
                error!("zone store failure reading {zone_name}: {e}");
                ResponseCode::ServFail
            })?;

        // in an update request the answer section carries the prerequisites
        // and the authority section carries the updates
        transaction.verify_prerequisites(request.answers())?;
        transaction.pre_scan(request.name_servers())?;
        transaction.apply(request.name_servers()).await
    }
}

/// Update responses take the RFC 2136 section 3.8 form: all sections zeroed,
/// only the id, opcode, and response code carried back.
fn update_response(request: &Message, code: ResponseCode) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_op_code(OpCode::Update)
        .set_message_type(MessageType::Response)
        .set_response_code(code);
    response
}

fn response_with_code(request: &Message, code: ResponseCode) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_op_code(request.op_code())
        .set_message_type(MessageType::Response)
        .set_response_code(code);
    for query in request.queries() {
        response.add_query(query.clone());
    }
    response
}

/// A response to `request` relaying what the upstream answered.
fn relay_response(request: &Message, reply: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_op_code(request.op_code())
        .set_message_type(MessageType::Response)
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(reply.recursion_available())
        .set_response_code(reply.response_code());
    for query in request.queries() {
        response.add_query(query.clone());
    }
    response.insert_answers(reply.answers().to_vec());
    response.insert_name_servers(reply.name_servers().to_vec());
    response.insert_additionals(reply.additionals().to_vec());
    response
}
