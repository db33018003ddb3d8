// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `Server` component for hosting a domain name servers operations.

mod gateway;

pub use self::gateway::Gateway;

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::net;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::proto::op::Message;
use crate::proto::serialize::binary::{BinDecodable, BinEncodable};
use crate::store::ZoneStore;

/// The max size a UDP datagram we are willing to decode may have
const MAX_DATAGRAM_LEN: usize = 4096;

/// A Tokio based DNS server, handling UDP traffic on any number of sockets.
pub struct ServerFuture<S: ZoneStore> {
    gateway: Arc<Gateway<S>>,
    join_set: JoinSet<Result<(), io::Error>>,
    shutdown_token: CancellationToken,
}

impl<S: ZoneStore> ServerFuture<S> {
    /// Creates a new server wrapping the given gateway.
    pub fn new(gateway: Gateway<S>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            join_set: JoinSet::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Register a UDP socket. Should be bound before calling this function.
    pub fn register_socket(&mut self, socket: net::UdpSocket) {
        debug!("registering udp: {:?}", socket);

        let socket = Arc::new(socket);
        let shutdown = self.shutdown_token.clone();
        let gateway = self.gateway.clone();

        self.join_set.spawn(async move {
            let mut inner_join_set = JoinSet::new();
            let mut buf = [0u8; MAX_DATAGRAM_LEN];
            loop {
                let (len, src_addr) = tokio::select! {
                    received = socket.recv_from(&mut buf) => match received {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("error receiving message on udp_socket: {e}");
                            if is_unrecoverable_socket_error(&e) {
                                break;
                            }
                            continue;
                        }
                    },
                    _ = shutdown.cancelled() => break,
                };

                debug!("received udp request from: {src_addr}");

                // verify that the src address is safe for responses
                if let Err(e) = sanitize_src_address(src_addr) {
                    warn!("address can not be responded to {src_addr}: {e}");
                    continue;
                }

                let bytes = buf[..len].to_vec();
                let gateway = gateway.clone();
                let socket = socket.clone();

                inner_join_set.spawn(async move {
                    handle_raw_request(&bytes, src_addr, gateway, socket).await;
                });

                reap_tasks(&mut inner_join_set);
            }

            if shutdown.is_cancelled() {
                Ok(())
            } else {
                Err(io::Error::other("unexpected close of UDP socket"))
            }
        });
    }

    /// Register a UDP socket. Should be bound before calling this function.
    pub fn register_socket_std(&mut self, socket: std::net::UdpSocket) -> io::Result<()> {
        self.register_socket(net::UdpSocket::from_std(socket)?);
        Ok(())
    }

    /// Triggers a graceful shutdown the server. All background tasks will stop
    /// accepting new requests and the returned future will complete once they
    /// have all exited.
    pub async fn shutdown_gracefully(&mut self) -> Result<(), io::Error> {
        self.shutdown_token.cancel();
        block_until_done(&mut self.join_set).await
    }

    /// This will run until all background tasks complete. If one or more tasks
    /// return an error, one will be chosen as the returned error for this future.
    pub async fn block_until_done(&mut self) -> Result<(), io::Error> {
        block_until_done(&mut self.join_set).await
    }
}

async fn block_until_done(join_set: &mut JoinSet<Result<(), io::Error>>) -> Result<(), io::Error> {
    if join_set.is_empty() {
        warn!("block_until_done called with no pending tasks");
        return Ok(());
    }

    // Now wait for all of the tasks to complete.
    let mut out = Ok(());
    while let Some(join_result) = join_set.join_next().await {
        match join_result {
            Ok(result) => {
                if let Err(e) = result {
                    // Save the last error.
                    out = Err(e);
                }
            }
            Err(e) => return Err(io::Error::other(format!("internal error in spawn: {e}"))),
        }
    }
    out
}

/// Reap finished tasks from a `JoinSet`, without awaiting or blocking.
fn reap_tasks(join_set: &mut JoinSet<()>) {
    while FutureExt::now_or_never(join_set.join_next())
        .flatten()
        .is_some()
    {}
}

async fn handle_raw_request<S: ZoneStore>(
    bytes: &[u8],
    src_addr: SocketAddr,
    gateway: Arc<Gateway<S>>,
    socket: Arc<net::UdpSocket>,
) {
    let message = match Message::from_bytes(bytes) {
        Ok(message) => message,
        Err(e) => {
            warn!("failed to decode request from {src_addr}: {e}");
            return;
        }
    };

    let Some(response) = gateway.handle_message(message).await else {
        // an in-flight duplicate, the original handler will answer
        return;
    };

    match response.to_bytes() {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, src_addr).await {
                warn!("error sending response to {src_addr}: {e}");
            }
        }
        Err(e) => warn!("failed to encode response for {src_addr}: {e}"),
    }
}

/// Checks if the IP address is safe for returning messages
///
/// Examples of unsafe addresses are any with a port of `0`
///
/// # Returns
///
/// Error if the address should not be used for returned requests
fn sanitize_src_address(src: SocketAddr) -> Result<(), String> {
    // currently checks that the src address aren't either the undefined IPv4 or IPv6 address, and not port 0.
    if src.port() == 0 {
        return Err(format!("cannot respond to src on port 0: {src}"));
    }

    fn verify_v4(src: Ipv4Addr) -> Result<(), String> {
        if src.is_unspecified() {
            return Err(format!("cannot respond to unspecified v4 addr: {src}"));
        }

        if src.is_broadcast() {
            return Err(format!("cannot respond to broadcast v4 addr: {src}"));
        }

        Ok(())
    }

    fn verify_v6(src: Ipv6Addr) -> Result<(), String> {
        if src.is_unspecified() {
            return Err(format!("cannot respond to unspecified v6 addr: {src}"));
        }

        Ok(())
    }

    match src.ip() {
        IpAddr::V4(v4) => verify_v4(v4),
        IpAddr::V6(v6) => verify_v6(v6),
    }
}

fn is_unrecoverable_socket_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::ConnectionAborted
    )
}
