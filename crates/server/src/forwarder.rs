// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Relay of non-update queries to an upstream resolver.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::ForwardConfig;
use crate::proto::op::Message;
use crate::proto::serialize::binary::{BinDecodable, BinEncodable};
use crate::proto::ProtoError;

const DEFAULT_DNS_PORT: u16 = 53;

/// Errors raised while relaying a query upstream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForwardError {
    /// A socket operation failed
    #[error("io error during forwarding: {0}")]
    Io(#[from] io::Error),

    /// The query or the reply could not be (de)serialized
    #[error("proto error during forwarding: {0}")]
    Proto(#[from] ProtoError),

    /// No upstream resolver is configured or none of them resolved
    #[error("no usable upstream nameserver")]
    NoUpstream,

    /// Every attempt ran out of time
    #[error("upstream did not answer within {0} attempts")]
    Exhausted(usize),
}

/// Relays queries to an upstream resolver over UDP.
///
/// One policy for every caller: each attempt waits `timeout` for a reply and
/// after `attempts` sends the query fails. The timer belongs to the attempt,
/// an abandoned attempt cannot keep retrying in the background.
#[derive(Clone, Debug)]
pub struct Forwarder {
    name_servers: Vec<String>,
    timeout: Duration,
    attempts: usize,
}

impl Forwarder {
    /// A forwarder targeting `name_servers`, tried in order.
    pub fn new(name_servers: Vec<String>, timeout: Duration, attempts: usize) -> Self {
        Self {
            name_servers,
            timeout,
            attempts: attempts.max(1),
        }
    }

    /// A forwarder from the `[forward]` section of the configuration.
    pub fn from_config(config: &ForwardConfig) -> Self {
        Self::new(
            config.name_servers().to_vec(),
            config.timeout(),
            config.attempts(),
        )
    }

    /// Sends `query` upstream and returns the first reply whose id matches.
    pub async fn forward(&self, query: &Message) -> Result<Message, ForwardError> {
        let upstream = self.resolve_upstream().await?;
        let bytes = query.to_bytes()?;

        let bind_addr: SocketAddr = if upstream.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(upstream).await?;

        let mut buf = [0u8; 4096];
        for attempt in 1..=self.attempts {
            socket.send(&bytes).await?;
            // stale datagrams with a foreign id are drained within the same
            // deadline, they do not consume the attempt
            let deadline = Instant::now() + self.timeout;
            loop {
                match timeout_at(deadline, socket.recv(&mut buf)).await {
                    Err(_elapsed) => {
                        debug!("upstream {upstream} did not answer (attempt {attempt})");
                        break;
                    }
                    Ok(received) => {
                        let len = received?;
                        let reply = Message::from_bytes(&buf[..len])?;
                        if reply.id() != query.id() {
                            warn!(
                                "ignoring upstream reply id {} that does not match query id {}",
                                reply.id(),
                                query.id()
                            );
                            continue;
                        }
                        return Ok(reply);
                    }
                }
            }
        }

        Err(ForwardError::Exhausted(self.attempts))
    }

    /// The first configured upstream that resolves to a socket address.
    /// Entries may be bare IPs, `ip:port`, hostnames, or `host:port`.
    async fn resolve_upstream(&self) -> Result<SocketAddr, ForwardError> {
        for server in &self.name_servers {
            if let Ok(addr) = server.parse::<SocketAddr>() {
                return Ok(addr);
            }
            if let Ok(ip) = server.parse::<IpAddr>() {
                return Ok(SocketAddr::new(ip, DEFAULT_DNS_PORT));
            }

            let (host, port) = match server
                .rsplit_once(':')
                .and_then(|(host, port)| Some((host, port.parse::<u16>().ok()?)))
            {
                Some((host, port)) => (host, port),
                None => (server.as_str(), DEFAULT_DNS_PORT),
            };

            match lookup_host((host, port)).await {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.next() {
                        return Ok(addr);
                    }
                    warn!("upstream nameserver {server} resolved to no addresses");
                }
                Err(e) => warn!("failed to resolve upstream nameserver {server}: {e}"),
            }
        }

        Err(ForwardError::NoUpstream)
    }
}
