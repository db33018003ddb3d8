// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Configuration module for the server binary, `zonegate`.

use std::{
    fs,
    net::{AddrParseError, IpAddr},
    path::Path,
    time::Duration,
};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::store::remote::RemoteStoreConfig;

static DEFAULT_PORT: u16 = 53;
static DEFAULT_FORWARD_TIMEOUT_MS: u64 = 500;
static DEFAULT_FORWARD_ATTEMPTS: usize = 3;

/// Server configuration, deserialized from a TOML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The list of IPv4/IPv6 addresses to listen on, wildcard when empty
    #[serde(default)]
    listen_addrs: Vec<String>,
    /// Port on which to listen (associated to all IPs)
    listen_port: Option<u16>,
    /// Default log level, overridable from the command line
    log_level: Option<String>,
    /// Upstream relay for queries that are not dynamic updates
    forward: ForwardConfig,
    /// The hosted DNS provider that owns the zone data
    store: RemoteStoreConfig,
}

impl Config {
    /// Read a [`Config`] from the file at `path`.
    pub fn read_config(path: &Path) -> Result<Self, ConfigError> {
        let toml = fs::read_to_string(path)?;
        Self::from_toml(&toml)
    }

    /// Load a [`Config`] from a TOML string.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml)?)
    }

    /// The addresses to listen on; the IPv4 wildcard when none are configured.
    pub fn listen_addrs(&self) -> Result<Vec<IpAddr>, AddrParseError> {
        if self.listen_addrs.is_empty() {
            return Ok(vec![IpAddr::from([0u8, 0, 0, 0])]);
        }
        self.listen_addrs.iter().map(|addr| addr.parse()).collect()
    }

    /// The UDP port to listen on.
    pub fn listen_port(&self) -> u16 {
        self.listen_port.unwrap_or(DEFAULT_PORT)
    }

    /// The configured default log level, if any.
    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    /// Upstream forwarding settings.
    pub fn forward(&self) -> &ForwardConfig {
        &self.forward
    }

    /// Record store settings.
    pub fn store(&self) -> &RemoteStoreConfig {
        &self.store
    }
}

/// Settings for relaying non-update queries upstream.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardConfig {
    /// Upstream resolvers, tried in order; IP or hostname, optional `:port`
    name_servers: Vec<String>,
    /// How long to wait for a single upstream reply, in milliseconds
    timeout_ms: Option<u64>,
    /// How many times to send before giving up
    attempts: Option<usize>,
}

impl ForwardConfig {
    /// The configured upstream resolvers.
    pub fn name_servers(&self) -> &[String] {
        &self.name_servers
    }

    /// Per-attempt reply timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_FORWARD_TIMEOUT_MS))
    }

    /// Send attempts before the query is failed.
    pub fn attempts(&self) -> usize {
        self.attempts.unwrap_or(DEFAULT_FORWARD_ATTEMPTS).max(1)
    }
}
