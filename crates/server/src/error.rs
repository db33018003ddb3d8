// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! All defined errors for zonegate

use std::{fmt, io};

use thiserror::Error;

/// The error kind for configuration errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    // foreign
    /// An error got returned from IO
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An error occurred while decoding toml data
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    /// A listen address could not be parsed
    #[error("invalid listen address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}

/// The error type for configuration errors
#[derive(Debug)]
pub struct ConfigError {
    kind: Box<ConfigErrorKind>,
}

impl ConfigError {
    /// Get the kind of the error
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}", self.kind))
    }
}

impl std::error::Error for ConfigError {}

impl<E> From<E> for ConfigError
where
    E: Into<ConfigErrorKind>,
{
    fn from(error: E) -> Self {
        Self {
            kind: Box::new(error.into()),
        }
    }
}

/// Errors surfaced by a [`ZoneStore`](crate::store::ZoneStore) implementation.
///
/// These are transport and provider failures, not protocol outcomes; the
/// update state machine maps them to SERVFAIL at the dispatch boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The HTTP transport failed before a response was produced
    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with an unexpected HTTP status
    #[error("store returned {status} for {url}")]
    Status {
        /// The HTTP status code of the response
        status: u16,
        /// The request URL the status was returned for
        url: String,
    },

    /// The provider rejected the configured credentials after a fresh login
    #[error("store rejected credentials")]
    Unauthorized,

    /// A name the store was asked to mutate is not hosted by it
    #[error("zone not hosted: {0}")]
    NotFound(String),
}
