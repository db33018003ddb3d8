// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Zone store backed by the hosted DNS provider's HTTP record-set API.

mod client;

pub use self::client::RemoteStore;

use serde::Deserialize;

/// Environment variable consulted when `username` is absent from the config.
pub const USERNAME_ENV: &str = "ZONEGATE_STORE_USERNAME";
/// Environment variable holding the store password.
pub const DEFAULT_PASSWORD_ENV: &str = "ZONEGATE_STORE_PASSWORD";

/// Connection settings for the hosted DNS provider.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteStoreConfig {
    /// Base URL of the provider API, e.g. `https://dns.example.net/api`
    endpoint: String,
    /// Account name; falls back to `ZONEGATE_STORE_USERNAME`
    username: Option<String>,
    /// Name of the environment variable holding the password
    password_env: Option<String>,
}

impl RemoteStoreConfig {
    /// The base URL of the provider API, without a trailing slash.
    pub fn endpoint(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    /// The account name, from the config or the environment.
    pub fn username(&self) -> Option<String> {
        self.username
            .clone()
            .or_else(|| std::env::var(USERNAME_ENV).ok())
    }

    /// The password, read from the configured environment variable.
    pub fn password(&self) -> Option<String> {
        let var = self.password_env.as_deref().unwrap_or(DEFAULT_PASSWORD_ENV);
        std::env::var(var).ok()
    }
}
