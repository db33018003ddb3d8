// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::RemoteStoreConfig;
use crate::error::StoreError;
use crate::proto::rr::{Name, RecordType};
use crate::store::{zone_key, RecordSet, Zone, ZoneStore};

/// Client for the hosted DNS provider's record-set API.
///
/// Authentication is a session cookie obtained from `POST /session/login`.
/// Any request answered with 401 triggers exactly one fresh login and one
/// retry of the original request; a second 401 surfaces as
/// [`StoreError::Unauthorized`].
pub struct RemoteStore {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
}

impl RemoteStore {
    /// Build a store client from its configuration.
    pub fn from_config(config: &RemoteStoreConfig) -> Result<Self, StoreError> {
        let username = config.username().unwrap_or_default();
        let password = config.password().unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            warn!("store credentials are not configured, logins will fail");
        }
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint().to_string(),
            username,
            password,
        })
    }

    async fn login(&self) -> Result<(), StoreError> {
        let url = format!("{}/session/login", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&LoginBody {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized);
        }
        check_status(response).await?;
        Ok(())
    }

    /// Send the request `build` produces, retrying it once behind a fresh
    /// login if the session has expired.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, StoreError> {
        let response = build().send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        debug!("store session expired, logging in again");
        self.login().await?;

        let response = build().send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized);
        }
        check_status(response).await
    }

    fn sets_url(&self, zone: &Zone) -> String {
        format!(
            "{}/zones/{}/recordsets",
            self.endpoint,
            zone_key(zone.name())
        )
    }

    fn set_url(&self, zone: &Zone, set: &RecordSet) -> String {
        format!("{}/{}/{}", self.sets_url(zone), set.name, set.rtype)
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(StoreError::Status {
        status: response.status().as_u16(),
        url: response.url().to_string(),
    })
}

#[async_trait]
impl ZoneStore for RemoteStore {
    async fn find_zone(&self, name: &Name) -> Result<Option<Zone>, StoreError> {
        let url = format!("{}/zones/{}/recordsets", self.endpoint, zone_key(name));
        match self.send(|| self.client.get(&url)).await {
            Ok(_) => Ok(Some(Zone::new(name.clone()))),
            Err(StoreError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn record_sets(&self, zone: &Zone) -> Result<Vec<RecordSet>, StoreError> {
        let url = self.sets_url(zone);
        let response = self.send(|| self.client.get(&url)).await?;
        let listing: RecordSetListing = response.json().await?;

        let mut sets = Vec::with_capacity(listing.results.len());
        for dto in listing.results {
            // tolerate record types this server does not manage
            let Ok(rtype) = dto.rtype.parse::<RecordType>() else {
                warn!(
                    "skipping record set {} with unsupported type {}",
                    dto.name, dto.rtype
                );
                continue;
            };
            sets.push(RecordSet {
                name: dto.name,
                rtype,
                ttl: dto.ttl,
                values: dto.records.into_iter().map(|r| r.value).collect(),
            });
        }
        Ok(sets)
    }

    async fn create_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError> {
        let url = self.set_url(zone, set);
        let body = RecordSetBody::new(set.ttl, &set.values);
        self.send(|| self.client.put(&url).json(&body)).await?;
        Ok(())
    }

    async fn replace_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError> {
        let url = self.set_url(zone, set);
        let body = RecordSetBody::new(set.ttl, values);
        self.send(|| self.client.post(&url).json(&body)).await?;
        Ok(())
    }

    async fn delete_record_set(&self, zone: &Zone, set: &RecordSet) -> Result<(), StoreError> {
        let url = self.set_url(zone, set);
        self.send(|| self.client.delete(&url)).await?;
        Ok(())
    }

    async fn delete_values(
        &self,
        zone: &Zone,
        set: &RecordSet,
        values: &[String],
    ) -> Result<(), StoreError> {
        // the provider has no partial delete, post the surviving values
        let remaining: Vec<String> = set
            .values
            .iter()
            .filter(|v| !values.contains(v))
            .cloned()
            .collect();
        self.replace_values(zone, set, &remaining).await
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct RecordSetListing {
    results: Vec<RecordSetDto>,
}

#[derive(Deserialize)]
struct RecordSetDto {
    name: String,
    #[serde(rename = "type")]
    rtype: String,
    ttl: u32,
    #[serde(default)]
    records: Vec<RecordDto>,
}

#[derive(Serialize, Deserialize)]
struct RecordDto {
    value: String,
}

#[derive(Serialize)]
struct RecordSetBody {
    ttl: u32,
    records: Vec<RecordDto>,
    filters: Vec<serde_json::Value>,
}

impl RecordSetBody {
    fn new(ttl: u32, values: &[String]) -> Self {
        Self {
            ttl,
            records: values
                .iter()
                .map(|value| RecordDto {
                    value: value.clone(),
                })
                .collect(),
            filters: Vec::new(),
        }
    }
}
