//! Client IP reputation.
//!
//! The location engine asks an [`IpIntelligence`] about the client address.
//! Lookups never fail: an unreachable provider yields a neutral assessment
//! and the static range lists still apply.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::IpIntelConfig;
use crate::location::Cidr;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IpAssessment {
    pub vpn: bool,
    pub proxy: bool,
    pub tor: bool,
    pub datacenter: bool,
    /// ISO 3166-1 alpha-2, when known.
    pub country: Option<String>,
}

impl IpAssessment {
    fn merge(mut self, other: IpAssessment) -> Self {
        self.vpn |= other.vpn;
        self.proxy |= other.proxy;
        self.tor |= other.tor;
        self.datacenter |= other.datacenter;
        self.country = self.country.or(other.country);
        self
    }
}

#[async_trait]
pub trait IpIntelligence: Send + Sync {
    async fn assess(&self, ip: IpAddr) -> IpAssessment;
}

/// Configured range lists, no network access.
#[derive(Clone, Debug, Default)]
pub struct StaticIpIntelligence {
    vpn: Vec<Cidr>,
    tor: Vec<Cidr>,
    datacenter: Vec<Cidr>,
}

impl StaticIpIntelligence {
    pub fn new(vpn: Vec<Cidr>, tor: Vec<Cidr>, datacenter: Vec<Cidr>) -> Self {
        Self {
            vpn,
            tor,
            datacenter,
        }
    }

    fn lookup(&self, ip: &IpAddr) -> IpAssessment {
        let hit = |ranges: &[Cidr]| ranges.iter().any(|r| r.contains(ip));
        IpAssessment {
            vpn: hit(&self.vpn),
            proxy: false,
            tor: hit(&self.tor),
            datacenter: hit(&self.datacenter),
            country: None,
        }
    }
}

#[async_trait]
impl IpIntelligence for StaticIpIntelligence {
    async fn assess(&self, ip: IpAddr) -> IpAssessment {
        self.lookup(&ip)
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    vpn: bool,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    tor: bool,
    #[serde(default, alias = "hosting")]
    datacenter: bool,
    #[serde(default, alias = "countryCode")]
    country_code: Option<String>,
}

/// Reputation service reached over HTTP at `GET {url}/{ip}`.
pub struct HttpIpIntelligence {
    client: Client,
    url: String,
    ranges: StaticIpIntelligence,
}

impl HttpIpIntelligence {
    pub fn new(client: Client, url: impl Into<String>, ranges: StaticIpIntelligence) -> Self {
        Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            ranges,
        }
    }

    async fn fetch(&self, ip: &IpAddr) -> Result<IpAssessment, reqwest::Error> {
        let body: LookupResponse = self
            .client
            .get(format!("{}/{}", self.url, ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(IpAssessment {
            vpn: body.vpn,
            proxy: body.proxy,
            tor: body.tor,
            datacenter: body.datacenter,
            country: body.country_code.map(|c| c.to_uppercase()),
        })
    }
}

#[async_trait]
impl IpIntelligence for HttpIpIntelligence {
    async fn assess(&self, ip: IpAddr) -> IpAssessment {
        let local = self.ranges.lookup(&ip);
        match self.fetch(&ip).await {
            Ok(remote) => remote.merge(local),
            Err(e) => {
                tracing::warn!(%ip, error = %e, "ip intelligence lookup failed, using neutral result");
                local
            }
        }
    }
}

/// Build the configured IP intelligence provider.
pub fn create_ip_intelligence(
    config: &IpIntelConfig,
    timeout: Duration,
) -> Result<Arc<dyn IpIntelligence>, reqwest::Error> {
    let ranges = StaticIpIntelligence::new(
        config.vpn_ranges.clone(),
        config.tor_ranges.clone(),
        config.datacenter_ranges.clone(),
    );
    match &config.url {
        Some(url) => {
            let client = Client::builder().timeout(timeout).build()?;
            Ok(Arc::new(HttpIpIntelligence::new(client, url.clone(), ranges)))
        }
        None => Ok(Arc::new(ranges)),
    }
}
