//! Shared application state and startup wiring.

use std::sync::Arc;

use geogate_cache_memory::MemoryKvCache;
use geogate_courier::carriers::{AcsCarrier, CyprusPostCarrier, DhlCarrier, ManualCarrier};
use geogate_courier::{build_http_client, Carrier, CourierError, CourierTracker};
use geogate_crypto::{KeyError, TokenCodec, TokenKey};
use geogate_events::EventBus;
use geogate_events_memory::MemoryEventBus;
use geogate_storage::{Store, StoreError};
use geogate_store_sqlite::SqliteStore;
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::sync::watch;

use crate::clock::SystemClock;
use crate::config::{CourierConfig, ServerConfig};
use crate::invitations::{InvitationService, ServiceDeps};
use crate::ip_intel::create_ip_intelligence;
use crate::sms::{create_provider, SmsError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open database: {0}")]
    Store(#[from] StoreError),
    #[error("invalid token key: {0}")]
    TokenKey(#[from] KeyError),
    #[error("courier setup failed: {0}")]
    Courier(#[from] CourierError),
    #[error("SMS setup failed: {0}")]
    Sms(#[from] SmsError),
    #[error("IP intelligence setup failed: {0}")]
    IpIntel(#[from] reqwest::Error),
}

pub struct AppState {
    pub config: ServerConfig,
    pub service: Arc<InvitationService>,
    pub events: Arc<dyn EventBus>,
    pub readiness: watch::Receiver<bool>,
    /// `None` when no recorder is installed (tests).
    pub metrics: Option<PrometheusHandle>,
}

/// Carriers with a configured endpoint, plus manual delivery.
pub fn build_carriers(config: &CourierConfig) -> Result<Vec<Arc<dyn Carrier>>, CourierError> {
    let http = build_http_client(config.timeout)?;
    let mut carriers: Vec<Arc<dyn Carrier>> = Vec::new();
    if let Some(url) = &config.acs_url {
        carriers.push(Arc::new(AcsCarrier::new(
            http.clone(),
            url.clone(),
            config.acs_api_key.clone(),
        )));
    }
    if let Some(url) = &config.cyprus_post_url {
        carriers.push(Arc::new(CyprusPostCarrier::new(http.clone(), url.clone())));
    }
    if let Some(url) = &config.dhl_url {
        carriers.push(Arc::new(DhlCarrier::new(
            http,
            url.clone(),
            config.dhl_api_key.clone(),
        )));
    }
    carriers.push(Arc::new(ManualCarrier::new()));
    Ok(carriers)
}

pub fn load_token_key(config: &ServerConfig) -> Result<TokenKey, KeyError> {
    match &config.token_key {
        Some(hex) => TokenKey::from_hex(hex),
        None => {
            tracing::warn!(
                "GEOGATE_TOKEN_KEY not set, using an ephemeral key; \
                 issued tokens will not survive a restart"
            );
            Ok(TokenKey::generate())
        }
    }
}

impl AppState {
    /// Wire the production collaborators: SQLite store, in-process cache
    /// and event bus, configured carriers, SMS provider and IP intelligence.
    pub async fn build(
        config: ServerConfig,
        database_url: &str,
        readiness: watch::Receiver<bool>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, StartupError> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(database_url).await?);
        let events: Arc<dyn EventBus> = Arc::new(MemoryEventBus::new());
        let key = load_token_key(&config)?;
        let carriers = build_carriers(&config.courier)?;
        tracing::info!(
            carriers = ?carriers.iter().map(|c| c.kind().as_str()).collect::<Vec<_>>(),
            "couriers configured"
        );

        let deps = ServiceDeps {
            store,
            cache: Arc::new(MemoryKvCache::new()),
            events: events.clone(),
            tokens: Arc::new(TokenCodec::new(&key, config.public_host.clone())),
            courier: CourierTracker::new(carriers, config.courier.timeout),
            sms: create_provider(&config.sms)?,
            ip_intel: create_ip_intelligence(&config.ip_intel, config.courier.timeout)?,
            clock: Arc::new(SystemClock),
        };
        let service = Arc::new(InvitationService::new(deps, &config));

        Ok(Self {
            config,
            service,
            events,
            readiness,
            metrics,
        })
    }
}
