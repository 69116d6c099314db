//! Common test helpers for server flow tests.
//!
//! The harness wires an [`InvitationService`] to an in-memory SQLite store,
//! the memory cache and event bus, a manual clock, a recording SMS provider
//! and a scripted ACS carrier.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use geogate_cache_memory::MemoryKvCache;
use geogate_courier::carriers::ManualCarrier;
use geogate_courier::{
    Carrier, CourierError, CourierTracker, NormalizedCourierEvent, Shipment, ShipmentRequest,
    TrackingResult,
};
use geogate_crypto::{TokenCodec, TokenKey};
use geogate_events_memory::MemoryEventBus;
use geogate_storage::{ActivationPolicy, CarrierKind, CourierEventType};
use geogate_store_sqlite::SqliteStore;
use serde_json::json;
use tokio::sync::watch;

use crate::clock::ManualClock;
use crate::config::ServerConfig;
use crate::invitations::{
    ActivationOutcome, ActivationRequest, CreateInvitation, CreatedInvitation, DispatchRequest,
    InvitationService, ServiceDeps,
};
use crate::ip_intel::StaticIpIntelligence;
use crate::location::{DeviceInfo, LocationSample};
use crate::sms::RecordingSmsProvider;
use crate::state::AppState;

pub const HOTEL_LAT: f64 = 34.6786;
pub const HOTEL_LNG: f64 = 33.0413;

pub const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X)";

/// ACS stand-in: books `ACS` vouchers and answers tracking from a script.
#[derive(Default)]
pub struct ScriptedAcs {
    booked: Mutex<u32>,
    pub events: Mutex<Vec<NormalizedCourierEvent>>,
}

#[async_trait]
impl Carrier for ScriptedAcs {
    fn kind(&self) -> CarrierKind {
        CarrierKind::Acs
    }

    fn matches_tracking_number(&self, tracking_number: &str) -> bool {
        tracking_number.len() == 10 && tracking_number.chars().all(|c| c.is_ascii_digit())
    }

    async fn track(&self, tracking_number: &str) -> Result<TrackingResult, CourierError> {
        let events: Vec<_> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.tracking_number == tracking_number)
            .cloned()
            .collect();
        if events.is_empty() {
            return Err(CourierError::NotFound);
        }
        Ok(TrackingResult::found(
            CarrierKind::Acs,
            tracking_number,
            events,
            None,
        ))
    }

    async fn create_shipment(&self, _request: &ShipmentRequest) -> Result<Shipment, CourierError> {
        let mut booked = self.booked.lock().unwrap();
        *booked += 1;
        Ok(Shipment {
            carrier: CarrierKind::Acs,
            tracking_number: format!("{:010}", 7_000_000_000u64 + u64::from(*booked)),
            label_url: None,
            estimated_delivery: None,
        })
    }
}

pub struct Harness {
    pub service: Arc<InvitationService>,
    pub store: Arc<SqliteStore>,
    pub events: Arc<MemoryEventBus>,
    pub clock: Arc<ManualClock>,
    pub sms: Arc<RecordingSmsProvider>,
    pub acs: Arc<ScriptedAcs>,
    pub config: ServerConfig,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

/// Test helper: harness with default configuration.
pub async fn create_harness() -> Harness {
    create_harness_with(ServerConfig::default()).await
}

pub async fn create_harness_with(config: ServerConfig) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let events = Arc::new(MemoryEventBus::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let sms = Arc::new(RecordingSmsProvider::default());
    let acs = Arc::new(ScriptedAcs::default());
    let key = TokenKey::from_bytes(&[7u8; 32]);

    let carriers: Vec<Arc<dyn Carrier>> = vec![acs.clone(), Arc::new(ManualCarrier::new())];
    let deps = ServiceDeps {
        store: store.clone(),
        cache: Arc::new(MemoryKvCache::new()),
        events: events.clone(),
        tokens: Arc::new(TokenCodec::new(&key, config.public_host.clone())),
        courier: CourierTracker::new(carriers, Duration::from_secs(1)),
        sms: sms.clone(),
        ip_intel: Arc::new(StaticIpIntelligence::new(vec![], vec![], vec![])),
        clock: clock.clone(),
    };
    let service = Arc::new(InvitationService::new(deps, &config));

    Harness {
        service,
        store,
        events,
        clock,
        sms,
        acs,
        config,
    }
}

impl Harness {
    /// Application state for router tests; `ready` drives `/readyz`.
    pub fn app_state(&self, ready: bool) -> AppState {
        let (_tx, rx) = watch::channel(ready);
        AppState {
            config: self.config.clone(),
            service: self.service.clone(),
            events: self.events.clone(),
            readiness: rx,
            metrics: None,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.service.now()
    }

    pub async fn create(&self, request: CreateInvitation) -> CreatedInvitation {
        self.service.create(request).await.unwrap()
    }

    /// Create, dispatch through ACS and deliver. Returns the creation result
    /// (for the token) and the ACS voucher.
    pub async fn delivered(&self, request: CreateInvitation) -> (CreatedInvitation, String) {
        let created = self.create(request).await;
        let sent = self
            .service
            .dispatch(&created.invitation.number, DispatchRequest::default())
            .await
            .unwrap();
        let voucher = sent.tracking_number.clone().unwrap();
        self.service
            .record_courier_events(
                CarrierKind::Acs,
                vec![courier_event(&voucher, CourierEventType::Delivered, self.now())],
            )
            .await
            .unwrap();
        (created, voucher)
    }

    /// Activate at the hotel entrance with an iPhone.
    pub async fn activate_at_hotel(&self, token: &str) -> ActivationOutcome {
        self.service
            .activate(
                ActivationRequest {
                    token: token.to_string(),
                    location: Some(self.sample(HOTEL_LAT, HOTEL_LNG)),
                    device: None,
                    sms_code: None,
                },
                None,
            )
            .await
            .unwrap()
    }

    /// A fix taken now on the test iPhone.
    pub fn sample(&self, latitude: f64, longitude: f64) -> LocationSample {
        LocationSample {
            latitude,
            longitude,
            accuracy_m: Some(8.0),
            altitude_m: Some(12.0),
            heading_deg: None,
            speed_mps: None,
            timestamp: self.now(),
            wifi_networks: vec![],
            device: iphone(),
        }
    }
}

pub fn iphone() -> DeviceInfo {
    DeviceInfo {
        user_agent: IPHONE_UA.to_string(),
        screen_resolution: Some("1179x2556".into()),
        timezone: Some("Asia/Nicosia".into()),
        language: Some("el-CY".into()),
        ..Default::default()
    }
}

pub fn courier_event(
    tracking_number: &str,
    event_type: CourierEventType,
    at: DateTime<Utc>,
) -> NormalizedCourierEvent {
    NormalizedCourierEvent {
        tracking_number: tracking_number.to_string(),
        event_type,
        occurred_at: at,
        description: event_type.as_str().to_string(),
        location: Some("Limassol".into()),
        signature: None,
    }
}

/// Founder-tier hotel in Limassol, 100 m activation radius.
pub fn founder_hotel() -> CreateInvitation {
    serde_json::from_value(json!({
        "business_type": "hotel",
        "tier": "founder",
        "recipient": {
            "name": "Eleni Georgiou",
            "title": "General Manager",
            "organization": "Limassol Bay Hotel",
            "address": "28 Oktovriou 1, 3035 Limassol",
            "email": "eleni@limassolbay.example",
            "mobile": "+357 99 123456",
            "business_registration": "HE123456"
        },
        "location": {
            "primary": {
                "label": "main entrance",
                "latitude": HOTEL_LAT,
                "longitude": HOTEL_LNG,
                "radius_m": 100.0
            }
        }
    }))
    .unwrap()
}

pub fn with_sms(mut request: CreateInvitation) -> CreateInvitation {
    request.overrides.policy = Some(ActivationPolicy {
        sms_verification_required: true,
        ..ActivationPolicy::default()
    });
    request
}
