//! Server configuration.
//!
//! Everything is read from the environment once at startup:
//!
//! ```bash
//! # Core settings
//! GEOGATE_PUBLIC_HOST=invite.example.cy     # host used in activation URLs
//! GEOGATE_TOKEN_KEY=<64 hex chars>          # required when GEOGATE_PRODUCTION=true
//! GEOGATE_PRODUCTION=false                  # redact error details in responses
//! GEOGATE_DEFAULT_EXPIRATION_HOURS=168
//! GEOGATE_AUTO_START_TRIAL=true             # open the trial right after activation
//! GEOGATE_SERVICE_REGION=cyprus             # cyprus | none | min_lat,max_lat,min_lng,max_lng
//! GEOGATE_SWEEP_INTERVAL_SECS=0             # 0 disables the background expiry sweep
//! GEOGATE_TRUST_FORWARDED_FOR=false         # take the client IP from X-Forwarded-For
//!
//! # Location verification
//! GEOGATE_PERFECT_ACCURACY_M=1.0
//! GEOGATE_MAX_SCAN_SPEED_MPS=55
//! GEOGATE_MAX_CLOCK_DRIFT_SECS=300
//! GEOGATE_MAX_TRAVEL_SPEED_KMH=900
//! GEOGATE_RAPID_CHANGE_M=1000
//! GEOGATE_RAPID_CHANGE_WINDOW_SECS=60
//! GEOGATE_LOCKOUT_THRESHOLD=5
//!
//! # IP intelligence
//! GEOGATE_IP_INTEL_URL=https://ipintel.internal/lookup
//! GEOGATE_VPN_RANGES=203.0.113.0/24
//! GEOGATE_TOR_RANGES=
//! GEOGATE_DATACENTER_RANGES=
//!
//! # SMS verification
//! GEOGATE_SMS_PROVIDER=console              # console | webhook
//! GEOGATE_SMS_WEBHOOK_URL=https://sms.internal/send
//! GEOGATE_SMS_MAX_PER_HOUR=3
//! GEOGATE_SMS_CODE_TTL_SECS=600
//! GEOGATE_SMS_MAX_ATTEMPTS=5
//!
//! # Couriers (a carrier is enabled when its URL is set)
//! GEOGATE_COURIER_TIMEOUT_SECS=5
//! GEOGATE_ACS_URL=https://api.acscourier.net
//! GEOGATE_ACS_API_KEY=...
//! GEOGATE_CYPRUS_POST_URL=https://tracking.cypruspost.post
//! GEOGATE_DHL_URL=https://api-eu.dhl.com
//! GEOGATE_DHL_API_KEY=...
//!
//! # Trial urgency thresholds (days remaining)
//! GEOGATE_URGENCY_CRITICAL_DAYS=1
//! GEOGATE_URGENCY_HIGH_DAYS=3
//! GEOGATE_URGENCY_MEDIUM_DAYS=7
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use geogate_crypto::TokenKey;
use geogate_geo::BoundingBox;
use thiserror::Error;

use crate::campaigns::UrgencyThresholds;
use crate::location::Cidr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub public_host: String,
    /// Hex-encoded token key. `None` means an ephemeral key (development only).
    pub token_key: Option<String>,
    pub production: bool,
    pub default_expiration_hours: u32,
    pub auto_start_trial: bool,
    pub service_region: Option<BoundingBox>,
    pub sweep_interval: Option<Duration>,
    /// Behind a reverse proxy the peer address is the proxy's.
    pub trust_forwarded_for: bool,
    pub location: LocationConfig,
    pub ip_intel: IpIntelConfig,
    pub sms: SmsConfig,
    pub courier: CourierConfig,
    pub urgency: UrgencyThresholds,
}

/// Anti-spoofing thresholds.
#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub perfect_accuracy_m: f64,
    pub max_scan_speed_mps: f64,
    pub max_clock_drift: Duration,
    pub max_travel_speed_kmh: f64,
    pub rapid_change_m: f64,
    pub rapid_change_window: Duration,
    pub min_altitude_m: f64,
    pub max_altitude_m: f64,
    /// Consecutive failures before an invitation is flagged for review.
    pub lockout_threshold: u32,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            perfect_accuracy_m: 1.0,
            max_scan_speed_mps: 55.0,
            max_clock_drift: Duration::from_secs(300),
            max_travel_speed_kmh: 900.0,
            rapid_change_m: 1_000.0,
            rapid_change_window: Duration::from_secs(60),
            min_altitude_m: -450.0,
            max_altitude_m: 9_000.0,
            lockout_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IpIntelConfig {
    pub url: Option<String>,
    pub vpn_ranges: Vec<Cidr>,
    pub tor_ranges: Vec<Cidr>,
    pub datacenter_ranges: Vec<Cidr>,
}

#[derive(Debug, Clone)]
pub enum SmsProviderConfig {
    Console,
    Webhook { url: String },
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub provider: SmsProviderConfig,
    pub max_per_hour: u32,
    pub code_ttl: Duration,
    pub max_attempts: u32,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            provider: SmsProviderConfig::Console,
            max_per_hour: 3,
            code_ttl: Duration::from_secs(600),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CourierConfig {
    pub timeout: Duration,
    pub acs_url: Option<String>,
    pub acs_api_key: Option<String>,
    pub cyprus_post_url: Option<String>,
    pub dhl_url: Option<String>,
    pub dhl_api_key: Option<String>,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            timeout: geogate_courier::DEFAULT_COURIER_TIMEOUT,
            acs_url: None,
            acs_api_key: None,
            cyprus_post_url: None,
            dhl_url: None,
            dhl_api_key: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_host: "localhost:8080".to_string(),
            token_key: None,
            production: false,
            default_expiration_hours: 168,
            auto_start_trial: true,
            service_region: Some(BoundingBox::CYPRUS),
            sweep_interval: None,
            trust_forwarded_for: false,
            location: LocationConfig::default(),
            ip_intel: IpIntelConfig::default(),
            sms: SmsConfig::default(),
            courier: CourierConfig::default(),
            urgency: UrgencyThresholds::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("GEOGATE_TOKEN_KEY must be 32 bytes of hex")]
    InvalidTokenKey,

    #[error("Invalid SMS provider: {0}. Expected 'console' or 'webhook'")]
    InvalidSmsProvider(String),

    #[error("Urgency thresholds must satisfy critical <= high <= medium")]
    UrgencyOrder,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: key.to_string(),
            value: raw,
        }),
    }
}

fn bool_var(key: &str, default: bool) -> bool {
    var(key)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(default)
}

fn secs_var(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    parse_var(key, default.as_secs()).map(Duration::from_secs)
}

fn cidr_list(key: &str) -> Result<Vec<Cidr>, ConfigError> {
    let Some(raw) = var(key) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::InvalidValue {
                var: key.to_string(),
                value: s.to_string(),
            })
        })
        .collect()
}

fn service_region(raw: Option<String>) -> Result<Option<BoundingBox>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Some(BoundingBox::CYPRUS));
    };
    let invalid = || ConfigError::InvalidValue {
        var: "GEOGATE_SERVICE_REGION".to_string(),
        value: raw.clone(),
    };
    match raw.to_lowercase().as_str() {
        "cyprus" => Ok(Some(BoundingBox::CYPRUS)),
        "none" => Ok(None),
        _ => {
            let parts = raw
                .split(',')
                .map(|p| p.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid())?;
            match parts.as_slice() {
                [min_lat, max_lat, min_lng, max_lng] if min_lat <= max_lat && min_lng <= max_lng => {
                    Ok(Some(BoundingBox {
                        min_lat: *min_lat,
                        max_lat: *max_lat,
                        min_lng: *min_lng,
                        max_lng: *max_lng,
                    }))
                }
                _ => Err(invalid()),
            }
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let production = bool_var("GEOGATE_PRODUCTION", false);

        let token_key = var("GEOGATE_TOKEN_KEY");
        match &token_key {
            Some(hex) => {
                TokenKey::from_hex(hex).map_err(|_| ConfigError::InvalidTokenKey)?;
            }
            None if production => {
                return Err(ConfigError::MissingEnvVar("GEOGATE_TOKEN_KEY".to_string()))
            }
            None => {}
        }

        let location_defaults = LocationConfig::default();
        let location = LocationConfig {
            perfect_accuracy_m: parse_var(
                "GEOGATE_PERFECT_ACCURACY_M",
                location_defaults.perfect_accuracy_m,
            )?,
            max_scan_speed_mps: parse_var(
                "GEOGATE_MAX_SCAN_SPEED_MPS",
                location_defaults.max_scan_speed_mps,
            )?,
            max_clock_drift: secs_var(
                "GEOGATE_MAX_CLOCK_DRIFT_SECS",
                location_defaults.max_clock_drift,
            )?,
            max_travel_speed_kmh: parse_var(
                "GEOGATE_MAX_TRAVEL_SPEED_KMH",
                location_defaults.max_travel_speed_kmh,
            )?,
            rapid_change_m: parse_var("GEOGATE_RAPID_CHANGE_M", location_defaults.rapid_change_m)?,
            rapid_change_window: secs_var(
                "GEOGATE_RAPID_CHANGE_WINDOW_SECS",
                location_defaults.rapid_change_window,
            )?,
            lockout_threshold: parse_var(
                "GEOGATE_LOCKOUT_THRESHOLD",
                location_defaults.lockout_threshold,
            )?,
            ..location_defaults
        };

        let sms_defaults = SmsConfig::default();
        let provider = match var("GEOGATE_SMS_PROVIDER") {
            None => SmsProviderConfig::Console,
            Some(p) => match p.to_lowercase().as_str() {
                "console" => SmsProviderConfig::Console,
                "webhook" => SmsProviderConfig::Webhook {
                    url: var("GEOGATE_SMS_WEBHOOK_URL").ok_or_else(|| {
                        ConfigError::MissingEnvVar("GEOGATE_SMS_WEBHOOK_URL".to_string())
                    })?,
                },
                other => return Err(ConfigError::InvalidSmsProvider(other.to_string())),
            },
        };
        let sms = SmsConfig {
            provider,
            max_per_hour: parse_var("GEOGATE_SMS_MAX_PER_HOUR", sms_defaults.max_per_hour)?,
            code_ttl: secs_var("GEOGATE_SMS_CODE_TTL_SECS", sms_defaults.code_ttl)?,
            max_attempts: parse_var("GEOGATE_SMS_MAX_ATTEMPTS", sms_defaults.max_attempts)?,
        };

        let courier = CourierConfig {
            timeout: secs_var(
                "GEOGATE_COURIER_TIMEOUT_SECS",
                geogate_courier::DEFAULT_COURIER_TIMEOUT,
            )?,
            acs_url: var("GEOGATE_ACS_URL"),
            acs_api_key: var("GEOGATE_ACS_API_KEY"),
            cyprus_post_url: var("GEOGATE_CYPRUS_POST_URL"),
            dhl_url: var("GEOGATE_DHL_URL"),
            dhl_api_key: var("GEOGATE_DHL_API_KEY"),
        };

        let urgency_defaults = UrgencyThresholds::default();
        let urgency = UrgencyThresholds {
            critical_days: parse_var(
                "GEOGATE_URGENCY_CRITICAL_DAYS",
                urgency_defaults.critical_days,
            )?,
            high_days: parse_var("GEOGATE_URGENCY_HIGH_DAYS", urgency_defaults.high_days)?,
            medium_days: parse_var("GEOGATE_URGENCY_MEDIUM_DAYS", urgency_defaults.medium_days)?,
        };
        if !(urgency.critical_days <= urgency.high_days && urgency.high_days <= urgency.medium_days)
        {
            return Err(ConfigError::UrgencyOrder);
        }

        let sweep_secs: u64 = parse_var("GEOGATE_SWEEP_INTERVAL_SECS", 0)?;

        Ok(Self {
            public_host: var("GEOGATE_PUBLIC_HOST").unwrap_or(defaults.public_host),
            token_key,
            production,
            default_expiration_hours: parse_var(
                "GEOGATE_DEFAULT_EXPIRATION_HOURS",
                defaults.default_expiration_hours,
            )?,
            auto_start_trial: bool_var("GEOGATE_AUTO_START_TRIAL", defaults.auto_start_trial),
            service_region: service_region(var("GEOGATE_SERVICE_REGION"))?,
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            trust_forwarded_for: bool_var("GEOGATE_TRUST_FORWARDED_FOR", false),
            location,
            ip_intel: IpIntelConfig {
                url: var("GEOGATE_IP_INTEL_URL"),
                vpn_ranges: cidr_list("GEOGATE_VPN_RANGES")?,
                tor_ranges: cidr_list("GEOGATE_TOR_RANGES")?,
                datacenter_ranges: cidr_list("GEOGATE_DATACENTER_RANGES")?,
            },
            sms,
            courier,
            urgency,
        })
    }
}
