use chrono::{DateTime, Utc};
use geogate_storage::DeviceFingerprint;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Device signals reported by the activation page.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: String,
    #[serde(default)]
    pub screen_resolution: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub canvas_hash: Option<String>,
    #[serde(default)]
    pub webgl_hash: Option<String>,
    #[serde(default)]
    pub audio_hash: Option<String>,
}

const AUTOMATION_SIGNATURES: &[&str] = &[
    "headlesschrome",
    "phantomjs",
    "selenium",
    "webdriver",
    "puppeteer",
    "playwright",
    "slimerjs",
    "curl/",
    "wget/",
    "python-requests",
    "go-http-client",
];

/// Headless browsers, automation drivers and plain HTTP clients.
pub fn is_suspicious_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.trim().to_lowercase();
    ua.is_empty() || AUTOMATION_SIGNATURES.iter().any(|sig| ua.contains(sig))
}

impl DeviceInfo {
    /// What a plain page load tells us: the `User-Agent` header and nothing else.
    pub fn from_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Default::default()
        }
    }

    pub fn is_user_agent_only(&self) -> bool {
        [
            &self.screen_resolution,
            &self.timezone,
            &self.language,
            &self.platform,
            &self.canvas_hash,
            &self.webgl_hash,
            &self.audio_hash,
        ]
        .iter()
        .all(|v| v.is_none())
    }

    /// Same device as `known`. A user-agent-only report can only be compared
    /// by user agent.
    pub fn matches(&self, known: &DeviceFingerprint) -> bool {
        if self.is_user_agent_only() {
            self.user_agent == known.user_agent
        } else {
            self.fingerprint_hash() == known.hash
        }
    }

    /// Hex SHA-256 over the signals that are present. Each field is labelled
    /// so a missing field never collides with an empty one.
    pub fn fingerprint_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"ua=");
        hasher.update(self.user_agent.as_bytes());
        let optional = [
            ("screen", &self.screen_resolution),
            ("tz", &self.timezone),
            ("lang", &self.language),
            ("platform", &self.platform),
            ("canvas", &self.canvas_hash),
            ("webgl", &self.webgl_hash),
            ("audio", &self.audio_hash),
        ];
        for (label, value) in optional {
            if let Some(value) = value {
                hasher.update(b"|");
                hasher.update(label.as_bytes());
                hasher.update(b"=");
                hasher.update(value.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    pub fn to_fingerprint(&self, seen_at: DateTime<Utc>) -> DeviceFingerprint {
        DeviceFingerprint {
            hash: self.fingerprint_hash(),
            user_agent: self.user_agent.clone(),
            screen_resolution: self.screen_resolution.clone(),
            timezone: self.timezone.clone(),
            language: self.language.clone(),
            platform: self.platform.clone(),
            canvas_hash: self.canvas_hash.clone(),
            webgl_hash: self.webgl_hash.clone(),
            audio_hash: self.audio_hash.clone(),
            first_seen_at: seen_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iphone() -> DeviceInfo {
        DeviceInfo {
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X)".into(),
            screen_resolution: Some("1179x2556".into()),
            timezone: Some("Asia/Nicosia".into()),
            language: Some("el-CY".into()),
            ..Default::default()
        }
    }

    #[test]
    fn hash_is_stable_and_hex() {
        let a = iphone().fingerprint_hash();
        assert_eq!(a, iphone().fingerprint_hash());
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn any_signal_changes_hash() {
        let base = iphone().fingerprint_hash();
        let mut other = iphone();
        other.timezone = Some("Europe/Athens".into());
        assert_ne!(base, other.fingerprint_hash());

        let mut moved = iphone();
        moved.timezone = None;
        moved.language = Some("el-CYAsia/Nicosia".into());
        assert_ne!(base, moved.fingerprint_hash());
    }

    #[test]
    fn automation_user_agents() {
        assert!(is_suspicious_user_agent(
            "Mozilla/5.0 (X11; Linux x86_64) HeadlessChrome/120.0"
        ));
        assert!(is_suspicious_user_agent("curl/8.5.0"));
        assert!(is_suspicious_user_agent("  "));
        assert!(!is_suspicious_user_agent(&iphone().user_agent));
    }

    #[test]
    fn user_agent_only_reports_compare_by_user_agent() {
        let now = chrono::Utc::now();
        let known = iphone().to_fingerprint(now);
        assert!(iphone().matches(&known));

        let page_load = DeviceInfo::from_user_agent(iphone().user_agent);
        assert!(page_load.is_user_agent_only());
        assert!(page_load.matches(&known));
        assert!(!DeviceInfo::from_user_agent("Mozilla/5.0 (Linux; Android 14)").matches(&known));

        let mut other = iphone();
        other.language = Some("en-GB".into());
        assert!(!other.matches(&known));
    }
}
