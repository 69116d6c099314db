use std::str::FromStr;

use chrono::{DateTime, Utc};
use geogate_storage::{
    CampaignKind, CourierEvent, CourierEventId, DeviceFingerprint, FiredCampaign, Invitation,
    InvitationCounter, InvitationFilter, InvitationId, InvitationStatus, LocationAttempt,
    LocationAttemptId, NewCourierEvent, NewInvitation, NewLocationAttempt, Store, StoreError,
    Transition,
};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    /// Open (creating if missing) and migrate.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let url = if url.starts_with("sqlite:") && !url.contains(":memory:") && !url.contains('?')
        {
            format!("{url}?mode=rwc")
        } else {
            url.to_string()
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(backend)?;

        MIGRATOR.run(&pool).await.map_err(backend)?;

        Ok(Self { pool })
    }

    async fn fetch_invitation(&self, column: &str, value: &str) -> Result<Invitation, StoreError> {
        let sql = format!("SELECT * FROM invitations WHERE {column}=?");
        let row = sqlx::query_as::<_, InvitationRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        self.hydrate(row).await
    }

    async fn hydrate(&self, row: InvitationRow) -> Result<Invitation, StoreError> {
        let mut inv = row.into_invitation()?;
        inv.failed_location_attempts = self
            .list_location_attempts(&inv.id)
            .await?
            .into_iter()
            .filter(|a| !a.success)
            .collect();
        inv.device_fingerprints = self.list_device_fingerprints(&inv.id).await?;
        Ok(inv)
    }
}

fn backend<E: ToString>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn unique_or_backend(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::AlreadyExists
    } else {
        StoreError::Backend(s)
    }
}

fn ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_ms(v: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(v)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {v}")))
}

fn opt_from_ms(v: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    v.map(from_ms).transpose()
}

fn to_json<T: Serialize>(v: &T) -> Result<String, StoreError> {
    serde_json::to_string(v).map_err(backend)
}

fn from_json<T: DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_str(s).map_err(backend)
}

fn parse<T>(s: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: ToString,
{
    s.parse().map_err(backend)
}

fn uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(backend)
}

fn timestamp_column(status: InvitationStatus) -> Option<&'static str> {
    match status {
        InvitationStatus::Created => None,
        InvitationStatus::Sent => Some("sent_at"),
        InvitationStatus::Delivered => Some("delivered_at"),
        InvitationStatus::Activated => Some("activated_at"),
        InvitationStatus::Trial => None,
        InvitationStatus::Converted => Some("converted_at"),
        InvitationStatus::Expired => Some("expired_at"),
    }
}

fn counter_column(counter: InvitationCounter) -> &'static str {
    match counter {
        InvitationCounter::DeliveryAttempts => "delivery_attempts",
        InvitationCounter::ActivationAttempts => "activation_attempts",
        InvitationCounter::PageViews => "page_views",
    }
}

#[derive(sqlx::FromRow)]
struct InvitationRow {
    id: String,
    number: String,
    business_type: String,
    tier: String,
    status: String,
    recipient: String,
    geofence: String,
    config: String,
    carrier: Option<String>,
    tracking_number: Option<String>,
    created_at: i64,
    sent_at: Option<i64>,
    delivered_at: Option<i64>,
    activated_at: Option<i64>,
    trial_ends_at: Option<i64>,
    converted_at: Option<i64>,
    expired_at: Option<i64>,
    expires_at: i64,
    delivery_attempts: i64,
    activation_attempts: i64,
    page_views: i64,
    flagged_for_review: bool,
    review_cleared_at: Option<i64>,
    conversion: Option<String>,
}

impl InvitationRow {
    fn into_invitation(self) -> Result<Invitation, StoreError> {
        Ok(Invitation {
            id: InvitationId(uuid(&self.id)?),
            number: self.number,
            business_type: parse(&self.business_type)?,
            tier: parse(&self.tier)?,
            status: parse(&self.status)?,
            recipient: from_json(&self.recipient)?,
            geofence: from_json(&self.geofence)?,
            config: from_json(&self.config)?,
            carrier: self.carrier.as_deref().map(parse).transpose()?,
            tracking_number: self.tracking_number,
            created_at: from_ms(self.created_at)?,
            sent_at: opt_from_ms(self.sent_at)?,
            delivered_at: opt_from_ms(self.delivered_at)?,
            activated_at: opt_from_ms(self.activated_at)?,
            trial_ends_at: opt_from_ms(self.trial_ends_at)?,
            converted_at: opt_from_ms(self.converted_at)?,
            expired_at: opt_from_ms(self.expired_at)?,
            expires_at: from_ms(self.expires_at)?,
            delivery_attempts: self.delivery_attempts,
            activation_attempts: self.activation_attempts,
            page_views: self.page_views,
            flagged_for_review: self.flagged_for_review,
            review_cleared_at: opt_from_ms(self.review_cleared_at)?,
            conversion: self.conversion.as_deref().map(from_json).transpose()?,
            failed_location_attempts: Vec::new(),
            device_fingerprints: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct LocationAttemptRow {
    id: String,
    invitation_id: String,
    latitude: f64,
    longitude: f64,
    accuracy_m: Option<f64>,
    altitude_m: Option<f64>,
    heading_deg: Option<f64>,
    speed_mps: Option<f64>,
    client_timestamp: i64,
    received_at: i64,
    distance_m: f64,
    matched_zone: Option<String>,
    method: String,
    success: bool,
    confidence: f64,
    indicators: String,
    client_ip: Option<String>,
    fingerprint_hash: Option<String>,
}

impl LocationAttemptRow {
    fn into_attempt(self) -> Result<LocationAttempt, StoreError> {
        Ok(LocationAttempt {
            id: LocationAttemptId(uuid(&self.id)?),
            invitation_id: InvitationId(uuid(&self.invitation_id)?),
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy_m: self.accuracy_m,
            altitude_m: self.altitude_m,
            heading_deg: self.heading_deg,
            speed_mps: self.speed_mps,
            client_timestamp: from_ms(self.client_timestamp)?,
            received_at: from_ms(self.received_at)?,
            distance_m: self.distance_m,
            matched_zone: self.matched_zone,
            method: parse(&self.method)?,
            success: self.success,
            confidence: self.confidence,
            indicators: from_json(&self.indicators)?,
            client_ip: self.client_ip,
            fingerprint_hash: self.fingerprint_hash,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CourierEventRow {
    id: String,
    invitation_id: String,
    tracking_number: String,
    carrier: String,
    event_type: String,
    occurred_at: i64,
    description: String,
    location: Option<String>,
    signature: Option<String>,
    recorded_at: i64,
}

impl CourierEventRow {
    fn into_event(self) -> Result<CourierEvent, StoreError> {
        Ok(CourierEvent {
            id: CourierEventId(uuid(&self.id)?),
            invitation_id: InvitationId(uuid(&self.invitation_id)?),
            tracking_number: self.tracking_number,
            carrier: parse(&self.carrier)?,
            event_type: parse(&self.event_type)?,
            occurred_at: from_ms(self.occurred_at)?,
            description: self.description,
            location: self.location,
            signature: self.signature.as_deref().map(from_json).transpose()?,
            recorded_at: from_ms(self.recorded_at)?,
        })
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Numbering ──────────────────────────────

    async fn next_invitation_sequence(&self, prefix: &str) -> Result<u64, StoreError> {
        let (value,): (i64,) = sqlx::query_as(
            "INSERT INTO invitation_sequences(prefix,value) VALUES(?,1)
             ON CONFLICT(prefix) DO UPDATE SET value=value+1
             RETURNING value",
        )
        .bind(prefix)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        u64::try_from(value).map_err(backend)
    }

    // ──────────────────────────── Invitations ─────────────────────────────

    async fn create_invitation(&self, p: &NewInvitation) -> Result<Invitation, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO invitations(id,number,business_type,tier,status,recipient,geofence,config,
                                     created_at,expires_at)
             VALUES(?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&p.number)
        .bind(p.business_type.as_str())
        .bind(p.tier.as_str())
        .bind(InvitationStatus::Created.as_str())
        .bind(to_json(&p.recipient)?)
        .bind(to_json(&p.geofence)?)
        .bind(to_json(&p.config)?)
        .bind(ms(p.created_at))
        .bind(ms(p.expires_at))
        .execute(&self.pool)
        .await
        .map_err(unique_or_backend)?;

        self.get_invitation(&InvitationId(id)).await
    }

    async fn get_invitation(&self, id: &InvitationId) -> Result<Invitation, StoreError> {
        self.fetch_invitation("id", &id.0.to_string()).await
    }

    async fn get_invitation_by_number(&self, number: &str) -> Result<Invitation, StoreError> {
        self.fetch_invitation("number", number).await
    }

    async fn get_invitation_by_tracking(
        &self,
        tracking_number: &str,
    ) -> Result<Invitation, StoreError> {
        self.fetch_invitation("tracking_number", tracking_number)
            .await
    }

    async fn list_invitations(
        &self,
        filter: &InvitationFilter,
    ) -> Result<Vec<Invitation>, StoreError> {
        let status = filter.status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, InvitationRow>(
            "SELECT * FROM invitations
              WHERE (? IS NULL OR status=?)
                AND (? = 0 OR flagged_for_review=1)
              ORDER BY created_at DESC, id DESC",
        )
        .bind(status)
        .bind(status)
        .bind(filter.flagged_only)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.hydrate(row).await?);
        }
        Ok(out)
    }

    async fn transition_invitation(
        &self,
        id: &InvitationId,
        expected: InvitationStatus,
        t: &Transition,
    ) -> Result<Invitation, StoreError> {
        if !expected.can_transition_to(t.to) {
            return Err(StoreError::Conflict);
        }

        // Each lifecycle timestamp is written at most once.
        let stamp = match timestamp_column(t.to) {
            Some(col) => format!(", {col}=COALESCE({col}, ?)"),
            None => String::new(),
        };
        let sql = format!(
            "UPDATE invitations
                SET status=?,
                    carrier=COALESCE(?, carrier),
                    tracking_number=COALESCE(?, tracking_number),
                    trial_ends_at=COALESCE(trial_ends_at, ?),
                    conversion=COALESCE(conversion, ?){stamp}
              WHERE id=? AND status=?"
        );

        let conversion = t.conversion.as_ref().map(to_json).transpose()?;
        let mut q = sqlx::query(&sql)
            .bind(t.to.as_str())
            .bind(t.carrier.map(|c| c.as_str()))
            .bind(t.tracking_number.as_deref())
            .bind(t.trial_ends_at.map(ms))
            .bind(conversion);
        if stamp.is_empty() {
            q = q.bind(id.0.to_string());
        } else {
            q = q.bind(ms(t.at)).bind(id.0.to_string());
        }
        let res = q
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(unique_or_backend)?;

        if res.rows_affected() == 0 {
            // Distinguish a lost race from a missing row.
            self.get_invitation(id).await?;
            return Err(StoreError::Conflict);
        }
        self.get_invitation(id).await
    }

    async fn increment_counter(
        &self,
        id: &InvitationId,
        counter: InvitationCounter,
    ) -> Result<i64, StoreError> {
        let col = counter_column(counter);
        let sql = format!("UPDATE invitations SET {col}={col}+1 WHERE id=? RETURNING {col}");
        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|(v,)| v).ok_or(StoreError::NotFound)
    }

    async fn set_review_flag(
        &self,
        id: &InvitationId,
        flagged: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let res = if flagged {
            sqlx::query("UPDATE invitations SET flagged_for_review=1 WHERE id=?")
                .bind(id.0.to_string())
                .execute(&self.pool)
                .await
        } else {
            sqlx::query(
                "UPDATE invitations SET flagged_for_review=0, review_cleared_at=? WHERE id=?",
            )
            .bind(ms(at))
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await
        }
        .map_err(backend)?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ────────────────────────────── Location ──────────────────────────────

    async fn append_location_attempt(
        &self,
        a: &NewLocationAttempt,
    ) -> Result<LocationAttempt, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO location_attempts(id,invitation_id,latitude,longitude,accuracy_m,altitude_m,
                                           heading_deg,speed_mps,client_timestamp,received_at,
                                           distance_m,matched_zone,method,success,confidence,
                                           indicators,client_ip,fingerprint_hash)
             VALUES(?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(a.invitation_id.0.to_string())
        .bind(a.latitude)
        .bind(a.longitude)
        .bind(a.accuracy_m)
        .bind(a.altitude_m)
        .bind(a.heading_deg)
        .bind(a.speed_mps)
        .bind(ms(a.client_timestamp))
        .bind(ms(a.received_at))
        .bind(a.distance_m)
        .bind(a.matched_zone.as_deref())
        .bind(a.method.as_str())
        .bind(a.success)
        .bind(a.confidence)
        .bind(to_json(&a.indicators)?)
        .bind(a.client_ip.as_deref())
        .bind(a.fingerprint_hash.as_deref())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(LocationAttempt {
            id: LocationAttemptId(id),
            invitation_id: a.invitation_id.clone(),
            latitude: a.latitude,
            longitude: a.longitude,
            accuracy_m: a.accuracy_m,
            altitude_m: a.altitude_m,
            heading_deg: a.heading_deg,
            speed_mps: a.speed_mps,
            client_timestamp: a.client_timestamp,
            received_at: a.received_at,
            distance_m: a.distance_m,
            matched_zone: a.matched_zone.clone(),
            method: a.method,
            success: a.success,
            confidence: a.confidence,
            indicators: a.indicators,
            client_ip: a.client_ip.clone(),
            fingerprint_hash: a.fingerprint_hash.clone(),
        })
    }

    async fn list_location_attempts(
        &self,
        id: &InvitationId,
    ) -> Result<Vec<LocationAttempt>, StoreError> {
        let rows = sqlx::query_as::<_, LocationAttemptRow>(
            "SELECT * FROM location_attempts WHERE invitation_id=? ORDER BY received_at, id",
        )
        .bind(id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(LocationAttemptRow::into_attempt).collect()
    }

    async fn last_location_attempt(
        &self,
        id: &InvitationId,
    ) -> Result<Option<LocationAttempt>, StoreError> {
        let row = sqlx::query_as::<_, LocationAttemptRow>(
            "SELECT * FROM location_attempts WHERE invitation_id=?
              ORDER BY received_at DESC, id DESC LIMIT 1",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(LocationAttemptRow::into_attempt).transpose()
    }

    // ─────────────────────────────── Devices ──────────────────────────────

    async fn append_device_fingerprint(
        &self,
        id: &InvitationId,
        fp: &DeviceFingerprint,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "INSERT OR IGNORE INTO device_fingerprints(invitation_id,hash,data,first_seen_at)
             VALUES(?,?,?,?)",
        )
        .bind(id.0.to_string())
        .bind(&fp.hash)
        .bind(to_json(fp)?)
        .bind(ms(fp.first_seen_at))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(res.rows_affected() == 1)
    }

    async fn list_device_fingerprints(
        &self,
        id: &InvitationId,
    ) -> Result<Vec<DeviceFingerprint>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM device_fingerprints WHERE invitation_id=? ORDER BY rowid",
        )
        .bind(id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(|(data,)| from_json(data)).collect()
    }

    // ─────────────────────────────── Courier ──────────────────────────────

    async fn append_courier_event(&self, e: &NewCourierEvent) -> Result<bool, StoreError> {
        let signature = e.signature.as_ref().map(to_json).transpose()?;
        let res = sqlx::query(
            "INSERT OR IGNORE INTO courier_events(id,invitation_id,tracking_number,carrier,event_type,
                                                  occurred_at,description,location,signature,
                                                  recorded_at)
             VALUES(?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(e.invitation_id.0.to_string())
        .bind(&e.tracking_number)
        .bind(e.carrier.as_str())
        .bind(e.event_type.as_str())
        .bind(ms(e.occurred_at))
        .bind(&e.description)
        .bind(e.location.as_deref())
        .bind(signature)
        .bind(ms(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(res.rows_affected() == 1)
    }

    async fn list_courier_events(
        &self,
        id: &InvitationId,
    ) -> Result<Vec<CourierEvent>, StoreError> {
        let rows = sqlx::query_as::<_, CourierEventRow>(
            "SELECT * FROM courier_events WHERE invitation_id=? ORDER BY occurred_at, id",
        )
        .bind(id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(CourierEventRow::into_event).collect()
    }

    // ────────────────────────────── Campaigns ─────────────────────────────

    async fn record_campaign(
        &self,
        id: &InvitationId,
        kind: CampaignKind,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "INSERT OR IGNORE INTO campaigns(invitation_id,kind,fired_at) VALUES(?,?,?)",
        )
        .bind(id.0.to_string())
        .bind(kind.as_str())
        .bind(ms(at))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(res.rows_affected() == 1)
    }

    async fn list_campaigns(&self, id: &InvitationId) -> Result<Vec<FiredCampaign>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT kind, fired_at FROM campaigns WHERE invitation_id=? ORDER BY fired_at, kind",
        )
        .bind(id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|(kind, fired_at)| {
                Ok(FiredCampaign {
                    invitation_id: id.clone(),
                    kind: parse(&kind)?,
                    fired_at: from_ms(fired_at)?,
                })
            })
            .collect()
    }
}
