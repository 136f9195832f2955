use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A device or session that buys network access.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subject {
    pub id: Uuid,
    /// MAC address or session handle.
    pub handle: String,
    pub phone: Option<String>,
    pub active_until: Option<DateTime<Utc>>,
    pub appliance_id: Option<Uuid>,
    /// Last plan granted.
    pub plan_id: Option<Uuid>,
    /// Hotspot login provisioned on the appliance.
    pub username: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subject {
    pub fn new(handle: impl Into<String>) -> Self {
        let handle = normalize_handle(&handle.into());
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username_for(&handle),
            password: generate_password(),
            handle,
            phone: None,
            active_until: None,
            appliance_id: None,
            plan_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_appliance(mut self, appliance_id: Option<Uuid>) -> Self {
        self.appliance_id = appliance_id;
        self
    }

    pub fn with_phone(mut self, phone: Option<String>) -> Self {
        self.phone = phone;
        self
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.active_until.map(|until| until > now).unwrap_or(false)
    }
}

/// Next expiry for a grant of `duration`: extends from the later of the current expiry and now.
pub fn extended_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    duration: Duration,
) -> DateTime<Utc> {
    let base = match current {
        Some(until) if until > now => until,
        _ => now,
    };
    base + duration
}

/// Lowercased, trimmed handle. MAC separators are unified to colons.
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().to_lowercase().replace('-', ":")
}

fn username_for(handle: &str) -> String {
    let compact: String = handle.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("user_{}", compact)
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}
