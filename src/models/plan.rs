use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A sellable access package.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub duration_hours: i32,
    /// Throughput tier in Mbps.
    pub speed_mbps: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(name: impl Into<String>, price: Decimal, duration_hours: i32, speed_mbps: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            duration_hours,
            speed_mbps,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::hours(i64::from(self.duration_hours))
    }

    /// Appliance user profile that carries this plan's rate limit.
    pub fn profile_name(&self) -> String {
        format!("profile_{}M", self.speed_mbps)
    }
}
