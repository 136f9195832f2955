use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A provider operating one or more appliances.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// Percent of each payment paid out to the tenant. Falls back to the configured default.
    pub share_percent: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            share_percent: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_share_percent(mut self, pct: Decimal) -> Self {
        self.share_percent = Some(pct);
        self
    }
}

/// A network appliance reachable through its REST management interface.
#[derive(Clone, Serialize, Deserialize, FromRow)]
pub struct Appliance {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Appliance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Appliance")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl Appliance {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: None,
            name: name.into(),
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn owned_by(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

/// Paybill a tenant's share is disbursed to.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DisbursementTarget {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Set when the target only applies to one appliance.
    pub appliance_id: Option<Uuid>,
    pub paybill: String,
    pub account_reference: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl DisbursementTarget {
    pub fn new(tenant_id: Uuid, paybill: impl Into<String>, account_reference: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            appliance_id: None,
            paybill: paybill.into(),
            account_reference: account_reference.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn for_appliance(mut self, appliance_id: Uuid) -> Self {
        self.appliance_id = Some(appliance_id);
        self
    }
}

/// Picks the target for a payout: appliance-specific first, then tenant-wide.
pub fn select_target(
    targets: &[DisbursementTarget],
    appliance_id: Uuid,
) -> Option<&DisbursementTarget> {
    let active = || targets.iter().filter(|t| t.is_active);
    active()
        .filter(|t| t.appliance_id == Some(appliance_id))
        .min_by_key(|t| t.created_at)
        .or_else(|| active().filter(|t| t.appliance_id.is_none()).min_by_key(|t| t.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appliance_target_preferred() {
        let tenant = Uuid::new_v4();
        let appliance = Uuid::new_v4();
        let general = DisbursementTarget::new(tenant, "111111", "GENERAL");
        let specific = DisbursementTarget::new(tenant, "222222", "SITE").for_appliance(appliance);
        let other = DisbursementTarget::new(tenant, "333333", "OTHER").for_appliance(Uuid::new_v4());

        let targets = vec![general.clone(), specific.clone(), other];
        assert_eq!(select_target(&targets, appliance).map(|t| t.id), Some(specific.id));

        let targets = vec![general.clone()];
        assert_eq!(select_target(&targets, appliance).map(|t| t.id), Some(general.id));
    }

    #[test]
    fn test_inactive_and_foreign_targets_ignored() {
        let tenant = Uuid::new_v4();
        let appliance = Uuid::new_v4();
        let mut inactive = DisbursementTarget::new(tenant, "111111", "GENERAL");
        inactive.is_active = false;
        let foreign = DisbursementTarget::new(tenant, "333333", "OTHER").for_appliance(Uuid::new_v4());
        assert!(select_target(&[inactive, foreign], appliance).is_none());
    }

    #[test]
    fn test_appliance_debug_hides_password() {
        let appliance = Appliance::new("core", "https://10.0.0.1", "admin", "hunter2");
        assert!(!format!("{:?}", appliance).contains("hunter2"));
    }
}
