//! Reference data loaded into the in-memory stores at startup.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use uuid::Uuid;

use super::memory::{InMemoryCatalog, InMemoryVoucherStore};
use crate::models::{Appliance, DisbursementTarget, Plan, Tenant, Voucher};

#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub plans: Vec<PlanSeed>,
    #[serde(default)]
    pub tenants: Vec<TenantSeed>,
    #[serde(default)]
    pub appliances: Vec<ApplianceSeed>,
    #[serde(default)]
    pub targets: Vec<TargetSeed>,
    #[serde(default)]
    pub vouchers: Vec<VoucherSeed>,
}

#[derive(Debug, Deserialize)]
pub struct PlanSeed {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub duration_hours: i32,
    pub speed_mbps: i32,
}

#[derive(Debug, Deserialize)]
pub struct TenantSeed {
    pub id: Uuid,
    pub name: String,
    pub share_percent: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct ApplianceSeed {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct TargetSeed {
    pub tenant_id: Uuid,
    pub appliance_id: Option<Uuid>,
    pub paybill: String,
    pub account_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct VoucherSeed {
    pub code: String,
    pub plan_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CatalogSeed {
    /// Reads a seed file; the format follows the extension, as for settings.
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?
            .try_deserialize()
    }

    pub async fn apply(&self, catalog: &InMemoryCatalog, vouchers: &InMemoryVoucherStore) {
        for seed in &self.plans {
            let mut plan = Plan::new(seed.name.clone(), seed.price, seed.duration_hours, seed.speed_mbps);
            plan.id = seed.id;
            catalog.insert_plan(plan).await;
        }

        for seed in &self.tenants {
            let mut tenant = Tenant::new(seed.name.clone());
            tenant.id = seed.id;
            tenant.share_percent = seed.share_percent;
            catalog.insert_tenant(tenant).await;
        }

        for seed in &self.appliances {
            let mut appliance = Appliance::new(
                seed.name.clone(),
                seed.base_url.clone(),
                seed.username.clone(),
                seed.password.expose_secret(),
            );
            appliance.id = seed.id;
            appliance.tenant_id = seed.tenant_id;
            catalog.insert_appliance(appliance).await;
        }

        for seed in &self.targets {
            let mut target = DisbursementTarget::new(seed.tenant_id, seed.paybill.clone(), seed.account_reference.clone());
            target.appliance_id = seed.appliance_id;
            catalog.insert_target(target).await;
        }

        for seed in &self.vouchers {
            let mut voucher = Voucher::new(seed.code.clone(), seed.plan_id);
            voucher.expires_at = seed.expires_at;
            vouchers.insert(voucher).await;
        }

        tracing::info!(
            plans = self.plans.len(),
            tenants = self.tenants.len(),
            appliances = self.appliances.len(),
            vouchers = self.vouchers.len(),
            "Seeded in-memory catalog"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{CatalogStore, VoucherStore};
    use config::{File, FileFormat};
    use rust_decimal_macros::dec;

    const SEED: &str = r#"
        [[plans]]
        id = "6f1c2a3e-8d4b-4c5a-9e7f-0a1b2c3d4e01"
        name = "1 Hour"
        price = "10"
        duration_hours = 1
        speed_mbps = 5

        [[tenants]]
        id = "6f1c2a3e-8d4b-4c5a-9e7f-0a1b2c3d4e10"
        name = "Demo Net"
        share_percent = "75"

        [[appliances]]
        id = "6f1c2a3e-8d4b-4c5a-9e7f-0a1b2c3d4e20"
        tenant_id = "6f1c2a3e-8d4b-4c5a-9e7f-0a1b2c3d4e10"
        name = "demo-core"
        base_url = "https://192.168.88.1"
        username = "api"
        password = "secret"

        [[targets]]
        tenant_id = "6f1c2a3e-8d4b-4c5a-9e7f-0a1b2c3d4e10"
        paybill = "888880"
        account_reference = "DEMO"

        [[vouchers]]
        code = "demo-1h"
        plan_id = "6f1c2a3e-8d4b-4c5a-9e7f-0a1b2c3d4e01"
    "#;

    fn parse(text: &str) -> CatalogSeed {
        config::Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[tokio::test]
    async fn test_seed_populates_catalog_and_vouchers() {
        let seed = parse(SEED);
        let catalog = InMemoryCatalog::new();
        let vouchers = InMemoryVoucherStore::new();
        seed.apply(&catalog, &vouchers).await;

        let plan_id = seed.plans[0].id;
        let plan = catalog.find_plan(plan_id).await.unwrap().unwrap();
        assert_eq!(plan.price, dec!(10));
        assert_eq!(catalog.active_plans().await.unwrap().len(), 1);

        let tenant = catalog.find_tenant(seed.tenants[0].id).await.unwrap().unwrap();
        assert_eq!(tenant.share_percent, Some(dec!(75)));
        let appliance = catalog.find_appliance(seed.appliances[0].id).await.unwrap().unwrap();
        assert_eq!(appliance.tenant_id, Some(tenant.id));
        assert_eq!(appliance.password, "secret");
        assert_eq!(catalog.disbursement_targets(tenant.id).await.unwrap().len(), 1);

        let voucher = vouchers.find("DEMO-1H").await.unwrap().unwrap();
        assert_eq!(voucher.plan_id, plan_id);
    }

    #[tokio::test]
    async fn test_shipped_catalog_sells_plans() {
        let seed = CatalogSeed::load("config/catalog").unwrap();
        let stores = crate::repositories::Stores::in_memory(&seed).await;

        let plans = stores.catalog.active_plans().await.unwrap();
        assert!(!plans.is_empty());
        assert!(stores.vouchers.find("DEMO-1H").await.unwrap().is_some());
    }

    #[test]
    fn test_empty_seed_is_valid() {
        let seed = parse("");
        assert!(seed.plans.is_empty());
        assert!(seed.vouchers.is_empty());
    }
}
