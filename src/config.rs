use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub gateway: GatewaySettings,
    pub appliance: ApplianceSettings,
    pub activation: ActivationSettings,
    pub payout: PayoutSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

/// Where ledger, subject and voucher state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
    pub backend: StorageBackend,
    /// Plans, sites and vouchers loaded into the `memory` backend.
    #[serde(default)]
    pub seed_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

/// Push-payment processor credentials and endpoints.
#[derive(Debug, Deserialize)]
pub struct GatewaySettings {
    pub base_url: String,
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    /// Paybill that collects customer payments.
    pub short_code: String,
    pub passkey: SecretString,
    /// Public base URL the processor calls back on.
    pub callback_base_url: String,
    /// Paybill that funds B2B disbursements.
    pub disbursement_short_code: String,
    pub initiator: String,
    pub security_credential: SecretString,
    pub request_timeout_secs: u64,
    pub token_margin_secs: u64,
    /// Largest single push payment accepted.
    pub max_amount: Decimal,
}

impl GatewaySettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_margin(&self) -> Duration {
        Duration::from_secs(self.token_margin_secs)
    }

    /// True once consumer credentials have been supplied.
    pub fn is_configured(&self) -> bool {
        !self.consumer_key.expose_secret().is_empty() && !self.consumer_secret.expose_secret().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplianceSettings {
    pub request_timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl ApplianceSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationSettings {
    /// How long a transaction may stay pending before it is declared timed out.
    pub timeout_window_secs: u64,
    pub sweep_interval_secs: u64,
    pub provisioning_budget_secs: u64,
    pub payout_budget_secs: u64,
}

impl ActivationSettings {
    pub fn timeout_window(&self) -> Duration {
        Duration::from_secs(self.timeout_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn provisioning_budget(&self) -> Duration {
        Duration::from_secs(self.provisioning_budget_secs)
    }

    pub fn payout_budget(&self) -> Duration {
        Duration::from_secs(self.payout_budget_secs)
    }
}

impl Default for ActivationSettings {
    fn default() -> Self {
        Self {
            timeout_window_secs: 120,
            sweep_interval_secs: 30,
            provisioning_budget_secs: 10,
            payout_budget_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutSettings {
    /// Provider share used when a tenant has no explicit percentage.
    pub default_share_percent: Decimal,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
