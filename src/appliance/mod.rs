pub mod pool;
pub mod routeros;

pub use pool::AppliancePool;
pub use routeros::{RouterOsConnection, RouterOsProvisioner};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Appliance, Plan, Subject};

/// Login a subject uses on the appliance's captive portal.
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotCredential {
    pub username: String,
    pub password: String,
    pub profile: String,
    pub mac_address: Option<String>,
}

impl HotspotCredential {
    pub fn for_subject(subject: &Subject, plan: &Plan) -> Self {
        Self {
            username: subject.username.clone(),
            password: subject.password.clone(),
            profile: plan.profile_name(),
            mac_address: looks_like_mac(&subject.handle).then(|| subject.handle.to_uppercase()),
        }
    }
}

fn looks_like_mac(handle: &str) -> bool {
    let parts: Vec<&str> = handle.split(':').collect();
    parts.len() == 6 && parts.iter().all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Creates and enables hotspot credentials on a network appliance.
#[async_trait]
pub trait ApplianceProvisioner: Send + Sync {
    async fn provision(&self, appliance: &Appliance, credential: &HotspotCredential) -> Result<()>;
}
