//! RouterOS v7 REST management client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{AppliancePool, ApplianceProvisioner, HotspotCredential};
use crate::error::{AppError, Result};
use crate::models::Appliance;

const HOTSPOT_USER_PATH: &str = "/rest/ip/hotspot/user";

#[derive(Debug, Deserialize)]
struct HotspotUser {
    #[serde(rename = ".id")]
    id: String,
}

/// An authenticated HTTP session with one appliance.
pub struct RouterOsConnection {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: SecretString,
}

impl RouterOsConnection {
    /// Builds the session and checks the credentials against the system identity endpoint.
    pub async fn connect(appliance: &Appliance, timeout: Duration, accept_invalid_certs: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| AppError::ProvisioningFailed(format!("failed to build HTTP client: {}", e)))?;

        let connection = Self {
            http,
            base_url: appliance.base_url.trim_end_matches('/').to_string(),
            username: appliance.username.clone(),
            password: SecretString::from(appliance.password.clone()),
        };

        let response = connection
            .http
            .get(format!("{}/rest/system/identity", connection.base_url))
            .basic_auth(&connection.username, Some(connection.password.expose_secret()))
            .send()
            .await
            .map_err(|e| AppError::ProvisioningFailed(format!("cannot reach {}: {}", appliance.name, e)))?;
        if !response.status().is_success() {
            return Err(AppError::ProvisioningFailed(format!(
                "{} rejected login with {}",
                appliance.name,
                response.status()
            )));
        }

        Ok(connection)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AppError::ProvisioningFailed(format!("{} returned {}: {}", action, status, body)))
        }
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<String>> {
        let response = self
            .request(reqwest::Method::GET, HOTSPOT_USER_PATH)
            .query(&[("name", username)])
            .send()
            .await
            .map_err(|e| AppError::ProvisioningFailed(format!("user lookup failed: {}", e)))?;
        let users: Vec<HotspotUser> = Self::check(response, "user lookup")
            .await?
            .json()
            .await
            .map_err(|e| AppError::ProvisioningFailed(format!("unreadable user list: {}", e)))?;

        Ok(users.into_iter().next().map(|u| u.id))
    }

    pub async fn add_user(&self, credential: &HotspotCredential) -> Result<String> {
        let mut body = json!({
            "name": credential.username,
            "password": credential.password,
            "profile": credential.profile,
        });
        if let Some(mac) = &credential.mac_address {
            body["mac-address"] = json!(mac);
        }

        let response = self
            .request(reqwest::Method::PUT, HOTSPOT_USER_PATH)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProvisioningFailed(format!("user create failed: {}", e)))?;
        let created: HotspotUser = Self::check(response, "user create")
            .await?
            .json()
            .await
            .map_err(|e| AppError::ProvisioningFailed(format!("unreadable create response: {}", e)))?;

        Ok(created.id)
    }

    pub async fn set_profile(&self, id: &str, profile: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::PATCH, &format!("{}/{}", HOTSPOT_USER_PATH, id))
            .json(&json!({ "profile": profile }))
            .send()
            .await
            .map_err(|e| AppError::ProvisioningFailed(format!("profile update failed: {}", e)))?;
        Self::check(response, "profile update").await?;
        Ok(())
    }

    pub async fn enable_user(&self, id: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, &format!("{}/enable", HOTSPOT_USER_PATH))
            .json(&json!({ ".id": id }))
            .send()
            .await
            .map_err(|e| AppError::ProvisioningFailed(format!("user enable failed: {}", e)))?;
        Self::check(response, "user enable").await?;
        Ok(())
    }
}

/// Provisions hotspot users through pooled RouterOS sessions.
pub struct RouterOsProvisioner {
    pool: AppliancePool,
}

impl RouterOsProvisioner {
    pub fn new(pool: AppliancePool) -> Self {
        Self { pool }
    }

    async fn provision_with(&self, connection: &RouterOsConnection, credential: &HotspotCredential) -> Result<()> {
        // Returning subjects already have a user; only the profile may have changed.
        let id = match connection.find_user(&credential.username).await? {
            Some(id) => {
                connection.set_profile(&id, &credential.profile).await?;
                id
            }
            None => connection.add_user(credential).await?,
        };
        connection.enable_user(&id).await
    }
}

#[async_trait]
impl ApplianceProvisioner for RouterOsProvisioner {
    async fn provision(&self, appliance: &Appliance, credential: &HotspotCredential) -> Result<()> {
        let connection = self.pool.get_or_connect(appliance).await?;

        match self.provision_with(&connection, credential).await {
            Ok(()) => {
                tracing::info!(
                    appliance = %appliance.name,
                    username = %credential.username,
                    profile = %credential.profile,
                    "Hotspot user provisioned"
                );
                Ok(())
            }
            Err(e) => {
                self.pool.evict(appliance.id).await;
                Err(e)
            }
        }
    }
}
