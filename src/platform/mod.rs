//! Hosting platform API: site details, add-on service instances, auth token

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::env::SessionEnvironment;
use crate::error::DevError;

pub const DEFAULT_API_URL: &str = "https://api.netlify.com/api/v1";
pub const API_URL_VAR: &str = "NETLIFY_API_URL";
pub const AUTH_TOKEN_VAR: &str = "NETLIFY_AUTH_TOKEN";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Site record as returned by the platform
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteDetails {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ssl_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub build_settings: BuildSettings,
}

impl SiteDetails {
    /// Public site URL, preferring https
    pub fn site_url(&self) -> Option<&str> {
        self.ssl_url.as_deref().or(self.url.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSettings {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// One add-on provisioned for a site
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceInstance {
    pub service_slug: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn base_url(&self) -> &str;

    async fn get_site(&self, site_id: &str) -> Result<SiteDetails, DevError>;

    async fn list_service_instances(&self, site_id: &str)
        -> Result<Vec<ServiceInstance>, DevError>;
}

/// HTTP client for the platform REST API
#[derive(Debug, Clone)]
pub struct NetlifyApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl NetlifyApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, DevError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("netlify-dev/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Client configured from the session environment and the stored user config
    pub fn from_env(env: &SessionEnvironment) -> Result<Self, DevError> {
        let base_url = env.get(API_URL_VAR).unwrap_or(DEFAULT_API_URL).to_string();
        let token = env
            .get(AUTH_TOKEN_VAR)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(stored_access_token);
        Self::new(base_url, token)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl PlatformApi for NetlifyApi {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_site(&self, site_id: &str) -> Result<SiteDetails, DevError> {
        debug!(site_id = %site_id, "Fetching site details");
        let site = self
            .get(&format!("/sites/{}", site_id))
            .send()
            .await?
            .error_for_status()?
            .json::<SiteDetails>()
            .await?;
        Ok(site)
    }

    async fn list_service_instances(
        &self,
        site_id: &str,
    ) -> Result<Vec<ServiceInstance>, DevError> {
        debug!(site_id = %site_id, "Listing service instances");
        let instances = self
            .get(&format!("/sites/{}/service-instances", site_id))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ServiceInstance>>()
            .await?;
        Ok(instances)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserConfig {
    user_id: Option<String>,
    #[serde(default)]
    users: BTreeMap<String, StoredUser>,
}

#[derive(Debug, Deserialize)]
struct StoredUser {
    #[serde(default)]
    auth: Option<StoredAuth>,
}

#[derive(Debug, Deserialize)]
struct StoredAuth {
    token: Option<String>,
}

fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".netlify").join("config.json"))
}

/// Token of the current user from ~/.netlify/config.json
fn stored_access_token() -> Option<String> {
    let content = std::fs::read_to_string(user_config_path()?).ok()?;
    token_from_user_config(&content)
}

fn token_from_user_config(content: &str) -> Option<String> {
    let config: UserConfig = serde_json::from_str(content).ok()?;
    let user_id = config.user_id?;
    config
        .users
        .get(&user_id)?
        .auth
        .as_ref()?
        .token
        .clone()
        .filter(|t| !t.is_empty())
}
