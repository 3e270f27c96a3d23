//! Add-on contributed variables and URLs

use indexmap::IndexMap;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::Site;
use crate::error::DevError;
use crate::platform::{PlatformApi, SiteDetails};

/// What the platform contributes to a session
#[derive(Debug, Clone, Default)]
pub struct AddonResolution {
    /// Site build environment followed by each add-on's variables
    pub env: IndexMap<String, String>,
    /// Add-on slug to its site-relative endpoint
    pub urls: BTreeMap<String, String>,
    /// Site record, when one was fetched
    pub site: Option<SiteDetails>,
}

/// Query the platform for add-on variables and URLs.
///
/// Nothing is fetched for an unlinked site or in offline mode. No
/// variables are written here; the caller injects them.
pub async fn resolve_addon_variables(
    api: &dyn PlatformApi,
    site: &Site,
    offline: bool,
) -> Result<AddonResolution, DevError> {
    let site_id = match (&site.id, offline) {
        (Some(id), false) => id,
        _ => return Ok(AddonResolution::default()),
    };

    let details = api.get_site(site_id).await?;
    let instances = api.list_service_instances(site_id).await?;

    let mut env: IndexMap<String, String> = details
        .build_settings
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut urls = BTreeMap::new();

    for instance in &instances {
        for (key, value) in &instance.env {
            env.insert(key.clone(), value.clone());
        }
        if let Some(site_url) = details.site_url() {
            urls.insert(
                instance.service_slug.clone(),
                format!("{}/.netlify/{}", site_url.trim_end_matches('/'), instance.service_slug),
            );
        }
    }

    debug!(
        site_id = %site_id,
        addons = instances.len(),
        vars = env.len(),
        "Resolved add-on variables"
    );

    Ok(AddonResolution {
        env,
        urls,
        site: Some(details),
    })
}
