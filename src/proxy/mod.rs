//! Proxy strategy: one externally reachable URL in front of the session
//!
//! Two interchangeable proxies exist. The strategy is fixed once from the
//! `trafficMesh` flag; only the selected proxy is ever started.

pub mod integrated;
pub mod mesh;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub use integrated::LocalProxy;
pub use mesh::TrafficMesh;

use crate::config::{ServerSettings, Site};
use crate::env::SessionEnvironment;
use crate::error::DevError;

/// Proxy that applies the project's routing in front of the framework
#[async_trait]
pub trait IntegratedProxy: Send + Sync {
    /// Start serving on `settings.port`; `None` when no listener came up
    async fn start(
        &self,
        settings: &ServerSettings,
        addon_urls: &BTreeMap<String, String>,
        config_path: Option<&Path>,
        project_root: &Path,
    ) -> Result<Option<String>, DevError>;
}

/// Inputs of the forward-mesh proxy
#[derive(Debug, Clone)]
pub struct ForwardProxyRequest {
    pub port: u16,
    pub framework_port: u16,
    pub functions_port: u16,
    pub publish_dir: PathBuf,
    pub debug: bool,
    /// PATH of the session environment
    pub search_path: Option<String>,
}

#[async_trait]
pub trait ForwardProxy: Send + Sync {
    async fn start(&self, request: ForwardProxyRequest) -> Result<Option<String>, DevError>;
}

/// Everything a strategy may need at start time
pub struct ProxyContext<'a> {
    pub settings: &'a ServerSettings,
    pub site: &'a Site,
    pub addon_urls: &'a BTreeMap<String, String>,
    pub env: &'a SessionEnvironment,
    pub debug: bool,
}

#[derive(Clone)]
pub enum ProxyStrategy {
    Integrated(Arc<dyn IntegratedProxy>),
    ForwardMesh(Arc<dyn ForwardProxy>),
}

impl std::fmt::Debug for ProxyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

impl ProxyStrategy {
    /// Pick the strategy for the session; the other proxy is dropped unused
    pub fn select(
        traffic_mesh: bool,
        integrated: Arc<dyn IntegratedProxy>,
        forward: Arc<dyn ForwardProxy>,
    ) -> Self {
        if traffic_mesh {
            ProxyStrategy::ForwardMesh(forward)
        } else {
            ProxyStrategy::Integrated(integrated)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProxyStrategy::Integrated(_) => "proxy server",
            ProxyStrategy::ForwardMesh(_) => "forward proxy",
        }
    }

    /// Start the selected proxy and return the session URL
    pub async fn start(&self, ctx: ProxyContext<'_>) -> Result<String, DevError> {
        let port = ctx.settings.port;
        let url = match self {
            ProxyStrategy::ForwardMesh(proxy) => {
                proxy
                    .start(ForwardProxyRequest {
                        port,
                        framework_port: ctx.settings.framework_port,
                        functions_port: ctx.settings.functions_port,
                        publish_dir: ctx.settings.dist.clone(),
                        debug: ctx.debug,
                        search_path: ctx.env.get("PATH").map(str::to_string),
                    })
                    .await?
            }
            ProxyStrategy::Integrated(proxy) => {
                proxy
                    .start(
                        ctx.settings,
                        ctx.addon_urls,
                        ctx.site.config_path.as_deref(),
                        &ctx.site.root,
                    )
                    .await?
            }
        };

        match url {
            Some(url) => {
                info!(kind = self.kind(), %url, "Proxy started");
                Ok(url)
            }
            None => Err(DevError::ProxyStartFailure {
                kind: self.kind(),
                port,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProxy {
        starts: AtomicUsize,
        url: Option<String>,
    }

    #[async_trait]
    impl IntegratedProxy for CountingProxy {
        async fn start(
            &self,
            settings: &ServerSettings,
            _addon_urls: &BTreeMap<String, String>,
            _config_path: Option<&Path>,
            _project_root: &Path,
        ) -> Result<Option<String>, DevError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(self.url.clone().map(|u| format!("{}:{}", u, settings.port)))
        }
    }

    #[async_trait]
    impl ForwardProxy for CountingProxy {
        async fn start(&self, request: ForwardProxyRequest) -> Result<Option<String>, DevError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(self.url.clone().map(|u| format!("{}:{}", u, request.port)))
        }
    }

    fn settings() -> ServerSettings {
        ServerSettings {
            framework: None,
            command: String::new(),
            args: Vec::new(),
            no_cmd: true,
            port: 8888,
            framework_port: 3999,
            functions_port: 34567,
            dist: PathBuf::from("/project/public"),
            functions: None,
            project_root: PathBuf::from("/project"),
            config_path: None,
            env: BTreeMap::new(),
        }
    }

    fn site() -> Site {
        Site {
            id: None,
            root: PathBuf::from("/project"),
            config_path: None,
        }
    }

    async fn run(traffic_mesh: bool, url: Option<&str>) -> (Result<String, DevError>, usize, usize) {
        let integrated = Arc::new(CountingProxy {
            url: url.map(|u| format!("{}-integrated", u)),
            ..CountingProxy::default()
        });
        let forward = Arc::new(CountingProxy {
            url: url.map(|u| format!("{}-mesh", u)),
            ..CountingProxy::default()
        });
        let strategy = ProxyStrategy::select(traffic_mesh, integrated.clone(), forward.clone());
        let settings = settings();
        let site = site();
        let addon_urls = BTreeMap::new();
        let env = SessionEnvironment::default();
        let result = strategy
            .start(ProxyContext {
                settings: &settings,
                site: &site,
                addon_urls: &addon_urls,
                env: &env,
                debug: false,
            })
            .await;
        (
            result,
            integrated.starts.load(Ordering::SeqCst),
            forward.starts.load(Ordering::SeqCst),
        )
    }

    #[tokio::test]
    async fn test_integrated_by_default() {
        let (result, integrated, forward) = run(false, Some("http://localhost")).await;
        assert_eq!(result.unwrap(), "http://localhost-integrated:8888");
        assert_eq!((integrated, forward), (1, 0));
    }

    #[tokio::test]
    async fn test_traffic_mesh_selects_forward_proxy() {
        let (result, integrated, forward) = run(true, Some("http://localhost")).await;
        assert_eq!(result.unwrap(), "http://localhost-mesh:8888");
        assert_eq!((integrated, forward), (0, 1));
    }

    #[tokio::test]
    async fn test_missing_url_is_fatal() {
        let (result, _, _) = run(false, None).await;
        match result {
            Err(DevError::ProxyStartFailure { kind, port }) => {
                assert_eq!(kind, "proxy server");
                assert_eq!(port, 8888);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
