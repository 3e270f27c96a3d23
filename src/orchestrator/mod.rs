//! Dev session sequencing
//!
//! Stages run strictly one after another:
//! settings → environment → functions → framework + readiness → proxy →
//! tunnel → browser → analytics → publish URL → banner.
//! The first failing stage ends `run` with its error; the caller reports it and
//! exits through the shutdown routine. Earlier stages are not rolled back.

pub mod banner;

use std::sync::Arc;
use tracing::{debug, info};

pub use banner::{banner_lines, print_banner};

use crate::analytics::{AnalyticsReporter, DevEvent, LogAnalytics};
use crate::browser::{BrowserOpener, SystemBrowser};
use crate::cli::DevFlags;
use crate::config::{ConfigSettingsResolver, DevConfig, ProjectConfig, ServerSettings, SettingsResolver, Site};
use crate::env::{merge_session_environment, resolve_addon_variables, SessionEnvironment};
use crate::error::DevError;
use crate::functions::{FunctionsCatalog, FunctionsLauncher};
use crate::platform::PlatformApi;
use crate::proxy::{ForwardProxy, IntegratedProxy, LocalProxy, ProxyContext, ProxyStrategy, TrafficMesh};
use crate::supervisor::{ProcessSupervisor, RunningFramework, ShutdownRoutine};
use crate::tunnel::{LiveTunnelClient, TunnelCoordinator, TunnelStarter};
use crate::util::{emit, Severity, DEV_MARKER};

/// External services the session drives
#[derive(Clone)]
pub struct Collaborators {
    pub settings: Arc<dyn SettingsResolver>,
    pub api: Arc<dyn PlatformApi>,
    pub functions: Arc<dyn FunctionsLauncher>,
    pub integrated_proxy: Arc<dyn IntegratedProxy>,
    pub forward_proxy: Arc<dyn ForwardProxy>,
    pub tunnel: Arc<dyn TunnelStarter>,
    pub browser: Arc<dyn BrowserOpener>,
    pub analytics: Arc<dyn AnalyticsReporter>,
}

impl Collaborators {
    /// Production collaborators around a platform client. Helper processes
    /// they start are attached to `shutdown`.
    pub fn standard(
        api: Arc<dyn PlatformApi>,
        site: &Site,
        shutdown: &ShutdownRoutine,
    ) -> Result<Self, DevError> {
        let tunnel = LiveTunnelClient::new(api.base_url(), shutdown.clone())?;
        Ok(Self {
            settings: Arc::new(ConfigSettingsResolver::new(site.config_path.clone())),
            api,
            functions: Arc::new(FunctionsCatalog),
            integrated_proxy: Arc::new(LocalProxy),
            forward_proxy: Arc::new(TrafficMesh::new(shutdown.clone())),
            tunnel: Arc::new(tunnel),
            browser: Arc::new(SystemBrowser),
            analytics: Arc::new(LogAnalytics),
        })
    }
}

/// A session that reached the banner
#[derive(Debug)]
pub struct LiveSession {
    /// Tunnel URL in live mode, proxy URL otherwise
    pub url: String,
    pub settings: ServerSettings,
    pub framework: RunningFramework,
    pub env: SessionEnvironment,
}

pub struct DevSession {
    flags: DevFlags,
    project: ProjectConfig,
    site: Site,
    env: SessionEnvironment,
    collaborators: Collaborators,
    supervisor: ProcessSupervisor,
}

impl DevSession {
    pub fn new(
        flags: DevFlags,
        project: ProjectConfig,
        site: Site,
        env: SessionEnvironment,
        collaborators: Collaborators,
        shutdown: ShutdownRoutine,
    ) -> Self {
        Self {
            flags,
            project,
            site,
            env,
            collaborators,
            supervisor: ProcessSupervisor::new(shutdown),
        }
    }

    /// Adjust the framework supervisor before the session runs
    pub fn configure_supervisor(
        mut self,
        configure: impl FnOnce(ProcessSupervisor) -> ProcessSupervisor,
    ) -> Self {
        self.supervisor = configure(self.supervisor);
        self
    }

    pub async fn run(self) -> Result<LiveSession, DevError> {
        let DevSession {
            flags,
            project,
            site,
            mut env,
            collaborators,
            supervisor,
        } = self;

        println!("{}", DEV_MARKER);

        let dev_config = DevConfig::assemble(&flags, &project);
        let settings = collaborators
            .settings
            .resolve(&dev_config, &flags, &site.root)
            .await?;

        let addons =
            resolve_addon_variables(collaborators.api.as_ref(), &site, flags.offline).await?;
        let dotfiles = merge_session_environment(&mut env, &addons, &site.root)?;
        debug!(vars = ?dotfiles.var_names(), "Session environment ready");

        collaborators
            .functions
            .start(&settings, &site, addons.site.as_ref())
            .await?;

        let framework = supervisor.start(&settings, &env).await?;

        let strategy = ProxyStrategy::select(
            flags.traffic_mesh,
            collaborators.integrated_proxy.clone(),
            collaborators.forward_proxy.clone(),
        );
        let proxy_url = strategy
            .start(ProxyContext {
                settings: &settings,
                site: &site,
                addon_urls: &addons.urls,
                env: &env,
                debug: flags.debug,
            })
            .await?;

        let token = collaborators.api.access_token();
        let tunnel_url = TunnelCoordinator::new(collaborators.tunnel.clone())
            .maybe_start(flags.live, &site, token.as_deref(), settings.port, &mut env)
            .await?;
        let url = tunnel_url.unwrap_or(proxy_url);

        if dev_config.should_launch_browser() {
            if let Err(e) = collaborators.browser.open(&url, &env).await {
                emit(
                    Severity::Warn,
                    format!("Failed to open browser automatically: {}", e),
                );
            }
        }

        if let Err(e) = collaborators
            .analytics
            .report(&DevEvent::new(&settings, flags.live))
            .await
        {
            debug!(error = %e, "Analytics report failed");
        }

        env.publish_url(&url);
        print_banner(&url);
        info!(%url, "Session ready");

        Ok(LiveSession {
            url,
            settings,
            framework,
            env,
        })
    }
}
