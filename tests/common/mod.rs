//! Fake collaborators shared by the session tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netlify_dev_core::analytics::{AnalyticsReporter, DevEvent};
use netlify_dev_core::browser::BrowserOpener;
use netlify_dev_core::config::{ConfigSettingsResolver, ServerSettings, Site};
use netlify_dev_core::env::SessionEnvironment;
use netlify_dev_core::error::DevError;
use netlify_dev_core::functions::FunctionsLauncher;
use netlify_dev_core::orchestrator::Collaborators;
use netlify_dev_core::platform::{PlatformApi, ServiceInstance, SiteDetails};
use netlify_dev_core::proxy::{ForwardProxy, ForwardProxyRequest, IntegratedProxy};
use netlify_dev_core::supervisor::ShutdownRoutine;
use netlify_dev_core::tunnel::TunnelStarter;

pub struct OfflineApi;

#[async_trait]
impl PlatformApi for OfflineApi {
    fn access_token(&self) -> Option<String> {
        Some("test-token".to_string())
    }

    fn base_url(&self) -> &str {
        "http://127.0.0.1:9"
    }

    async fn get_site(&self, _site_id: &str) -> Result<SiteDetails, DevError> {
        Err(DevError::Api("offline".to_string()))
    }

    async fn list_service_instances(
        &self,
        _site_id: &str,
    ) -> Result<Vec<ServiceInstance>, DevError> {
        Err(DevError::Api("offline".to_string()))
    }
}

#[derive(Default)]
pub struct NoFunctions {
    pub starts: AtomicUsize,
}

#[async_trait]
impl FunctionsLauncher for NoFunctions {
    async fn start(
        &self,
        _settings: &ServerSettings,
        _site: &Site,
        _site_info: Option<&SiteDetails>,
    ) -> Result<(), DevError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Proxy that reports a URL without binding anything
#[derive(Default)]
pub struct FakeProxy {
    pub starts: AtomicUsize,
}

#[async_trait]
impl IntegratedProxy for FakeProxy {
    async fn start(
        &self,
        settings: &ServerSettings,
        _addon_urls: &BTreeMap<String, String>,
        _config_path: Option<&Path>,
        _project_root: &Path,
    ) -> Result<Option<String>, DevError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("http://localhost:{}", settings.port)))
    }
}

#[async_trait]
impl ForwardProxy for FakeProxy {
    async fn start(&self, request: ForwardProxyRequest) -> Result<Option<String>, DevError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("http://localhost:{}", request.port)))
    }
}

pub struct FakeTunnel(pub String);

#[async_trait]
impl TunnelStarter for FakeTunnel {
    async fn start(
        &self,
        _site_id: &str,
        _api_token: &str,
        _local_port: u16,
        _env: &SessionEnvironment,
    ) -> Result<String, DevError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct RecordingBrowser {
    pub opened: Mutex<Vec<String>>,
}

#[async_trait]
impl BrowserOpener for RecordingBrowser {
    async fn open(&self, url: &str, _env: &SessionEnvironment) -> Result<(), DevError> {
        self.opened.lock().unwrap().push(url.to_string());
        Err(DevError::Io(std::io::Error::other("no display")))
    }
}

#[derive(Default)]
pub struct RecordingAnalytics {
    pub events: Mutex<Vec<DevEvent>>,
}

#[async_trait]
impl AnalyticsReporter for RecordingAnalytics {
    async fn report(&self, event: &DevEvent) -> Result<(), DevError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Fakes {
    pub functions: Arc<NoFunctions>,
    pub proxy: Arc<FakeProxy>,
    pub browser: Arc<RecordingBrowser>,
    pub analytics: Arc<RecordingAnalytics>,
}

pub fn collaborators(tunnel_url: &str) -> (Collaborators, Fakes) {
    let fakes = Fakes {
        functions: Arc::new(NoFunctions::default()),
        proxy: Arc::new(FakeProxy::default()),
        browser: Arc::new(RecordingBrowser::default()),
        analytics: Arc::new(RecordingAnalytics::default()),
    };
    let collaborators = Collaborators {
        settings: Arc::new(ConfigSettingsResolver::default()),
        api: Arc::new(OfflineApi),
        functions: fakes.functions.clone(),
        integrated_proxy: fakes.proxy.clone(),
        forward_proxy: fakes.proxy.clone(),
        tunnel: Arc::new(FakeTunnel(tunnel_url.to_string())),
        browser: fakes.browser.clone(),
        analytics: fakes.analytics.clone(),
    };
    (collaborators, fakes)
}

/// Shutdown routine that records instead of exiting the test process.
/// Group kills are real so spawned children do not outlive the test.
#[derive(Default)]
pub struct ShutdownLog {
    pub kills: Mutex<Vec<i32>>,
    pub exits: Mutex<Vec<i32>>,
}

pub fn recording_shutdown() -> (ShutdownRoutine, Arc<ShutdownLog>) {
    let log = Arc::new(ShutdownLog::default());
    let kills = log.clone();
    let exits = log.clone();
    let routine = ShutdownRoutine::with_hooks(
        move |pgid| {
            kills.kills.lock().unwrap().push(pgid);
            netlify_dev_core::supervisor::kill_process_group(pgid)
        },
        move |code| exits.exits.lock().unwrap().push(code),
    );
    (routine, log)
}

/// Wait until the routine has recorded an exit
pub async fn wait_for_exit(log: &ShutdownLog, within: Duration) -> Option<i32> {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if let Some(code) = log.exits.lock().unwrap().first().copied() {
            return Some(code);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn site(root: &Path, id: Option<&str>) -> Site {
    Site {
        id: id.map(str::to_string),
        root: PathBuf::from(root),
        config_path: None,
    }
}

pub fn session_env() -> SessionEnvironment {
    SessionEnvironment::inherit()
}
