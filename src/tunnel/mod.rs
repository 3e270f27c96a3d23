//! Live sessions: an optional public endpoint in front of the local proxy
//!
//! When live mode is on, the tunnel URL supersedes the proxy URL for the
//! rest of the session and is published as `BASE_URL`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Site;
use crate::env::{SessionEnvironment, BASE_URL};
use crate::error::DevError;
use crate::supervisor::ShutdownRoutine;
use crate::util::{emit, Severity};

pub const TUNNEL_CLIENT_BINARY: &str = "live-tunnel-client";

/// Delay between live session state checks
pub const STATE_POLL_INTERVAL: Duration = Duration::from_millis(500);

const ONLINE_STATE: &str = "online";

/// Creates a public endpoint bound to a local port
#[async_trait]
pub trait TunnelStarter: Send + Sync {
    /// Returns the public session URL once it is reachable
    async fn start(
        &self,
        site_id: &str,
        api_token: &str,
        local_port: u16,
        env: &SessionEnvironment,
    ) -> Result<String, DevError>;
}

#[derive(Clone)]
pub struct TunnelCoordinator {
    starter: Arc<dyn TunnelStarter>,
}

impl TunnelCoordinator {
    pub fn new(starter: Arc<dyn TunnelStarter>) -> Self {
        Self { starter }
    }

    /// Start a tunnel when `live` is set. The returned URL replaces the
    /// proxy URL; it is also stored under `BASE_URL` in `env`.
    pub async fn maybe_start(
        &self,
        live: bool,
        site: &Site,
        api_token: Option<&str>,
        local_port: u16,
        env: &mut SessionEnvironment,
    ) -> Result<Option<String>, DevError> {
        if !live {
            return Ok(None);
        }

        let site_id = site.id.as_deref().ok_or_else(|| {
            DevError::Tunnel(
                "Live sessions need a linked site. Run `netlify link` first".to_string(),
            )
        })?;
        let token = api_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            DevError::Tunnel("Live sessions need an access token. Run `netlify login` first".to_string())
        })?;

        let url = self.starter.start(site_id, token, local_port, env).await?;
        env.set(BASE_URL, url.as_str());
        Ok(Some(url))
    }
}

#[derive(Debug, Serialize)]
struct NewSession<'a> {
    session: SessionTitle<'a>,
}

#[derive(Debug, Serialize)]
struct SessionTitle<'a> {
    title: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveSession {
    pub id: String,
    pub session_url: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Tunnel through the platform's live-session API and the tunnel client binary.
/// The client process runs in its own group, attached to the shutdown routine.
#[derive(Debug, Clone)]
pub struct LiveTunnelClient {
    client: reqwest::Client,
    api_base: Url,
    binary: String,
    shutdown: ShutdownRoutine,
}

impl LiveTunnelClient {
    pub fn new(api_base: &str, shutdown: ShutdownRoutine) -> Result<Self, DevError> {
        // Url::join drops the last segment without a trailing slash
        let api_base = Url::parse(&format!("{}/", api_base.trim_end_matches('/')))
            .map_err(|e| DevError::Tunnel(format!("Invalid API URL '{}': {}", api_base, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_base,
            binary: TUNNEL_CLIENT_BINARY.to_string(),
            shutdown,
        })
    }

    /// Run `binary` instead of `live-tunnel-client`
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, DevError> {
        self.api_base
            .join(path)
            .map_err(|e| DevError::Tunnel(format!("Invalid live session path '{}': {}", path, e)))
    }

    async fn create_session(&self, site_id: &str, token: &str) -> Result<LiveSession, DevError> {
        let mut url = self.endpoint("live_sessions")?;
        url.query_pairs_mut().append_pair("site_id", site_id);

        let title = format!("{} - Live Session", site_id);
        let session = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&NewSession {
                session: SessionTitle { title: &title },
            })
            .send()
            .await
            .map_err(tunnel_error)?
            .error_for_status()
            .map_err(tunnel_error)?
            .json::<LiveSession>()
            .await
            .map_err(tunnel_error)?;
        debug!(session_id = %session.id, "Created live session");
        Ok(session)
    }

    async fn session_state(&self, session_id: &str, token: &str) -> Result<LiveSession, DevError> {
        let url = self.endpoint(&format!("live_sessions/{}", session_id))?;
        self.client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(tunnel_error)?
            .error_for_status()
            .map_err(tunnel_error)?
            .json::<LiveSession>()
            .await
            .map_err(tunnel_error)
    }

    async fn connect(
        &self,
        session_id: &str,
        token: &str,
        local_port: u16,
        env: &SessionEnvironment,
    ) -> Result<(), DevError> {
        let name = self.binary.clone();
        let search_path = env.get("PATH").map(str::to_string);
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let binary = tokio::task::spawn_blocking(move || which::which_in(name, search_path, cwd))
            .await?
            .map_err(|_| DevError::BinaryNotFound {
                command: self.binary.clone(),
            })?;

        let mut cmd = env.command(&binary);
        cmd.args(["connect", "-s", session_id, "-t", token, "-l"])
            .arg(local_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        if let Some(pid) = child.id() {
            self.shutdown.attach_group(pid);
        }
        info!(binary = %binary.display(), local_port, "Started tunnel client");

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => warn!(%status, "Tunnel client exited"),
                Err(e) => warn!(error = %e, "Failed to wait for tunnel client"),
            }
        });
        Ok(())
    }
}

#[async_trait]
impl TunnelStarter for LiveTunnelClient {
    async fn start(
        &self,
        site_id: &str,
        api_token: &str,
        local_port: u16,
        env: &SessionEnvironment,
    ) -> Result<String, DevError> {
        let session = self.create_session(site_id, api_token).await?;
        emit(Severity::Info, "Starting Live Tunnel");
        self.connect(&session.id, api_token, local_port, env).await?;

        loop {
            let current = self.session_state(&session.id, api_token).await?;
            if current.state.as_deref() == Some(ONLINE_STATE) {
                return Ok(session.session_url);
            }
            tokio::time::sleep(STATE_POLL_INTERVAL).await;
        }
    }
}

fn tunnel_error(e: reqwest::Error) -> DevError {
    DevError::Tunnel(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStarter {
        calls: Mutex<Vec<(String, String, u16)>>,
    }

    #[async_trait]
    impl TunnelStarter for RecordingStarter {
        async fn start(
            &self,
            site_id: &str,
            api_token: &str,
            local_port: u16,
            _env: &SessionEnvironment,
        ) -> Result<String, DevError> {
            self.calls
                .lock()
                .unwrap()
                .push((site_id.to_string(), api_token.to_string(), local_port));
            Ok("https://abc.netlify.live".to_string())
        }
    }

    fn linked_site() -> Site {
        Site {
            id: Some("site-123".to_string()),
            root: PathBuf::from("/project"),
            config_path: None,
        }
    }

    #[tokio::test]
    async fn test_not_live_is_noop() {
        let starter = Arc::new(RecordingStarter::default());
        let coordinator = TunnelCoordinator::new(starter.clone());
        let mut env = SessionEnvironment::default();
        let url = coordinator
            .maybe_start(false, &linked_site(), Some("token"), 8888, &mut env)
            .await
            .unwrap();
        assert!(url.is_none());
        assert!(starter.calls.lock().unwrap().is_empty());
        assert!(!env.contains(BASE_URL));
    }

    #[tokio::test]
    async fn test_live_publishes_base_url() {
        let starter = Arc::new(RecordingStarter::default());
        let coordinator = TunnelCoordinator::new(starter.clone());
        let mut env = SessionEnvironment::default();
        let url = coordinator
            .maybe_start(true, &linked_site(), Some("token"), 8888, &mut env)
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://abc.netlify.live"));
        assert_eq!(env.get(BASE_URL), Some("https://abc.netlify.live"));
        assert_eq!(
            *starter.calls.lock().unwrap(),
            vec![("site-123".to_string(), "token".to_string(), 8888)]
        );
    }

    #[tokio::test]
    async fn test_live_requires_site_and_token() {
        let coordinator = TunnelCoordinator::new(Arc::new(RecordingStarter::default()));
        let mut env = SessionEnvironment::default();

        let unlinked = Site {
            id: None,
            ..linked_site()
        };
        let err = coordinator
            .maybe_start(true, &unlinked, Some("token"), 8888, &mut env)
            .await
            .unwrap_err();
        assert!(matches!(err, DevError::Tunnel(_)));

        let err = coordinator
            .maybe_start(true, &linked_site(), None, 8888, &mut env)
            .await
            .unwrap_err();
        assert!(matches!(err, DevError::Tunnel(_)));
        assert!(!env.contains(BASE_URL));
    }

    fn quiet_shutdown() -> ShutdownRoutine {
        ShutdownRoutine::with_hooks(|_| Ok(()), |_| {})
    }

    /// What the live-session API saw
    #[derive(Default)]
    struct ApiLog {
        created: Mutex<Vec<(Option<String>, Option<String>, serde_json::Value)>>,
        polls: AtomicUsize,
    }

    async fn create_session(
        State(log): State<Arc<ApiLog>>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        log.created
            .lock()
            .unwrap()
            .push((query.get("site_id").cloned(), auth, body));
        Json(json!({
            "id": "sess-1",
            "session_url": "https://sess-1.netlify.live",
            "state": "pending",
        }))
    }

    async fn session_state(
        State(log): State<Arc<ApiLog>>,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some("Bearer tok") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let polls = log.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let state = if polls >= 2 { "online" } else { "pending" };
        Ok(Json(json!({
            "id": id,
            "session_url": "https://sess-1.netlify.live",
            "state": state,
        })))
    }

    async fn live_session_api() -> (String, Arc<ApiLog>) {
        let log = Arc::new(ApiLog::default());
        let app = Router::new()
            .route("/api/v1/live_sessions", post(create_session))
            .route("/api/v1/live_sessions/:id", get(session_state))
            .with_state(log.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://127.0.0.1:{}/api/v1", port), log)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_live_tunnel_client_waits_for_online_session() {
        let (api, log) = live_session_api().await;
        let shutdown = quiet_shutdown();
        // `true` stands in for the tunnel client binary
        let client = LiveTunnelClient::new(&api, shutdown.clone())
            .unwrap()
            .with_binary("true");

        let started = tokio::time::Instant::now();
        let url = client
            .start("site-1", "tok", 8888, &SessionEnvironment::inherit())
            .await
            .unwrap();

        assert_eq!(url, "https://sess-1.netlify.live");
        assert_eq!(log.polls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= STATE_POLL_INTERVAL);

        let created = log.created.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        let (site_id, auth, body) = &created[0];
        assert_eq!(site_id.as_deref(), Some("site-1"));
        assert_eq!(auth.as_deref(), Some("Bearer tok"));
        assert_eq!(body["session"]["title"], "site-1 - Live Session");

        // The client process is reached by the shutdown routine
        assert_eq!(shutdown.groups().len(), 1);
    }

    #[tokio::test]
    async fn test_live_tunnel_client_binary_missing() {
        let (api, log) = live_session_api().await;
        let client = LiveTunnelClient::new(&api, quiet_shutdown())
            .unwrap()
            .with_binary("no-such-tunnel-client-xyz");

        let err = client
            .start("site-1", "tok", 8888, &SessionEnvironment::inherit())
            .await
            .unwrap_err();
        assert!(matches!(err, DevError::BinaryNotFound { .. }));
        assert_eq!(log.polls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_endpoint_keeps_api_prefix() {
        let client = LiveTunnelClient::new("https://api.netlify.com/api/v1", quiet_shutdown()).unwrap();
        assert_eq!(
            client.endpoint("live_sessions/abc").unwrap().as_str(),
            "https://api.netlify.com/api/v1/live_sessions/abc"
        );
    }
}
