//! Forward-mesh proxy: the external `traffic-mesh` binary

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ForwardProxy, ForwardProxyRequest};
use crate::error::DevError;
use crate::readiness::wait_for_port;
use crate::supervisor::ShutdownRoutine;

pub const TRAFFIC_MESH_BINARY: &str = "traffic-mesh";

/// How long the mesh gets to open its port
pub const MESH_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches the mesh in its own process group, attached to the session's
/// shutdown routine
#[derive(Debug, Clone)]
pub struct TrafficMesh {
    binary: String,
    ready_timeout: Duration,
    shutdown: ShutdownRoutine,
}

impl TrafficMesh {
    pub fn new(shutdown: ShutdownRoutine) -> Self {
        Self {
            binary: TRAFFIC_MESH_BINARY.to_string(),
            ready_timeout: MESH_READY_TIMEOUT,
            shutdown,
        }
    }

    /// Run `binary` instead of `traffic-mesh`
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }
}

/// Command-line arguments of the mesh process
pub fn mesh_args(request: &ForwardProxyRequest) -> Vec<String> {
    let mut args = vec![
        "--port".to_string(),
        request.port.to_string(),
        "--forward-proxy".to_string(),
        format!("http://localhost:{}", request.framework_port),
        "--watch".to_string(),
        request.publish_dir.display().to_string(),
        "--functions-port".to_string(),
        request.functions_port.to_string(),
    ];
    if request.debug {
        args.push("--debug".to_string());
    }
    args
}

#[async_trait]
impl ForwardProxy for TrafficMesh {
    async fn start(&self, request: ForwardProxyRequest) -> Result<Option<String>, DevError> {
        let name = self.binary.clone();
        let search_path = request.search_path.clone();
        let cwd = request.publish_dir.clone();
        let lookup =
            tokio::task::spawn_blocking(move || which::which_in(name, search_path, cwd)).await?;
        let binary = match lookup {
            Ok(binary) => binary,
            Err(e) => {
                warn!(binary = %self.binary, error = %e, "Forward proxy binary not found");
                return Ok(None);
            }
        };

        let mut cmd = Command::new(&binary);
        cmd.args(mesh_args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(path) = &request.search_path {
            cmd.env("PATH", path);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        if let Some(pid) = child.id() {
            self.shutdown.attach_group(pid);
        }
        info!(binary = %binary.display(), port = request.port, "Started forward proxy");

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(%status, "Forward proxy exited"),
                Err(e) => warn!(error = %e, "Failed to wait for forward proxy"),
            }
        });

        match wait_for_port(request.port, self.ready_timeout).await {
            Ok(()) => Ok(Some(format!("http://localhost:{}", request.port))),
            Err(e) => {
                warn!(error = %e, "Forward proxy never opened its port");
                Ok(None)
            }
        }
    }
}
