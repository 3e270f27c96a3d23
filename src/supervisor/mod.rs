//! Framework process supervision
//!
//! Starts either the configured framework command, in its own process group,
//! or the embedded static server, then gates on port readiness. The
//! framework process is a required long-running dependency: whenever it
//! exits, for any code, the whole session ends through the shutdown routine.

pub mod sanitize;
pub mod shutdown;
pub mod static_server;

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use sanitize::{relay_sanitized, ControlSanitizer};
pub use shutdown::{kill_process_group, ShutdownRoutine};
pub use static_server::StaticServer;

use crate::config::ServerSettings;
use crate::env::SessionEnvironment;
use crate::error::DevError;
use crate::readiness::wait_for_port;
use crate::util::{emit, Severity};

/// How long the framework gets to open its port: 10 minutes
pub const FRAMEWORK_PORT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Upper bound on relaying leftover framework output after it exits
pub const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The session's one framework server
#[derive(Debug)]
pub enum RunningFramework {
    Static(StaticServer),
    Process(FrameworkProcess),
}

#[derive(Debug, Clone)]
pub struct FrameworkProcess {
    pub pid: u32,
    pub binary: PathBuf,
    pub command_line: String,
}

/// Owns starting the framework; consumed by `start` so at most one exists
pub struct ProcessSupervisor {
    shutdown: ShutdownRoutine,
    readiness_timeout: Duration,
    relay_stdin: bool,
}

impl ProcessSupervisor {
    pub fn new(shutdown: ShutdownRoutine) -> Self {
        Self {
            shutdown,
            readiness_timeout: FRAMEWORK_PORT_TIMEOUT,
            relay_stdin: true,
        }
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Give the child a closed stdin instead of relaying ours.
    ///
    /// A pending read on the supervisor's stdin cannot be cancelled and would
    /// hold the runtime open after the session ends.
    pub fn without_stdin_relay(mut self) -> Self {
        self.relay_stdin = false;
        self
    }

    pub async fn start(
        self,
        settings: &ServerSettings,
        env: &SessionEnvironment,
    ) -> Result<RunningFramework, DevError> {
        if settings.no_cmd {
            let server = StaticServer::start(&settings.dist, settings.framework_port).await?;
            emit(
                Severity::Info,
                format!("Server listening to {}", settings.framework_port),
            );
            return Ok(RunningFramework::Static(server));
        }

        emit(
            Severity::Info,
            format!(
                "Starting Netlify Dev with {}",
                settings.framework.as_deref().unwrap_or("custom config")
            ),
        );

        let binary = resolve_binary(&settings.command, env, &settings.project_root).await?;
        let command_line = settings.command_line();
        let mut child = spawn_framework(&binary, settings, env, self.relay_stdin)?;
        let pid = child
            .id()
            .ok_or_else(|| std::io::Error::other("framework process exited before it got a pid"))?;
        self.shutdown.attach_group(pid);
        info!(pid, binary = %binary.display(), "Spawned framework process");

        let relays = relay_child_io(&mut child, tokio::io::stdout(), tokio::io::stderr());
        watch_child_exit(child, relays, command_line.clone(), self.shutdown.clone());

        wait_for_port(settings.framework_port, self.readiness_timeout).await?;
        debug!(port = settings.framework_port, "Framework server is ready");

        Ok(RunningFramework::Process(FrameworkProcess {
            pid,
            binary,
            command_line,
        }))
    }
}

/// Look the command up on the session PATH
pub async fn resolve_binary(
    command: &str,
    env: &SessionEnvironment,
    cwd: &Path,
) -> Result<PathBuf, DevError> {
    let name = command.to_string();
    let path = env.get("PATH").map(str::to_string);
    let cwd = cwd.to_path_buf();

    let found = tokio::task::spawn_blocking(move || which::which_in(name, path, cwd)).await?;
    match found {
        Ok(binary) => Ok(binary),
        Err(which::Error::CannotFindBinaryPath) => Err(DevError::BinaryNotFound {
            command: command.to_string(),
        }),
        Err(e) => Err(DevError::Configuration(format!(
            "Could not resolve \"{}\": {}",
            command, e
        ))),
    }
}

fn spawn_framework(
    binary: &Path,
    settings: &ServerSettings,
    env: &SessionEnvironment,
    relay_stdin: bool,
) -> Result<Child, DevError> {
    let stdin = if relay_stdin {
        Stdio::piped()
    } else {
        Stdio::null()
    };

    let mut cmd = env.command(binary);
    cmd.args(&settings.args)
        .current_dir(&settings.project_root)
        .envs(&settings.env)
        .env("FORCE_COLOR", "true")
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    cmd.process_group(0);

    Ok(cmd.spawn()?)
}

/// Forward supervisor stdin to the child and sanitized child output to
/// `out` and `err`. Returns the output relays, which end once the child's
/// pipes close.
fn relay_child_io<O, E>(child: &mut Child, out: O, err: E) -> Vec<JoinHandle<()>>
where
    O: AsyncWrite + Unpin + Send + 'static,
    E: AsyncWrite + Unpin + Send + 'static,
{
    let mut relays = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        relays.push(tokio::spawn(async move {
            if let Err(e) = relay_sanitized(stdout, out).await {
                debug!(error = %e, "stdout relay ended");
            }
        }));
    }

    if let Some(stderr) = child.stderr.take() {
        relays.push(tokio::spawn(async move {
            if let Err(e) = relay_sanitized(stderr, err).await {
                debug!(error = %e, "stderr relay ended");
            }
        }));
    }

    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            let mut input = tokio::io::stdin();
            if let Err(e) = tokio::io::copy(&mut input, &mut stdin).await {
                debug!(error = %e, "stdin relay ended");
            }
        });
    }
    relays
}

/// End the session when the framework process exits.
///
/// Output still buffered in the pipes is relayed before the exit line and
/// the shutdown. A descendant holding the pipes open delays shutdown by at
/// most `RELAY_DRAIN_TIMEOUT`.
fn watch_child_exit(
    mut child: Child,
    relays: Vec<JoinHandle<()>>,
    command_line: String,
    shutdown: ShutdownRoutine,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                warn!(error = %e, "Failed to wait for framework process");
                1
            }
        };

        let drained =
            tokio::time::timeout(RELAY_DRAIN_TIMEOUT, futures::future::join_all(relays)).await;
        if drained.is_err() {
            debug!("Framework output still open after exit, shutting down anyway");
        }

        let exit = DevError::ChildProcessExit {
            command: command_line,
            code,
        };
        if code > 0 {
            emit(Severity::Error, &exit);
        } else {
            // TODO: decide whether a clean exit of the framework should keep the proxy running
            emit(Severity::Warn, &exit);
        }
        shutdown.trigger(exit.exit_code());
    })
}

/// Exit code, or 128 + signal number for a signalled child
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
