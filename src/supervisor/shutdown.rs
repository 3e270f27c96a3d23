//! The session's single shutdown routine
//!
//! Child exit, every termination signal (interrupt, terminate, quit, hangup)
//! and the supervisor's own exit all funnel into [`ShutdownRoutine::trigger`].
//! The first trigger terminates every attached process group (the framework
//! and any helper binaries), ignoring errors, and then ends the supervisor
//! process. Later triggers do nothing.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

type GroupKiller = dyn Fn(i32) -> io::Result<()> + Send + Sync;
type ExitHook = dyn Fn(i32) + Send + Sync;

struct ShutdownInner {
    fired: AtomicBool,
    handlers_installed: AtomicBool,
    /// Process groups started by the session, in attach order
    groups: Mutex<Vec<i32>>,
    kill_group: Box<GroupKiller>,
    exit: Box<ExitHook>,
}

#[derive(Clone)]
pub struct ShutdownRoutine {
    inner: Arc<ShutdownInner>,
}

impl std::fmt::Debug for ShutdownRoutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownRoutine")
            .field("fired", &self.is_triggered())
            .field("groups", &self.groups())
            .finish()
    }
}

impl Default for ShutdownRoutine {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownRoutine {
    /// Routine that signals the real process group and exits the process
    pub fn new() -> Self {
        Self::with_hooks(kill_process_group, |code| std::process::exit(code))
    }

    /// Routine with custom group-kill and exit actions
    pub fn with_hooks<K, E>(kill_group: K, exit: E) -> Self
    where
        K: Fn(i32) -> io::Result<()> + Send + Sync + 'static,
        E: Fn(i32) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ShutdownInner {
                fired: AtomicBool::new(false),
                handlers_installed: AtomicBool::new(false),
                groups: Mutex::new(Vec::new()),
                kill_group: Box::new(kill_group),
                exit: Box::new(exit),
            }),
        }
    }

    /// Record a process group to terminate on shutdown
    pub fn attach_group(&self, pgid: u32) {
        let mut groups = self.inner.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let pgid = pgid as i32;
        if !groups.contains(&pgid) {
            groups.push(pgid);
        }
    }

    pub fn groups(&self) -> Vec<i32> {
        self.inner
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Run the routine once: terminate every attached group, then exit with `code`
    pub fn trigger(&self, code: i32) {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            debug!(code, "Shutdown already in progress");
            return;
        }

        for pgid in self.groups() {
            debug!(pgid, "Terminating process group");
            if let Err(e) = (self.inner.kill_group)(pgid) {
                debug!(pgid, error = %e, "Process group already gone");
            }
        }

        info!(code, "Shutting down");
        (self.inner.exit)(code);
    }

    /// Route termination signals into the routine. Registers once per routine.
    pub fn install_signal_handlers(&self) -> io::Result<()> {
        if self.inner.handlers_installed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut interrupt = signal(SignalKind::interrupt())?;
            let mut terminate = signal(SignalKind::terminate())?;
            let mut quit = signal(SignalKind::quit())?;
            let mut hangup = signal(SignalKind::hangup())?;

            let routine = self.clone();
            tokio::spawn(async move {
                let name = tokio::select! {
                    _ = interrupt.recv() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                    _ = quit.recv() => "SIGQUIT",
                    _ = hangup.recv() => "SIGHUP",
                };
                info!(signal = name, "Received termination signal");
                routine.trigger(0);
            });
        }

        #[cfg(not(unix))]
        {
            let routine = self.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!(signal = "ctrl-c", "Received termination signal");
                    routine.trigger(0);
                }
            });
        }

        Ok(())
    }
}

/// Send SIGTERM to every process in the group
#[cfg(unix)]
pub fn kill_process_group(pgid: i32) -> io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pgid), Signal::SIGTERM).map_err(io::Error::from)
}

/// Terminate the process tree rooted at `pid`
#[cfg(not(unix))]
pub fn kill_process_group(pid: i32) -> io::Result<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("taskkill exited with {}", status)))
    }
}
