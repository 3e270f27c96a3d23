use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use netlify_dev_core::cli::DevFlags;
use netlify_dev_core::config::{ProjectConfig, Site};
use netlify_dev_core::env::SessionEnvironment;
use netlify_dev_core::orchestrator::{Collaborators, DevSession};
use netlify_dev_core::platform::NetlifyApi;
use netlify_dev_core::supervisor::ShutdownRoutine;
use netlify_dev_core::util::{emit, Severity};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    netlify_dev_core::util::init_logging();

    let flags = DevFlags::parse();

    let shutdown = ShutdownRoutine::new();
    shutdown
        .install_signal_handlers()
        .context("failed to install signal handlers")?;

    let env = SessionEnvironment::inherit();
    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    let site = Site::discover(&cwd, &env);

    let session = match prepare(flags, site, env, shutdown.clone()) {
        Ok(session) => session,
        Err(e) => {
            emit(Severity::Error, format!("{:#}", e));
            shutdown.trigger(1);
            return Ok(());
        }
    };

    match session.run().await {
        Ok(live) => {
            info!(url = %live.url, "Serving until interrupted");
            // The shutdown routine ends the process on child exit or signal
            std::future::pending::<()>().await;
        }
        Err(e) => {
            emit(Severity::Error, &e);
            shutdown.trigger(e.exit_code());
        }
    }
    Ok(())
}

fn prepare(
    flags: DevFlags,
    site: Site,
    env: SessionEnvironment,
    shutdown: ShutdownRoutine,
) -> anyhow::Result<DevSession> {
    let project = ProjectConfig::load(site.config_path.as_deref())
        .context("failed to load project configuration")?;
    let api = NetlifyApi::from_env(&env)?;
    let collaborators = Collaborators::standard(Arc::new(api), &site, &shutdown)?;
    Ok(DevSession::new(
        flags,
        project,
        site,
        env,
        collaborators,
        shutdown,
    ))
}
