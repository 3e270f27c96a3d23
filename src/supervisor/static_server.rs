//! Embedded static file server used when no framework command is configured

use axum::Router;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info};

/// Document served for paths that match no file
pub const NOT_FOUND_DOCUMENT: &str = "404.html";

/// A bound static server; serving continues in a background task
#[derive(Debug)]
pub struct StaticServer {
    pub addr: SocketAddr,
    pub root: PathBuf,
    task: JoinHandle<()>,
}

impl StaticServer {
    /// Bind `port` and serve `root`. Returns once the listener is bound.
    pub async fn start(root: &Path, port: u16) -> std::io::Result<Self> {
        let serve_dir = ServeDir::new(root)
            .append_index_html_on_directories(true)
            .not_found_service(ServeFile::new(root.join(NOT_FOUND_DOCUMENT)));
        let app = Router::new().fallback_service(serve_dir);

        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        info!(root = %root.display(), %addr, "Static server bound");

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Static server stopped: {}", e);
            }
        });

        Ok(Self {
            addr,
            root: root.to_path_buf(),
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}
