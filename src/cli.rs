//! Command-line flags for the dev session

use clap::Parser;
use std::path::PathBuf;

/// Local dev server
///
/// The dev command will run a local dev server with Netlify's proxy and redirect rules
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "netlify-dev", version)]
#[command(after_help = "Examples:\n  $ netlify-dev\n  $ netlify-dev -c \"yarn start\"\n  $ netlify-dev -c hugo")]
pub struct DevFlags {
    /// command to run
    #[arg(short = 'c', long)]
    pub command: Option<String>,

    /// port of netlify dev
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// port of target app server
    #[arg(long = "targetPort")]
    pub target_port: Option<u16>,

    /// port of the static app server used when no framework is detected
    #[arg(long = "staticServerPort", hide = true)]
    pub static_server_port: Option<u16>,

    /// dir with static files
    #[arg(short = 'd', long)]
    pub dir: Option<PathBuf>,

    /// Specify a functions folder to serve
    #[arg(short = 'f', long)]
    pub functions: Option<PathBuf>,

    /// disables any features that require network access
    #[arg(short = 'o', long)]
    pub offline: bool,

    /// Start a public live session
    #[arg(short = 'l', long)]
    pub live: bool,

    /// Uses Traffic Mesh for proxying requests
    #[arg(short = 't', long = "trafficMesh", hide = true)]
    pub traffic_mesh: bool,

    /// Verbose output from the forward-mesh proxy
    #[arg(long, hide = true)]
    pub debug: bool,
}
