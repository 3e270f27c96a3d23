pub mod analytics;
pub mod browser;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod functions;
pub mod orchestrator;
pub mod platform;
pub mod proxy;
pub mod readiness;
pub mod supervisor;
pub mod tunnel;
pub mod util;
