pub mod log;

pub use log::{emit, init_logging, Severity, DEV_MARKER};
