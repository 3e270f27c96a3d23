//! TCP port readiness polling

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace};

use crate::error::DevError;

/// Delay between connection attempts
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for a single connection attempt
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll localhost:`port` until it accepts a connection or `deadline` elapses.
pub async fn wait_for_port(port: u16, deadline: Duration) -> Result<(), DevError> {
    let started = Instant::now();
    let expires = started + deadline;
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        let remaining = expires.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(port, attempts, "Port did not open before the deadline");
            return Err(DevError::ReadinessTimeout {
                port,
                waited: started.elapsed(),
            });
        }

        let attempt = timeout(
            remaining.min(CONNECT_ATTEMPT_TIMEOUT),
            TcpStream::connect(("localhost", port)),
        )
        .await;
        match attempt {
            Ok(Ok(_)) => {
                debug!(port, attempts, elapsed = ?started.elapsed(), "Port is accepting connections");
                return Ok(());
            }
            Ok(Err(e)) => trace!(port, error = %e, "Port not ready yet"),
            Err(_) => trace!(port, "Connection attempt timed out"),
        }

        let remaining = expires.saturating_duration_since(Instant::now());
        sleep(POLL_INTERVAL.min(remaining)).await;
    }
}
