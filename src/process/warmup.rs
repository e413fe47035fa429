//! Warm-up between starting background processes and the primary run.
//!
//! There is no readiness protocol with the background processes. By default
//! the harness sleeps for a fixed delay and assumes they are ready. When
//! ports are listed, the harness instead polls TCP connects until every
//! port accepts or a deadline passes, then continues either way.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Interval between readiness probes.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How the harness waits for background processes to come up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmUp {
    /// Fixed delay used when no ready ports are configured.
    pub delay: Duration,

    /// Ports that must accept TCP connections before the primary run.
    pub ready_ports: Vec<u16>,

    /// Host the ready ports are probed on.
    pub ready_host: String,

    /// Upper bound on port polling.
    pub ready_timeout: Duration,
}

impl Default for WarmUp {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            ready_ports: Vec::new(),
            ready_host: "127.0.0.1".to_string(),
            ready_timeout: Duration::from_secs(10),
        }
    }
}

/// How a warm-up ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Slept for the fixed delay.
    Delayed,
    /// Every ready port accepted a connection.
    Ready,
    /// The deadline passed before every port accepted.
    TimedOut,
}

impl WarmUp {
    /// A fixed delay with no port polling.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Polls the given ports instead of sleeping a fixed delay.
    pub fn with_ready_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ready_ports = ports.into_iter().collect();
        self
    }

    /// Sets the polling deadline.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Waits according to this policy. Never fails.
    pub async fn wait(&self) -> Readiness {
        if self.ready_ports.is_empty() {
            debug!("Waiting {:?} for background processes", self.delay);
            tokio::time::sleep(self.delay).await;
            return Readiness::Delayed;
        }

        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if self.all_ports_accept().await {
                debug!("Background ports {:?} are accepting", self.ready_ports);
                return Readiness::Ready;
            }

            if Instant::now() >= deadline {
                warn!(
                    "Background ports {:?} not ready after {:?}, continuing",
                    self.ready_ports, self.ready_timeout
                );
                return Readiness::TimedOut;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn all_ports_accept(&self) -> bool {
        for port in &self.ready_ports {
            if TcpStream::connect((self.ready_host.as_str(), *port))
                .await
                .is_err()
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_delay() {
        let start = std::time::Instant::now();
        let readiness = WarmUp::fixed(Duration::from_millis(100)).wait().await;

        assert_eq!(readiness, Readiness::Delayed);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_ready_port_accepting() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let readiness = WarmUp::default()
            .with_ready_ports([port])
            .with_ready_timeout(Duration::from_secs(2))
            .wait()
            .await;

        assert_eq!(readiness, Readiness::Ready);
    }

    #[tokio::test]
    async fn test_ready_port_times_out() {
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let readiness = WarmUp::default()
            .with_ready_ports([port])
            .with_ready_timeout(Duration::from_millis(200))
            .wait()
            .await;

        assert_eq!(readiness, Readiness::TimedOut);
    }
}
