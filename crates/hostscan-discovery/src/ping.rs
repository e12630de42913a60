//! ICMP echo reachability checks via the system `ping`

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;
use tracing::trace;

use crate::ports::ReachabilityProbe;

/// Reachability probe that runs one `ping` per address
#[derive(Debug, Clone, Default)]
pub struct PingProbe;

impl PingProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn is_reachable(&self, ip: Ipv4Addr, timeout: Duration) -> bool {
        let result = tokio::process::Command::new("ping")
            .args(ping_args(ip, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match result {
            Ok(status) => status.success(),
            Err(e) => {
                trace!(ip = %ip, error = %e, "ping failed to run");
                false
            }
        }
    }
}

/// Arguments for a single echo request with a reply deadline
#[cfg(not(windows))]
fn ping_args(ip: Ipv4Addr, timeout: Duration) -> Vec<String> {
    vec![
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        format!("{}", timeout.as_secs_f64()),
        "-n".to_string(),
        ip.to_string(),
    ]
}

#[cfg(windows)]
fn ping_args(ip: Ipv4Addr, timeout: Duration) -> Vec<String> {
    vec![
        "-n".to_string(),
        "1".to_string(),
        "-w".to_string(),
        timeout.as_millis().to_string(),
        ip.to_string(),
    ]
}
