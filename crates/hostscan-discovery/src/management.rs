//! SNMP-backed management attribute source

use async_trait::async_trait;
use hostscan_core::Catalog;
use hostscan_snmp::{DEFAULT_TIMEOUT_MS, SNMP_PORT};
use indexmap::IndexMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

use crate::ports::ManagementInfoFetcher;

#[derive(Debug, Clone)]
pub struct SnmpManagementFetcher {
    port: u16,
    timeout_ms: u64,
}

impl SnmpManagementFetcher {
    pub fn new(port: u16, timeout_ms: u64) -> Self {
        Self { port, timeout_ms }
    }
}

impl Default for SnmpManagementFetcher {
    fn default() -> Self {
        Self::new(SNMP_PORT, DEFAULT_TIMEOUT_MS)
    }
}

#[async_trait]
impl ManagementInfoFetcher for SnmpManagementFetcher {
    async fn fetch_management_info(
        &self,
        ip: Ipv4Addr,
        community: &str,
        catalog: &Catalog,
    ) -> IndexMap<String, String> {
        match hostscan_snmp::fetch_management_info(
            IpAddr::V4(ip),
            self.port,
            community,
            catalog,
            self.timeout_ms,
        )
        .await
        {
            Ok(info) => info,
            Err(e) => {
                debug!(ip = %ip, error = %e, "Management query failed");
                IndexMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn test_silent_agent_yields_empty_map() {
        // Bound but never answers
        let agent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = agent.local_addr().unwrap().port();

        let fetcher = SnmpManagementFetcher::new(port, 100);
        let info = fetcher
            .fetch_management_info(Ipv4Addr::LOCALHOST, "public", &Catalog::builtin())
            .await;
        assert!(info.is_empty());
    }

    #[tokio::test]
    async fn test_empty_catalog_sends_nothing() {
        let fetcher = SnmpManagementFetcher::default();
        let info = fetcher
            .fetch_management_info(Ipv4Addr::LOCALHOST, "public", &Catalog::new(Vec::new()))
            .await;
        assert!(info.is_empty());
    }
}
