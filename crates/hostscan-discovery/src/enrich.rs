//! Enrichment coordinator
//!
//! Completes discovered records with vendor, host name and management
//! attributes. Every record is enriched in its own task; each source call
//! holds one permit of a semaphore shared across the batch, so at most
//! `max_workers` source invocations are in flight at once. Results are
//! matched back to their input slot, never to completion order.

use hostscan_core::{Catalog, Enrichment, HostRecord};
use indexmap::IndexMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::ports::Sources;

/// Enrichment tuning and the read-only inputs shared by every host
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub max_workers: usize,
    /// Budget for a single source invocation
    pub source_timeout: Duration,
    pub community: String,
    pub catalog: Catalog,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_workers: 30,
            source_timeout: Duration::from_secs(3),
            community: hostscan_snmp::DEFAULT_COMMUNITY.to_string(),
            catalog: Catalog::builtin(),
        }
    }
}

#[derive(Clone)]
pub struct EnrichmentCoordinator {
    sources: Sources,
    config: Arc<EnrichmentConfig>,
}

impl EnrichmentCoordinator {
    pub fn new(sources: Sources, config: EnrichmentConfig) -> Self {
        Self {
            sources,
            config: Arc::new(config),
        }
    }

    /// Enrich `records`, returning them in the same order. Source failures
    /// leave the corresponding field absent; no record is dropped.
    pub async fn enrich(&self, records: Vec<HostRecord>) -> Vec<HostRecord> {
        if records.is_empty() {
            return records;
        }

        let permits = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut set = JoinSet::new();

        for (index, record) in records.iter().enumerate() {
            let sources = self.sources.clone();
            let config = self.config.clone();
            let permits = permits.clone();
            let record = record.clone();
            set.spawn(async move {
                let enrichment = enrich_one(sources, config, permits, &record).await;
                (index, enrichment)
            });
        }

        let mut results: Vec<Option<Enrichment>> = vec![None; records.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, enrichment)) => results[index] = Some(enrichment),
                Err(e) => debug!(error = %e, "Enrichment task failed"),
            }
        }

        records
            .into_iter()
            .zip(results)
            .map(|(record, enrichment)| match enrichment {
                Some(enrichment) => record.apply(enrichment),
                None => record,
            })
            .collect()
    }
}

/// Result of one source invocation
enum Found {
    Vendor(Option<String>),
    HostName(Option<String>),
    Management(IndexMap<String, String>),
}

/// Query all sources for one host concurrently. Each source runs in its
/// own task, so a panicking source only loses its own field.
async fn enrich_one(
    sources: Sources,
    config: Arc<EnrichmentConfig>,
    permits: Arc<Semaphore>,
    record: &HostRecord,
) -> Enrichment {
    let ip = record.address;
    let timeout = config.source_timeout;
    let mut calls = JoinSet::new();

    if let Some(mac) = record.link_address {
        let (vendor, permits) = (sources.vendor.clone(), permits.clone());
        calls.spawn(async move {
            let name = run_source(&permits, timeout, "vendor", vendor.resolve_vendor(mac)).await;
            Found::Vendor(name)
        });
    }

    let (names, name_permits) = (sources.names.clone(), permits.clone());
    calls.spawn(async move {
        let name = run_source(&name_permits, timeout, "name", names.resolve_name(ip)).await;
        Found::HostName(name.flatten())
    });

    let management = sources.management.clone();
    calls.spawn(async move {
        let info = run_source(
            &permits,
            timeout,
            "management",
            management.fetch_management_info(ip, &config.community, &config.catalog),
        )
        .await;
        Found::Management(info.unwrap_or_default())
    });

    let mut enrichment = Enrichment::default();
    while let Some(joined) = calls.join_next().await {
        match joined {
            Ok(Found::Vendor(vendor)) => enrichment.vendor = vendor,
            Ok(Found::HostName(name)) => enrichment.host_name = name,
            Ok(Found::Management(info)) => enrichment.management_info = info,
            Err(e) => debug!(ip = %ip, error = %e, "Enrichment source failed"),
        }
    }

    trace!(
        ip = %ip,
        vendor = ?enrichment.vendor,
        host_name = ?enrichment.host_name,
        attributes = enrichment.management_info.len(),
        "Enriched"
    );
    enrichment
}

/// Run one source call under a pool permit and the per-call timeout
async fn run_source<T>(
    permits: &Semaphore,
    timeout: Duration,
    source: &'static str,
    call: impl Future<Output = T>,
) -> Option<T> {
    let _permit = permits.acquire().await.ok()?;
    match tokio::time::timeout(timeout, call).await {
        Ok(value) => Some(value),
        Err(_) => {
            debug!(source = source, "Enrichment source timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ManagementInfoFetcher, NameResolver, VendorResolver};
    use async_trait::async_trait;
    use hostscan_core::{DiscoverySource, LinkAddress};
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tracks how many source calls run at the same time
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        async fn hold(&self, delay: Duration) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeVendor(Arc<Gauge>);

    #[async_trait]
    impl VendorResolver for FakeVendor {
        async fn resolve_vendor(&self, mac: LinkAddress) -> String {
            self.0.hold(Duration::from_millis(5)).await;
            format!("vendor-{}", mac.octets()[5])
        }
    }

    /// Resolves names with a delay that shrinks with the address, so later
    /// hosts finish first
    struct FakeNames(Arc<Gauge>);

    #[async_trait]
    impl NameResolver for FakeNames {
        async fn resolve_name(&self, ip: Ipv4Addr) -> Option<String> {
            let last = ip.octets()[3];
            self.0
                .hold(Duration::from_millis(2 * (20 - (last % 20)) as u64))
                .await;
            (last % 2 == 0).then(|| format!("host{}.lan", last))
        }
    }

    struct FakeManagement(Arc<Gauge>);

    #[async_trait]
    impl ManagementInfoFetcher for FakeManagement {
        async fn fetch_management_info(
            &self,
            ip: Ipv4Addr,
            community: &str,
            _catalog: &Catalog,
        ) -> IndexMap<String, String> {
            self.0.hold(Duration::from_millis(5)).await;
            let mut info = IndexMap::new();
            if ip.octets()[3] == 1 {
                info.insert("Comunidade".to_string(), community.to_string());
            }
            info
        }
    }

    struct Crash;

    #[async_trait]
    impl ManagementInfoFetcher for Crash {
        async fn fetch_management_info(
            &self,
            _ip: Ipv4Addr,
            _community: &str,
            _catalog: &Catalog,
        ) -> IndexMap<String, String> {
            panic!("agent response could not be handled")
        }
    }

    struct Hang;

    #[async_trait]
    impl VendorResolver for Hang {
        async fn resolve_vendor(&self, _mac: LinkAddress) -> String {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl NameResolver for Hang {
        async fn resolve_name(&self, _ip: Ipv4Addr) -> Option<String> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl ManagementInfoFetcher for Hang {
        async fn fetch_management_info(
            &self,
            _ip: Ipv4Addr,
            _community: &str,
            _catalog: &Catalog,
        ) -> IndexMap<String, String> {
            std::future::pending().await
        }
    }

    fn fake_sources(gauge: Arc<Gauge>) -> Sources {
        Sources {
            vendor: Arc::new(FakeVendor(gauge.clone())),
            names: Arc::new(FakeNames(gauge.clone())),
            management: Arc::new(FakeManagement(gauge)),
        }
    }

    fn records(count: usize) -> Vec<HostRecord> {
        (0..count)
            .map(|i| {
                let ip = Ipv4Addr::from(u32::from(Ipv4Addr::new(10, 0, 0, 0)) + i as u32 + 1);
                let mac = (i % 3 == 0).then(|| LinkAddress::new([2, 0, 0, 0, 0, ip.octets()[3]]));
                HostRecord::new(ip, DiscoverySource::Reachability).with_link_address(mac)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_input() {
        let coordinator =
            EnrichmentCoordinator::new(fake_sources(Arc::default()), EnrichmentConfig::default());
        assert!(coordinator.enrich(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_order_preserved_and_fields_added() {
        let coordinator =
            EnrichmentCoordinator::new(fake_sources(Arc::default()), EnrichmentConfig::default());
        let input = records(12);
        let output = coordinator.enrich(input.clone()).await;

        let before: Vec<_> = input.iter().map(|r| r.address).collect();
        let after: Vec<_> = output.iter().map(|r| r.address).collect();
        assert_eq!(before, after);

        // 10.0.0.1 has a link address and answers management queries
        assert_eq!(output[0].vendor.as_deref(), Some("vendor-1"));
        assert_eq!(output[0].host_name, None);
        assert_eq!(
            output[0].management_info.get("Comunidade").map(String::as_str),
            Some("public")
        );

        // 10.0.0.2 has no link address, so no vendor
        assert_eq!(output[1].vendor, None);
        assert_eq!(output[1].host_name.as_deref(), Some("host2.lan"));
        assert!(output[1].management_info.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_source_keeps_sibling_fields() {
        let gauge = Arc::new(Gauge::default());
        let sources = Sources {
            vendor: Arc::new(FakeVendor(gauge.clone())),
            names: Arc::new(FakeNames(gauge)),
            management: Arc::new(Crash),
        };
        let coordinator = EnrichmentCoordinator::new(sources, EnrichmentConfig::default());

        let output = coordinator.enrich(records(2)).await;
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].vendor.as_deref(), Some("vendor-1"));
        assert!(output[0].management_info.is_empty());
        assert_eq!(output[1].host_name.as_deref(), Some("host2.lan"));
    }

    #[tokio::test]
    async fn test_failing_sources_keep_records() {
        let sources = Sources {
            vendor: Arc::new(Hang),
            names: Arc::new(Hang),
            management: Arc::new(Hang),
        };
        let config = EnrichmentConfig {
            source_timeout: Duration::from_millis(20),
            ..EnrichmentConfig::default()
        };
        let coordinator = EnrichmentCoordinator::new(sources, config);

        let input = records(4);
        let output = coordinator.enrich(input.clone()).await;
        assert_eq!(output, input);
        assert!(output[0].link_address.is_some());
        assert!(output.iter().all(|r| r.vendor.is_none()
            && r.host_name.is_none()
            && r.management_info.is_empty()));
    }

    #[tokio::test]
    async fn test_pool_cap_respected() {
        let gauge = Arc::new(Gauge::default());
        let config = EnrichmentConfig {
            max_workers: 30,
            ..EnrichmentConfig::default()
        };
        let coordinator = EnrichmentCoordinator::new(fake_sources(gauge.clone()), config);

        let output = coordinator.enrich(records(100)).await;
        assert_eq!(output.len(), 100);

        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak <= 30, "peak in-flight source calls was {}", peak);
        assert!(peak > 1);
        assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
    }
}
