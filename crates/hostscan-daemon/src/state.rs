//! Application state built once at startup

use anyhow::Result;
use hostscan_discovery::{
    ArpBroadcastProbe, DiscoveryMerger, EnrichmentCoordinator, NeighbourTable, OuiVendorResolver,
    PingProbe, Probes, ScanPipeline, SnmpManagementFetcher, Sources, SystemNameResolver,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::session::SessionConfig;

/// Shared, read-only state handed to every session
pub struct AppState {
    pub pipeline: ScanPipeline,
    pub session: SessionConfig,
}

impl AppState {
    /// Wire the system probes and sources from configuration
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        let probes = Probes {
            link_layer: Arc::new(ArpBroadcastProbe::new(config.discovery.interface.clone())),
            reachability: Arc::new(PingProbe::new()),
            link_address: Arc::new(NeighbourTable::new()),
        };

        let oui_table = Arc::new(config.oui_table());
        let mut vendor = OuiVendorResolver::new(oui_table.clone());
        if let Some(lookup) = config.online_lookup() {
            vendor = vendor.with_online_lookup(lookup)?;
        }

        let sources = Sources {
            vendor: Arc::new(vendor),
            names: Arc::new(SystemNameResolver::new()),
            management: Arc::new(SnmpManagementFetcher::new(
                config.management.port,
                config.management.timeout_ms,
            )),
        };

        let enrichment = config.enrichment_config();
        info!(
            oui_entries = oui_table.len(),
            descriptors = enrichment.catalog.len(),
            max_probes = config.discovery.max_probes,
            max_workers = enrichment.max_workers,
            "Scan pipeline ready"
        );

        let pipeline = ScanPipeline::new(
            DiscoveryMerger::new(probes, config.probe_settings()),
            EnrichmentCoordinator::new(sources, enrichment),
        );

        Ok(Arc::new(Self {
            pipeline,
            session: SessionConfig {
                request_timeout: Duration::from_millis(config.daemon.request_timeout_ms),
                max_request_bytes: config.daemon.max_request_bytes,
            },
        }))
    }

    #[cfg(test)]
    pub fn with_pipeline(pipeline: ScanPipeline, session: SessionConfig) -> Arc<Self> {
        Arc::new(Self { pipeline, session })
    }
}
