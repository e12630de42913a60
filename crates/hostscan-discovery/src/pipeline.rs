//! Discovery followed by enrichment for one range

use hostscan_core::{HostRecord, TargetRange};
use std::time::Instant;
use tracing::info;

use crate::enrich::EnrichmentCoordinator;
use crate::merger::DiscoveryMerger;

/// Full scan of one range. Cheap to clone; every clone shares the same
/// probes, sources and read-only tables.
#[derive(Clone)]
pub struct ScanPipeline {
    merger: DiscoveryMerger,
    coordinator: EnrichmentCoordinator,
}

impl ScanPipeline {
    pub fn new(merger: DiscoveryMerger, coordinator: EnrichmentCoordinator) -> Self {
        Self {
            merger,
            coordinator,
        }
    }

    pub async fn run(&self, range: &TargetRange) -> Vec<HostRecord> {
        let started = Instant::now();
        info!(range = %range, "Starting scan");

        let discovered = self.merger.discover(range).await;
        let hosts = self.coordinator.enrich(discovered).await;

        info!(
            range = %range,
            hosts = hosts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan complete"
        );
        hosts
    }
}
