//! Discovery merger: link-layer broadcast plus reachability sweep

use hostscan_core::{DiscoverySource, HostRecord, LinkAddress, TargetRange};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::ports::Probes;

/// Slack on top of the probe timeout before an unfinished reachability
/// probe is abandoned (process start-up is not covered by the probe's own
/// deadline).
const PROBE_GRACE: Duration = Duration::from_millis(500);

/// Discovery tuning
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Per-host reachability timeout and link-layer listen window
    pub probe_timeout: Duration,
    /// Maximum reachability probes in flight
    pub max_probes: usize,
    /// Run the broadcast round at all
    pub use_link_layer: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(200),
            max_probes: 200,
            use_link_layer: true,
        }
    }
}

/// Runs both discovery probes over a range and merges what they find
#[derive(Clone)]
pub struct DiscoveryMerger {
    probes: Probes,
    config: DiscoveryConfig,
}

impl DiscoveryMerger {
    pub fn new(probes: Probes, config: DiscoveryConfig) -> Self {
        Self { probes, config }
    }

    /// Discover live hosts in `range`.
    ///
    /// Link-layer hosts come first in reply order, followed by hosts that
    /// only answered the reachability probe, in completion order. Each
    /// address appears once.
    pub async fn discover(&self, range: &TargetRange) -> Vec<HostRecord> {
        if range.is_single_host() {
            return self.discover_single(range.network()).await;
        }

        let (link, reachable) = tokio::join!(self.link_layer_round(range), self.reachability_sweep(range));

        let records = merge_discoveries(link, reachable);
        let (link_layer, reachability_only) = source_counts(&records);
        info!(
            range = %range,
            link_layer = link_layer,
            reachability_only = reachability_only,
            total = records.len(),
            "Discovery complete"
        );

        records
    }

    /// Single-address mode: no broadcast, just a direct identity lookup
    async fn discover_single(&self, ip: Ipv4Addr) -> Vec<HostRecord> {
        match self.probes.link_address.resolve_link_address(ip).await {
            Ok(mac) => {
                debug!(ip = %ip, mac = ?mac.map(|m| m.to_string()), "Direct lookup");
                vec![HostRecord::new(ip, DiscoverySource::Direct).with_link_address(mac)]
            }
            Err(e) => {
                warn!(ip = %ip, error = %e, "Direct lookup failed");
                Vec::new()
            }
        }
    }

    async fn link_layer_round(&self, range: &TargetRange) -> Vec<(Ipv4Addr, LinkAddress)> {
        if !self.config.use_link_layer {
            return Vec::new();
        }
        match self
            .probes
            .link_layer
            .probe(range, self.config.probe_timeout)
            .await
        {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!(range = %range, error = %e, "Link-layer probe unavailable, using reachability only");
                Vec::new()
            }
        }
    }

    /// Probe every host address with at most `max_probes` in flight.
    /// Results are in completion order.
    async fn reachability_sweep(&self, range: &TargetRange) -> Vec<(Ipv4Addr, Option<LinkAddress>)> {
        debug!(range = %range, hosts = range.host_count(), "Probing reachability");
        let semaphore = Arc::new(Semaphore::new(self.config.max_probes.max(1)));
        let timeout = self.config.probe_timeout;
        let mut set = JoinSet::new();
        let mut found = Vec::new();

        for ip in range.hosts() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let probes = self.probes.clone();
            set.spawn(async move {
                let _permit = permit;
                probe_one(&probes, ip, timeout).await
            });

            // Drain what already finished so completion order is kept
            while let Some(joined) = set.try_join_next() {
                collect(joined, &mut found);
            }
        }

        while let Some(joined) = set.join_next().await {
            collect(joined, &mut found);
        }

        found
    }
}

async fn probe_one(
    probes: &Probes,
    ip: Ipv4Addr,
    timeout: Duration,
) -> Option<(Ipv4Addr, Option<LinkAddress>)> {
    let reachable = tokio::time::timeout(
        timeout + PROBE_GRACE,
        probes.reachability.is_reachable(ip, timeout),
    )
    .await
    .unwrap_or(false);

    if !reachable {
        return None;
    }

    let mac = match probes.link_address.resolve_link_address(ip).await {
        Ok(mac) => mac,
        Err(e) => {
            trace!(ip = %ip, error = %e, "Link address lookup failed");
            None
        }
    };
    trace!(ip = %ip, "Reachable");
    Some((ip, mac))
}

fn collect(
    joined: Result<Option<(Ipv4Addr, Option<LinkAddress>)>, tokio::task::JoinError>,
    found: &mut Vec<(Ipv4Addr, Option<LinkAddress>)>,
) {
    match joined {
        Ok(Some(hit)) => found.push(hit),
        Ok(None) => {}
        Err(e) => debug!(error = %e, "Reachability probe task failed"),
    }
}

/// Link-layer and reachability-only record counts of a merged result
fn source_counts(records: &[HostRecord]) -> (usize, usize) {
    let link_layer = records
        .iter()
        .filter(|r| r.source == DiscoverySource::LinkLayer)
        .count();
    (link_layer, records.len() - link_layer)
}

/// Merge link-layer and reachability results.
///
/// Link-layer records are authoritative and come first; reachability
/// records for addresses already seen are dropped.
pub fn merge_discoveries(
    link_layer: Vec<(Ipv4Addr, LinkAddress)>,
    reachable: Vec<(Ipv4Addr, Option<LinkAddress>)>,
) -> Vec<HostRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(link_layer.len() + reachable.len());

    for (ip, mac) in link_layer {
        if seen.insert(ip) {
            records.push(HostRecord::new(ip, DiscoverySource::LinkLayer).with_link_address(Some(mac)));
        }
    }
    for (ip, mac) in reachable {
        if seen.insert(ip) {
            records.push(HostRecord::new(ip, DiscoverySource::Reachability).with_link_address(mac));
        }
    }

    records
}
