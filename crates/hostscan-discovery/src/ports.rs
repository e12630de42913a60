//! Collaborator interfaces consumed by discovery and enrichment
//!
//! Each probe or lookup source sits behind a trait so the merger and the
//! coordinator can be driven by the system implementations in this crate
//! or by in-memory fakes.

use async_trait::async_trait;
use hostscan_core::{Catalog, LinkAddress, TargetRange};
use indexmap::IndexMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Broadcast discovery of the local segment
#[async_trait]
pub trait LinkLayerProbe: Send + Sync {
    /// Run one broadcast round over `range`, collecting replies for `wait`.
    ///
    /// An `Err` means the mechanism itself is unavailable (no capable
    /// interface, insufficient privileges), not that nobody answered.
    async fn probe(
        &self,
        range: &TargetRange,
        wait: Duration,
    ) -> anyhow::Result<Vec<(Ipv4Addr, LinkAddress)>>;
}

/// Echo-style liveness check of one address
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self, ip: Ipv4Addr, timeout: Duration) -> bool;
}

/// Point lookup of one address's hardware address
#[async_trait]
pub trait LinkAddressResolver: Send + Sync {
    /// `Ok(None)` when the address is simply unknown
    async fn resolve_link_address(&self, ip: Ipv4Addr) -> anyhow::Result<Option<LinkAddress>>;
}

/// Manufacturer lookup by hardware address
#[async_trait]
pub trait VendorResolver: Send + Sync {
    /// Never fails; unknown prefixes yield [`hostscan_core::host::UNKNOWN_VENDOR`]
    async fn resolve_vendor(&self, mac: LinkAddress) -> String;
}

/// Reverse name lookup
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_name(&self, ip: Ipv4Addr) -> Option<String>;
}

/// Management-protocol attribute fetcher
#[async_trait]
pub trait ManagementInfoFetcher: Send + Sync {
    /// Label to value for every catalog entry that answered, in catalog order
    async fn fetch_management_info(
        &self,
        ip: Ipv4Addr,
        community: &str,
        catalog: &Catalog,
    ) -> IndexMap<String, String>;
}

/// Probes used by the discovery merger
#[derive(Clone)]
pub struct Probes {
    pub link_layer: Arc<dyn LinkLayerProbe>,
    pub reachability: Arc<dyn ReachabilityProbe>,
    pub link_address: Arc<dyn LinkAddressResolver>,
}

/// Sources used by the enrichment coordinator
#[derive(Clone)]
pub struct Sources {
    pub vendor: Arc<dyn VendorResolver>,
    pub names: Arc<dyn NameResolver>,
    pub management: Arc<dyn ManagementInfoFetcher>,
}
