//! Hostscan Discovery - Host discovery and enrichment
//!
//! This crate provides:
//! - Collaborator traits for probes and lookup sources, with system
//!   implementations (ARP broadcast and neighbour table, `ping`, reverse
//!   lookup, OUI vendor table, SNMP)
//! - The discovery merger, combining link-layer and reachability results
//! - The enrichment coordinator, completing records under a bounded pool

pub mod arp;
pub mod enrich;
pub mod management;
pub mod merger;
pub mod names;
pub mod ping;
pub mod pipeline;
pub mod ports;
pub mod vendor;

pub use arp::{ArpBroadcastProbe, NeighbourTable};
pub use enrich::{EnrichmentConfig, EnrichmentCoordinator};
pub use management::SnmpManagementFetcher;
pub use merger::{merge_discoveries, DiscoveryConfig, DiscoveryMerger};
pub use names::SystemNameResolver;
pub use ping::PingProbe;
pub use pipeline::ScanPipeline;
pub use ports::{
    LinkAddressResolver, LinkLayerProbe, ManagementInfoFetcher, NameResolver, Probes,
    ReachabilityProbe, Sources, VendorResolver,
};
pub use vendor::{OnlineLookup, OuiTable, OuiVendorResolver};
