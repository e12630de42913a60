//! Configuration loading and validation

use anyhow::{Context, Result};
use hostscan_core::{Catalog, CatalogEntry};
use hostscan_discovery::{DiscoveryConfig as ProbeSettings, EnrichmentConfig, OnlineLookup, OuiTable};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
    #[serde(default)]
    pub vendor: VendorConfig,
    #[serde(default)]
    pub management: ManagementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the scan listener
    #[serde(default = "default_bind")]
    pub bind: String,
    /// How long to wait for the request after a client connects
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Largest request chunk read from a client
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_ms: default_request_timeout(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:35640".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_max_request_bytes() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Reachability timeout per host, also the ARP listen window
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Maximum reachability probes in flight
    #[serde(default = "default_max_probes")]
    pub max_probes: usize,
    /// Use ARP broadcast discovery
    #[serde(default = "default_true")]
    pub use_link_layer: bool,
    /// Interface for ARP broadcasts (default: the one attached to the target)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout(),
            max_probes: default_max_probes(),
            use_link_layer: true,
            interface: None,
        }
    }
}

fn default_probe_timeout() -> u64 {
    200
}

fn default_max_probes() -> usize {
    200
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Source invocations in flight across one scan
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Budget for each vendor, name or management call
    #[serde(default = "default_source_timeout")]
    pub source_timeout_ms: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            source_timeout_ms: default_source_timeout(),
        }
    }
}

fn default_max_workers() -> usize {
    30
}

fn default_source_timeout() -> u64 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    /// Query the lookup service for prefixes missing from the table
    #[serde(default = "default_true")]
    pub online_lookup: bool,
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
    /// Extra prefixes on top of the built-in table
    #[serde(default, rename = "oui", skip_serializing_if = "Vec::is_empty")]
    pub oui: Vec<OuiEntry>,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            online_lookup: true,
            lookup_url: default_lookup_url(),
            lookup_timeout_ms: default_lookup_timeout(),
            oui: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OuiEntry {
    /// First three octets, e.g. `"B8:27:EB"`
    pub prefix: String,
    pub name: String,
}

fn default_lookup_url() -> String {
    "https://api.macvendors.com".to_string()
}

fn default_lookup_timeout() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementConfig {
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    /// Per-request timeout
    #[serde(default = "default_snmp_timeout")]
    pub timeout_ms: u64,
    /// Attributes to query, in output order (default: built-in catalog)
    #[serde(default, rename = "descriptor", skip_serializing_if = "Option::is_none")]
    pub descriptors: Option<Vec<CatalogEntry>>,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            community: default_community(),
            port: default_snmp_port(),
            timeout_ms: default_snmp_timeout(),
            descriptors: None,
        }
    }
}

fn default_community() -> String {
    hostscan_snmp::DEFAULT_COMMUNITY.to_string()
}

fn default_snmp_port() -> u16 {
    hostscan_snmp::SNMP_PORT
}

fn default_snmp_timeout() -> u64 {
    hostscan_snmp::DEFAULT_TIMEOUT_MS
}

impl Config {
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            probe_timeout: Duration::from_millis(self.discovery.probe_timeout_ms),
            max_probes: self.discovery.max_probes,
            use_link_layer: self.discovery.use_link_layer,
        }
    }

    pub fn enrichment_config(&self) -> EnrichmentConfig {
        EnrichmentConfig {
            max_workers: self.enrichment.max_workers,
            source_timeout: Duration::from_millis(self.enrichment.source_timeout_ms),
            community: self.management.community.clone(),
            catalog: self.catalog(),
        }
    }

    pub fn catalog(&self) -> Catalog {
        match &self.management.descriptors {
            Some(entries) => Catalog::new(entries.clone()),
            None => Catalog::builtin(),
        }
    }

    pub fn oui_table(&self) -> OuiTable {
        OuiTable::with_entries(
            self.vendor
                .oui
                .iter()
                .map(|e| (e.prefix.as_str(), e.name.as_str())),
        )
    }

    pub fn online_lookup(&self) -> Option<OnlineLookup> {
        self.vendor.online_lookup.then(|| OnlineLookup {
            base_url: self.vendor.lookup_url.clone(),
            timeout: Duration::from_millis(self.vendor.lookup_timeout_ms),
        })
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let mut config = Config::default();
    config.management.descriptors = Some(hostscan_core::descriptor::builtin_entries());

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
