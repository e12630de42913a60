//! Manufacturer lookup by hardware address prefix

use async_trait::async_trait;
use hostscan_core::host::UNKNOWN_VENDOR;
use hostscan_core::LinkAddress;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::ports::VendorResolver;

/// Well-known prefixes resolved without a network round-trip
const BUILTIN_OUI: &[(&str, &str)] = &[
    ("00:1A:2B", "Cisco"),
    ("00:1B:63", "Apple"),
    ("00:1C:B3", "Dell"),
    ("00:09:6B", "Intel"),
    ("00:0C:29", "VMware"),
    ("00:50:56", "VMware"),
    ("F4:5C:89", "Samsung"),
    ("3C:5A:B4", "Google"),
    ("FC:FB:FB", "Amazon"),
    ("00:15:5D", "Microsoft"),
    ("B8:27:EB", "Raspberry Pi"),
    ("DC:A6:32", "TP-Link"),
    ("D8:CB:8A", "Xiaomi"),
    ("00:1E:C2", "Hewlett Packard"),
    ("00:21:5A", "ASUSTek"),
    ("00:25:9C", "Hon Hai (Foxconn)"),
    ("00:0D:93", "Sony"),
    ("00:13:CE", "Nintendo"),
    ("00:17:88", "LG"),
    ("00:18:82", "Motorola"),
    ("00:1D:D8", "Lenovo"),
    ("00:1D:72", "Acer"),
];

/// Immutable prefix → manufacturer table
#[derive(Debug, Clone)]
pub struct OuiTable {
    entries: HashMap<[u8; 3], String>,
}

impl OuiTable {
    /// Built-in table extended with `extra` (`"AA:BB:CC"`, name) pairs.
    /// Extra entries override built-in ones; malformed prefixes are skipped.
    pub fn with_entries<'a>(extra: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut table = Self {
            entries: HashMap::new(),
        };
        for &(prefix, name) in BUILTIN_OUI {
            table.insert(prefix, name);
        }
        for (prefix, name) in extra {
            table.insert(prefix, name);
        }
        table
    }

    fn insert(&mut self, prefix: &str, name: &str) {
        match parse_prefix(prefix) {
            Some(oui) => {
                self.entries.insert(oui, name.to_string());
            }
            None => debug!(prefix = prefix, "Ignoring malformed OUI prefix"),
        }
    }

    pub fn builtin() -> Self {
        Self::with_entries(std::iter::empty())
    }

    pub fn lookup(&self, mac: LinkAddress) -> Option<&str> {
        self.entries.get(&mac.oui()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse `AA:BB:CC`, `aa-bb-cc` or `aabb.cc` into prefix bytes
fn parse_prefix(prefix: &str) -> Option<[u8; 3]> {
    let hex: String = prefix
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([byte(0)?, byte(2)?, byte(4)?])
}

/// Remote lookup service settings
#[derive(Debug, Clone)]
pub struct OnlineLookup {
    pub base_url: String,
    pub timeout: Duration,
}

/// Vendor resolver backed by the local table and an optional web service
pub struct OuiVendorResolver {
    table: Arc<OuiTable>,
    online: Option<(reqwest::Client, OnlineLookup)>,
}

impl OuiVendorResolver {
    pub fn new(table: Arc<OuiTable>) -> Self {
        Self {
            table,
            online: None,
        }
    }

    /// Fall back to `GET <base_url>/<AA-BB-CC>` for prefixes missing locally
    pub fn with_online_lookup(mut self, lookup: OnlineLookup) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(lookup.timeout).build()?;
        self.online = Some((client, lookup));
        Ok(self)
    }

    async fn lookup_online(&self, mac: LinkAddress) -> Option<String> {
        let (client, lookup) = self.online.as_ref()?;
        let [a, b, c] = mac.oui();
        let url = format!(
            "{}/{:02X}-{:02X}-{:02X}",
            lookup.base_url.trim_end_matches('/'),
            a,
            b,
            c
        );

        let response = match client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                trace!(url = %url, status = %r.status(), "Vendor lookup miss");
                return None;
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Vendor lookup failed");
                return None;
            }
        };

        let body = response.text().await.ok()?;
        let vendor = body.trim();
        if vendor.is_empty() {
            None
        } else {
            Some(vendor.to_string())
        }
    }
}

#[async_trait]
impl VendorResolver for OuiVendorResolver {
    async fn resolve_vendor(&self, mac: LinkAddress) -> String {
        if let Some(name) = self.table.lookup(mac) {
            return name.to_string();
        }
        self.lookup_online(mac)
            .await
            .unwrap_or_else(|| UNKNOWN_VENDOR.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(s: &str) -> LinkAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let table = OuiTable::builtin();
        assert_eq!(table.lookup(mac("b8:27:eb:12:34:56")), Some("Raspberry Pi"));
        assert_eq!(table.lookup(mac("00-50-56-AA-BB-CC")), Some("VMware"));
        assert_eq!(table.lookup(mac("02:00:00:00:00:01")), None);
        assert_eq!(table.len(), BUILTIN_OUI.len());
    }

    #[test]
    fn test_extra_entries_override_and_extend() {
        let table = OuiTable::with_entries([
            ("02:00:00", "Lab Gear"),
            ("00:0c:29", "VMware Inc."),
            ("nonsense", "Ignored"),
        ]);
        assert_eq!(table.lookup(mac("02:00:00:00:00:01")), Some("Lab Gear"));
        assert_eq!(table.lookup(mac("00:0c:29:01:02:03")), Some("VMware Inc."));
        assert_eq!(table.len(), BUILTIN_OUI.len() + 1);
    }

    #[tokio::test]
    async fn test_resolver_without_online_lookup() {
        let resolver = OuiVendorResolver::new(Arc::new(OuiTable::builtin()));
        assert_eq!(resolver.resolve_vendor(mac("00:15:5d:00:00:01")).await, "Microsoft");
        assert_eq!(resolver.resolve_vendor(mac("02:00:00:00:00:01")).await, UNKNOWN_VENDOR);
    }

    #[tokio::test]
    async fn test_unreachable_service_yields_unknown() {
        let resolver = OuiVendorResolver::new(Arc::new(OuiTable::builtin()))
            .with_online_lookup(OnlineLookup {
                base_url: "http://127.0.0.1:9".to_string(),
                timeout: Duration::from_millis(200),
            })
            .unwrap();
        assert_eq!(resolver.resolve_vendor(mac("02:00:00:00:00:01")).await, UNKNOWN_VENDOR);
    }
}
