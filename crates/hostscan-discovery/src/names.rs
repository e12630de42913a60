//! Reverse name resolution through the system resolver

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::process::Stdio;
use tracing::trace;

use crate::ports::NameResolver;

/// Reverse lookups via `getent hosts`, which honours the NSS configuration
/// (hosts file, DNS, mDNS) the same way `gethostbyaddr` does.
#[derive(Debug, Clone, Default)]
pub struct SystemNameResolver;

impl SystemNameResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NameResolver for SystemNameResolver {
    async fn resolve_name(&self, ip: Ipv4Addr) -> Option<String> {
        let output = tokio::process::Command::new("getent")
            .args(["hosts", &ip.to_string()])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            trace!(ip = %ip, "No reverse entry");
            return None;
        }

        parse_getent_hosts(&String::from_utf8_lossy(&output.stdout), ip)
    }
}

/// Parse `getent hosts` output: `<address> <canonical-name> [aliases...]`
fn parse_getent_hosts(output: &str, ip: Ipv4Addr) -> Option<String> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let mut fields = line.split_whitespace();
    fields.next()?;
    let name = fields.next()?.trim_end_matches('.');
    if name.is_empty() || name == ip.to_string() {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_getent_hosts() {
        let ip = Ipv4Addr::new(192, 168, 1, 1);
        assert_eq!(
            parse_getent_hosts("192.168.1.1     router.lan router\n", ip).as_deref(),
            Some("router.lan")
        );
        assert_eq!(
            parse_getent_hosts("192.168.1.1 gw.example.com.\n", ip).as_deref(),
            Some("gw.example.com")
        );
    }

    #[test]
    fn test_parse_getent_hosts_empty() {
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        assert_eq!(parse_getent_hosts("", ip), None);
        assert_eq!(parse_getent_hosts("10.0.0.5\n", ip), None);
        assert_eq!(parse_getent_hosts("10.0.0.5 10.0.0.5\n", ip), None);
    }
}
