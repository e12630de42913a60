//! Text formatting of scan responses for the wire protocol

use crate::host::HostRecord;

/// Acknowledgement sent as soon as a request is accepted
pub const SCAN_STARTED: &str = "Scan iniciado, aguarde...\n\n";

/// Sent instead of a host list when nothing answered
pub const NO_HOSTS: &str = "Nenhum host ativo encontrado na rede.\n";

/// Prefix of the single line sent for a rejected request
pub const ERROR_PREFIX: &str = "ERRO:";

/// Format a rejection line
pub fn format_error(message: &str) -> String {
    format!("{} {}\n", ERROR_PREFIX, message)
}

/// Format one host block, terminated by a blank line
pub fn format_host(host: &HostRecord) -> String {
    let mut lines = vec![
        format!("Nome DNS: {}", host.display_name()),
        format!("Endereço IP: {}", host.address),
        format!(
            "MAC Address: {}",
            host.link_address.map(|m| m.to_string()).unwrap_or_default()
        ),
        format!("Fabricante: {}", host.vendor.as_deref().unwrap_or_default()),
    ];
    for (label, value) in &host.management_info {
        lines.push(format!("{}: {}", label, value));
    }
    lines.join("\n") + "\n\n"
}

/// Format the full result section that follows [`SCAN_STARTED`]
pub fn format_report(hosts: &[HostRecord]) -> String {
    if hosts.is_empty() {
        return NO_HOSTS.to_string();
    }
    let mut out = format!("Hosts ativos encontrados ({}):\n\n", hosts.len());
    for host in hosts {
        out.push_str(&format_host(host));
    }
    out
}
