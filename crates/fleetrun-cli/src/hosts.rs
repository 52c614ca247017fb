//! Hosts file loading.
//!
//! One host per line, optionally followed by a comma-separated port
//! list. `#` comments and blank lines are skipped; malformed or
//! duplicate entries are logged and skipped rather than aborting the
//! sweep.

use std::collections::HashSet;
use std::io;
use std::path::Path;

use tracing::{info, warn};

use fleetrun_core::Endpoint;

/// Load endpoints from a hosts file.
pub fn load_hosts(path: &Path, default_ports: &[u16]) -> io::Result<Vec<Endpoint>> {
    let content = std::fs::read_to_string(path)?;
    let endpoints = parse_hosts(&content, default_ports);
    info!(
        file = %path.display(),
        endpoints = endpoints.len(),
        "loaded hosts file"
    );
    Ok(endpoints)
}

/// Parse hosts file content into endpoints. Each endpoint's command
/// list is its port list, one probe command per port.
pub fn parse_hosts(content: &str, default_ports: &[u16]) -> Vec<Endpoint> {
    let mut seen = HashSet::new();
    let mut endpoints = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let host = match fields.next() {
            Some(host) => host,
            None => continue,
        };

        let ports: Vec<u16> = match fields.next() {
            Some(spec) => {
                let parsed: Result<Vec<u16>, _> =
                    spec.split(',').map(|p| p.trim().parse::<u16>()).collect();
                match parsed {
                    Ok(ports) if !ports.is_empty() => ports,
                    _ => {
                        warn!(line = line_num + 1, host, spec, "skipping malformed port list");
                        continue;
                    }
                }
            }
            None => default_ports.to_vec(),
        };

        if !seen.insert(host.to_string()) {
            warn!(line = line_num + 1, host, "skipping duplicate host entry");
            continue;
        }

        endpoints.push(Endpoint::new(
            host,
            ports.iter().map(u16::to_string).collect(),
        ));
    }

    endpoints
}
