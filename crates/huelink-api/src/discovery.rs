// Bridge discovery: the vendor's public lookup service first, local mDNS
// as the offline fallback. Both only report candidates; nothing here talks
// to the bridge itself.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::transport::BRIDGE_PORT;

/// Public lookup endpoint listing bridges seen from the caller's public IP.
pub const PUBLIC_DISCOVERY_URL: &str = "https://discovery.meethue.com/";

/// mDNS service type bridges advertise.
pub const MDNS_SERVICE: &str = "_hue._tcp.local.";

/// A bridge found on the network, not yet paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredBridge {
    /// Stable bridge id, lower-case.
    pub id: String,
    pub address: IpAddr,
    pub port: u16,
}

#[derive(Deserialize)]
struct PublicEntry {
    id: String,
    internalipaddress: String,
    #[serde(default)]
    port: Option<u16>,
}

/// Ask the public lookup service which bridges share our network.
///
/// An empty list is a successful answer. Entries with an unparseable
/// address are skipped.
pub async fn discover_public(http: &reqwest::Client, url: &Url) -> Result<Vec<DiscoveredBridge>, Error> {
    debug!("GET {url}");

    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| Error::Discovery(format!("public lookup failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Discovery(format!("public lookup returned HTTP {status}")));
    }

    let entries: Vec<PublicEntry> = resp
        .json()
        .await
        .map_err(|e| Error::Discovery(format!("public lookup returned malformed data: {e}")))?;

    let bridges: Vec<_> = entries
        .into_iter()
        .filter_map(|entry| match entry.internalipaddress.parse() {
            Ok(address) => Some(DiscoveredBridge {
                id: entry.id.to_ascii_lowercase(),
                address,
                port: entry.port.unwrap_or(BRIDGE_PORT),
            }),
            Err(_) => {
                debug!(id = %entry.id, address = %entry.internalipaddress, "skipping bridge with bad address");
                None
            }
        })
        .collect();

    info!(count = bridges.len(), "public discovery finished");
    Ok(bridges)
}

/// Browse the local network for advertised bridges.
///
/// Returns as soon as one bridge resolves, or an empty list once `timeout`
/// elapses.
pub async fn discover_mdns(timeout: Duration) -> Result<Vec<DiscoveredBridge>, Error> {
    let daemon = ServiceDaemon::new().map_err(|e| Error::Discovery(format!("mDNS unavailable: {e}")))?;
    let events = daemon
        .browse(MDNS_SERVICE)
        .map_err(|e| Error::Discovery(format!("mDNS browse failed: {e}")))?;

    let deadline = Instant::now() + timeout;
    let mut seen = HashSet::new();
    let mut bridges = Vec::new();

    while bridges.is_empty() {
        let event = match tokio::time::timeout_at(deadline, events.recv_async()).await {
            Ok(Ok(event)) => event,
            Ok(Err(_)) => break,
            Err(_) => {
                debug!(?timeout, "mDNS browse timed out");
                break;
            }
        };

        let ServiceEvent::ServiceResolved(info) = event else {
            trace!(?event, "mDNS event");
            continue;
        };

        let Some(id) = info.get_property_val_str("bridgeid").map(str::to_ascii_lowercase) else {
            debug!(name = info.get_fullname(), "advertised bridge has no bridgeid record");
            continue;
        };
        let Some(address) = info.get_addresses().iter().find(|a| a.is_ipv4()).copied() else {
            continue;
        };
        if seen.insert(id.clone()) {
            bridges.push(DiscoveredBridge {
                id,
                address,
                port: info.get_port(),
            });
        }
    }

    if let Err(e) = daemon.shutdown() {
        warn!(error = %e, "failed to stop mDNS daemon");
    }

    info!(count = bridges.len(), "mDNS discovery finished");
    Ok(bridges)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn public_entry_tolerates_missing_port() {
        let entries: Vec<PublicEntry> =
            serde_json::from_str(r#"[{"id":"001788FFFE4A7B2C","internalipaddress":"192.168.1.20"}]"#).unwrap();
        assert_eq!(entries[0].port, None);
    }
}
