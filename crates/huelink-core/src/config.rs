// ── Bridge configuration ──
//
// `BridgeConfig` is the persisted identity of one paired bridge.
// Core never touches disk: values go through a `CredentialStore`, which the
// CLI backs with a file (huelink-config) and tests back with memory.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use huelink_api::discovery::PUBLIC_DISCOVERY_URL;
use huelink_api::tls::certificate_from_pem;
use huelink_api::transport::BRIDGE_PORT;
use huelink_api::{CertificateKind, DiscoveredBridge, PairingResult, PinnedCertificate, QueueSettings, TransportConfig};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::error::CoreError;

/// Names of the persisted values.
pub mod keys {
    pub const ID: &str = "bridge_id";
    pub const IP: &str = "bridge_ip";
    pub const USERNAME: &str = "bridge_username";
    pub const CERTIFICATE: &str = "bridge_certificate";
    pub const CERTIFICATE_TYPE: &str = "bridge_certificate_type";

    pub const ALL: [&str; 5] = [ID, IP, USERNAME, CERTIFICATE, CERTIFICATE_TYPE];
}

// ── CredentialStore ──────────────────────────────────────────────────

/// Named string storage for bridge credentials.
pub trait CredentialStore: Send + Sync {
    fn read(&self, name: &str) -> Result<Option<String>, CoreError>;
    fn write(&self, name: &str, value: &str) -> Result<(), CoreError>;
    fn remove(&self, name: &str) -> Result<(), CoreError>;
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn read(&self, name: &str) -> Result<Option<String>, CoreError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }

    fn write(&self, name: &str, value: &str) -> Result<(), CoreError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), CoreError> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).remove(name);
        Ok(())
    }
}

// ── BridgeConfig ─────────────────────────────────────────────────────

/// Everything needed to reconnect to a paired bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Stable bridge id: TLS server name and expected certificate CN.
    pub id: String,
    pub ip_address: IpAddr,
    /// Application key issued at pairing.
    pub username: SecretString,
    /// PEM of the certificate captured at pairing.
    pub certificate: String,
    pub certificate_type: CertificateKind,
}

impl BridgeConfig {
    /// Read a saved bridge.
    ///
    /// Returns `None` unless id, address, username, and certificate are all
    /// present and usable. A missing certificate type is re-derived from the
    /// certificate itself.
    pub fn load(store: &dyn CredentialStore) -> Result<Option<Self>, CoreError> {
        let id = store.read(keys::ID)?;
        let ip = store.read(keys::IP)?;
        let username = store.read(keys::USERNAME)?;
        let certificate = store.read(keys::CERTIFICATE)?;

        let (Some(id), Some(ip), Some(username), Some(certificate)) = (id, ip, username, certificate) else {
            debug!("no complete bridge configuration saved");
            return Ok(None);
        };

        let Ok(ip_address) = ip.parse::<IpAddr>() else {
            warn!(%ip, "saved bridge address is not an IP address; ignoring saved bridge");
            return Ok(None);
        };

        let certificate_type = match store.read(keys::CERTIFICATE_TYPE)? {
            Some(kind) => match kind.parse::<CertificateKind>() {
                Ok(kind) => kind,
                Err(_) => {
                    warn!(%kind, "unknown certificate type; ignoring saved bridge");
                    return Ok(None);
                }
            },
            None => match certificate_from_pem(&certificate).and_then(|der| CertificateKind::classify(&der)) {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(error = %e, "saved certificate is unreadable; ignoring saved bridge");
                    return Ok(None);
                }
            },
        };

        Ok(Some(Self {
            id,
            ip_address,
            username: SecretString::from(username),
            certificate,
            certificate_type,
        }))
    }

    /// Persist every field.
    pub fn save(&self, store: &dyn CredentialStore) -> Result<(), CoreError> {
        store.write(keys::ID, &self.id)?;
        store.write(keys::IP, &self.ip_address.to_string())?;
        store.write(keys::USERNAME, self.username.expose_secret())?;
        store.write(keys::CERTIFICATE, &self.certificate)?;
        store.write(keys::CERTIFICATE_TYPE, self.certificate_type.as_ref())?;
        Ok(())
    }

    /// Remove every persisted field.
    pub fn clear(store: &dyn CredentialStore) -> Result<(), CoreError> {
        for key in keys::ALL {
            store.remove(key)?;
        }
        Ok(())
    }

    /// Transport settings for connecting to this bridge.
    pub fn transport(&self, link: &LinkConfig) -> TransportConfig {
        let mut transport = TransportConfig::new(
            self.id.clone(),
            self.ip_address,
            PinnedCertificate {
                pem: self.certificate.clone(),
                kind: self.certificate_type,
            },
        );
        transport.connect_timeout = link.connect_timeout;
        transport.request_timeout = link.request_timeout;
        transport
    }

    /// The saved bridge as a pairing candidate, used when its key stops
    /// working.
    pub fn as_candidate(&self) -> DiscoveredBridge {
        DiscoveredBridge {
            id: self.id.clone(),
            address: self.ip_address,
            port: BRIDGE_PORT,
        }
    }
}

impl From<PairingResult> for BridgeConfig {
    fn from(paired: PairingResult) -> Self {
        Self {
            id: paired.bridge_id,
            ip_address: paired.address,
            username: paired.username,
            certificate: paired.certificate_pem,
            certificate_type: paired.certificate_kind,
        }
    }
}

// ── LinkConfig ───────────────────────────────────────────────────────

/// Tuning for discovery, pairing, and sessions.
///
/// Built by the caller (the CLI reads it from settings); core never reads
/// config files.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Public lookup endpoint.
    pub discovery_url: String,
    pub mdns_timeout: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub queues: QueueSettings,
    /// `app#device` name the bridge records for the issued key.
    pub device_type: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            discovery_url: PUBLIC_DISCOVERY_URL.to_owned(),
            mdns_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            queues: QueueSettings::default(),
            device_type: huelink_api::pairing::device_type("huelink", "cli"),
        }
    }
}
