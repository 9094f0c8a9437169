// Shared transport configuration for building reqwest::Client instances.
//
// The bridge is always addressed by its id, never by IP: the id is the TLS
// server name and the certificate CN. A per-host resolve override maps the
// id to the bridge address; every other host goes through system DNS.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::tls::{self, CapturedCertificate, CapturingVerifier, CertificateKind, IdentityProbe, PinnedVerifier};

/// HTTPS port the bridge serves both the resource API and the event stream on.
pub const BRIDGE_PORT: u16 = 443;

const USER_AGENT: &str = concat!("huelink/", env!("CARGO_PKG_VERSION"));

/// Certificate material used to authenticate one bridge.
#[derive(Debug, Clone)]
pub struct PinnedCertificate {
    /// PEM text of the bridge certificate captured during pairing.
    pub pem: String,
    pub kind: CertificateKind,
}

/// Everything needed to open a pinned session to one bridge.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Stable bridge id (lower-case hex); TLS server name and expected CN.
    pub bridge_id: String,
    /// Current network address of the bridge.
    pub address: IpAddr,
    pub port: u16,
    pub certificate: PinnedCertificate,
    /// Upper bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Upper bound on a single request/response exchange.
    pub request_timeout: Duration,
}

impl TransportConfig {
    pub fn new(bridge_id: impl Into<String>, address: IpAddr, certificate: PinnedCertificate) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            address,
            port: BRIDGE_PORT,
            certificate,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// `https://{bridge_id}:{port}/`
    pub fn base_url(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!("https://{}:{}/", self.bridge_id, self.port))?)
    }

    /// Build a pinned `reqwest::Client` for this bridge.
    ///
    /// One client carries both requests and the event stream. It has no
    /// total timeout; callers bound each request with `request_timeout`.
    ///
    /// The returned [`IdentityProbe`] reports whether a failed handshake was
    /// caused by a certificate naming some other bridge.
    pub fn build_client(&self) -> Result<(reqwest::Client, IdentityProbe), Error> {
        let provider = tls::crypto_provider();
        let verifier = PinnedVerifier::new(
            &self.bridge_id,
            self.certificate.kind,
            &self.certificate.pem,
            Arc::clone(&provider),
        )?;
        let probe = verifier.probe();
        let tls = tls::client_config(Arc::new(verifier), provider)?;

        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .resolve(&self.bridge_id, SocketAddr::new(self.address, self.port))
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))?;

        Ok((http, probe))
    }
}

/// Build a client for the pairing handshake, which happens before any
/// certificate is known.
///
/// The bridge is addressed by IP; its certificate is accepted and captured
/// so it can be pinned once pairing succeeds.
pub fn pairing_client(timeout: Duration) -> Result<(reqwest::Client, CapturedCertificate), Error> {
    let provider = tls::crypto_provider();
    let verifier = CapturingVerifier::new(Arc::clone(&provider));
    let slot = verifier.slot();
    let tls = tls::client_config(Arc::new(verifier), provider)?;

    let http = reqwest::Client::builder()
        .use_preconfigured_tls(tls)
        .connect_timeout(timeout)
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))?;

    Ok((http, slot))
}

/// Build a plain client for public endpoints (cloud discovery).
pub fn public_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const SELF_SIGNED: &str = include_str!("../tests/fixtures/bridge-self-signed.pem");

    fn config() -> TransportConfig {
        TransportConfig::new(
            "001788fffe4a7b2c",
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            PinnedCertificate {
                pem: SELF_SIGNED.into(),
                kind: CertificateKind::SelfSigned,
            },
        )
    }

    #[test]
    fn base_url_uses_bridge_id_not_ip() {
        let url = config().base_url().unwrap();
        assert_eq!(url.host_str(), Some("001788fffe4a7b2c"));
        assert_eq!(url.as_str(), "https://001788fffe4a7b2c/");
    }

    #[test]
    fn defaults_are_bounded() {
        let cfg = config();
        assert_eq!(cfg.port, BRIDGE_PORT);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(5));
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn client_builds_from_valid_pin() {
        assert!(config().build_client().is_ok());
    }

    #[test]
    fn invalid_pin_is_a_tls_error() {
        let mut cfg = config();
        cfg.certificate.pem = "not a certificate".into();
        assert!(matches!(cfg.build_client(), Err(Error::Tls(_))));
    }
}
