// Certificate pinning for bridge connections.
//
// Bridges never present a certificate that chains to a public CA. A session
// is trusted when the peer certificate is either byte-identical to the
// self-signed certificate captured at pairing time, or chains to the bundled
// vendor root. Independently of chain trust, the subject CN must equal the
// bridge id and the issuer CN must match the certificate kind.

use std::sync::{Arc, Mutex, PoisonError};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::verify_server_cert_signed_by_trust_anchor;
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, DigitallySignedStruct, OtherError, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use x509_parser::x509::X509Name;

use crate::error::Error;

/// Common name of the vendor root CA that signs factory bridge certificates.
pub const ROOT_BRIDGE_CN: &str = "root-bridge";

const ROOT_CA_PEM: &[u8] = include_bytes!("../certs/hue-root-ca.pem");

// ── CertificateKind ──────────────────────────────────────────────────

/// How a bridge certificate is anchored.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CertificateKind {
    /// The bridge signed its own certificate; pin that exact certificate.
    SelfSigned,
    /// The certificate chains to the bundled vendor root.
    SignedByRootCa,
}

impl CertificateKind {
    /// Classify a DER certificate by its issuer common name.
    pub fn classify(der: &[u8]) -> Result<Self, Error> {
        let names = CertificateNames::from_der(der)?;
        Ok(if names.issuer.as_deref() == Some(ROOT_BRIDGE_CN) {
            Self::SignedByRootCa
        } else {
            Self::SelfSigned
        })
    }

    /// The issuer CN a valid certificate of this kind must carry.
    fn expected_issuer<'a>(self, bridge_id: &'a str) -> &'a str {
        match self {
            Self::SelfSigned => bridge_id,
            Self::SignedByRootCa => ROOT_BRIDGE_CN,
        }
    }
}

// ── Certificate names ────────────────────────────────────────────────

/// Subject and issuer common names extracted from a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateNames {
    pub subject: Option<String>,
    pub issuer: Option<String>,
}

impl CertificateNames {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| Error::Tls(format!("unparseable certificate: {e}")))?;
        Ok(Self {
            subject: common_name(cert.subject()),
            issuer: common_name(cert.issuer()),
        })
    }
}

fn common_name(name: &X509Name<'_>) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_owned)
}

/// A peer certificate whose names do not match the configured bridge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("peer certificate {subject:?} / {issuer:?} does not identify bridge {expected}")]
pub struct IdentityMismatch {
    pub expected: String,
    pub subject: Option<String>,
    pub issuer: Option<String>,
}

impl From<IdentityMismatch> for Error {
    fn from(m: IdentityMismatch) -> Self {
        Error::Identity {
            expected: m.expected,
            subject: m.subject,
            issuer: m.issuer,
        }
    }
}

/// Check that a certificate names the bridge it is supposed to belong to.
///
/// The subject CN must equal `bridge_id`. The issuer CN must equal
/// `bridge_id` for self-signed certificates, or [`ROOT_BRIDGE_CN`] for
/// certificates signed by the vendor root. Bridge ids are hex, so the
/// comparison ignores ASCII case.
pub fn check_identity(der: &[u8], bridge_id: &str, kind: CertificateKind) -> Result<(), Error> {
    let names = CertificateNames::from_der(der)?;
    let subject_ok = names
        .subject
        .as_deref()
        .is_some_and(|cn| cn.eq_ignore_ascii_case(bridge_id));
    let issuer_ok = names
        .issuer
        .as_deref()
        .is_some_and(|cn| cn.eq_ignore_ascii_case(kind.expected_issuer(bridge_id)));

    if subject_ok && issuer_ok {
        Ok(())
    } else {
        Err(IdentityMismatch {
            expected: bridge_id.to_owned(),
            subject: names.subject,
            issuer: names.issuer,
        }
        .into())
    }
}

/// Decode the first certificate of a PEM blob.
pub fn certificate_from_pem(pem: &str) -> Result<CertificateDer<'static>, Error> {
    CertificateDer::from_pem_slice(pem.as_bytes())
        .map_err(|e| Error::Tls(format!("invalid certificate PEM: {e}")))
}

/// Encode a DER certificate as PEM for persistence.
pub fn certificate_to_pem(der: &CertificateDer<'_>) -> String {
    use base64::{Engine, engine::general_purpose::STANDARD};

    let encoded = STANDARD.encode(der.as_ref());
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

fn vendor_roots() -> Result<RootCertStore, Error> {
    let root = CertificateDer::from_pem_slice(ROOT_CA_PEM)
        .map_err(|e| Error::Tls(format!("bundled root certificate is invalid: {e}")))?;
    let mut roots = RootCertStore::empty();
    roots
        .add(root)
        .map_err(|e| Error::Tls(format!("bundled root certificate rejected: {e}")))?;
    Ok(roots)
}

pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a client config around a custom verifier, offering h2 first.
pub(crate) fn client_config(
    verifier: Arc<dyn ServerCertVerifier>,
    provider: Arc<CryptoProvider>,
) -> Result<rustls::ClientConfig, Error> {
    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("unsupported protocol versions: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

// ── IdentityProbe ────────────────────────────────────────────────────

/// Records the most recent identity mismatch seen by a verifier.
///
/// The TLS stack only surfaces an opaque handshake failure; the probe lets
/// the client report [`Error::Identity`] instead.
#[derive(Debug, Clone, Default)]
pub struct IdentityProbe {
    last: Arc<Mutex<Option<IdentityMismatch>>>,
}

impl IdentityProbe {
    fn record(&self, mismatch: IdentityMismatch) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(mismatch);
    }

    /// Take the recorded mismatch, if any.
    pub fn take(&self) -> Option<IdentityMismatch> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

// ── PinnedVerifier ───────────────────────────────────────────────────

#[derive(Debug)]
enum Anchor {
    SelfSigned(CertificateDer<'static>),
    RootCa(Arc<RootCertStore>),
}

/// Verifies a bridge certificate against its pin and its expected names.
#[derive(Debug)]
pub struct PinnedVerifier {
    bridge_id: String,
    kind: CertificateKind,
    anchor: Anchor,
    provider: Arc<CryptoProvider>,
    probe: IdentityProbe,
}

impl PinnedVerifier {
    /// Build a verifier for `bridge_id`.
    ///
    /// For [`CertificateKind::SelfSigned`] the `certificate_pem` is the pin;
    /// for [`CertificateKind::SignedByRootCa`] the bundled root is the anchor
    /// and `certificate_pem` is not consulted.
    pub fn new(
        bridge_id: &str,
        kind: CertificateKind,
        certificate_pem: &str,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, Error> {
        let anchor = match kind {
            CertificateKind::SelfSigned => Anchor::SelfSigned(certificate_from_pem(certificate_pem)?),
            CertificateKind::SignedByRootCa => Anchor::RootCa(Arc::new(vendor_roots()?)),
        };
        Ok(Self {
            bridge_id: bridge_id.to_owned(),
            kind,
            anchor,
            provider,
            probe: IdentityProbe::default(),
        })
    }

    /// Handle to the mismatch recorder shared with this verifier.
    pub fn probe(&self) -> IdentityProbe {
        self.probe.clone()
    }

    fn verify_chain(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<(), rustls::Error> {
        match &self.anchor {
            Anchor::SelfSigned(pinned) => {
                if end_entity.as_ref() == pinned.as_ref() {
                    Ok(())
                } else {
                    debug!(bridge_id = %self.bridge_id, "peer certificate differs from pinned certificate");
                    Err(rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer))
                }
            }
            Anchor::RootCa(roots) => {
                let cert = ParsedCertificate::try_from(end_entity)?;
                verify_server_cert_signed_by_trust_anchor(
                    &cert,
                    roots,
                    intermediates,
                    now,
                    self.provider.signature_verification_algorithms.all,
                )
            }
        }
    }
}

impl ServerCertVerifier for PinnedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        // Identity first: a mismatch is reported as such even when the
        // chain would also have failed.
        match check_identity(end_entity.as_ref(), &self.bridge_id, self.kind) {
            Ok(()) => {}
            Err(Error::Identity {
                expected,
                subject,
                issuer,
            }) => {
                let mismatch = IdentityMismatch {
                    expected,
                    subject,
                    issuer,
                };
                warn!(%mismatch, "rejecting bridge certificate");
                self.probe.record(mismatch.clone());
                return Err(rustls::Error::InvalidCertificate(CertificateError::Other(
                    OtherError(Arc::new(mismatch)),
                )));
            }
            Err(_) => return Err(rustls::Error::InvalidCertificate(CertificateError::BadEncoding)),
        }

        self.verify_chain(end_entity, intermediates, now)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// ── CapturingVerifier ────────────────────────────────────────────────

/// Trust-on-first-use verifier used only while pairing.
///
/// Accepts whatever certificate the bridge presents (handshake signatures
/// are still checked) and keeps a copy so it can be pinned afterwards.
#[derive(Debug)]
pub struct CapturingVerifier {
    captured: Arc<Mutex<Option<CertificateDer<'static>>>>,
    provider: Arc<CryptoProvider>,
}

impl CapturingVerifier {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self {
            captured: Arc::new(Mutex::new(None)),
            provider,
        }
    }

    /// Shared slot that receives the peer certificate.
    pub fn slot(&self) -> CapturedCertificate {
        CapturedCertificate {
            inner: Arc::clone(&self.captured),
        }
    }
}

/// The certificate a [`CapturingVerifier`] saw, once a handshake happened.
#[derive(Debug, Clone)]
pub struct CapturedCertificate {
    inner: Arc<Mutex<Option<CertificateDer<'static>>>>,
}

impl CapturedCertificate {
    pub fn get(&self) -> Option<CertificateDer<'static>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ServerCertVerifier for CapturingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        *self.captured.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(end_entity.clone().into_owned());
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SELF_SIGNED: &str = include_str!("../tests/fixtures/bridge-self-signed.pem");
    const OTHER_BRIDGE: &str = include_str!("../tests/fixtures/other-bridge.pem");
    const ROOT_SIGNED: &str = include_str!("../tests/fixtures/bridge-root-signed.pem");
    const BRIDGE_ID: &str = "001788fffe4a7b2c";

    fn der(pem: &str) -> CertificateDer<'static> {
        certificate_from_pem(pem).unwrap()
    }

    fn now() -> UnixTime {
        UnixTime::since_unix_epoch(std::time::Duration::from_secs(1_750_000_000))
    }

    fn server_name() -> ServerName<'static> {
        ServerName::try_from(BRIDGE_ID).unwrap()
    }

    #[test]
    fn names_are_extracted() {
        let names = CertificateNames::from_der(der(ROOT_SIGNED).as_ref()).unwrap();
        assert_eq!(names.subject.as_deref(), Some(BRIDGE_ID));
        assert_eq!(names.issuer.as_deref(), Some(ROOT_BRIDGE_CN));
    }

    #[test]
    fn classify_by_issuer() {
        assert_eq!(
            CertificateKind::classify(der(SELF_SIGNED).as_ref()).unwrap(),
            CertificateKind::SelfSigned
        );
        assert_eq!(
            CertificateKind::classify(der(ROOT_SIGNED).as_ref()).unwrap(),
            CertificateKind::SignedByRootCa
        );
    }

    #[test]
    fn kind_round_trips_through_its_tag() {
        assert_eq!(CertificateKind::SignedByRootCa.to_string(), "signed-by-root-ca");
        assert_eq!(
            "self-signed".parse::<CertificateKind>().unwrap(),
            CertificateKind::SelfSigned
        );
    }

    #[test]
    fn identity_accepts_matching_self_signed() {
        check_identity(der(SELF_SIGNED).as_ref(), BRIDGE_ID, CertificateKind::SelfSigned).unwrap();
    }

    #[test]
    fn identity_accepts_matching_root_signed() {
        check_identity(der(ROOT_SIGNED).as_ref(), BRIDGE_ID, CertificateKind::SignedByRootCa)
            .unwrap();
    }

    #[test]
    fn identity_rejects_other_bridge() {
        let err = check_identity(der(OTHER_BRIDGE).as_ref(), BRIDGE_ID, CertificateKind::SelfSigned)
            .unwrap_err();
        assert!(matches!(err, Error::Identity { ref expected, .. } if expected == BRIDGE_ID));
    }

    #[test]
    fn identity_rejects_wrong_issuer_for_kind() {
        // Subject matches, but a self-signed certificate cannot pass as root-signed.
        let err = check_identity(der(SELF_SIGNED).as_ref(), BRIDGE_ID, CertificateKind::SignedByRootCa)
            .unwrap_err();
        assert!(matches!(err, Error::Identity { .. }));
    }

    #[test]
    fn pinned_verifier_accepts_pinned_certificate() {
        let verifier =
            PinnedVerifier::new(BRIDGE_ID, CertificateKind::SelfSigned, SELF_SIGNED, crypto_provider())
                .unwrap();
        let result = verifier.verify_server_cert(&der(SELF_SIGNED), &[], &server_name(), &[], now());
        assert!(result.is_ok());
        assert!(verifier.probe().take().is_none());
    }

    #[test]
    fn pinned_verifier_rejects_cn_mismatch_even_when_pin_matches() {
        // The pin is the other bridge's own certificate, so chain trust alone
        // would pass; the CN check must still fail the handshake.
        let verifier =
            PinnedVerifier::new(BRIDGE_ID, CertificateKind::SelfSigned, OTHER_BRIDGE, crypto_provider())
                .unwrap();
        let result = verifier.verify_server_cert(&der(OTHER_BRIDGE), &[], &server_name(), &[], now());
        assert!(result.is_err());

        let mismatch = verifier.probe().take().unwrap();
        assert_eq!(mismatch.expected, BRIDGE_ID);
        assert_eq!(mismatch.subject.as_deref(), Some("001788fffe000001"));
    }

    #[test]
    fn pinned_verifier_rejects_unpinned_certificate() {
        let verifier =
            PinnedVerifier::new(BRIDGE_ID, CertificateKind::SelfSigned, OTHER_BRIDGE, crypto_provider())
                .unwrap();
        let result = verifier.verify_server_cert(&der(SELF_SIGNED), &[], &server_name(), &[], now());
        assert!(result.is_err());
        // Names were fine; only the pin failed.
        assert!(verifier.probe().take().is_none());
    }

    #[test]
    fn root_verifier_rejects_leaf_not_signed_by_vendor_root() {
        // The fixture leaf is signed by a look-alike "root-bridge" CA, not the bundled one.
        let verifier =
            PinnedVerifier::new(BRIDGE_ID, CertificateKind::SignedByRootCa, "", crypto_provider())
                .unwrap();
        let result = verifier.verify_server_cert(&der(ROOT_SIGNED), &[], &server_name(), &[], now());
        assert!(result.is_err());
        assert!(verifier.probe().take().is_none());
    }

    #[test]
    fn capturing_verifier_keeps_peer_certificate() {
        let verifier = CapturingVerifier::new(crypto_provider());
        let slot = verifier.slot();
        assert!(slot.get().is_none());

        verifier
            .verify_server_cert(&der(SELF_SIGNED), &[], &server_name(), &[], now())
            .unwrap();
        assert_eq!(slot.get().unwrap(), der(SELF_SIGNED));
    }

    #[test]
    fn pem_round_trip_preserves_der() {
        let original = der(ROOT_SIGNED);
        let pem = certificate_to_pem(&original);
        assert_eq!(certificate_from_pem(&pem).unwrap(), original);
    }
}
