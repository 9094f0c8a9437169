// One-time pairing handshake.
//
// The bridge issues an application key only within a short window after its
// physical link button is pressed. Before that, the user-creation endpoint
// answers with error type 101, which the caller turns into a prompt.

use std::net::IpAddr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::tls::{self, CertificateKind};
use crate::transport;

const APP_NAME_MAX: usize = 20;
const DEVICE_NAME_MAX: usize = 19;

#[derive(Serialize)]
struct CreateUserBody<'a> {
    devicetype: &'a str,
    generateclientkey: bool,
}

#[derive(Deserialize)]
struct CreateUserItem {
    #[serde(default)]
    success: Option<CreateUserSuccess>,
    #[serde(default)]
    error: Option<CreateUserError>,
}

#[derive(Deserialize)]
struct CreateUserSuccess {
    username: String,
    #[serde(default)]
    clientkey: Option<String>,
}

#[derive(Deserialize)]
struct CreateUserError {
    #[serde(rename = "type")]
    error_type: u16,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct BridgeConfigResponse {
    bridgeid: String,
}

/// Credentials returned by a successful user-creation call.
#[derive(Debug)]
pub struct IssuedCredentials {
    pub username: SecretString,
    /// Streaming key; issued alongside the username, unused by this client.
    pub client_key: Option<SecretString>,
}

/// Everything learned from a successful pairing, ready to persist.
#[derive(Debug)]
pub struct PairingResult {
    pub bridge_id: String,
    pub address: IpAddr,
    pub username: SecretString,
    pub client_key: Option<SecretString>,
    pub certificate_pem: String,
    pub certificate_kind: CertificateKind,
}

/// `app#device`, each half cut to the length the bridge accepts.
pub fn device_type(app: &str, device: &str) -> String {
    let app: String = app.chars().take(APP_NAME_MAX).collect();
    let device: String = device.chars().take(DEVICE_NAME_MAX).collect();
    format!("{app}#{device}")
}

/// Ask the bridge at `base` to issue an application key.
pub async fn create_user(http: &reqwest::Client, base: &Url, devicetype: &str) -> Result<IssuedCredentials, Error> {
    let url = base.join("api")?;
    debug!("POST {url}");

    let resp = http
        .post(url)
        .json(&CreateUserBody {
            devicetype,
            generateclientkey: true,
        })
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Bridge {
            status: status.as_u16(),
            message: "user creation refused".into(),
        });
    }

    let body = resp.text().await?;
    let items: Vec<CreateUserItem> = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.clone(),
    })?;

    for item in items {
        if let Some(err) = item.error {
            return Err(Error::Pairing {
                error_type: err.error_type,
                description: err.description,
            });
        }
        if let Some(ok) = item.success {
            return Ok(IssuedCredentials {
                username: SecretString::from(ok.username),
                client_key: ok.clientkey.map(SecretString::from),
            });
        }
    }

    Err(Error::Pairing {
        error_type: 0,
        description: "bridge answered without success or error".into(),
    })
}

/// Read the bridge's stable id from its unauthenticated config endpoint.
pub async fn fetch_bridge_id(http: &reqwest::Client, base: &Url) -> Result<String, Error> {
    let url = base.join("api/0/config")?;
    debug!("GET {url}");

    let resp = http.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Bridge {
            status: status.as_u16(),
            message: "bridge config unavailable".into(),
        });
    }
    let config: BridgeConfigResponse = resp.json().await?;
    Ok(config.bridgeid.to_ascii_lowercase())
}

/// Run the full handshake against the bridge at `address`.
///
/// The bridge certificate is captured from this connection and checked
/// against the id the bridge reports, so the result can be pinned.
pub async fn pair(address: IpAddr, port: u16, devicetype: &str, timeout: Duration) -> Result<PairingResult, Error> {
    let (http, captured) = transport::pairing_client(timeout)?;
    let host = match address {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    };
    let base = Url::parse(&format!("https://{host}:{port}/"))?;

    let credentials = create_user(&http, &base, devicetype).await?;
    let bridge_id = fetch_bridge_id(&http, &base).await?;

    let der = captured
        .get()
        .ok_or_else(|| Error::Tls("bridge presented no certificate".into()))?;
    let kind = CertificateKind::classify(&der)?;
    tls::check_identity(&der, &bridge_id, kind)?;

    info!(bridge_id = %bridge_id, %address, %kind, "paired with bridge");
    Ok(PairingResult {
        bridge_id,
        address,
        username: credentials.username,
        client_key: credentials.client_key,
        certificate_pem: tls::certificate_to_pem(&der),
        certificate_kind: kind,
    })
}
