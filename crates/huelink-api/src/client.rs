// Bridge API HTTP client
//
// Wraps `reqwest::Client` with bridge URL construction, the CLIP v2
// `{ errors, data }` envelope, and one rate-limited queue per mutating
// resource class. Reads go straight to the bridge; writes wait their turn
// in the queue for their class.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::events::EventStreamHandle;
use crate::models::{GroupedLight, Light, LightUpdate, Resource, ResourceKind, Room, Scene, SceneRecall, Zone};
use crate::queue::{QueueConfig, RateLimitedQueue};
use crate::tls::IdentityProbe;
use crate::transport::TransportConfig;

/// Header carrying the application key on every authenticated request.
pub(crate) const APP_KEY_HEADER: &str = "hue-application-key";

const VERIFY_PATH: &str = "clip/v2/resource/bridge";
const EVENT_STREAM_PATH: &str = "eventstream/clip/v2";

/// Request timeout for clients built with [`BridgeClient::with_client`].
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_PREVIEW_LEN: usize = 200;

/// Individual lights tolerate a faster command rate than groups.
pub const LIGHT_QUEUE: QueueConfig = QueueConfig {
    requests_per_second: 10.0,
    max_queue_length: Some(25),
};

/// Grouped lights and scene recalls fan out inside the bridge; keep them slow.
pub const GROUP_QUEUE: QueueConfig = QueueConfig {
    requests_per_second: 1.0,
    max_queue_length: Some(5),
};

// ── Envelope ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    errors: Vec<EnvelopeError>,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    description: String,
}

// ── Queues ───────────────────────────────────────────────────────────

/// Rate limits for the two command queues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueSettings {
    pub lights: QueueConfig,
    pub groups: QueueConfig,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            lights: LIGHT_QUEUE,
            groups: GROUP_QUEUE,
        }
    }
}

#[derive(Debug)]
struct CommandQueues {
    lights: RateLimitedQueue,
    groups: RateLimitedQueue,
}

impl CommandQueues {
    fn new(settings: QueueSettings) -> Self {
        Self {
            lights: RateLimitedQueue::new("lights", settings.lights),
            groups: RateLimitedQueue::new("groups", settings.groups),
        }
    }
}

// ── BridgeClient ─────────────────────────────────────────────────────

/// Authenticated client for one paired bridge.
///
/// Cheap to clone; clones share the HTTP connection pool and the command
/// queues, so rate limits hold across every clone. Requests and the event
/// stream go over the same pinned client.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
    app_key: SecretString,
    probe: Option<IdentityProbe>,
    queues: Arc<CommandQueues>,
}

impl BridgeClient {
    /// Build a pinned client for the bridge described by `transport`.
    ///
    /// No request is made; call [`verify`](Self::verify) to confirm the
    /// bridge is reachable and accepts the key.
    pub fn connect(transport: &TransportConfig, app_key: SecretString, queues: QueueSettings) -> Result<Self, Error> {
        let (http, probe) = transport.build_client()?;
        let base_url = transport.base_url()?;
        Ok(Self {
            http,
            base_url,
            request_timeout: transport.request_timeout,
            app_key,
            probe: Some(probe),
            queues: Arc::new(CommandQueues::new(queues)),
        })
    }

    /// Create a client over a pre-built `reqwest::Client`.
    ///
    /// Used against plain-HTTP test servers; no identity pinning applies.
    pub fn with_client(http: reqwest::Client, base_url: Url, app_key: SecretString, queues: QueueSettings) -> Self {
        Self {
            http,
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            app_key,
            probe: None,
            queues: Arc::new(CommandQueues::new(queues)),
        }
    }

    /// Bound each request/response exchange by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Number of light commands admitted but not yet settled.
    pub fn pending_light_commands(&self) -> usize {
        self.queues.lights.pending()
    }

    /// Number of group and scene commands admitted but not yet settled.
    pub fn pending_group_commands(&self) -> usize {
        self.queues.groups.pending()
    }

    // ── Verification ─────────────────────────────────────────────────

    /// Issue one authenticated request to confirm the session.
    ///
    /// HTTP 403 maps to [`Error::CredentialRejected`]; any other
    /// non-success status to [`Error::Bridge`].
    pub async fn verify(&self) -> Result<(), Error> {
        let url = self.url(VERIFY_PATH)?;
        debug!("GET {url} (verify)");

        let resp = send(self.authed(self.http.get(url)), self.probe.as_ref(), self.request_timeout).await?;
        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::CredentialRejected);
        }
        read_envelope::<Value>(resp).await?;
        debug!(%status, "bridge verified");
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn get_lights(&self) -> Result<Vec<Light>, Error> {
        self.get_all::<Light>().await
    }

    pub async fn get_grouped_lights(&self) -> Result<Vec<GroupedLight>, Error> {
        self.get_all::<GroupedLight>().await
    }

    pub async fn get_rooms(&self) -> Result<Vec<Room>, Error> {
        self.get_all::<Room>().await
    }

    pub async fn get_zones(&self) -> Result<Vec<Zone>, Error> {
        self.get_all::<Zone>().await
    }

    pub async fn get_scenes(&self) -> Result<Vec<Scene>, Error> {
        self.get_all::<Scene>().await
    }

    /// Fetch a whole collection of one resource class.
    pub async fn get_all<R: Resource>(&self) -> Result<Vec<R>, Error> {
        let url = self.url(&R::KIND.collection_path())?;
        debug!("GET {url}");
        let resp = send(self.authed(self.http.get(url)), self.probe.as_ref(), self.request_timeout).await?;
        read_envelope(resp).await
    }

    /// Fetch one resource by id; `None` if the bridge returned no record.
    pub async fn get_one<R: Resource>(&self, id: &str) -> Result<Option<R>, Error> {
        let url = self.url(&R::KIND.item_path(id))?;
        debug!("GET {url}");
        let resp = send(self.authed(self.http.get(url)), self.probe.as_ref(), self.request_timeout).await?;
        Ok(read_envelope(resp).await?.into_iter().next())
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Queue a state change for one light.
    ///
    /// Resolves with the bridge's acknowledgement: the references it reports
    /// as changed, not an echo of the request.
    pub fn update_light(
        &self,
        id: &str,
        update: &LightUpdate,
    ) -> impl Future<Output = Result<Vec<Value>, Error>> + Send + 'static {
        let request = self.put_request(ResourceKind::Light, id, update);
        let probe = self.probe.clone();
        let timeout = self.request_timeout;
        self.queues.lights.enqueue(async move { execute(request?, probe, timeout).await })
    }

    /// Queue a state change for a room or zone through its grouped light.
    pub fn update_grouped_light(
        &self,
        id: &str,
        update: &LightUpdate,
    ) -> impl Future<Output = Result<Vec<Value>, Error>> + Send + 'static {
        let request = self.put_request(ResourceKind::GroupedLight, id, update);
        let probe = self.probe.clone();
        let timeout = self.request_timeout;
        self.queues.groups.enqueue(async move { execute(request?, probe, timeout).await })
    }

    /// Queue a scene recall. Shares the group queue.
    pub fn recall_scene(&self, id: &str) -> impl Future<Output = Result<Vec<Value>, Error>> + Send + 'static {
        let request = self.put_request(ResourceKind::Scene, id, &SceneRecall::active());
        let probe = self.probe.clone();
        let timeout = self.request_timeout;
        self.queues.groups.enqueue(async move { execute(request?, probe, timeout).await })
    }

    // ── Event stream ─────────────────────────────────────────────────

    /// Open the push event stream. It runs until `cancel` fires, the handle
    /// is dropped, or the bridge ends it.
    pub fn open_event_stream(&self, cancel: CancellationToken) -> Result<EventStreamHandle, Error> {
        let url = self.url(EVENT_STREAM_PATH)?;
        Ok(EventStreamHandle::open(
            self.http.clone(),
            url,
            self.app_key.clone(),
            cancel,
        ))
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// Add the key and the per-request timeout. The client itself has no
    /// total timeout, which would cut the event stream.
    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(APP_KEY_HEADER, self.app_key.expose_secret())
            .timeout(self.request_timeout)
    }

    fn put_request(
        &self,
        kind: ResourceKind,
        id: &str,
        body: &impl Serialize,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let url = self.url(&kind.item_path(id))?;
        debug!("PUT {url}");
        Ok(self.authed(self.http.put(url).json(body)))
    }
}

// ── Request framing ──────────────────────────────────────────────────

async fn execute(
    request: reqwest::RequestBuilder,
    probe: Option<IdentityProbe>,
    timeout: Duration,
) -> Result<Vec<Value>, Error> {
    let resp = send(request, probe.as_ref(), timeout).await?;
    read_envelope(resp).await
}

/// Send a request, reporting a pinned-identity failure as [`Error::Identity`]
/// rather than an opaque handshake error, and an elapsed deadline as
/// [`Error::Timeout`].
async fn send(
    request: reqwest::RequestBuilder,
    probe: Option<&IdentityProbe>,
    timeout: Duration,
) -> Result<reqwest::Response, Error> {
    match request.send().await {
        Ok(resp) => Ok(resp),
        Err(e) => match probe.and_then(IdentityProbe::take) {
            Some(mismatch) => Err(mismatch.into()),
            None if e.is_timeout() => Err(Error::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
            None => Err(Error::Transport(e)),
        },
    }
}

/// Accumulate the body, then unwrap the `{ errors, data }` envelope.
///
/// A non-empty `errors` array is a failure even on HTTP 200.
async fn read_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Vec<T>, Error> {
    let status = resp.status();
    let is_html = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));
    let body = resp.text().await.map_err(Error::Transport)?;
    trace!(%status, bytes = body.len(), "response body");

    if !status.is_success() {
        let message = if is_html {
            html_error_message(&body)
        } else {
            serde_json::from_str::<Envelope<Value>>(&body)
                .ok()
                .and_then(|env| joined_errors(&env.errors))
                .unwrap_or_else(|| preview(&body))
        };
        return Err(Error::Bridge {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body: body.clone(),
    })?;

    if let Some(message) = joined_errors(&envelope.errors) {
        return Err(Error::Api { message });
    }
    Ok(envelope.data)
}

fn joined_errors(errors: &[EnvelopeError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .map(|e| e.description.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn preview(body: &str) -> String {
    body.chars().take(ERROR_PREVIEW_LEN).collect()
}

/// Best-effort message from an HTML error page: the `<title>`, else the
/// page text with markup stripped.
fn html_error_message(body: &str) -> String {
    let lower = body.to_ascii_lowercase();
    if let (Some(start), Some(end)) = (lower.find("<title>"), lower.find("</title>")) {
        let start = start + "<title>".len();
        if start < end {
            let title = collapse_whitespace(&body[start..end]);
            if !title.is_empty() {
                return title;
            }
        }
    }

    let mut text = String::with_capacity(body.len());
    let mut in_tag = false;
    for c in body.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    preview(&collapse_whitespace(&text))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
