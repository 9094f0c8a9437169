//! Link state machine.
//!
//! Takes a bridge from "nothing saved" to a live [`Bridge`] session: load
//! saved credentials, discover, pair, connect. The machine runs as a single
//! task. Callers send [`LinkEvent`]s through a [`LinkHandle`] and observe
//! [`LinkState`] through a `watch` channel.
//!
//! Exactly one transition is in flight at a time. Events sent while a
//! transition's work is pending wait in the channel until it settles; a
//! queued [`LinkEvent::Unlink`] then preempts whatever work would come next.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use huelink_api::{DiscoveredBridge, discovery, pairing, transport};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{BridgeConfig, CredentialStore, LinkConfig};
use crate::error::CoreError;
use crate::session::Bridge;

// ── States and events ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LinkState {
    LoadingCredentials,
    DiscoveringUsingPublicApi,
    DiscoveringUsingMdns,
    /// Both discovery methods came back empty. Awaits `Retry`.
    NoBridgeFound {
        reason: String,
    },
    /// A candidate was found. Awaits `Link` once the user has pressed the
    /// bridge's link button.
    LinkWithBridge {
        bridge: DiscoveredBridge,
    },
    Linking {
        bridge: DiscoveredBridge,
    },
    /// Awaits `Retry`.
    FailedToLink {
        bridge: DiscoveredBridge,
        reason: String,
        /// The bridge only objected to the link button not being pressed.
        link_button: bool,
    },
    /// Credentials are saved. Awaits `Done`.
    Linked {
        bridge_id: String,
    },
    Connecting {
        bridge_id: String,
    },
    Connected {
        bridge_id: String,
    },
    /// Awaits `Retry`. The saved credentials are kept.
    FailedToConnect {
        bridge_id: String,
        reason: String,
    },
    Unlinking,
}

impl LinkState {
    /// States that run work on entry. The others wait for an event.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::LoadingCredentials
                | Self::DiscoveringUsingPublicApi
                | Self::DiscoveringUsingMdns
                | Self::Linking { .. }
                | Self::Connecting { .. }
                | Self::Unlinking
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LinkEvent {
    Retry,
    Link,
    Done,
    Unlink,
}

/// The event-driven edges. `None` means the event does nothing in `state`.
fn transition(state: &LinkState, event: LinkEvent) -> Option<LinkState> {
    match (state, event) {
        (_, LinkEvent::Unlink) => Some(LinkState::Unlinking),
        (LinkState::NoBridgeFound { .. }, LinkEvent::Retry) => Some(LinkState::DiscoveringUsingPublicApi),
        (LinkState::LinkWithBridge { bridge }, LinkEvent::Link)
        | (LinkState::FailedToLink { bridge, .. }, LinkEvent::Retry) => Some(LinkState::Linking {
            bridge: bridge.clone(),
        }),
        (LinkState::Linked { bridge_id }, LinkEvent::Done)
        | (LinkState::FailedToConnect { bridge_id, .. }, LinkEvent::Retry) => Some(LinkState::Connecting {
            bridge_id: bridge_id.clone(),
        }),
        _ => None,
    }
}

// ── Side effects ─────────────────────────────────────────────────────

/// Everything the machine does outside itself.
pub trait LinkServices: Send + Sync + 'static {
    type Session: Send + Sync + 'static;

    fn load(&self) -> Result<Option<BridgeConfig>, CoreError>;

    fn save(&self, config: &BridgeConfig) -> Result<(), CoreError>;

    fn clear(&self) -> Result<(), CoreError>;

    fn discover_public(&self) -> impl Future<Output = Result<Vec<DiscoveredBridge>, CoreError>> + Send;

    fn discover_mdns(&self) -> impl Future<Output = Result<Vec<DiscoveredBridge>, CoreError>> + Send;

    fn pair(&self, bridge: &DiscoveredBridge) -> impl Future<Output = Result<BridgeConfig, CoreError>> + Send;

    fn connect(&self, config: &BridgeConfig) -> impl Future<Output = Result<Self::Session, CoreError>> + Send;

    /// Called when a session is being replaced or the machine stops.
    fn disconnect(&self, _session: &Self::Session) {}
}

/// Real network and storage behind the machine.
pub struct BridgeServices {
    store: Arc<dyn CredentialStore>,
    link: LinkConfig,
}

impl BridgeServices {
    pub fn new(store: Arc<dyn CredentialStore>, link: LinkConfig) -> Self {
        Self { store, link }
    }
}

impl LinkServices for BridgeServices {
    type Session = Bridge;

    fn load(&self) -> Result<Option<BridgeConfig>, CoreError> {
        BridgeConfig::load(self.store.as_ref())
    }

    fn save(&self, config: &BridgeConfig) -> Result<(), CoreError> {
        config.save(self.store.as_ref())
    }

    fn clear(&self) -> Result<(), CoreError> {
        BridgeConfig::clear(self.store.as_ref())
    }

    async fn discover_public(&self) -> Result<Vec<DiscoveredBridge>, CoreError> {
        let url = Url::parse(&self.link.discovery_url).map_err(|e| CoreError::Configuration {
            message: format!("invalid discovery URL '{}': {e}", self.link.discovery_url),
        })?;
        let http = transport::public_client(self.link.request_timeout)?;
        Ok(discovery::discover_public(&http, &url).await?)
    }

    async fn discover_mdns(&self) -> Result<Vec<DiscoveredBridge>, CoreError> {
        Ok(discovery::discover_mdns(self.link.mdns_timeout).await?)
    }

    async fn pair(&self, bridge: &DiscoveredBridge) -> Result<BridgeConfig, CoreError> {
        let paired = pairing::pair(
            bridge.address,
            bridge.port,
            &self.link.device_type,
            self.link.request_timeout,
        )
        .await?;
        if paired.bridge_id != bridge.id {
            warn!(discovered = %bridge.id, reported = %paired.bridge_id, "bridge reports a different id than discovery");
        }
        Ok(paired.into())
    }

    async fn connect(&self, config: &BridgeConfig) -> Result<Bridge, CoreError> {
        Bridge::connect(config, &self.link).await
    }

    fn disconnect(&self, session: &Bridge) {
        session.shutdown();
    }
}

// ── Handle ───────────────────────────────────────────────────────────

/// Owner of a running link state machine.
///
/// Dropping the handle stops the machine and any live session.
pub struct LinkHandle<S> {
    events: mpsc::UnboundedSender<LinkEvent>,
    state: watch::Receiver<LinkState>,
    session: watch::Receiver<Option<Arc<S>>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<S: Send + Sync + 'static> LinkHandle<S> {
    /// Start the machine in [`LinkState::LoadingCredentials`].
    pub fn spawn<L>(services: L) -> Self
    where
        L: LinkServices<Session = S>,
    {
        let (events, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(LinkState::LoadingCredentials);
        let (session_tx, session) = watch::channel(None);
        let cancel = CancellationToken::new();

        let machine = Machine {
            services,
            state: state_tx,
            session: session_tx,
            config: None,
            backlog: VecDeque::new(),
        };
        let task = tokio::spawn(machine.run(rx, cancel.clone()));

        Self {
            events,
            state,
            session,
            cancel,
            task,
        }
    }

    pub fn send(&self, event: LinkEvent) -> Result<(), CoreError> {
        self.events
            .send(event)
            .map_err(|_| CoreError::Internal("link state machine stopped".into()))
    }

    pub fn state(&self) -> LinkState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// The live session, present only in [`LinkState::Connected`].
    pub fn session(&self) -> Option<Arc<S>> {
        self.session.borrow().clone()
    }

    /// Wait until the state satisfies `done`. Checks the current state
    /// first.
    pub async fn wait_for(&self, mut done: impl FnMut(&LinkState) -> bool) -> Result<LinkState, CoreError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| done(s))
            .await
            .map_err(|_| CoreError::Internal("link state machine stopped".into()))?;
        Ok(state.clone())
    }

    /// Stop the machine and wait for it to release the session.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "link state machine task failed");
        }
    }
}

impl<S> Drop for LinkHandle<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Machine ──────────────────────────────────────────────────────────

struct Machine<L: LinkServices> {
    services: L,
    state: watch::Sender<LinkState>,
    session: watch::Sender<Option<Arc<L::Session>>>,
    config: Option<BridgeConfig>,
    backlog: VecDeque<LinkEvent>,
}

impl<L: LinkServices> Machine<L> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<LinkEvent>, cancel: CancellationToken) {
        loop {
            let current = self.state.borrow().clone();

            let next = if current.is_busy() {
                if current != LinkState::Unlinking && self.take_queued_unlink(&mut events) {
                    LinkState::Unlinking
                } else {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        next = self.work(current) => next,
                    }
                }
            } else {
                let event = match self.backlog.pop_front() {
                    Some(event) => event,
                    None => tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        event = events.recv() => match event {
                            Some(event) => event,
                            None => break,
                        },
                    },
                };
                match transition(&current, event) {
                    Some(next) => next,
                    None => {
                        debug!(state = %current, %event, "event ignored");
                        continue;
                    }
                }
            };

            self.enter(next);
        }

        self.drop_session();
        debug!("link state machine stopped");
    }

    fn enter(&self, next: LinkState) {
        let to = next.to_string();
        let from = self.state.send_replace(next);
        info!(%from, %to, "link state changed");
    }

    /// Move queued events into the backlog; consume everything up to and
    /// including the first `Unlink`, if any.
    fn take_queued_unlink(&mut self, events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> bool {
        while let Ok(event) = events.try_recv() {
            self.backlog.push_back(event);
        }
        match self.backlog.iter().position(|e| *e == LinkEvent::Unlink) {
            Some(pos) => {
                self.backlog.drain(..=pos);
                true
            }
            None => false,
        }
    }

    async fn work(&mut self, state: LinkState) -> LinkState {
        match state {
            LinkState::LoadingCredentials => self.load_credentials(),
            LinkState::DiscoveringUsingPublicApi => match self.services.discover_public().await {
                Ok(found) => first_candidate(found).unwrap_or(LinkState::DiscoveringUsingMdns),
                Err(e) => {
                    warn!(error = %e, "public discovery failed; trying mDNS");
                    LinkState::DiscoveringUsingMdns
                }
            },
            LinkState::DiscoveringUsingMdns => match self.services.discover_mdns().await {
                Ok(found) => first_candidate(found).unwrap_or_else(|| LinkState::NoBridgeFound {
                    reason: "no bridge answered on the local network".into(),
                }),
                Err(e) => {
                    warn!(error = %e, "mDNS discovery failed");
                    LinkState::NoBridgeFound { reason: e.to_string() }
                }
            },
            LinkState::Linking { bridge } => self.link(bridge).await,
            LinkState::Connecting { .. } => self.connect().await,
            LinkState::Unlinking => self.unlink(),
            waiting => waiting,
        }
    }

    fn load_credentials(&mut self) -> LinkState {
        match self.services.load() {
            Ok(Some(config)) => {
                let bridge_id = config.id.clone();
                self.config = Some(config);
                LinkState::Connecting { bridge_id }
            }
            Ok(None) => LinkState::DiscoveringUsingPublicApi,
            Err(e) => {
                warn!(error = %e, "could not read saved bridge");
                LinkState::DiscoveringUsingPublicApi
            }
        }
    }

    async fn link(&mut self, bridge: DiscoveredBridge) -> LinkState {
        let config = match self.services.pair(&bridge).await {
            Ok(config) => config,
            Err(e) => {
                let link_button = matches!(e, CoreError::Pairing { link_button: true, .. });
                return LinkState::FailedToLink {
                    bridge,
                    reason: e.to_string(),
                    link_button,
                };
            }
        };

        if let Err(e) = self.services.save(&config) {
            return LinkState::FailedToLink {
                bridge,
                reason: format!("could not save credentials: {e}"),
                link_button: false,
            };
        }
        let bridge_id = config.id.clone();
        self.config = Some(config);
        LinkState::Linked { bridge_id }
    }

    async fn connect(&mut self) -> LinkState {
        self.drop_session();
        let Some(config) = &self.config else {
            warn!("no saved bridge to connect to");
            return LinkState::DiscoveringUsingPublicApi;
        };

        match self.services.connect(config).await {
            Ok(session) => {
                self.session.send_replace(Some(Arc::new(session)));
                LinkState::Connected {
                    bridge_id: config.id.clone(),
                }
            }
            Err(e) if e.requires_relink() => {
                warn!(bridge_id = %config.id, "saved credential rejected; pairing again");
                LinkState::LinkWithBridge {
                    bridge: config.as_candidate(),
                }
            }
            Err(e) => LinkState::FailedToConnect {
                bridge_id: config.id.clone(),
                reason: e.to_string(),
            },
        }
    }

    fn unlink(&mut self) -> LinkState {
        self.drop_session();
        self.config = None;
        if let Err(e) = self.services.clear() {
            warn!(error = %e, "could not clear saved bridge");
        }
        LinkState::DiscoveringUsingPublicApi
    }

    fn drop_session(&self) {
        if let Some(session) = self.session.send_replace(None) {
            self.services.disconnect(&session);
        }
    }
}

fn first_candidate(found: Vec<DiscoveredBridge>) -> Option<LinkState> {
    found
        .into_iter()
        .next()
        .map(|bridge| LinkState::LinkWithBridge { bridge })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use huelink_api::CertificateKind;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::config::MemoryCredentialStore;

    #[derive(Debug, Clone, Copy)]
    enum Connect {
        Ok,
        Unreachable,
        Rejected,
    }

    struct Mock {
        store: MemoryCredentialStore,
        public: Mutex<Option<Vec<DiscoveredBridge>>>,
        mdns: Mutex<Option<Vec<DiscoveredBridge>>>,
        /// `Some(link_button)` makes pairing fail.
        pair_error: Mutex<Option<bool>>,
        connect: Mutex<Connect>,
        public_gate: Option<Semaphore>,
        connect_gate: Option<Semaphore>,
        public_calls: AtomicUsize,
        connect_calls: AtomicUsize,
        disconnects: AtomicUsize,
    }

    impl Default for Mock {
        fn default() -> Self {
            Self {
                store: MemoryCredentialStore::new(),
                public: Mutex::new(None),
                mdns: Mutex::new(None),
                pair_error: Mutex::new(None),
                connect: Mutex::new(Connect::Ok),
                public_gate: None,
                connect_gate: None,
                public_calls: AtomicUsize::new(0),
                connect_calls: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
            }
        }
    }

    async fn pass(gate: Option<&Semaphore>) {
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    fn found(result: Option<Vec<DiscoveredBridge>>) -> Result<Vec<DiscoveredBridge>, CoreError> {
        result.ok_or_else(|| CoreError::Discovery {
            message: "unreachable".into(),
        })
    }

    impl LinkServices for Arc<Mock> {
        type Session = String;

        fn load(&self) -> Result<Option<BridgeConfig>, CoreError> {
            BridgeConfig::load(&self.store)
        }

        fn save(&self, config: &BridgeConfig) -> Result<(), CoreError> {
            config.save(&self.store)
        }

        fn clear(&self) -> Result<(), CoreError> {
            BridgeConfig::clear(&self.store)
        }

        async fn discover_public(&self) -> Result<Vec<DiscoveredBridge>, CoreError> {
            self.public_calls.fetch_add(1, Ordering::SeqCst);
            pass(self.public_gate.as_ref()).await;
            found(self.public.lock().unwrap().clone())
        }

        async fn discover_mdns(&self) -> Result<Vec<DiscoveredBridge>, CoreError> {
            found(self.mdns.lock().unwrap().clone())
        }

        async fn pair(&self, bridge: &DiscoveredBridge) -> Result<BridgeConfig, CoreError> {
            let pair_error = *self.pair_error.lock().unwrap();
            match pair_error {
                Some(link_button) => Err(CoreError::Pairing {
                    message: "link button not pressed".into(),
                    link_button,
                }),
                None => Ok(config_for(bridge)),
            }
        }

        async fn connect(&self, config: &BridgeConfig) -> Result<String, CoreError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            pass(self.connect_gate.as_ref()).await;
            let outcome = *self.connect.lock().unwrap();
            match outcome {
                Connect::Ok => Ok(config.id.clone()),
                Connect::Unreachable => Err(CoreError::Request {
                    message: "connection refused".into(),
                    status: None,
                }),
                Connect::Rejected => Err(CoreError::Credential),
            }
        }

        fn disconnect(&self, _session: &String) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn bridge() -> DiscoveredBridge {
        DiscoveredBridge {
            id: "001788fffe4a7b2c".into(),
            address: "192.168.1.20".parse().unwrap(),
            port: 443,
        }
    }

    fn config_for(bridge: &DiscoveredBridge) -> BridgeConfig {
        BridgeConfig {
            id: bridge.id.clone(),
            ip_address: bridge.address,
            username: SecretString::from("app-key".to_owned()),
            certificate: "-----BEGIN CERTIFICATE-----".into(),
            certificate_type: CertificateKind::SelfSigned,
        }
    }

    fn saved(mock: Mock) -> Mock {
        config_for(&bridge()).save(&mock.store).unwrap();
        mock
    }

    async fn reach(handle: &LinkHandle<String>, done: impl FnMut(&LinkState) -> bool) -> LinkState {
        tokio::time::timeout(Duration::from_secs(5), handle.wait_for(done))
            .await
            .expect("state not reached")
            .unwrap()
    }

    #[test]
    fn event_edges() {
        let failed = LinkState::FailedToConnect {
            bridge_id: "b".into(),
            reason: "x".into(),
        };
        assert_eq!(
            transition(&failed, LinkEvent::Retry),
            Some(LinkState::Connecting { bridge_id: "b".into() })
        );
        assert_eq!(transition(&failed, LinkEvent::Link), None);
        assert_eq!(
            transition(&LinkState::Connected { bridge_id: "b".into() }, LinkEvent::Unlink),
            Some(LinkState::Unlinking)
        );
        assert_eq!(transition(&LinkState::Connected { bridge_id: "b".into() }, LinkEvent::Retry), None);
        assert_eq!(LinkState::DiscoveringUsingMdns.to_string(), "discovering_using_mdns");
    }

    #[tokio::test]
    async fn failed_discovery_waits_for_retry() {
        let mock = Arc::new(Mock {
            public_gate: Some(Semaphore::new(0)),
            ..Mock::default()
        });
        let handle = LinkHandle::spawn(Arc::clone(&mock));

        reach(&handle, |s| *s == LinkState::DiscoveringUsingPublicApi).await;
        mock.public_gate.as_ref().unwrap().add_permits(1);

        let state = reach(&handle, |s| matches!(s, LinkState::NoBridgeFound { .. })).await;
        assert!(matches!(state, LinkState::NoBridgeFound { .. }));

        handle.send(LinkEvent::Retry).unwrap();
        reach(&handle, |s| *s == LinkState::DiscoveringUsingPublicApi).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state(), LinkState::DiscoveringUsingPublicApi);
        assert_eq!(mock.public_calls.load(Ordering::SeqCst), 2);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn mdns_is_the_fallback() {
        let mock = Arc::new(Mock {
            mdns: Mutex::new(Some(vec![bridge()])),
            ..Mock::default()
        });
        let handle = LinkHandle::spawn(Arc::clone(&mock));
        let state = reach(&handle, |s| !s.is_busy()).await;
        assert_eq!(state, LinkState::LinkWithBridge { bridge: bridge() });
    }

    #[tokio::test]
    async fn empty_public_answer_falls_back_too() {
        let mock = Arc::new(Mock {
            public: Mutex::new(Some(Vec::new())),
            mdns: Mutex::new(Some(Vec::new())),
            ..Mock::default()
        });
        let handle = LinkHandle::spawn(Arc::clone(&mock));
        let state = reach(&handle, |s| !s.is_busy()).await;
        assert!(matches!(state, LinkState::NoBridgeFound { .. }));
    }

    #[tokio::test]
    async fn pairing_then_connect() {
        let mock = Arc::new(Mock {
            public: Mutex::new(Some(vec![bridge()])),
            ..Mock::default()
        });
        let handle = LinkHandle::spawn(Arc::clone(&mock));

        reach(&handle, |s| matches!(s, LinkState::LinkWithBridge { .. })).await;
        handle.send(LinkEvent::Link).unwrap();
        let state = reach(&handle, |s| !s.is_busy() && !matches!(s, LinkState::LinkWithBridge { .. })).await;
        assert_eq!(
            state,
            LinkState::Linked {
                bridge_id: bridge().id
            }
        );
        assert!(BridgeConfig::load(&mock.store).unwrap().is_some());

        handle.send(LinkEvent::Done).unwrap();
        reach(&handle, |s| matches!(s, LinkState::Connected { .. })).await;
        assert_eq!(handle.session().as_deref().map(String::as_str), Some(bridge().id.as_str()));
    }

    #[tokio::test]
    async fn link_button_failure_is_retryable() {
        let mock = Arc::new(Mock {
            public: Mutex::new(Some(vec![bridge()])),
            pair_error: Mutex::new(Some(true)),
            ..Mock::default()
        });
        let handle = LinkHandle::spawn(Arc::clone(&mock));

        reach(&handle, |s| matches!(s, LinkState::LinkWithBridge { .. })).await;
        handle.send(LinkEvent::Link).unwrap();
        let state = reach(&handle, |s| matches!(s, LinkState::FailedToLink { .. })).await;
        assert!(matches!(state, LinkState::FailedToLink { link_button: true, .. }));
        assert!(BridgeConfig::load(&mock.store).unwrap().is_none());

        *mock.pair_error.lock().unwrap() = None;
        handle.send(LinkEvent::Retry).unwrap();
        reach(&handle, |s| matches!(s, LinkState::Linked { .. })).await;
    }

    #[tokio::test]
    async fn saved_bridge_connects_directly() {
        let mock = Arc::new(saved(Mock::default()));
        let handle = LinkHandle::spawn(Arc::clone(&mock));
        let state = reach(&handle, |s| !s.is_busy()).await;
        assert_eq!(
            state,
            LinkState::Connected {
                bridge_id: bridge().id
            }
        );
        assert_eq!(mock.public_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_bridge_keeps_credentials() {
        let mock = Arc::new(saved(Mock {
            connect: Mutex::new(Connect::Unreachable),
            ..Mock::default()
        }));
        let handle = LinkHandle::spawn(Arc::clone(&mock));

        let state = reach(&handle, |s| !s.is_busy()).await;
        assert!(matches!(state, LinkState::FailedToConnect { .. }));
        assert!(BridgeConfig::load(&mock.store).unwrap().is_some());
        assert!(handle.session().is_none());

        *mock.connect.lock().unwrap() = Connect::Ok;
        handle.send(LinkEvent::Retry).unwrap();
        reach(&handle, |s| matches!(s, LinkState::Connected { .. })).await;
        assert_eq!(mock.connect_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_credential_goes_back_to_pairing() {
        let mock = Arc::new(saved(Mock {
            connect: Mutex::new(Connect::Rejected),
            ..Mock::default()
        }));
        let handle = LinkHandle::spawn(Arc::clone(&mock));
        let state = reach(&handle, |s| !s.is_busy()).await;
        assert_eq!(state, LinkState::LinkWithBridge { bridge: bridge() });
    }

    #[tokio::test]
    async fn events_wait_for_pending_work() {
        let mock = Arc::new(saved(Mock {
            public: Mutex::new(Some(vec![bridge()])),
            connect_gate: Some(Semaphore::new(0)),
            ..Mock::default()
        }));
        let handle = LinkHandle::spawn(Arc::clone(&mock));

        reach(&handle, |s| matches!(s, LinkState::Connecting { .. })).await;
        handle.send(LinkEvent::Retry).unwrap();
        handle.send(LinkEvent::Unlink).unwrap();
        mock.connect_gate.as_ref().unwrap().add_permits(1);

        reach(&handle, |s| matches!(s, LinkState::LinkWithBridge { .. })).await;
        assert_eq!(mock.connect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.disconnects.load(Ordering::SeqCst), 1);
        assert!(handle.session().is_none());
        assert!(BridgeConfig::load(&mock.store).unwrap().is_none());
    }

    #[tokio::test]
    async fn shutdown_releases_session() {
        let mock = Arc::new(saved(Mock::default()));
        let handle = LinkHandle::spawn(Arc::clone(&mock));
        reach(&handle, |s| matches!(s, LinkState::Connected { .. })).await;
        handle.shutdown().await;
        assert_eq!(mock.disconnects.load(Ordering::SeqCst), 1);
    }
}
