// huelink-api: async client for a local Hue bridge (CLIP v2 + push events)

pub mod client;
pub mod discovery;
pub mod error;
pub mod events;
pub mod models;
pub mod pairing;
pub mod queue;
pub mod tls;
pub mod transport;

pub use client::{BridgeClient, GROUP_QUEUE, LIGHT_QUEUE, QueueSettings};
pub use discovery::DiscoveredBridge;
pub use error::Error;
pub use events::{EventBatch, EventStreamHandle, StreamStatus};
pub use models::{GroupedLight, Light, LightUpdate, Resource, ResourceKind, Room, Scene, Zone};
pub use pairing::PairingResult;
pub use queue::{QueueConfig, RateLimitedQueue};
pub use tls::CertificateKind;
pub use transport::{PinnedCertificate, TransportConfig};
