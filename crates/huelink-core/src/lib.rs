//! Core of huelink: everything between the bridge wire protocol and a user
//! interface.
//!
//! - [`link`]: the state machine that discovers, pairs with, and connects to
//!   a bridge.
//! - [`session::Bridge`]: one live connection. It keeps a [`ResourceStore`]
//!   current from bulk reads, push events, and optimistic commands.
//! - [`color`]: conversions between RGB, CIE xy, and color temperature.
//! - [`config`]: the persisted bridge identity and link tuning.

pub mod color;
pub mod command;
pub mod config;
pub mod error;
pub mod link;
pub mod session;
pub mod store;

pub use color::{Chromaticity, Rgb};
pub use config::{BridgeConfig, CredentialStore, LinkConfig, MemoryCredentialStore};
pub use error::CoreError;
pub use link::{BridgeServices, LinkEvent, LinkHandle, LinkServices, LinkState};
pub use session::Bridge;
pub use store::{MergeSummary, ResourceStore, Snapshot};

// Wire types callers need alongside the core API.
pub use huelink_api::pairing::device_type;
pub use huelink_api::{
    DiscoveredBridge, GroupedLight, Light, LightUpdate, QueueConfig, QueueSettings, ResourceKind, Room, Scene, StreamStatus, Zone,
};
