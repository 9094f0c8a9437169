//! Command dispatch: CLI args -> core session calls -> output formatting.

pub mod discover;
pub mod link;
pub mod resources;
pub mod set;
pub mod status;
pub mod unlink;
pub mod util;
pub mod watch;

use std::sync::Arc;

use huelink_config::{FileCredentialStore, Settings};
use huelink_core::{Bridge, BridgeConfig, BridgeServices, CoreError, CredentialStore, LinkConfig};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Settings and credential storage shared by every bridge-bound command.
pub struct Context {
    pub settings: Settings,
    pub link: LinkConfig,
    pub store: Arc<FileCredentialStore>,
}

impl Context {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let settings = match &global.settings {
            Some(path) => huelink_config::load_settings_from(path)?,
            None => huelink_config::load_settings()?,
        };
        let link = settings.to_link_config()?;
        let store = Arc::new(FileCredentialStore::open(&settings));
        Ok(Self { settings, link, store })
    }

    /// The saved bridge, or `NotLinked`.
    pub fn saved_bridge(&self) -> Result<BridgeConfig, CliError> {
        BridgeConfig::load(self.store.as_ref())?.ok_or(CliError::NotLinked)
    }

    pub fn services(&self) -> BridgeServices {
        let store: Arc<dyn CredentialStore> = self.store.clone();
        BridgeServices::new(store, self.link.clone())
    }

    /// Open a session to the saved bridge.
    pub async fn connect(&self) -> Result<Bridge, CliError> {
        let config = self.saved_bridge()?;
        Bridge::connect(&config, &self.link).await.map_err(|e| match e {
            CoreError::Request { message, .. } => CliError::ConnectionFailed {
                bridge: format!("{} ({})", config.id, config.ip_address),
                reason: message,
            },
            other => other.into(),
        })
    }
}

/// Dispatch a bridge-bound command to its handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Discover(args) => discover::handle(ctx, &args, global).await,
        Command::Link(args) => link::handle(ctx, &args, global).await,
        Command::Status(args) => status::handle(ctx, &args, global).await,
        Command::Lights => resources::lights(ctx, global).await,
        Command::Rooms => resources::rooms(ctx, global).await,
        Command::Scenes => resources::scenes(ctx, global).await,
        Command::Set(args) => set::handle(ctx, &args, global).await,
        Command::Scene(args) => set::recall(ctx, &args, global).await,
        Command::Watch => watch::handle(ctx, global).await,
        Command::Unlink => unlink::handle(ctx, global),
        // Completions are handled before dispatch
        Command::Completions(_) => Ok(()),
    }
}
