//! Interactive pairing, driven by the link state machine.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use huelink_core::{Bridge, BridgeConfig, LinkEvent, LinkHandle, LinkState};

use crate::cli::{GlobalOpts, LinkArgs};
use crate::error::CliError;

use super::{Context, util};

/// Automatic pairing attempts under `--yes` while waiting for the button.
const LINK_BUTTON_ATTEMPTS: u32 = 15;
const LINK_BUTTON_INTERVAL: Duration = Duration::from_secs(2);

pub async fn handle(ctx: &Context, args: &LinkArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.relink {
        if !util::confirm("Forget the saved bridge and pair again?", global.yes)? {
            return Err(CliError::Cancelled);
        }
        BridgeConfig::clear(ctx.store.as_ref())?;
    }

    let handle: LinkHandle<Bridge> = LinkHandle::spawn(ctx.services());
    let spinner = spinner(global.quiet);
    let result = drive(&handle, &spinner, global).await;
    spinner.finish_and_clear();

    match &result {
        Ok(bridge_id) if !global.quiet => {
            let lights = handle
                .session()
                .map(|bridge| bridge.store().lights().len())
                .unwrap_or_default();
            eprintln!("Connected to bridge {bridge_id} ({lights} lights)");
        }
        _ => {}
    }
    handle.shutdown().await;
    result.map(|_| ())
}

/// Walk the machine to `Connected`, answering its waiting states.
async fn drive(
    handle: &LinkHandle<Bridge>,
    spinner: &ProgressBar,
    global: &GlobalOpts,
) -> Result<String, CliError> {
    let mut states = handle.subscribe();
    let mut attempts = 0;

    loop {
        let state = states.borrow_and_update().clone();
        debug!(%state, "link progress");
        spinner.set_message(describe(&state));

        match state {
            LinkState::NoBridgeFound { reason } => return Err(CliError::NoBridgeFound { reason }),
            LinkState::LinkWithBridge { bridge } => {
                let prompt = format!(
                    "Press the link button on bridge {} at {}, then continue",
                    bridge.id, bridge.address
                );
                if !spinner.suspend(|| util::confirm(&prompt, global.yes))? {
                    return Err(CliError::Cancelled);
                }
                handle.send(LinkEvent::Link)?;
            }
            LinkState::FailedToLink {
                reason, link_button, ..
            } => {
                attempts += 1;
                if !link_button {
                    return Err(CliError::PairingFailed { message: reason });
                }
                if global.yes {
                    if attempts >= LINK_BUTTON_ATTEMPTS {
                        return Err(CliError::PairingFailed { message: reason });
                    }
                    tokio::time::sleep(LINK_BUTTON_INTERVAL).await;
                } else if !spinner.suspend(|| util::confirm("The link button was not pressed. Try again?", false))? {
                    return Err(CliError::Cancelled);
                }
                handle.send(LinkEvent::Retry)?;
            }
            LinkState::Linked { .. } => handle.send(LinkEvent::Done)?,
            LinkState::Connected { bridge_id } => return Ok(bridge_id),
            LinkState::FailedToConnect { bridge_id, reason } => {
                return Err(CliError::ConnectionFailed {
                    bridge: bridge_id,
                    reason,
                });
            }
            _ => {}
        }

        if states.changed().await.is_err() {
            return Err(CliError::Internal("link state machine stopped".into()));
        }
    }
}

fn describe(state: &LinkState) -> String {
    match state {
        LinkState::LoadingCredentials => "Reading saved bridge".into(),
        LinkState::DiscoveringUsingPublicApi => "Looking up bridges online".into(),
        LinkState::DiscoveringUsingMdns => "Searching the local network".into(),
        LinkState::LinkWithBridge { bridge } => format!("Found bridge {}", bridge.id),
        LinkState::Linking { bridge } => format!("Pairing with {}", bridge.address),
        LinkState::FailedToLink { reason, .. } => format!("Pairing failed: {reason}"),
        LinkState::Linked { bridge_id } => format!("Paired with {bridge_id}"),
        LinkState::Connecting { bridge_id } => format!("Connecting to {bridge_id}"),
        LinkState::Connected { bridge_id } => format!("Connected to {bridge_id}"),
        LinkState::FailedToConnect { reason, .. } => format!("Connection failed: {reason}"),
        LinkState::NoBridgeFound { .. } => "No bridge found".into(),
        LinkState::Unlinking => "Forgetting saved bridge".into(),
    }
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
