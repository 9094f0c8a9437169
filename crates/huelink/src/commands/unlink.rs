//! Forget the saved bridge.

use huelink_core::BridgeConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

use super::{Context, util};

pub fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let config = ctx.saved_bridge()?;
    let prompt = format!("Forget bridge {} at {}?", config.id, config.ip_address);
    if !util::confirm(&prompt, global.yes)? {
        return Err(CliError::Cancelled);
    }

    BridgeConfig::clear(ctx.store.as_ref())?;
    if !global.quiet {
        eprintln!("Bridge {} forgotten", config.id);
    }
    Ok(())
}
