//! Bridge discovery.

use huelink_core::{DiscoveredBridge, LinkServices};
use tabled::Tabled;
use tracing::warn;

use crate::cli::{DiscoverArgs, DiscoveryMethod, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::Context;

#[derive(Tabled)]
struct BridgeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Port")]
    port: u16,
}

fn bridge_row(b: &DiscoveredBridge) -> BridgeRow {
    BridgeRow {
        id: b.id.clone(),
        address: b.address.to_string(),
        port: b.port,
    }
}

pub async fn handle(ctx: &Context, args: &DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let services = ctx.services();
    let bridges = match args.method {
        DiscoveryMethod::Public => services.discover_public().await?,
        DiscoveryMethod::Mdns => services.discover_mdns().await?,
        DiscoveryMethod::Auto => {
            let found = services.discover_public().await.unwrap_or_else(|e| {
                warn!(error = %e, "public discovery failed; trying mDNS");
                Vec::new()
            });
            if found.is_empty() {
                services.discover_mdns().await?
            } else {
                found
            }
        }
    };

    if bridges.is_empty() {
        return Err(CliError::NoBridgeFound {
            reason: "no bridge answered".into(),
        });
    }

    let out = output::render_list(global.output, &bridges, bridge_row, |b| b.id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
