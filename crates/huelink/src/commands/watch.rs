//! Follow light changes pushed by the bridge.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use huelink_core::{Light, Snapshot, StreamStatus};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::Context;

pub async fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let bridge = ctx.connect().await?;
    let colored = output::should_color(global.color);
    let mut lights = bridge.store().subscribe_lights();
    let mut stream = bridge.stream_status();

    let mut seen: HashMap<String, Arc<Light>> = HashMap::new();
    let initial = lights.borrow_and_update().clone();
    report_changes(&initial, &mut seen, global, colored)?;
    if !global.quiet && global.output == OutputFormat::Table {
        eprintln!("Watching for changes (Ctrl-C to stop)");
    }

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = lights.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let snapshot = lights.borrow_and_update().clone();
                report_changes(&snapshot, &mut seen, global, colored)?;
            }
            changed = stream.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let status = stream.borrow_and_update().clone();
                if let StreamStatus::Closed { reason } = status {
                    info!(?reason, "event stream closed");
                    break Err(CliError::ConnectionFailed {
                        bridge: bridge.id().to_owned(),
                        reason: reason.unwrap_or_else(|| "event stream closed".into()),
                    });
                }
            }
        }
    };

    bridge.shutdown();
    result
}

/// Print every light whose record differs from the last one printed.
fn report_changes(
    snapshot: &Snapshot<Light>,
    seen: &mut HashMap<String, Arc<Light>>,
    global: &GlobalOpts,
    colored: bool,
) -> Result<(), CliError> {
    for light in snapshot.iter() {
        if seen.get(&light.id).is_some_and(|prev| prev == light) {
            continue;
        }
        seen.insert(light.id.clone(), Arc::clone(light));

        let line = match global.output {
            OutputFormat::Table => output::light_line(light, colored),
            OutputFormat::Plain => light.id.clone(),
            OutputFormat::Json => serde_json::to_string(&json!({
                "id": light.id,
                "name": light.metadata.name,
                "on": light.on.on,
                "brightness": light.dimming.as_ref().map(|d| d.brightness),
                "color": output::light_rgb(light).map(huelink_core::color::rgb_to_hex),
            }))?,
        };
        output::print_output(&line, global.quiet);
    }
    Ok(())
}
