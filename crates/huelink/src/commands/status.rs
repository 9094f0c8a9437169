//! Saved bridge and connection status.

use std::collections::BTreeMap;

use serde::Serialize;

use huelink_core::StreamStatus;

use crate::cli::{GlobalOpts, OutputFormat, StatusArgs};
use crate::error::CliError;
use crate::output;

use super::Context;

#[derive(Serialize)]
struct StatusReport {
    bridge_id: String,
    address: String,
    certificate: String,
    credentials: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_stream: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    resources: BTreeMap<String, usize>,
}

pub async fn handle(ctx: &Context, args: &StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config = ctx.saved_bridge()?;
    let mut report = StatusReport {
        bridge_id: config.id.clone(),
        address: config.ip_address.to_string(),
        certificate: config.certificate_type.as_ref().to_owned(),
        credentials: if ctx.settings.use_keyring {
            format!("{} (key in system keyring)", ctx.store.path().display())
        } else {
            ctx.store.path().display().to_string()
        },
        event_stream: None,
        resources: BTreeMap::new(),
    };

    if !args.offline {
        let bridge = ctx.connect().await?;
        report.resources = bridge
            .store()
            .counts()
            .iter()
            .map(|(kind, count)| (kind.to_string(), *count))
            .collect();
        report.event_stream = Some(stream_label(&bridge.stream_status().borrow()));
        bridge.shutdown();
    }

    let out = match global.output {
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Plain => report.bridge_id.clone(),
        OutputFormat::Table => render_table(&report),
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn stream_label(status: &StreamStatus) -> String {
    match status {
        StreamStatus::Connecting => "connecting".into(),
        StreamStatus::Open => "open".into(),
        StreamStatus::Closed { reason: Some(reason) } => format!("closed: {reason}"),
        StreamStatus::Closed { reason: None } => "closed".into(),
    }
}

fn render_table(report: &StatusReport) -> String {
    let mut lines = vec![
        format!("Bridge:       {}", report.bridge_id),
        format!("Address:      {}", report.address),
        format!("Certificate:  {}", report.certificate),
        format!("Credentials:  {}", report.credentials),
    ];
    if let Some(stream) = &report.event_stream {
        lines.push(format!("Event stream: {stream}"));
    }
    for (kind, count) in &report.resources {
        let label = format!("{kind}:");
        lines.push(format!("  {label:<14}{count}"));
    }
    lines.join("\n")
}
