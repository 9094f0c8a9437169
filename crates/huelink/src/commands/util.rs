//! Shared helpers for command handlers.

use std::io::IsTerminal;

use huelink_core::Bridge;

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal to ask on, `--yes` is required.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.to_owned(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

pub enum Target {
    Light(String),
    Group(String),
}

/// Resolve a light first, then a room or zone, by id or name.
pub fn resolve_target(bridge: &Bridge, query: &str) -> Result<Target, CliError> {
    if let Some(id) = bridge.find_light(query) {
        return Ok(Target::Light(id));
    }
    bridge
        .find_group(query)
        .map(Target::Group)
        .ok_or_else(|| CliError::NotFound {
            resource_type: "light or room".into(),
            identifier: query.into(),
            list_command: "lights".into(),
        })
}

pub fn resolve_scene(bridge: &Bridge, query: &str) -> Result<String, CliError> {
    bridge.find_scene(query).ok_or_else(|| CliError::NotFound {
        resource_type: "scene".into(),
        identifier: query.into(),
        list_command: "scenes".into(),
    })
}
