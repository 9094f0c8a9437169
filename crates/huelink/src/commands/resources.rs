//! Listing lights, rooms and scenes.

use std::sync::Arc;

use tabled::Tabled;

use huelink_core::color;
use huelink_core::{Bridge, Light, Room, Scene, Zone};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::Context;

// ── Lights ───────────────────────────────────────────────────────────

#[derive(Tabled)]
struct LightRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "On")]
    on: &'static str,
    #[tabled(rename = "Brightness")]
    brightness: String,
    #[tabled(rename = "Color")]
    color: String,
}

fn light_row(l: &Arc<Light>) -> LightRow {
    LightRow {
        id: l.id.clone(),
        name: l.metadata.name.clone(),
        on: if l.on.on { "yes" } else { "no" },
        brightness: output::brightness_label(l),
        color: output::light_rgb(l).map_or_else(|| "-".into(), color::rgb_to_hex),
    }
}

pub async fn lights(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let bridge = ctx.connect().await?;
    let lights = sorted(bridge.store().lights().to_vec(), |l| &l.metadata.name);
    let out = output::render_list(global.output, &lights, light_row, |l| l.id.clone())?;
    output::print_output(&out, global.quiet);
    bridge.shutdown();
    Ok(())
}

// ── Rooms and zones ──────────────────────────────────────────────────

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: &'static str,
    #[tabled(rename = "Lights")]
    lights: usize,
    #[tabled(rename = "On")]
    on: &'static str,
}

/// A room or zone with its grouped-light state resolved.
#[derive(serde::Serialize)]
struct GroupView {
    id: String,
    name: String,
    kind: &'static str,
    lights: usize,
    grouped_light: Option<String>,
    on: Option<bool>,
}

fn group_row(g: &GroupView) -> GroupRow {
    GroupRow {
        id: g.id.clone(),
        name: g.name.clone(),
        kind: g.kind,
        lights: g.lights,
        on: match g.on {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        },
    }
}

fn group_views(bridge: &Bridge) -> Vec<GroupView> {
    let store = bridge.store();
    let rooms: Vec<Arc<Room>> = store.rooms().to_vec();
    let zones: Vec<Arc<Zone>> = store.zones().to_vec();

    let groups = rooms
        .iter()
        .map(|r| (&r.0, "room"))
        .chain(zones.iter().map(|z| (&z.0, "zone")));

    let views: Vec<GroupView> = groups
        .map(|(g, kind)| {
            let grouped_light = g.grouped_light_id().map(str::to_owned);
            let on = grouped_light
                .as_deref()
                .and_then(|id| store.grouped_light(id))
                .and_then(|gl| gl.on.as_ref().map(|o| o.on));
            GroupView {
                id: g.id.clone(),
                name: g.metadata.name.clone(),
                kind,
                lights: g.children.len(),
                grouped_light,
                on,
            }
        })
        .collect();
    sorted(views, |g| &g.name)
}

pub async fn rooms(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let bridge = ctx.connect().await?;
    let groups = group_views(&bridge);
    let out = output::render_list(global.output, &groups, group_row, |g| g.id.clone())?;
    output::print_output(&out, global.quiet);
    bridge.shutdown();
    Ok(())
}

// ── Scenes ───────────────────────────────────────────────────────────

#[derive(Tabled)]
struct SceneRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Group")]
    group: String,
}

pub async fn scenes(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let bridge = ctx.connect().await?;
    let groups = group_views(&bridge);
    let scenes = sorted(bridge.store().scenes().to_vec(), |s| &s.metadata.name);

    let scene_row = |s: &Arc<Scene>| SceneRow {
        id: s.id.clone(),
        name: s.metadata.name.clone(),
        group: s
            .group
            .as_ref()
            .and_then(|r| groups.iter().find(|g| g.id == r.rid))
            .map_or_else(|| "-".into(), |g| g.name.clone()),
    };
    let out = output::render_list(global.output, &scenes, scene_row, |s| s.id.clone())?;
    output::print_output(&out, global.quiet);
    bridge.shutdown();
    Ok(())
}

fn sorted<T>(mut items: Vec<T>, name: impl Fn(&T) -> &String) -> Vec<T> {
    items.sort_by_cached_key(|item| name(item).to_lowercase());
    items
}
