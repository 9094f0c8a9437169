//! Output formatting: table, JSON, plain.
//!
//! Table uses `tabled`, JSON uses serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use huelink_core::color::{self, Rgb};
use huelink_core::Light;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Render a list in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Print to stdout unless quiet.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Light presentation ───────────────────────────────────────────────

/// The color a light is showing, if it reports one.
pub fn light_rgb(light: &Light) -> Option<Rgb> {
    let brightness = light.dimming.as_ref().map_or(100.0, |d| d.brightness);
    let mirek = light
        .color_temperature
        .as_ref()
        .filter(|c| c.mirek_valid)
        .and_then(|c| c.mirek);
    if let Some(mirek) = mirek {
        return Some(color::mired_to_rgb(f64::from(mirek), brightness));
    }
    light
        .color
        .as_ref()
        .map(|c| color::xy_to_rgb(c.xy.x, c.xy.y, brightness))
}

pub fn brightness_label(light: &Light) -> String {
    light
        .dimming
        .as_ref()
        .map_or_else(|| "-".into(), |d| format!("{:.0}%", d.brightness))
}

/// One-line summary used by `watch`.
pub fn light_line(light: &Light, colored: bool) -> String {
    let state = if light.on.on { "on" } else { "off" };
    let state = match (colored, light.on.on) {
        (false, _) => state.to_owned(),
        (true, true) => state.green().to_string(),
        (true, false) => state.dimmed().to_string(),
    };

    let swatch = match light_rgb(light) {
        Some(rgb) if colored => format!(" {}", "██".truecolor(rgb.r, rgb.g, rgb.b)),
        Some(rgb) => format!(" {}", color::rgb_to_hex(rgb)),
        None => String::new(),
    };

    format!("{}: {state} {}{swatch}", light.metadata.name, brightness_label(light))
}
