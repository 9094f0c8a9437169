//! Clap derive structures for the `huelink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// huelink -- control a Hue bridge on your local network
#[derive(Debug, Parser)]
#[command(
    name = "huelink",
    version,
    about = "Control a Hue lighting bridge on your local network",
    long_about = "Find, pair with, and control a Hue bridge over its local HTTPS API.\n\n\
        The bridge certificate is pinned at pairing time; later sessions refuse\n\
        any peer that does not present the same bridge identity.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (defaults to settings.toml in the config directory)
    #[arg(long, env = "HUELINK_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', env = "HUELINK_OUTPUT", default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Plain text, one identifier per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find bridges on this network
    Discover(DiscoverArgs),

    /// Pair with a bridge and save its credentials
    Link(LinkArgs),

    /// Show the saved bridge and whether it answers
    Status(StatusArgs),

    /// List lights
    #[command(alias = "l")]
    Lights,

    /// List rooms and zones
    #[command(alias = "groups")]
    Rooms,

    /// List scenes
    Scenes,

    /// Change a light, room or zone
    Set(SetArgs),

    /// Activate a scene
    Scene(SceneArgs),

    /// Print light changes as the bridge reports them
    Watch,

    /// Forget the saved bridge
    Unlink,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Where to look
    #[arg(long, value_enum, default_value = "auto")]
    pub method: DiscoveryMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiscoveryMethod {
    /// Public lookup service, then the local network if that finds nothing
    Auto,
    /// Public lookup service only
    Public,
    /// Local network (mDNS) only
    Mdns,
}

#[derive(Debug, Args)]
pub struct LinkArgs {
    /// Forget the saved bridge first and pair again
    #[arg(long)]
    pub relink: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Only show saved details; do not contact the bridge
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Light, room or zone: name or id
    pub target: String,

    /// Switch on
    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    /// Switch off
    #[arg(long)]
    pub off: bool,

    /// Brightness percentage
    #[arg(long, short = 'b', value_parser = clap::value_parser!(u8).range(0..=100))]
    pub brightness: Option<u8>,

    /// Color as hex, e.g. "#ff8800"
    #[arg(long, short = 'c', conflicts_with = "kelvin")]
    pub rgb: Option<String>,

    /// White color temperature in Kelvin
    #[arg(long, short = 'k', value_parser = clap::value_parser!(u32).range(2000..=6500))]
    pub kelvin: Option<u32>,

    /// Transition time in milliseconds
    #[arg(long, short = 't')]
    pub transition: Option<u32>,
}

#[derive(Debug, Args)]
pub struct SceneArgs {
    /// Scene name or id
    pub scene: String,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
