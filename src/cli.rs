use crate::config::REFRESH_SECS_RANGE;
use crate::models::PanelId;
use clap::{Args, Parser, Subcommand, ValueEnum};

fn parse_refresh_rate(s: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .map_err(|_| "Invalid refresh interval".to_string())
        .and_then(|v| {
            if REFRESH_SECS_RANGE.contains(&v) {
                Ok(v)
            } else {
                Err("Refresh interval must be between 0 and 3600 seconds".to_string())
            }
        })
}

/// `PANEL=FILE` pair for `--inline`.
fn parse_inline(s: &str) -> Result<(PanelId, String), String> {
    let (panel, path) = s
        .split_once('=')
        .ok_or_else(|| "Expected PANEL=FILE".to_string())?;
    let panel = [PanelId::Overview]
        .into_iter()
        .chain(PanelId::BUNDLE)
        .find(|p| p.as_str() == panel.trim())
        .ok_or_else(|| format!("Unknown panel {panel:?}"))?;
    Ok((panel, path.trim().to_string()))
}

#[derive(Parser, Debug)]
#[command(name = "health-dash")]
#[command(about = "Regional health-risk dashboard with tiered data fallback")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Analytics API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Directory holding static fixture files
    #[arg(long, global = true)]
    pub fixtures_dir: Option<String>,

    /// Session cookie sent with every request (e.g. "session=abc")
    #[arg(long, global = true)]
    pub cookie: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch interactive dashboard (default)
    #[command(visible_aliases = &["dash", "d"])]
    Dashboard {
        /// Auto-refresh interval in seconds, 0 for manual refresh only
        #[arg(short, long, value_parser = parse_refresh_rate)]
        refresh: Option<f64>,
    },

    /// Resolve every dashboard panel once and print where its data came from
    #[command(visible_alias = "stats")]
    Show(ShowArgs),

    /// Print the personal profile page
    Profile {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// End the current session
    Logout,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Show summary of data sources
    #[arg(long)]
    pub summary: bool,

    /// Supply a panel's data from a JSON file (e.g. region-users=users.json)
    #[arg(long, value_parser = parse_inline)]
    pub inline: Vec<(PanelId, String)>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Markdown,
}
