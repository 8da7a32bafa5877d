pub mod api;
pub mod cli;
pub mod clicks;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod formatters;
pub mod geo;
pub mod models;
pub mod narration;
pub mod orchestrator;
pub mod profile;
pub mod resolver;

use anyhow::{bail, Context, Result};
use api::ApiClient;
use cli::{Cli, Commands, GlobalArgs, OutputFormat, ShowArgs};
use config::Settings;
use indicatif::{ProgressBar, ProgressStyle};
use orchestrator::{ChartRegistry, PanelLoader, PanelUpdate, RenderSink};
use profile::{LogoutOutcome, PersonalCharts};
use std::fs::{self, OpenOptions};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Where log lines go. The TUI owns the terminal, so it logs to a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogTarget {
    Stderr,
    File,
}

pub fn init_logging(settings: &Settings, target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match target {
        LogTarget::Stderr => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogTarget::File => {
            let path = settings.log_file_path();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };

    installed.map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

/// Config file and environment, then command-line flags on top.
pub fn resolve_settings(global: &GlobalArgs) -> Result<Settings> {
    let mut settings = config::load_settings(global.config.as_deref())?;
    if let Some(base_url) = &global.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(dir) = &global.fixtures_dir {
        settings.fixtures_dir = dir.clone();
    }
    if let Some(cookie) = &global.cookie {
        settings.session_cookie = Some(cookie.clone());
    }
    Ok(settings)
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = resolve_settings(&cli.global)?;

    match cli.command.unwrap_or(Commands::Dashboard { refresh: None }) {
        Commands::Dashboard { refresh } => {
            init_logging(&settings, LogTarget::File)?;
            let settings = Settings {
                refresh_secs: refresh.unwrap_or(settings.refresh_secs),
                ..settings
            };
            dashboard::run_dashboard(settings).await
        }
        Commands::Show(args) => {
            init_logging(&settings, LogTarget::Stderr)?;
            run_show(&settings, args).await
        }
        Commands::Profile { format } => {
            init_logging(&settings, LogTarget::Stderr)?;
            run_profile(&settings, format).await
        }
        Commands::Logout => {
            init_logging(&settings, LogTarget::Stderr)?;
            run_logout(&settings).await
        }
    }
}

/// Forwards updates and ticks a progress bar per resolved panel.
struct ProgressSink {
    bar: ProgressBar,
    tx: mpsc::UnboundedSender<PanelUpdate>,
}

impl RenderSink for ProgressSink {
    fn render(&self, update: PanelUpdate) {
        self.bar.inc(1);
        self.bar
            .set_message(format!("{} ({})", update.panel(), update.result.tier));
        self.tx.render(update);
    }
}

pub async fn run_show(settings: &Settings, args: ShowArgs) -> Result<()> {
    let client = Arc::new(ApiClient::new(settings)?);
    let endpoints = client.endpoints().clone();
    let mut loader = PanelLoader::new(client, endpoints, settings.overview_defaults.clone());

    for (panel, path) in &args.inline {
        let raw = fs::read_to_string(shellexpand::tilde(path).as_ref())
            .with_context(|| format!("reading inline data for {panel} from {path}"))?;
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing inline data for {panel} from {path}"))?;
        loader = loader.with_inline(*panel, value);
    }

    let bar = if args.format == OutputFormat::Json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(6)
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} panels {msg}")?
            .progress_chars("#>-"),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = ProgressSink { bar: bar.clone(), tx };
    let summary = loader.load_all(&sink).await;
    bar.finish_and_clear();

    let mut registry = ChartRegistry::with_defaults(loader.default_overview());
    while let Ok(update) = rx.try_recv() {
        registry.render(update);
    }
    info!(generation = summary.generation, "panels resolved");

    let reports = formatters::build_reports(&registry, settings.tz()?);
    match args.format {
        OutputFormat::Table => {
            println!("{}", formatters::format_table(&reports, args.summary));
        }
        OutputFormat::Csv => {
            print!("{}", formatters::format_csv(&reports)?);
        }
        OutputFormat::Json => {
            println!("{}", formatters::format_json(&reports)?);
        }
        OutputFormat::Markdown => {
            println!("{}", formatters::format_markdown(&reports, args.summary));
        }
    }

    if args.summary && args.format != OutputFormat::Table {
        formatters::print_summary(&reports);
    }

    Ok(())
}

pub async fn run_profile(settings: &Settings, format: OutputFormat) -> Result<()> {
    let client = Arc::new(ApiClient::new(settings)?);
    let endpoints = client.endpoints().clone();
    let today = chrono::Utc::now().with_timezone(&settings.tz()?).date_naive();
    let defaults = PersonalCharts::defaults(today, &mut rand::thread_rng());

    let page = profile::load_profile(client, &endpoints, defaults).await;

    match format {
        OutputFormat::Table => formatters::print_profile(&page),
        OutputFormat::Json => {
            let report = formatters::build_profile_report(&page);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Csv | OutputFormat::Markdown => {
            bail!("profile output supports table or json");
        }
    }
    Ok(())
}

pub async fn run_logout(settings: &Settings) -> Result<()> {
    let client = ApiClient::new(settings)?;
    let outcome = LogoutOutcome::from(client.logout().await);
    println!("{}", outcome.message());
    match outcome {
        LogoutOutcome::LoggedOut => Ok(()),
        _ => bail!("logout did not complete"),
    }
}
