use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use super::app::App;
use super::events::{handle_key_event, handle_mouse_event};
use super::ui;
use crate::api::ApiClient;
use crate::clicks::SystemClock;
use crate::config::Settings;
use crate::narration::PacedEngine;
use crate::orchestrator::{Orchestrator, PanelLoader};

const TICK_RATE: Duration = Duration::from_millis(100);

pub async fn run_dashboard(settings: Settings) -> Result<()> {
    let client = Arc::new(ApiClient::new(&settings)?);
    let loader = PanelLoader::new(
        client.clone(),
        client.endpoints().clone(),
        settings.overview_defaults.clone(),
    );
    let engine = PacedEngine::new(settings.narration.words_per_second);
    let mut app = App::new(
        &settings,
        Orchestrator::new(loader),
        client.clone(),
        engine,
        SystemClock,
    )?
    .with_session(client);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // First paint shows the built-in defaults while the load runs
    app.refresh();
    info!("dashboard started");

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }
    if let Some(message) = app.exit_message.take() {
        println!("{message}");
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    let auto_refresh = (app.refresh_secs > 0.0).then(|| Duration::from_secs_f64(app.refresh_secs));
    let mut last_refresh = Instant::now();

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if crossterm::event::poll(app.poll_timeout(TICK_RATE))? {
            match event::read()? {
                // Release events would count as a second narration click
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key_event(key, app),
                Event::Mouse(mouse) => handle_mouse_event(mouse, app),
                _ => {}
            }
        }

        app.on_tick();
        if app.should_quit {
            return Ok(());
        }

        if let Some(every) = auto_refresh {
            if last_refresh.elapsed() >= every {
                app.refresh();
                last_refresh = Instant::now();
            }
        }

        // Let spawned loads and narration make progress between frames
        tokio::task::yield_now().await;
    }
}
