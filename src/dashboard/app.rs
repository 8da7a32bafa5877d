use crate::api::{ApiClient, Endpoints};
use crate::clicks::{ClickDisambiguator, ClickKind, Clock, SystemClock};
use crate::config::Settings;
use crate::error::NarrationError;
use crate::models::{MapRegion, PanelData, PanelId};
use crate::narration::{NarrationController, NarrationEngine, PacedEngine};
use crate::orchestrator::Orchestrator;
use crate::profile::{self, LogoutOutcome, PersonalChart, PersonalCharts, ProfilePage};
use crate::resolver::Fetcher;
use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ratatui::layout::Rect;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info};

const STATUS_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Overview,
    Profile,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Overview => Page::Profile,
            Page::Profile => Page::Overview,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Page::Overview => 0,
            Page::Profile => 1,
        }
    }
}

pub struct App<E: NarrationEngine = PacedEngine, C: Clock = SystemClock> {
    pub orchestrator: Orchestrator,
    pub profile: ProfilePage,
    pub narration: NarrationController<E>,
    pub clicks: ClickDisambiguator<C>,
    pub page: Page,
    pub selected_chart: PersonalChart,
    pub selected_region: usize,
    pub tz: Tz,
    pub last_update: DateTime<Utc>,
    pub refresh_secs: f64,
    pub should_quit: bool,
    pub exit_message: Option<String>,
    /// Where the narration button was last drawn, for mouse hit-testing.
    pub narrate_button: Rect,
    status: Option<(String, Instant)>,
    fetcher: Arc<dyn Fetcher>,
    endpoints: Endpoints,
    chart_defaults: PersonalCharts,
    session: Option<Arc<ApiClient>>,
    profile_rx: Option<oneshot::Receiver<ProfilePage>>,
    logout_rx: Option<oneshot::Receiver<LogoutOutcome>>,
}

impl<E: NarrationEngine, C: Clock> App<E, C> {
    pub fn new(
        settings: &Settings,
        orchestrator: Orchestrator,
        fetcher: Arc<dyn Fetcher>,
        engine: E,
        clock: C,
    ) -> Result<Self> {
        let tz = settings.tz()?;
        let today = Utc::now().with_timezone(&tz).date_naive();
        let chart_defaults = PersonalCharts::defaults(today, &mut rand::thread_rng());

        Ok(Self {
            orchestrator,
            profile: ProfilePage::placeholder(chart_defaults.clone()),
            narration: NarrationController::new(engine, settings.narration.clone()),
            clicks: ClickDisambiguator::with_clock(settings.click_window(), clock),
            page: Page::Overview,
            selected_chart: PersonalChart::Radar,
            selected_region: 0,
            tz,
            last_update: Utc::now(),
            refresh_secs: settings.refresh_secs,
            should_quit: false,
            exit_message: None,
            narrate_button: Rect::default(),
            status: None,
            fetcher,
            endpoints: Endpoints::from_settings(settings)?,
            chart_defaults,
            session: None,
            profile_rx: None,
            logout_rx: None,
        })
    }

    /// Enables logout through the given API client.
    pub fn with_session(mut self, client: Arc<ApiClient>) -> Self {
        self.session = Some(client);
        self
    }

    /// Re-run every load. Earlier refreshes keep running; whichever finishes
    /// last for a panel is what stays on screen.
    pub fn refresh(&mut self) {
        drop(self.orchestrator.refresh());

        let (tx, rx) = oneshot::channel();
        let fetcher = self.fetcher.clone();
        let endpoints = self.endpoints.clone();
        let defaults = self.chart_defaults.clone();
        tokio::spawn(async move {
            let page = profile::load_profile(fetcher, &endpoints, defaults).await;
            let _ = tx.send(page);
        });
        self.profile_rx = Some(rx);
    }

    /// Applies everything that completed since the last tick and fires the
    /// pending single click once its window has passed.
    pub fn on_tick(&mut self) {
        if self.orchestrator.drain() > 0 {
            self.last_update = Utc::now();
            self.clamp_region();
        }

        if let Some(rx) = self.profile_rx.as_mut() {
            match rx.try_recv() {
                Ok(page) => {
                    if let Some(notice) = page.user.notice() {
                        self.set_status(notice);
                    }
                    self.profile = page;
                    self.profile_rx = None;
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => self.profile_rx = None,
            }
        }

        if let Some(rx) = self.logout_rx.as_mut() {
            match rx.try_recv() {
                Ok(outcome) => {
                    self.logout_rx = None;
                    self.finish_logout(outcome);
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => self.logout_rx = None,
            }
        }

        self.narration.process_events();
        if let Some(notice) = self.narration.take_notice() {
            self.set_status(notice);
        }

        if let Some(kind) = self.clicks.poll() {
            self.apply_click(kind);
        }
    }

    /// One raw click on the narration button.
    pub fn click_narrate(&mut self) {
        if let Some(kind) = self.clicks.on_click() {
            self.apply_click(kind);
        }
    }

    fn apply_click(&mut self, kind: ClickKind) {
        debug!(?kind, "narration click");
        match kind {
            ClickKind::Single => {
                if let Err(err) = self.narration.toggle(self.profile.suggestions()) {
                    if err == NarrationError::EmptyContent {
                        self.set_status(err.to_string());
                    }
                }
            }
            ClickKind::Double => self.narration.stop(),
        }
    }

    pub fn logout(&mut self) {
        let Some(client) = self.session.clone() else {
            self.set_status("Logout is not available");
            return;
        };
        if self.logout_rx.is_some() {
            return;
        }

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(LogoutOutcome::from(client.logout().await));
        });
        self.logout_rx = Some(rx);
        self.set_status("Logging out...");
    }

    fn finish_logout(&mut self, outcome: LogoutOutcome) {
        info!(?outcome, "logout finished");
        if outcome == LogoutOutcome::LoggedOut {
            self.narration.stop();
            self.exit_message = Some(format!("{}. Log in again to continue.", outcome.message()));
            self.should_quit = true;
        } else {
            self.set_status(outcome.message());
        }
    }

    pub fn next_page(&mut self) {
        self.page = self.page.next();
    }

    /// 1-based catalog selection; switches to the profile page.
    pub fn select_chart(&mut self, index: usize) {
        if let Some(chart) = PersonalChart::from_index(index) {
            self.selected_chart = chart;
            self.page = Page::Profile;
        }
    }

    pub fn map_regions(&self) -> &[MapRegion] {
        match self
            .orchestrator
            .registry()
            .get(PanelId::Map)
            .and_then(|slot| slot.data.as_ref())
        {
            Some(PanelData::Map(rows)) => rows,
            _ => &[],
        }
    }

    pub fn select_next_region(&mut self) {
        let len = self.map_regions().len();
        if len > 0 {
            self.selected_region = (self.selected_region + 1) % len;
        }
    }

    pub fn select_prev_region(&mut self) {
        let len = self.map_regions().len();
        if len > 0 {
            self.selected_region = (self.selected_region + len - 1) % len;
        }
    }

    fn clamp_region(&mut self) {
        let len = self.map_regions().len();
        if self.selected_region >= len {
            self.selected_region = 0;
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Instant::now()));
    }

    pub fn status(&self) -> Option<&str> {
        self.status
            .as_ref()
            .filter(|(_, at)| at.elapsed() < STATUS_TTL)
            .map(|(msg, _)| msg.as_str())
    }

    /// How long the runner may block waiting for input.
    pub fn poll_timeout(&self, tick: Duration) -> Duration {
        match self.clicks.time_to_deadline() {
            Some(left) => left.min(tick),
            None => tick,
        }
    }
}
