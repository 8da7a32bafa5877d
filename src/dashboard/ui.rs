use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame,
};

use super::app::{App, Page};
use super::widgets::{
    overview_bar::draw_overview_bar, panel_charts::draw_panel_chart,
    personal_chart::draw_personal_chart, profile_panel::draw_profile_panel,
    region_map::draw_region_map, tier_color,
};
use crate::clicks::Clock;
use crate::models::PanelId;
use crate::narration::NarrationEngine;

pub fn draw<E: NarrationEngine, C: Clock>(f: &mut Frame, app: &mut App<E, C>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3), // Header
                Constraint::Min(15),   // Page
                Constraint::Length(3), // Status
                Constraint::Length(2), // Help
            ]
            .as_ref(),
        )
        .split(f.size());

    draw_header(f, chunks[0], app);
    match app.page {
        Page::Overview => {
            draw_overview_page(f, chunks[1], app);
            app.narrate_button = Rect::default();
        }
        Page::Profile => {
            app.narrate_button = draw_profile_page(f, chunks[1], app);
        }
    }
    draw_status(f, chunks[2], app);
    draw_help(f, chunks[3], app.page);
}

fn draw_header<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(20)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec!["Overview", "Profile"])
        .select(app.page.index())
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(tabs, chunks[0]);

    let refresh = if app.refresh_secs > 0.0 {
        format!("every {}s", app.refresh_secs)
    } else {
        "manual".to_string()
    };
    let mut spans = vec![
        Span::raw("Last Update: "),
        Span::raw(
            app.last_update
                .with_timezone(&app.tz)
                .format("%H:%M:%S")
                .to_string(),
        ),
        Span::raw(format!(" | Auto-refresh: {refresh}")),
    ];
    let loading = app.orchestrator.in_flight();
    if loading > 0 {
        spans.push(Span::styled(
            format!(" | loading ({loading})"),
            Style::default().fg(Color::Yellow),
        ));
    }

    let header = Paragraph::new(Line::from(spans))
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .title(" Health Risk Dashboard ")
                .title_alignment(Alignment::Center)
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
    f.render_widget(header, chunks[1]);
}

fn draw_overview_page<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(12)].as_ref())
        .split(area);

    draw_overview_bar(f, rows[0], app);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
        .split(rows[1]);

    draw_region_map(f, columns[0], app);

    let grid = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(columns[1]);
    for (row, panels) in grid.iter().zip([
        [PanelId::RegionUsers, PanelId::AgeRisk],
        [PanelId::RegionRisk, PanelId::RiskDistribution],
    ]) {
        let cells = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
            .split(*row);
        for (cell, panel) in cells.iter().zip(panels) {
            draw_panel_chart(f, *cell, app, panel);
        }
    }
}

fn draw_profile_page<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) -> Rect {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(38), Constraint::Percentage(62)].as_ref())
        .split(area);

    let button = draw_profile_panel(f, columns[0], app);
    draw_personal_chart(f, columns[1], app);
    button
}

fn draw_status<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let line = match app.status() {
        Some(message) => Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        None => {
            let registry = app.orchestrator.registry();
            let mut spans = vec![Span::raw("Sources: ")];
            for panel in std::iter::once(PanelId::Overview).chain(PanelId::BUNDLE) {
                if let Some(slot) = registry.get(panel) {
                    spans.push(Span::raw(format!("{} ", panel.as_str())));
                    spans.push(Span::styled(
                        format!("{}  ", slot.tier),
                        Style::default().fg(tier_color(slot.tier)),
                    ));
                }
            }
            Line::from(spans)
        }
    };

    let status = Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    f.render_widget(status, area);
}

fn key(k: &str) -> Span<'_> {
    Span::styled(k, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
}

fn draw_help(f: &mut Frame, area: Rect, page: Page) {
    let mut help_text = vec![
        Span::raw("["),
        key("q"),
        Span::raw("]uit ["),
        key("r"),
        Span::raw("]efresh ["),
        key("Tab"),
        Span::raw("] page ["),
        key("1-7"),
        Span::raw("] chart ["),
        key("l"),
        Span::raw("]ogout"),
    ];
    match page {
        Page::Overview => {
            help_text.push(Span::raw(" ["));
            help_text.push(key("↑↓"));
            help_text.push(Span::raw("] region"));
        }
        Page::Profile => {
            help_text.push(Span::raw(" ["));
            help_text.push(key("s"));
            help_text.push(Span::raw("]peak (press twice to stop)"));
        }
    }

    let help = Paragraph::new(Line::from(help_text))
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::TOP))
        .alignment(Alignment::Center);

    f.render_widget(help, area);
}
