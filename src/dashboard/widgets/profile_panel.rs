use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::clicks::Clock;
use crate::dashboard::app::App;
use crate::models::RiskLevel;
use crate::narration::{NarrationEngine, NarrationState};

/// Draws the user card, suggestions and narration button. Returns where the
/// button landed so mouse clicks can be matched against it.
pub fn draw_profile_panel<E: NarrationEngine, C: Clock>(
    f: &mut Frame,
    area: Rect,
    app: &App<E, C>,
) -> Rect {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(6),
                Constraint::Min(4),
                Constraint::Length(3),
                Constraint::Length(5),
            ]
            .as_ref(),
        )
        .split(area);

    draw_user_card(f, chunks[0], app);
    draw_suggestions(f, chunks[1], app);
    draw_button(f, chunks[2], app);
    draw_caption(f, chunks[3], app);
    chunks[2]
}

fn risk_color(level: RiskLevel) -> Color {
    match level {
        RiskLevel::Low => Color::Green,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::High => Color::Red,
        RiskLevel::Unknown => Color::Gray,
    }
}

fn draw_user_card<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let lines = match app.profile.user.profile() {
        Some(user) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    user.name.clone(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )),
                Line::from(user.meta_line()),
            ];
            if let Some(risk) = user.primary_risk() {
                let level = RiskLevel::from_label(&risk.level);
                lines.push(Line::from(vec![
                    Span::raw("Risk: "),
                    Span::styled(
                        format!(" {} ({}) ", risk.label, risk.level),
                        Style::default().fg(Color::Black).bg(risk_color(level)),
                    ),
                ]));
            }
            lines
        }
        None => vec![Line::from(Span::styled(
            app.profile.user.notice().unwrap_or_default(),
            Style::default().fg(Color::Yellow),
        ))],
    };

    let card = Paragraph::new(lines).block(Block::default().title(" Profile ").borders(Borders::ALL));
    f.render_widget(card, area);
}

fn draw_suggestions<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let suggestions = app.profile.suggestions();
    let lines: Vec<Line> = if suggestions.is_empty() {
        vec![Line::from(Span::styled(
            "No suggestions yet",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        suggestions
            .iter()
            .enumerate()
            .map(|(i, s)| Line::from(vec![
                Span::styled(format!("{}. ", i + 1), Style::default().fg(Color::Cyan)),
                Span::raw(s.clone()),
            ]))
            .collect()
    };

    let list = Paragraph::new(lines)
        .block(Block::default().title(" Health Suggestions ").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(list, area);
}

fn draw_button<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let state = app.narration.state();
    let color = match state {
        NarrationState::Idle if app.narration.is_awaiting_start() => Color::DarkGray,
        NarrationState::Idle => Color::Cyan,
        NarrationState::Speaking => Color::Green,
        NarrationState::Paused => Color::Yellow,
    };

    let button = Paragraph::new(Line::from(Span::styled(
        app.narration.indicator(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(" click: play/pause, double-click: stop "),
    );
    f.render_widget(button, area);
}

fn draw_caption<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let caption = if app.narration.state() == NarrationState::Idle {
        String::new()
    } else {
        app.narration.engine().caption()
    };

    let text = Paragraph::new(caption)
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Now Reading "));
    f.render_widget(text, area);
}
