use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Bar, BarChart, BarGroup, Block, Borders, Chart, Dataset, GraphType, Paragraph, Wrap},
    Frame,
};

use super::tier_color;
use crate::clicks::Clock;
use crate::dashboard::app::App;
use crate::narration::NarrationEngine;
use crate::profile::{PersonalChart, RadarChart, TrendChart};

const SERIES_COLORS: [Color; 3] = [Color::Cyan, Color::Magenta, Color::Yellow];

pub fn draw_personal_chart<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(26), Constraint::Min(20)].as_ref())
        .split(area);

    draw_catalog(f, chunks[0], app.selected_chart);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(4)].as_ref())
        .split(chunks[1]);

    let tier = app.profile.charts_tier;
    let block = Block::default()
        .title(format!(" {} [{}] ", app.selected_chart.title(), tier))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tier_color(tier)));

    match app.profile.charts.trend(app.selected_chart) {
        Some(trend) => draw_trend(f, right[0], block, trend),
        None => draw_radar(f, right[0], block, &app.profile.charts.radar),
    }

    let description = Paragraph::new(app.selected_chart.description())
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" About "));
    f.render_widget(description, right[1]);
}

fn draw_catalog(f: &mut Frame, area: Rect, selected: PersonalChart) {
    let lines: Vec<Line> = PersonalChart::ALL
        .iter()
        .enumerate()
        .map(|(i, chart)| {
            let style = if *chart == selected {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::REVERSED)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("[{}] ", i + 1), Style::default().fg(Color::Yellow)),
                Span::styled(chart.title(), style),
            ])
        })
        .collect();

    let catalog = Paragraph::new(lines).block(Block::default().title(" Charts ").borders(Borders::ALL));
    f.render_widget(catalog, area);
}

fn draw_radar(f: &mut Frame, area: Rect, block: Block<'static>, radar: &RadarChart) {
    let bars: Vec<Bar> = radar
        .indicators
        .iter()
        .zip(&radar.values)
        .map(|(indicator, value)| {
            Bar::default()
                .value(value.round().max(0.0) as u64)
                .text_value(format!("{value:.0}/{:.0}", indicator.max))
                .label(Line::from(indicator.name.clone()))
        })
        .collect();

    let chart = BarChart::default()
        .block(block)
        .direction(Direction::Horizontal)
        .data(BarGroup::default().bars(&bars))
        .max(radar.indicators.iter().map(|i| i.max).fold(0.0, f64::max).round() as u64)
        .bar_width(1)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    f.render_widget(chart, area);
}

fn draw_trend(f: &mut Frame, area: Rect, block: Block<'static>, trend: &TrendChart) {
    let points: Vec<Vec<(f64, f64)>> = trend
        .series
        .iter()
        .map(|s| s.values.iter().enumerate().map(|(i, v)| (i as f64, *v)).collect())
        .collect();

    let datasets: Vec<Dataset> = trend
        .series
        .iter()
        .zip(&points)
        .enumerate()
        .map(|(i, (series, data))| {
            Dataset::default()
                .name(series.label.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(SERIES_COLORS[i % SERIES_COLORS.len()]))
                .data(data)
        })
        .collect();

    let (lo, hi) = trend.value_bounds().unwrap_or((0.0, 1.0));
    let pad = ((hi - lo) * 0.1).max(1.0);
    let (y_min, y_max) = (lo - pad, hi + pad);
    let x_max = trend.dates.len().saturating_sub(1).max(1) as f64;

    let x_labels: Vec<Span> = [trend.dates.first(), trend.dates.get(trend.dates.len() / 2), trend.dates.last()]
        .into_iter()
        .flatten()
        .map(|d| Span::raw(d.clone()))
        .collect();
    let y_labels: Vec<Span> = (0..=4)
        .map(|i| Span::raw(format!("{:.0}", y_min + (y_max - y_min) * i as f64 / 4.0)))
        .collect();

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .labels(x_labels)
                .bounds([0.0, x_max]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .labels(y_labels)
                .bounds([y_min, y_max]),
        );
    f.render_widget(chart, area);
}
