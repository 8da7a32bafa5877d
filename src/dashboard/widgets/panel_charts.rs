use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Paragraph},
    Frame,
};

use super::{panel_block, score_color, truncate_to_width};
use crate::clicks::Clock;
use crate::dashboard::app::App;
use crate::models::{PanelData, PanelId};
use crate::narration::NarrationEngine;

const BAR_LABEL_WIDTH: usize = 6;

pub fn draw_panel_chart<E: NarrationEngine, C: Clock>(
    f: &mut Frame,
    area: Rect,
    app: &App<E, C>,
    panel: PanelId,
) {
    let slot = app.orchestrator.registry().get(panel);
    let block = panel_block(panel, slot);

    match slot.and_then(|s| s.data.as_ref()) {
        Some(PanelData::RegionUsers(rows)) => {
            let bars: Vec<Bar> = rows
                .iter()
                .map(|r| simple_bar(&r.name, r.value, Color::Cyan))
                .collect();
            draw_bars(f, area, block, bars);
        }
        Some(PanelData::RiskDistribution(rows)) => {
            let bars: Vec<Bar> = rows
                .iter()
                .map(|r| simple_bar(&r.region, r.score.round().max(0.0) as u64, score_color(r.score)))
                .collect();
            draw_bars(f, area, block, bars);
        }
        Some(PanelData::AgeRisk(rows)) => {
            let groups = rows
                .iter()
                .map(|r| risk_group(&r.age_group, r.low, r.medium, r.high))
                .collect();
            draw_groups(f, area, block, groups);
        }
        Some(PanelData::RegionRisk(rows)) => {
            let groups = rows
                .iter()
                .map(|r| risk_group(&r.region, r.low, r.medium, r.high))
                .collect();
            draw_groups(f, area, block, groups);
        }
        _ => {
            let empty = Paragraph::new(Line::from(Span::styled(
                "No data",
                Style::default().fg(Color::DarkGray),
            )))
            .block(block);
            f.render_widget(empty, area);
        }
    }
}

fn simple_bar(label: &str, value: u64, color: Color) -> Bar<'static> {
    Bar::default()
        .value(value)
        .label(Line::from(truncate_to_width(label, BAR_LABEL_WIDTH)))
        .style(Style::default().fg(color))
        .value_style(Style::default().fg(Color::Black).bg(color))
}

fn risk_group(label: &str, low: u64, medium: u64, high: u64) -> BarGroup<'static> {
    BarGroup::default()
        .label(Line::from(truncate_to_width(label, BAR_LABEL_WIDTH * 2)))
        .bars(&[
            Bar::default().value(low).style(Style::default().fg(Color::Green)),
            Bar::default().value(medium).style(Style::default().fg(Color::Yellow)),
            Bar::default().value(high).style(Style::default().fg(Color::Red)),
        ])
}

fn draw_bars(f: &mut Frame, area: Rect, block: Block<'static>, bars: Vec<Bar<'static>>) {
    let chart = BarChart::default()
        .block(block)
        .data(BarGroup::default().bars(&bars))
        .bar_width(BAR_LABEL_WIDTH as u16)
        .bar_gap(1)
        .value_style(Style::default().add_modifier(Modifier::BOLD));
    f.render_widget(chart, area);
}

fn draw_groups(f: &mut Frame, area: Rect, block: Block<'static>, groups: Vec<BarGroup<'static>>) {
    let mut chart = BarChart::default()
        .block(block)
        .bar_width(3)
        .bar_gap(0)
        .group_gap(2)
        .value_style(Style::default().fg(Color::Black).add_modifier(Modifier::BOLD));
    for group in groups {
        chart = chart.data(group);
    }
    f.render_widget(chart, area);
}
