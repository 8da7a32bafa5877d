use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as Segment},
        Block, Borders, Paragraph, Wrap,
    },
    Frame,
};

use super::{panel_block, score_color, truncate_to_width};
use crate::clicks::Clock;
use crate::dashboard::app::App;
use crate::formatters::format_map_detail;
use crate::geo::GeoBoundary;
use crate::models::{MapRegion, PanelId};
use crate::narration::NarrationEngine;

const LABEL_WIDTH: usize = 6;

pub fn draw_region_map<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(7)].as_ref())
        .split(area);

    let slot = app.orchestrator.registry().get(PanelId::Map);
    let regions = app.map_regions();
    let selected = regions.get(app.selected_region);
    let block = panel_block(PanelId::Map, slot);

    match slot.and_then(|s| s.boundary.as_deref()) {
        Some(boundary) => draw_canvas(f, chunks[0], block, boundary, regions, selected),
        None => draw_region_list(f, chunks[0], block, regions, app.selected_region),
    }

    draw_detail(f, chunks[1], selected);
}

fn region_score(regions: &[MapRegion], name: &str) -> Option<f64> {
    regions
        .iter()
        .find(|r| r.name == name)
        .and_then(|r| r.value)
}

fn draw_canvas(
    f: &mut Frame,
    area: Rect,
    block: Block<'static>,
    boundary: &GeoBoundary,
    regions: &[MapRegion],
    selected: Option<&MapRegion>,
) {
    let selected_name = selected.map(|r| r.name.as_str());

    let canvas = Canvas::default()
        .block(block)
        .marker(symbols::Marker::Braille)
        .x_bounds(boundary.x_bounds)
        .y_bounds(boundary.y_bounds)
        .paint(|ctx| {
            for shape in &boundary.regions {
                let color = if Some(shape.name.as_str()) == selected_name {
                    Color::White
                } else {
                    region_score(regions, &shape.name)
                        .map(score_color)
                        .unwrap_or(Color::DarkGray)
                };
                for ring in &shape.rings {
                    for pair in ring.windows(2) {
                        ctx.draw(&Segment {
                            x1: pair[0].0,
                            y1: pair[0].1,
                            x2: pair[1].0,
                            y2: pair[1].1,
                            color,
                        });
                    }
                }
            }

            ctx.layer();
            for shape in &boundary.regions {
                if let Some((x, y)) = shape.label_point() {
                    let label = truncate_to_width(&shape.name, LABEL_WIDTH);
                    let style = if Some(shape.name.as_str()) == selected_name {
                        Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().fg(Color::Gray)
                    };
                    ctx.print(x, y, Span::styled(label, style));
                }
            }
        });

    f.render_widget(canvas, area);
}

/// Without a registered boundary the map degrades to a scored list.
fn draw_region_list(
    f: &mut Frame,
    area: Rect,
    block: Block<'static>,
    regions: &[MapRegion],
    selected: usize,
) {
    let lines: Vec<Line> = regions
        .iter()
        .enumerate()
        .map(|(i, region)| {
            let score = region.value.unwrap_or(0.0);
            let marker = if i == selected { "▶ " } else { "  " };
            Line::from(vec![
                Span::raw(marker),
                Span::raw(format!("{:<12}", region.name)),
                Span::styled(format!("{score:>6.1}"), Style::default().fg(score_color(score))),
            ])
        })
        .collect();

    let list = Paragraph::new(lines).block(block);
    f.render_widget(list, area);
}

fn draw_detail(f: &mut Frame, area: Rect, selected: Option<&MapRegion>) {
    let lines: Vec<Line> = match selected {
        Some(region) => format_map_detail(region).into_iter().map(Line::from).collect(),
        None => vec![Line::from(Span::styled(
            "No region data",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let detail = Paragraph::new(lines)
        .block(Block::default().title(" Region Detail ").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(detail, area);
}
