use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::panel_block;
use crate::clicks::Clock;
use crate::dashboard::app::App;
use crate::formatters::overview_cells;
use crate::models::PanelId;
use crate::narration::NarrationEngine;

pub fn draw_overview_bar<E: NarrationEngine, C: Clock>(f: &mut Frame, area: Rect, app: &App<E, C>) {
    let registry = app.orchestrator.registry();
    let mut spans = Vec::new();

    if let Some(overview) = registry.overview() {
        for (i, (label, value)) in overview_cells(overview, app.tz).into_iter().enumerate() {
            if i > 0 {
                spans.push(Span::raw(" │ "));
            }
            spans.push(Span::raw(format!("{label}: ")));
            spans.push(Span::styled(
                value,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ));
        }
    }

    let bar = Paragraph::new(Line::from(spans))
        .block(panel_block(PanelId::Overview, registry.get(PanelId::Overview)))
        .alignment(Alignment::Center);

    f.render_widget(bar, area);
}
