pub mod overview_bar;
pub mod panel_charts;
pub mod personal_chart;
pub mod profile_panel;
pub mod region_map;

use ratatui::{
    style::{Color, Style},
    widgets::{Block, Borders},
};
use unicode_width::UnicodeWidthChar;

use crate::models::PanelId;
use crate::orchestrator::ChartSlot;
use crate::resolver::Tier;

pub fn tier_color(tier: Tier) -> Color {
    match tier {
        Tier::Inline | Tier::Remote => Color::Green,
        Tier::Static => Color::Yellow,
        Tier::Default => Color::DarkGray,
        Tier::None => Color::Red,
    }
}

/// Bordered block titled with the panel name and where its data came from.
pub fn panel_block(panel: PanelId, slot: Option<&ChartSlot>) -> Block<'static> {
    let tier = slot.map(|s| s.tier).unwrap_or(Tier::None);
    Block::default()
        .title(format!(" {} [{}] ", panel.title(), tier))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tier_color(tier)))
}

/// Green through red over the 0..100 risk scale.
pub fn score_color(score: f64) -> Color {
    match score {
        s if s >= 80.0 => Color::Red,
        s if s >= 60.0 => Color::LightRed,
        s if s >= 40.0 => Color::Yellow,
        s if s >= 20.0 => Color::LightGreen,
        _ => Color::Green,
    }
}

/// Cut `text` to at most `max` terminal columns. CJK glyphs count as two.
pub fn truncate_to_width(text: &str, max: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > max {
            break;
        }
        used += w;
        out.push(ch);
    }
    out
}
