use crate::models::{MapRegion, Overview, PanelData, PanelId, RiskLevel};
use crate::orchestrator::ChartRegistry;
use crate::profile::{PersonalChart, ProfilePage, UserInfoOutcome};
use crate::resolver::Tier;
use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use serde::Serialize;
use std::collections::BTreeMap;

/// Thousands separators: `25600` -> `25,600`.
pub fn format_number(num: u64) -> String {
    let num_str = num.to_string();
    let mut result = String::new();
    let mut count = 0;

    for ch in num_str.chars().rev() {
        if count == 3 {
            result.push(',');
            count = 0;
        }
        result.push(ch);
        count += 1;
    }

    result.chars().rev().collect()
}

/// Fractional score as a whole percentage: `0.68` -> `68%`.
pub fn format_percentage(score: f64) -> String {
    format!("{}%", (score * 100.0).round() as i64)
}

/// Fractional rate with one decimal: `0.1234` -> `12.3%`.
pub fn format_rate(rate: Option<f64>) -> String {
    format!("{:.1}%", rate.unwrap_or(0.0) * 100.0)
}

/// `YYYY/MM/DD HH:MM` in `tz`. Timestamps without an offset are taken as
/// already local; anything unparseable is shown as-is.
pub fn format_update_time(raw: &str, tz: Tz) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&tz).format("%Y/%m/%d %H:%M").to_string();
    }

    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, pattern) {
            if let Some(local) = tz.from_local_datetime(&naive).earliest() {
                return local.format("%Y/%m/%d %H:%M").to_string();
            }
        }
    }

    raw.to_string()
}

/// Map tooltip text for one region.
pub fn format_map_detail(region: &MapRegion) -> Vec<String> {
    let score = region
        .value
        .map(|v| format!("{v}"))
        .unwrap_or_else(|| "n/a".to_string());
    vec![
        region.name.clone(),
        format!("Risk score: {score}"),
        format!("High-risk users: {}", format_number(region.high_risk_count.unwrap_or(0))),
        format!("Hypertension rate: {}", format_rate(region.hypertension_rate)),
        format!("Diabetes rate: {}", format_rate(region.diabetes_rate)),
        format!("Total users: {}", format_number(region.total_users.unwrap_or(0))),
    ]
}

pub fn overview_cells(overview: &Overview, tz: Tz) -> [(&'static str, String); 5] {
    [
        ("Total users", format_number(overview.total_users)),
        ("Regions", format_number(overview.total_regions)),
        ("High-risk users", format_number(overview.high_risk_users)),
        ("Avg risk", format_percentage(overview.avg_risk_score)),
        (
            "Updated",
            overview
                .update_time
                .as_deref()
                .map(|t| format_update_time(t, tz))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]
}

/// One output row per resolved panel.
#[derive(Debug, Clone, Serialize)]
pub struct PanelReport {
    pub panel: PanelId,
    pub title: String,
    pub tier: Tier,
    pub rows: usize,
    pub summary: String,
    pub fallbacks: Vec<String>,
    pub error: Option<String>,
}

pub fn build_reports(registry: &ChartRegistry, tz: Tz) -> Vec<PanelReport> {
    registry
        .iter()
        .map(|(panel, slot)| PanelReport {
            panel: *panel,
            title: panel.title().to_string(),
            tier: slot.tier,
            rows: slot.data.as_ref().map(PanelData::len).unwrap_or(0),
            summary: slot
                .data
                .as_ref()
                .map(|data| summarize(data, tz))
                .unwrap_or_else(|| "no data".to_string()),
            fallbacks: slot
                .fallbacks
                .iter()
                .map(|(tier, err)| format!("{tier}: {}", err.kind()))
                .collect(),
            error: slot.error.as_ref().map(|e| e.to_string()),
        })
        .collect()
}

fn summarize(data: &PanelData, tz: Tz) -> String {
    match data {
        PanelData::Overview(o) => {
            let updated = o
                .update_time
                .as_deref()
                .map(|t| format_update_time(t, tz))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{} users, {} regions, {} high-risk, avg {}, updated {}",
                format_number(o.total_users),
                format_number(o.total_regions),
                format_number(o.high_risk_users),
                format_percentage(o.avg_risk_score),
                updated
            )
        }
        PanelData::Map(rows) => rows
            .iter()
            .filter(|r| r.value.is_some())
            .max_by(|a, b| a.value.unwrap_or(0.0).total_cmp(&b.value.unwrap_or(0.0)))
            .map(|r| format!("highest: {} ({})", r.name, r.value.unwrap_or(0.0)))
            .unwrap_or_else(|| "empty".to_string()),
        PanelData::RegionUsers(rows) => rows
            .iter()
            .max_by_key(|r| r.value)
            .map(|r| format!("largest: {} ({})", r.name, format_number(r.value)))
            .unwrap_or_else(|| "empty".to_string()),
        PanelData::AgeRisk(rows) => {
            if rows.is_empty() {
                return "empty".to_string();
            }
            let high: u64 = rows.iter().map(|r| r.high).sum();
            format!("{} groups, {} high-risk", rows.len(), format_number(high))
        }
        PanelData::RegionRisk(rows) => rows
            .iter()
            .max_by_key(|r| r.high)
            .map(|r| format!("most high-risk: {} ({})", r.region, format_number(r.high)))
            .unwrap_or_else(|| "empty".to_string()),
        PanelData::RiskDistribution(rows) => {
            if rows.is_empty() {
                return "empty".to_string();
            }
            let mean = rows.iter().map(|r| r.score).sum::<f64>() / rows.len() as f64;
            format!("{} regions, mean score {:.1}", rows.len(), mean)
        }
    }
}

fn tier_style(tier: Tier) -> &'static str {
    match tier {
        Tier::Inline | Tier::Remote => "Fg",
        Tier::Static => "Fy",
        Tier::Default => "Fm",
        Tier::None => "Fr",
    }
}

pub fn format_table(reports: &[PanelReport], show_summary: bool) -> String {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

    table.set_titles(Row::new(vec![
        Cell::new("Panel").style_spec("bFc"),
        Cell::new("Source").style_spec("bFc"),
        Cell::new("Rows").style_spec("bFc"),
        Cell::new("Summary").style_spec("bFc"),
        Cell::new("Fell back from").style_spec("bFc"),
    ]));

    for report in reports {
        table.add_row(Row::new(vec![
            Cell::new(&report.title),
            Cell::new(report.tier.as_str()).style_spec(tier_style(report.tier)),
            Cell::new(&report.rows.to_string()),
            Cell::new(&report.summary),
            Cell::new(&report.fallbacks.join(", ")),
        ]));
    }

    if show_summary {
        let live = reports.iter().filter(|r| r.tier.is_live()).count();
        table.add_empty_row();
        table.add_row(Row::new(vec![
            Cell::new("TOTAL").style_spec("bFy"),
            Cell::new(&format!("{live}/{} live", reports.len())).style_spec("bFy"),
            Cell::new(&reports.iter().map(|r| r.rows).sum::<usize>().to_string()).style_spec("bFy"),
            Cell::new("").style_spec("bFy"),
            Cell::new("").style_spec("bFy"),
        ]));
    }

    table.to_string()
}

pub fn format_csv(reports: &[PanelReport]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["panel", "source", "rows", "summary", "fell_back_from", "error"])?;

    for report in reports {
        let rows = report.rows.to_string();
        let fallbacks = report.fallbacks.join("; ");
        writer.write_record([
            report.panel.as_str(),
            report.tier.as_str(),
            rows.as_str(),
            report.summary.as_str(),
            fallbacks.as_str(),
            report.error.as_deref().unwrap_or(""),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn format_json(reports: &[PanelReport]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(reports)
}

pub fn format_markdown(reports: &[PanelReport], show_summary: bool) -> String {
    let mut md = String::new();

    md.push_str("| Panel | Source | Rows | Summary | Fell back from |\n");
    md.push_str("|-------|--------|------|---------|----------------|\n");

    for report in reports {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            report.title,
            report.tier,
            report.rows,
            report.summary.replace('|', "\\|"),
            report.fallbacks.join(", ")
        ));
    }

    if show_summary {
        let live = reports.iter().filter(|r| r.tier.is_live()).count();
        md.push_str(&format!(
            "| **TOTAL** | **{}/{} live** | **{}** | | |\n",
            live,
            reports.len(),
            reports.iter().map(|r| r.rows).sum::<usize>()
        ));
    }

    md
}

pub fn print_summary(reports: &[PanelReport]) {
    println!("\n{}", "=== Data Sources ===".bright_cyan().bold());

    let mut by_tier: BTreeMap<&'static str, Vec<&str>> = BTreeMap::new();
    for report in reports {
        by_tier
            .entry(report.tier.as_str())
            .or_default()
            .push(report.panel.as_str());
    }

    for (tier, panels) in by_tier {
        let label = match tier {
            "inline" | "remote" => tier.green(),
            "static" => tier.yellow(),
            "default" => tier.magenta(),
            _ => tier.red(),
        };
        println!("  {:<8} {}", label, panels.join(", "));
    }

    let failed: Vec<_> = reports.iter().filter(|r| r.error.is_some()).collect();
    if !failed.is_empty() {
        println!("\n{}", "Unresolved:".yellow());
        for report in failed {
            println!(
                "  {}: {}",
                report.panel.as_str().bright_blue(),
                report.error.as_deref().unwrap_or("")
            );
        }
    }
}

/// Serializable view of the profile page for `--format json`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport<'a> {
    pub status: &'static str,
    pub user: Option<&'a crate::models::UserProfile>,
    pub charts_source: Tier,
    pub charts: Vec<ChartReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartReport {
    pub chart: PersonalChart,
    pub title: &'static str,
    pub points: usize,
    pub latest: Vec<(String, f64)>,
}

pub fn build_profile_report(page: &ProfilePage) -> ProfileReport<'_> {
    let status = match &page.user {
        UserInfoOutcome::Loading => "loading",
        UserInfoOutcome::Loaded(_) => "ok",
        UserInfoOutcome::NotAuthenticated => "not-authenticated",
        UserInfoOutcome::Unavailable(_) => "unavailable",
        UserInfoOutcome::Network(_) => "network-error",
    };

    let charts = PersonalChart::ALL
        .iter()
        .map(|chart| match page.charts.trend(*chart) {
            Some(trend) => ChartReport {
                chart: *chart,
                title: chart.title(),
                points: trend.dates.len(),
                latest: trend
                    .series
                    .iter()
                    .filter_map(|s| s.values.last().map(|v| (s.label.clone(), *v)))
                    .collect(),
            },
            None => ChartReport {
                chart: *chart,
                title: chart.title(),
                points: page.charts.radar.values.len(),
                latest: page
                    .charts
                    .radar
                    .indicators
                    .iter()
                    .zip(&page.charts.radar.values)
                    .map(|(i, v)| (i.name.clone(), *v))
                    .collect(),
            },
        })
        .collect();

    ProfileReport {
        status,
        user: page.user.profile(),
        charts_source: page.charts_tier,
        charts,
    }
}

pub fn print_profile(page: &ProfilePage) {
    println!("\n{}", "=== Profile ===".bright_cyan().bold());

    match page.user.profile() {
        Some(user) => {
            println!("  {}", user.name.bold());
            println!("  {}", user.meta_line());
            if let Some(risk) = user.primary_risk() {
                let badge = match RiskLevel::from_label(&risk.level) {
                    RiskLevel::Low => risk.level.green(),
                    RiskLevel::Medium => risk.level.yellow(),
                    RiskLevel::High => risk.level.red(),
                    RiskLevel::Unknown => risk.level.normal(),
                };
                println!("\n{}", "Risk:".yellow());
                println!("  {}", risk.label);
                println!("  Level: {}", badge.bold());
            }
            println!("\n{}", "Suggestions:".yellow());
            for suggestion in &user.suggestions {
                println!("  - {suggestion}");
            }
        }
        None => {
            let notice = page.user.notice().unwrap_or_default();
            println!("  {}", notice.red());
        }
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(vec![
        Cell::new("#").style_spec("bFc"),
        Cell::new("Chart").style_spec("bFc"),
        Cell::new("Latest").style_spec("bFc"),
    ]));
    for (idx, chart) in build_profile_report(page).charts.iter().enumerate() {
        let latest = chart
            .latest
            .iter()
            .map(|(label, v)| format!("{label} {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(Row::new(vec![
            Cell::new(&(idx + 1).to_string()),
            Cell::new(chart.title),
            Cell::new(&latest),
        ]));
    }
    println!(
        "\n{} {}",
        "Charts".yellow(),
        format!("(source: {})", page.charts_tier).dimmed()
    );
    println!("{table}");
}
