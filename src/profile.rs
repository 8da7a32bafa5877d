//! Personal profile page: user info, personal health charts and logout.

use crate::api::Endpoints;
use crate::error::FetchError;
use crate::models::{PanelId, UserProfile};
use crate::resolver::{Fetcher, PanelRequest, Provider, Resolver, Tier};
use chrono::{Duration, NaiveDate};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub const TREND_DAYS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersonalChart {
    Radar,
    Disease,
    BloodPressure,
    BloodSugar,
    Bmi,
    Sleep,
    HeartRate,
}

/// One plotted metric of a trend chart: payload field, legend label and the
/// range its default series wanders in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSpec {
    pub field: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
}

const DISEASE: &[MetricSpec] = &[
    MetricSpec { field: "hypertension", label: "Hypertension risk", min: 30.0, max: 70.0 },
    MetricSpec { field: "diabetes", label: "Diabetes risk", min: 40.0, max: 80.0 },
    MetricSpec { field: "osteoporosis", label: "Osteoporosis risk", min: 50.0, max: 90.0 },
];
const BLOOD_PRESSURE: &[MetricSpec] = &[
    MetricSpec { field: "systolic", label: "Systolic (mmHg)", min: 110.0, max: 150.0 },
    MetricSpec { field: "diastolic", label: "Diastolic (mmHg)", min: 70.0, max: 100.0 },
];
const BLOOD_SUGAR: &[MetricSpec] = &[MetricSpec { field: "values", label: "Fasting glucose (mmol/L)", min: 4.5, max: 7.0 }];
const BMI: &[MetricSpec] = &[MetricSpec { field: "values", label: "BMI", min: 22.0, max: 28.0 }];
const SLEEP: &[MetricSpec] = &[MetricSpec { field: "values", label: "Sleep (hours)", min: 5.0, max: 8.5 }];
const HEART_RATE: &[MetricSpec] = &[MetricSpec { field: "values", label: "Resting heart rate (bpm)", min: 60.0, max: 100.0 }];

impl PersonalChart {
    pub const ALL: [PersonalChart; 7] = [
        PersonalChart::Radar,
        PersonalChart::Disease,
        PersonalChart::BloodPressure,
        PersonalChart::BloodSugar,
        PersonalChart::Bmi,
        PersonalChart::Sleep,
        PersonalChart::HeartRate,
    ];

    /// Key in the `charts` object of the charts payload.
    pub fn key(&self) -> &'static str {
        match self {
            PersonalChart::Radar => "radar",
            PersonalChart::Disease => "disease",
            PersonalChart::BloodPressure => "blood-pressure",
            PersonalChart::BloodSugar => "blood-sugar",
            PersonalChart::Bmi => "bmi",
            PersonalChart::Sleep => "sleep",
            PersonalChart::HeartRate => "heart-rate",
        }
    }

    /// 1-based catalog position.
    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn title(&self) -> &'static str {
        match self {
            PersonalChart::Radar => "Health Radar",
            PersonalChart::Disease => "Chronic Disease Trend",
            PersonalChart::BloodPressure => "Blood Pressure",
            PersonalChart::BloodSugar => "Blood Sugar",
            PersonalChart::Bmi => "BMI",
            PersonalChart::Sleep => "Sleep Duration",
            PersonalChart::HeartRate => "Heart Rate",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PersonalChart::Radar => {
                "Overall health across six dimensions, each scored 0-100. Higher is healthier; \
                 low axes are the areas that need attention."
            }
            PersonalChart::Disease => {
                "Risk index trend for hypertension, diabetes and osteoporosis. A rising line \
                 means the current health routine should be adjusted."
            }
            PersonalChart::BloodPressure => {
                "Systolic and diastolic pressure. Normal range: systolic 90-140 mmHg, \
                 diastolic 60-90 mmHg."
            }
            PersonalChart::BloodSugar => {
                "Fasting blood glucose. Normal range: 3.9-6.1 mmol/L."
            }
            PersonalChart::Bmi => {
                "Body mass index. Normal 18.5-24.9, overweight 25-29.9, obese 30 and above."
            }
            PersonalChart::Sleep => {
                "Daily sleep duration. Adults are advised to sleep 7-9 hours."
            }
            PersonalChart::HeartRate => {
                "Resting heart rate. Normal range: 60-100 beats per minute."
            }
        }
    }

    /// Series of a trend chart; the radar has none.
    pub fn metrics(&self) -> &'static [MetricSpec] {
        match self {
            PersonalChart::Radar => &[],
            PersonalChart::Disease => DISEASE,
            PersonalChart::BloodPressure => BLOOD_PRESSURE,
            PersonalChart::BloodSugar => BLOOD_SUGAR,
            PersonalChart::Bmi => BMI,
            PersonalChart::Sleep => SLEEP,
            PersonalChart::HeartRate => HEART_RATE,
        }
    }
}

impl fmt::Display for PersonalChart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarIndicator {
    pub name: String,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarChart {
    pub indicators: Vec<RadarIndicator>,
    pub values: Vec<f64>,
}

impl Default for RadarChart {
    fn default() -> Self {
        let names = [
            "Cardiovascular",
            "Metabolism",
            "Bone health",
            "Kidney function",
            "Sleep quality",
            "Respiratory",
        ];
        Self {
            indicators: names
                .iter()
                .map(|name| RadarIndicator {
                    name: name.to_string(),
                    max: 100.0,
                })
                .collect(),
            values: vec![85.0, 72.0, 68.0, 60.0, 78.0, 65.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub label: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendChart {
    pub dates: Vec<String>,
    pub series: Vec<TrendSeries>,
}

impl TrendChart {
    pub fn generate(specs: &[MetricSpec], dates: &[String], rng: &mut impl Rng) -> Self {
        Self {
            dates: dates.to_vec(),
            series: specs
                .iter()
                .map(|spec| TrendSeries {
                    label: spec.label.to_string(),
                    values: random_walk(rng, dates.len(), spec.min, spec.max),
                })
                .collect(),
        }
    }

    /// (min, max) over every series, for axis bounds.
    pub fn value_bounds(&self) -> Option<(f64, f64)> {
        self.series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalCharts {
    pub radar: RadarChart,
    pub disease: TrendChart,
    pub blood_pressure: TrendChart,
    pub blood_sugar: TrendChart,
    pub bmi: TrendChart,
    pub sleep: TrendChart,
    pub heart_rate: TrendChart,
}

impl PersonalCharts {
    /// Placeholder charts shown until (or instead of) server data.
    pub fn defaults(today: NaiveDate, rng: &mut impl Rng) -> Self {
        let dates = date_labels(today, TREND_DAYS);
        Self {
            radar: RadarChart::default(),
            disease: TrendChart::generate(DISEASE, &dates, rng),
            blood_pressure: TrendChart::generate(BLOOD_PRESSURE, &dates, rng),
            blood_sugar: TrendChart::generate(BLOOD_SUGAR, &dates, rng),
            bmi: TrendChart::generate(BMI, &dates, rng),
            sleep: TrendChart::generate(SLEEP, &dates, rng),
            heart_rate: TrendChart::generate(HEART_RATE, &dates, rng),
        }
    }

    pub fn trend(&self, chart: PersonalChart) -> Option<&TrendChart> {
        match chart {
            PersonalChart::Radar => None,
            PersonalChart::Disease => Some(&self.disease),
            PersonalChart::BloodPressure => Some(&self.blood_pressure),
            PersonalChart::BloodSugar => Some(&self.blood_sugar),
            PersonalChart::Bmi => Some(&self.bmi),
            PersonalChart::Sleep => Some(&self.sleep),
            PersonalChart::HeartRate => Some(&self.heart_rate),
        }
    }

    fn trend_mut(&mut self, chart: PersonalChart) -> Option<&mut TrendChart> {
        match chart {
            PersonalChart::Radar => None,
            PersonalChart::Disease => Some(&mut self.disease),
            PersonalChart::BloodPressure => Some(&mut self.blood_pressure),
            PersonalChart::BloodSugar => Some(&mut self.blood_sugar),
            PersonalChart::Bmi => Some(&mut self.bmi),
            PersonalChart::Sleep => Some(&mut self.sleep),
            PersonalChart::HeartRate => Some(&mut self.heart_rate),
        }
    }

    /// Overlay a `charts` payload field by field. Absent or ill-typed fields
    /// keep what is already there. Returns the number of fields replaced.
    pub fn merge(&mut self, charts: &Value) -> usize {
        let mut replaced = 0;

        if let Some(radar) = charts.get(PersonalChart::Radar.key()) {
            if let Some(indicators) = radar.get("indicators").and_then(parse_indicators) {
                self.radar.indicators = indicators;
                replaced += 1;
            }
            if let Some(values) = radar.get("values").and_then(parse_numbers) {
                self.radar.values = values;
                replaced += 1;
            }
        }

        for chart in PersonalChart::ALL.into_iter().skip(1) {
            let (Some(payload), Some(trend)) = (charts.get(chart.key()), self.trend_mut(chart)) else {
                continue;
            };
            if let Some(dates) = payload.get("dates").and_then(parse_labels) {
                trend.dates = dates;
                replaced += 1;
            }
            for (spec, series) in chart.metrics().iter().zip(trend.series.iter_mut()) {
                if let Some(values) = payload.get(spec.field).and_then(parse_numbers) {
                    series.values = values;
                    replaced += 1;
                }
            }
        }

        replaced
    }
}

fn parse_numbers(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn parse_labels(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn parse_indicators(value: &Value) -> Option<Vec<RadarIndicator>> {
    value
        .as_array()?
        .iter()
        .map(|item| {
            Some(RadarIndicator {
                name: item.get("name")?.as_str()?.to_string(),
                max: item.get("max").and_then(Value::as_f64).unwrap_or(100.0),
            })
        })
        .collect()
}

/// `days` consecutive `MM-DD` labels, oldest first, ending at `today`.
pub fn date_labels(today: NaiveDate, days: usize) -> Vec<String> {
    (0..days)
        .rev()
        .map(|back| (today - Duration::days(back as i64)).format("%m-%d").to_string())
        .collect()
}

/// Bounded random walk starting mid-range; each step moves at most 10% of
/// the range, values are clamped and rounded to one decimal.
pub fn random_walk(rng: &mut impl Rng, days: usize, min: f64, max: f64) -> Vec<f64> {
    let mut current = (min + max) / 2.0;
    (0..days)
        .map(|_| {
            current += (rng.gen::<f64>() - 0.5) * (max - min) * 0.1;
            current = current.clamp(min, max);
            (current * 10.0).round() / 10.0
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserInfoOutcome {
    Loading,
    Loaded(UserProfile),
    /// 401 from the user-info endpoint.
    NotAuthenticated,
    /// Server answered but gave no usable profile.
    Unavailable(String),
    Network(String),
}

impl UserInfoOutcome {
    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            UserInfoOutcome::Loaded(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn notice(&self) -> Option<String> {
        match self {
            UserInfoOutcome::Loaded(_) => None,
            UserInfoOutcome::Loading => Some("Loading profile...".into()),
            UserInfoOutcome::NotAuthenticated => Some("Please log in to see your profile".into()),
            UserInfoOutcome::Unavailable(_) => Some("Not logged in or user info unavailable".into()),
            UserInfoOutcome::Network(_) => Some("Network error, could not load user info".into()),
        }
    }
}

pub async fn load_user_info(resolver: &Resolver, endpoints: &Endpoints) -> UserInfoOutcome {
    let request = PanelRequest::new(
        PanelId::UserInfo,
        vec![Provider::RemoteFetch {
            url: endpoints.user_info.clone(),
            json_path: "user".into(),
        }],
    );
    let result = resolver.resolve(&request).await;

    if let Some(data) = result.data {
        return match serde_json::from_value::<UserProfile>(data) {
            Ok(profile) => {
                info!(user = %profile.name, suggestions = profile.suggestions.len(), "user info loaded");
                UserInfoOutcome::Loaded(profile)
            }
            Err(err) => UserInfoOutcome::Unavailable(err.to_string()),
        };
    }

    match result.error.unwrap_or(FetchError::Missing) {
        err if err.is_unauthorized() => UserInfoOutcome::NotAuthenticated,
        FetchError::Network(reason) => UserInfoOutcome::Network(reason),
        other => UserInfoOutcome::Unavailable(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartsOutcome {
    pub charts: PersonalCharts,
    /// `Remote` when any server data was merged, `Default` otherwise.
    pub tier: Tier,
    pub error: Option<FetchError>,
}

/// Fetch personal charts and merge them over `defaults`. 401 and 404 are
/// expected while the user is logged out or the endpoint is not deployed.
pub async fn load_personal_charts(
    resolver: &Resolver,
    endpoints: &Endpoints,
    mut defaults: PersonalCharts,
) -> ChartsOutcome {
    let request = PanelRequest::new(
        PanelId::PersonalCharts,
        vec![Provider::RemoteFetch {
            url: endpoints.user_charts.clone(),
            json_path: "charts".into(),
        }],
    );
    let result = resolver.resolve(&request).await;

    match (result.data, result.error) {
        (Some(charts), _) => {
            let replaced = defaults.merge(&charts);
            info!(replaced, "personal charts merged");
            ChartsOutcome {
                charts: defaults,
                tier: Tier::Remote,
                error: None,
            }
        }
        (None, error) => {
            match &error {
                Some(err) if err.is_unauthorized() => info!("not logged in, keeping default charts"),
                Some(err) if err.is_not_found() => info!("charts endpoint not available, keeping default charts"),
                Some(err) => warn!(error = %err, "charts request failed, keeping default charts"),
                None => {}
            }
            ChartsOutcome {
                charts: defaults,
                tier: Tier::Default,
                error,
            }
        }
    }
}

/// Everything the profile page shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePage {
    pub user: UserInfoOutcome,
    pub charts: PersonalCharts,
    pub charts_tier: Tier,
}

impl ProfilePage {
    /// First paint, before any request completes.
    pub fn placeholder(defaults: PersonalCharts) -> Self {
        Self {
            user: UserInfoOutcome::Loading,
            charts: defaults,
            charts_tier: Tier::Default,
        }
    }

    /// The rendered suggestion list; narration reads from it.
    pub fn suggestions(&self) -> &[String] {
        self.user
            .profile()
            .map(|p| p.suggestions.as_slice())
            .unwrap_or(&[])
    }
}

pub async fn load_profile(
    fetcher: Arc<dyn Fetcher>,
    endpoints: &Endpoints,
    defaults: PersonalCharts,
) -> ProfilePage {
    let resolver = Resolver::new(fetcher);
    let (user, charts) = tokio::join!(
        load_user_info(&resolver, endpoints),
        load_personal_charts(&resolver, endpoints, defaults)
    );
    ProfilePage {
        user,
        charts: charts.charts,
        charts_tier: charts.tier,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogoutOutcome {
    LoggedOut,
    Rejected,
    Failed(FetchError),
}

impl LogoutOutcome {
    pub fn message(&self) -> String {
        match self {
            LogoutOutcome::LoggedOut => "Logged out".to_string(),
            LogoutOutcome::Rejected => "Logout failed".to_string(),
            LogoutOutcome::Failed(FetchError::Network(_)) => "Network error, logout failed".to_string(),
            LogoutOutcome::Failed(err) => format!("Logout failed, please retry ({err})"),
        }
    }
}

impl From<Result<bool, FetchError>> for LogoutOutcome {
    fn from(result: Result<bool, FetchError>) -> Self {
        match result {
            Ok(true) => LogoutOutcome::LoggedOut,
            Ok(false) => LogoutOutcome::Rejected,
            Err(err) => LogoutOutcome::Failed(err),
        }
    }
}
