use crate::error::ConfigError;
use crate::models::Overview;
use crate::narration::{PITCH_RANGE, RATE_RANGE, VOLUME_RANGE, WORDS_PER_SECOND_RANGE};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "health-dash";
const ENV_PREFIX: &str = "HEALTH_DASH__";

/// Auto-refresh interval bounds in seconds; 0 disables auto-refresh.
pub const REFRESH_SECS_RANGE: RangeInclusive<f64> = 0.0..=3600.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub fixtures_dir: String,
    pub session_cookie: Option<String>,
    pub request_timeout_secs: u64,
    pub click_window_ms: u64,
    pub timezone: String,
    /// TUI auto-refresh interval; 0 disables auto-refresh.
    pub refresh_secs: f64,
    pub log_level: String,
    pub log_file: Option<String>,
    pub overview_defaults: OverviewDefaults,
    pub narration: NarrationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".into(),
            fixtures_dir: "./data".into(),
            session_cookie: None,
            request_timeout_secs: 10,
            click_window_ms: 300,
            timezone: "Asia/Shanghai".into(),
            refresh_secs: 0.0,
            log_level: "info".into(),
            log_file: None,
            overview_defaults: OverviewDefaults::default(),
            narration: NarrationSettings::default(),
        }
    }
}

/// Overview figures shown when the API cannot be reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverviewDefaults {
    pub total_users: u64,
    pub total_regions: u64,
    pub high_risk_users: u64,
    pub avg_risk_score: f64,
    pub update_time: Option<String>,
}

impl Default for OverviewDefaults {
    fn default() -> Self {
        Self {
            total_users: 25600,
            total_regions: 10,
            high_risk_users: 5870,
            avg_risk_score: 0.68,
            update_time: None,
        }
    }
}

impl OverviewDefaults {
    /// Unset update time means "now".
    pub fn to_overview(&self, now: &str) -> Overview {
        Overview {
            total_users: self.total_users,
            total_regions: self.total_regions,
            high_risk_users: self.high_risk_users,
            avg_risk_score: self.avg_risk_score,
            update_time: Some(self.update_time.clone().unwrap_or_else(|| now.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationSettings {
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub prefix: String,
    pub separator: String,
    /// Pace of the terminal engine at rate 1.0.
    pub words_per_second: f32,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            lang: "zh-CN".into(),
            rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
            prefix: "个性化健康建议：".into(),
            separator: "。".into(),
            words_per_second: 3.0,
        }
    }
}

impl Settings {
    pub fn fixtures_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.fixtures_dir).into_owned())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn click_window(&self) -> Duration {
        Duration::from_millis(self.click_window_ms)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    /// Absolute URL for an API path such as `/api/dashboard/all`.
    pub fn endpoint(&self, path: &str) -> Result<String, ConfigError> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|_| ConfigError::BaseUrl(self.base_url.clone()))?;
        let joined = base
            .join(path.trim_start_matches('/'))
            .map_err(|_| ConfigError::BaseUrl(self.base_url.clone()))?;
        Ok(joined.to_string())
    }

    pub fn log_file_path(&self) -> PathBuf {
        match &self.log_file {
            Some(path) => PathBuf::from(shellexpand::tilde(path).into_owned()),
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
                .join("health-dash.log"),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint("/")?;
        self.tz()?;
        check_range("refresh_secs", self.refresh_secs, &REFRESH_SECS_RANGE)?;
        let narration = &self.narration;
        check_range("narration.rate", narration.rate, &RATE_RANGE)?;
        check_range("narration.pitch", narration.pitch, &PITCH_RANGE)?;
        check_range("narration.volume", narration.volume, &VOLUME_RANGE)?;
        check_range(
            "narration.words_per_second",
            narration.words_per_second,
            &WORDS_PER_SECOND_RANGE,
        )?;
        Ok(())
    }
}

/// NaN and infinities never fall inside a range.
fn check_range<T>(field: &'static str, value: T, range: &RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            range: format!("{}..={}", range.start(), range.end()),
        })
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// Defaults, then the config file, then `HEALTH_DASH__*` environment variables.
///
/// An explicitly requested file must exist; the default location is optional.
pub fn load_settings(path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut settings = match path {
        Some(p) => read_file(Path::new(&shellexpand::tilde(p).into_owned()))?,
        None => match default_config_path() {
            Some(p) if p.exists() => read_file(&p)?,
            _ => Settings::default(),
        },
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_file(path: &Path) -> Result<Settings, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(v) = var("BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = var("FIXTURES_DIR") {
        settings.fixtures_dir = v;
    }
    if let Some(v) = var("SESSION_COOKIE") {
        settings.session_cookie = Some(v);
    }
    if let Some(v) = var("LOG_LEVEL") {
        settings.log_level = v;
    }
    if let Some(v) = var("LOG_FILE") {
        settings.log_file = Some(v);
    }
    if let Some(v) = var("TIMEZONE") {
        settings.timezone = v;
    }
    if let Some(v) = var("CLICK_WINDOW_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.click_window_ms = parsed;
        }
    }
    if let Some(v) = var("REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
}
