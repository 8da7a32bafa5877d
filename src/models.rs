use crate::error::FetchError;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Independently resolvable units of dashboard data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PanelId {
    Overview,
    Map,
    RegionUsers,
    AgeRisk,
    RegionRisk,
    RiskDistribution,
    UserInfo,
    PersonalCharts,
}

impl PanelId {
    /// Panels served together by the combined dashboard endpoint.
    pub const BUNDLE: [PanelId; 5] = [
        PanelId::Map,
        PanelId::RegionUsers,
        PanelId::AgeRisk,
        PanelId::RegionRisk,
        PanelId::RiskDistribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PanelId::Overview => "overview",
            PanelId::Map => "map",
            PanelId::RegionUsers => "region-users",
            PanelId::AgeRisk => "age-risk",
            PanelId::RegionRisk => "region-risk",
            PanelId::RiskDistribution => "risk-distribution",
            PanelId::UserInfo => "user-info",
            PanelId::PersonalCharts => "personal-charts",
        }
    }

    /// Field of `data` in the combined dashboard payload.
    pub fn bundle_field(&self) -> Option<&'static str> {
        match self {
            PanelId::Overview => Some("overview"),
            PanelId::Map => Some("map_data"),
            PanelId::RegionUsers => Some("region_users"),
            PanelId::AgeRisk => Some("age_risk"),
            PanelId::RegionRisk => Some("region_risk"),
            PanelId::RiskDistribution => Some("risk_distribution"),
            PanelId::UserInfo | PanelId::PersonalCharts => None,
        }
    }

    /// Static fixture file, relative to the fixtures directory.
    pub fn fixture(&self) -> Option<&'static str> {
        match self {
            PanelId::Map => Some("map.json"),
            PanelId::RegionUsers => Some("chart_1.json"),
            PanelId::AgeRisk => Some("chart_2.json"),
            PanelId::RegionRisk => Some("chart_3.json"),
            PanelId::RiskDistribution => Some("chart_4.json"),
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PanelId::Overview => "Overview",
            PanelId::Map => "Regional Health Risk",
            PanelId::RegionUsers => "Users by Region",
            PanelId::AgeRisk => "Risk by Age Group",
            PanelId::RegionRisk => "Risk by Region",
            PanelId::RiskDistribution => "Risk Score Distribution",
            PanelId::UserInfo => "Profile",
            PanelId::PersonalCharts => "Personal Charts",
        }
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Counts may arrive as JSON floats (`120.0`); any finite, non-negative number is accepted.
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(u64),
        Float(f64),
    }

    impl Number {
        fn into_count<E: Error>(self) -> Result<u64, E> {
            match self {
                Number::Int(n) => Ok(n),
                Number::Float(f) if f.is_finite() && f >= 0.0 && f <= u64::MAX as f64 => {
                    Ok(f.round() as u64)
                }
                Number::Float(f) => Err(E::custom(format!("invalid count {f}"))),
            }
        }
    }

    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Number::deserialize(deserializer)?.into_count()
    }

    pub fn opt_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Option::<Number>::deserialize(deserializer)?
            .map(Number::into_count)
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    #[serde(deserialize_with = "lenient::count")]
    pub total_users: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub total_regions: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub high_risk_users: u64,
    pub avg_risk_score: f64,
    #[serde(default)]
    pub update_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRegion {
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub high_risk_count: Option<u64>,
    #[serde(default)]
    pub hypertension_rate: Option<f64>,
    #[serde(default)]
    pub diabetes_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub total_users: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionUsers {
    pub name: String,
    #[serde(deserialize_with = "lenient::count")]
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeRisk {
    pub age_group: String,
    #[serde(deserialize_with = "lenient::count")]
    pub low: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub medium: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub high: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRisk {
    pub region: String,
    #[serde(deserialize_with = "lenient::count")]
    pub low: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub medium: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub high: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub region: String,
    pub score: f64,
}

/// Typed view of a resolved dashboard panel.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelData {
    Overview(Overview),
    Map(Vec<MapRegion>),
    RegionUsers(Vec<RegionUsers>),
    AgeRisk(Vec<AgeRisk>),
    RegionRisk(Vec<RegionRisk>),
    RiskDistribution(Vec<RiskScore>),
}

impl PanelData {
    /// Decode a raw panel value into its typed shape. A value that does not
    /// decode is "malformed" for fallback purposes.
    pub fn decode(panel: PanelId, value: &Value) -> Result<Self, FetchError> {
        let data = match panel {
            PanelId::Overview => PanelData::Overview(from_value(value)?),
            PanelId::Map => PanelData::Map(from_value(value)?),
            PanelId::RegionUsers => PanelData::RegionUsers(from_value(value)?),
            PanelId::AgeRisk => PanelData::AgeRisk(from_value(value)?),
            PanelId::RegionRisk => PanelData::RegionRisk(from_value(value)?),
            PanelId::RiskDistribution => PanelData::RiskDistribution(from_value(value)?),
            PanelId::UserInfo | PanelId::PersonalCharts => {
                return Err(FetchError::Decode(format!(
                    "{panel} is not a dashboard panel"
                )))
            }
        };
        Ok(data)
    }

    pub fn len(&self) -> usize {
        match self {
            PanelData::Overview(_) => 1,
            PanelData::Map(rows) => rows.len(),
            PanelData::RegionUsers(rows) => rows.len(),
            PanelData::AgeRisk(rows) => rows.len(),
            PanelData::RegionRisk(rows) => rows.len(),
            PanelData::RiskDistribution(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, FetchError> {
    serde_json::from_value(value.clone()).map_err(FetchError::from)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default, deserialize_with = "lenient_age")]
    pub age: Option<u32>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

fn lenient_age<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    lenient::opt_count(deserializer)?
        .map(|age| u32::try_from(age).map_err(serde::de::Error::custom))
        .transpose()
}

impl UserProfile {
    /// "gender | age | region" line shown under the name.
    pub fn meta_line(&self) -> String {
        let age = self
            .age
            .map(|a| format!("{a} yrs"))
            .unwrap_or_else(|| "age n/a".to_string());
        format!("{} | {} | {}", self.gender, age, self.region)
    }

    pub fn primary_risk(&self) -> Option<&Risk> {
        self.risks.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub label: String,
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    /// Levels arrive either as 低/中/高 or in English.
    pub fn from_label(level: &str) -> Self {
        match level.trim() {
            "低" => RiskLevel::Low,
            "中" => RiskLevel::Medium,
            "高" => RiskLevel::High,
            s if s.eq_ignore_ascii_case("low") => RiskLevel::Low,
            s if s.eq_ignore_ascii_case("medium") => RiskLevel::Medium,
            s if s.eq_ignore_ascii_case("high") => RiskLevel::High,
            _ => RiskLevel::Unknown,
        }
    }

    /// Badge class name for the level.
    pub fn badge(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "default",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_bundle_panel() {
        let value = json!([{ "age_group": "18-30", "low": 10, "medium": 5, "high": 1 }]);
        let data = PanelData::decode(PanelId::AgeRisk, &value).unwrap();
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let value = json!({ "not": "a list" });
        assert!(PanelData::decode(PanelId::Map, &value).is_err());
        let value = json!([{ "region": "Chengdu" }]);
        assert!(PanelData::decode(PanelId::RiskDistribution, &value).is_err());
    }

    #[test]
    fn test_map_region_optional_fields() {
        let value = json!([{ "name": "成都市" }]);
        match PanelData::decode(PanelId::Map, &value).unwrap() {
            PanelData::Map(rows) => {
                assert_eq!(rows[0].name, "成都市");
                assert!(rows[0].value.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_risk_level_labels() {
        assert_eq!(RiskLevel::from_label("高").badge(), "high");
        assert_eq!(RiskLevel::from_label("Medium").badge(), "medium");
        assert_eq!(RiskLevel::from_label("???").badge(), "default");
    }

    #[test]
    fn test_float_encoded_counts_decode() {
        let value = json!({
            "total_users": 25600.0, "total_regions": 21.0, "high_risk_users": 5870,
            "avg_risk_score": 0.42
        });
        match PanelData::decode(PanelId::Overview, &value).unwrap() {
            PanelData::Overview(overview) => {
                assert_eq!(overview.total_users, 25600);
                assert_eq!(overview.total_regions, 21);
            }
            other => panic!("unexpected {other:?}"),
        }

        let value = json!([{ "name": "成都市", "total_users": 420.0, "high_risk_count": null }]);
        match PanelData::decode(PanelId::Map, &value).unwrap() {
            PanelData::Map(rows) => {
                assert_eq!(rows[0].total_users, Some(420));
                assert_eq!(rows[0].high_risk_count, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        let user: UserProfile = serde_json::from_value(json!({ "name": "Li", "age": 40.0 })).unwrap();
        assert_eq!(user.age, Some(40));
    }

    #[test]
    fn test_negative_or_text_counts_rejected() {
        let value = json!([{ "name": "成都", "value": -3.0 }]);
        assert!(PanelData::decode(PanelId::RegionUsers, &value).is_err());
        let value = json!([{ "age_group": "60+", "low": "many", "medium": 1, "high": 1 }]);
        assert!(PanelData::decode(PanelId::AgeRisk, &value).is_err());
    }

    #[test]
    fn test_meta_line() {
        let user = UserProfile {
            name: "Li".into(),
            gender: "F".into(),
            age: Some(42),
            region: "Chengdu".into(),
            risks: vec![],
            suggestions: vec![],
        };
        assert_eq!(user.meta_line(), "F | 42 yrs | Chengdu");
    }
}
