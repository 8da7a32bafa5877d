use crate::config::Settings;
use crate::error::{ConfigError, FetchError};
use crate::resolver::Fetcher;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Client;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Absolute URLs of the analytics API.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub dashboard_all: String,
    pub user_info: String,
    pub user_charts: String,
    pub logout: String,
}

impl Endpoints {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            dashboard_all: settings.endpoint("/api/dashboard/all")?,
            user_info: settings.endpoint("/api/user/userinfo")?,
            user_charts: settings.endpoint("/api/user/charts")?,
            logout: settings.endpoint("/api/auth/api/logout")?,
        })
    }
}

/// reqwest-backed fetcher. Session credentials ride along on every request:
/// the configured cookie as a default header, plus whatever the server sets
/// during the session via the cookie store.
pub struct ApiClient {
    http: Client,
    fixtures_dir: PathBuf,
    endpoints: Endpoints,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &settings.session_cookie {
            headers.insert(COOKIE, HeaderValue::from_str(cookie)?);
        }

        let http = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            http,
            fixtures_dir: settings.fixtures_path(),
            endpoints: Endpoints::from_settings(settings)?,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn fixture_path(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.fixtures_dir.join(candidate)
        }
    }

    /// POST the logout endpoint. `Ok(true)` only when the server confirms.
    pub async fn logout(&self) -> Result<bool, FetchError> {
        let response = self.http.post(&self.endpoints.logout).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "logout rejected");
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let body: Value = serde_json::from_slice(&response.bytes().await?)?;
        let confirmed = body.get("success").and_then(Value::as_bool) == Some(true);
        info!(confirmed, "logout finished");
        Ok(confirmed)
    }
}

#[async_trait]
impl Fetcher for ApiClient {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        debug!(url, "GET");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn read_static(&self, path: &str) -> Result<Value, FetchError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return self.get_json(path).await;
        }

        let full = self.fixture_path(path);
        debug!(path = %full.display(), "reading fixture");
        let bytes = tokio::fs::read(&full)
            .await
            .map_err(|e| FetchError::Io(format!("{}: {e}", full.display())))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn client_for(dir: &Path) -> ApiClient {
        let settings = Settings {
            fixtures_dir: dir.display().to_string(),
            ..Settings::default()
        };
        ApiClient::new(&settings).unwrap()
    }

    #[test]
    fn test_endpoints() {
        let endpoints = Endpoints::from_settings(&Settings::default()).unwrap();
        assert_eq!(endpoints.user_info, "http://127.0.0.1:5000/api/user/userinfo");
        assert_eq!(endpoints.logout, "http://127.0.0.1:5000/api/auth/api/logout");
    }

    #[tokio::test]
    async fn test_read_static_fixture() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("chart_1.json"), r#"[{"name":"成都","value":12}]"#).unwrap();

        let client = client_for(dir.path());
        let value = client.read_static("chart_1.json").await.unwrap();
        assert_eq!(value[0]["value"], 12);
    }

    #[tokio::test]
    async fn test_read_static_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "[{").unwrap();

        let client = client_for(dir.path());
        assert_eq!(client.read_static("broken.json").await.unwrap_err().kind(), "decode");
        assert_eq!(client.read_static("absent.json").await.unwrap_err().kind(), "io");
    }
}
