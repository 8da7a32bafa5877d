//! Tiered data acquisition.
//!
//! Every panel carries an ordered list of providers. The resolver walks the
//! list and stops at the first provider whose own success predicate holds.
//! Failures never escape: they are logged, recorded on the result, and turned
//! into "try the next tier".

use crate::error::FetchError;
use crate::models::PanelId;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw I/O used by the remote and static tiers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` with session credentials and decode the body as JSON.
    /// Non-2xx statuses are reported as [`FetchError::Http`].
    async fn get_json(&self, url: &str) -> Result<Value, FetchError>;

    /// Read and decode a static JSON document.
    async fn read_static(&self, path: &str) -> Result<Value, FetchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    /// Caller-supplied data; `None` or JSON null counts as absent.
    InlineData(Option<Value>),
    /// Enveloped API response; `json_path` is a dotted path into the body.
    RemoteFetch { url: String, json_path: String },
    StaticFile(String),
    BuiltinDefault(Value),
}

impl Provider {
    pub fn tier(&self) -> Tier {
        match self {
            Provider::InlineData(_) => Tier::Inline,
            Provider::RemoteFetch { .. } => Tier::Remote,
            Provider::StaticFile(_) => Tier::Static,
            Provider::BuiltinDefault(_) => Tier::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Inline,
    Remote,
    Static,
    Default,
    None,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Inline => "inline",
            Tier::Remote => "remote",
            Tier::Static => "static",
            Tier::Default => "default",
            Tier::None => "none",
        }
    }

    /// Data that came from the API, directly or via the combined payload.
    pub fn is_live(&self) -> bool {
        matches!(self, Tier::Inline | Tier::Remote)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, immutable provider chain for one panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRequest {
    panel: PanelId,
    providers: Vec<Provider>,
}

impl PanelRequest {
    pub fn new(panel: PanelId, providers: Vec<Provider>) -> Self {
        Self { panel, providers }
    }

    pub fn panel(&self) -> PanelId {
        self.panel
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionResult {
    pub panel: PanelId,
    pub data: Option<Value>,
    pub tier: Tier,
    /// Set only when every tier failed.
    pub error: Option<FetchError>,
    /// Tiers that were tried and failed before the outcome, in order.
    pub fallbacks: Vec<(Tier, FetchError)>,
}

impl ResolutionResult {
    fn resolved(panel: PanelId, tier: Tier, data: Value, fallbacks: Vec<(Tier, FetchError)>) -> Self {
        Self {
            panel,
            data: Some(data),
            tier,
            error: None,
            fallbacks,
        }
    }

    fn exhausted(panel: PanelId, error: FetchError, fallbacks: Vec<(Tier, FetchError)>) -> Self {
        Self {
            panel,
            data: None,
            tier: Tier::None,
            error: Some(error),
            fallbacks,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.data.is_some()
    }

    /// Failure recorded for a given tier, if it was tried and failed.
    pub fn failure_of(&self, tier: Tier) -> Option<&FetchError> {
        self.fallbacks
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, err)| err)
    }
}

#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub async fn resolve(&self, request: &PanelRequest) -> ResolutionResult {
        self.resolve_validated(request, |_| Ok(())).await
    }

    /// Like [`Resolver::resolve`], but data a tier produced that fails
    /// `accept` counts as that tier failing, and resolution moves on.
    pub async fn resolve_validated<V>(&self, request: &PanelRequest, accept: V) -> ResolutionResult
    where
        V: Fn(&Value) -> Result<(), FetchError>,
    {
        let panel = request.panel();
        let mut fallbacks = Vec::new();

        for provider in request.providers() {
            let tier = provider.tier();
            match self.attempt(provider).await.and_then(|data| accept(&data).map(|_| data)) {
                Ok(data) => {
                    debug!(panel = %panel, tier = %tier, "panel resolved");
                    return ResolutionResult::resolved(panel, tier, data, fallbacks);
                }
                Err(err) => {
                    warn!(panel = %panel, tier = %tier, kind = err.kind(), error = %err, "tier failed, falling back");
                    fallbacks.push((tier, err));
                }
            }
        }

        let last = fallbacks
            .last()
            .map(|(_, err)| err.clone())
            .unwrap_or(FetchError::Missing);
        warn!(panel = %panel, error = %last, "every tier failed");
        ResolutionResult::exhausted(panel, last, fallbacks)
    }

    async fn attempt(&self, provider: &Provider) -> Result<Value, FetchError> {
        match provider {
            Provider::InlineData(value) => match value {
                Some(v) if !v.is_null() => Ok(v.clone()),
                _ => Err(FetchError::Missing),
            },
            Provider::RemoteFetch { url, json_path } => {
                let body = self.fetcher.get_json(url).await?;
                extract_enveloped(&body, json_path)
            }
            Provider::StaticFile(path) => self.fetcher.read_static(path).await,
            Provider::BuiltinDefault(value) => Ok(value.clone()),
        }
    }
}

/// Check the `success` flag of an API envelope and pull out `json_path`.
pub fn extract_enveloped(body: &Value, json_path: &str) -> Result<Value, FetchError> {
    if body.get("success").and_then(Value::as_bool) != Some(true) {
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("success flag not set");
        return Err(FetchError::Application(reason.to_string()));
    }

    match lookup_path(body, json_path) {
        Some(v) if !v.is_null() => Ok(v.clone()),
        _ => Err(FetchError::Application(format!("missing field {json_path}"))),
    }
}

/// Dotted path lookup; numeric segments index into arrays. Empty path is the root.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}
