//! Page-level sequencing of panel resolution and the chart registry it feeds.

use crate::api::Endpoints;
use crate::config::OverviewDefaults;
use crate::error::FetchError;
use crate::geo::{GeoBoundary, GeoRegistry};
use crate::models::{Overview, PanelData, PanelId};
use crate::resolver::{Fetcher, PanelRequest, Provider, ResolutionResult, Resolver, Tier};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const MAP_NAME: &str = "sichuan";
pub const BOUNDARY_FIXTURE: &str = "sichuan.json";

type SharedFetch = Shared<BoxFuture<'static, Result<Value, FetchError>>>;

/// Deduplicates GETs to the same URL for the lifetime of one page load, so
/// the overview and every bundle panel share a single combined round-trip.
struct CoalescingFetcher {
    inner: Arc<dyn Fetcher>,
    pending: Mutex<HashMap<String, SharedFetch>>,
}

impl CoalescingFetcher {
    fn new(inner: Arc<dyn Fetcher>) -> Self {
        Self {
            inner,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Fetcher for CoalescingFetcher {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let shared = {
            let mut pending = match self.pending.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            pending
                .entry(url.to_string())
                .or_insert_with(|| {
                    let inner = self.inner.clone();
                    let url = url.to_string();
                    async move { inner.get_json(&url).await }.boxed().shared()
                })
                .clone()
        };
        shared.await
    }

    async fn read_static(&self, path: &str) -> Result<Value, FetchError> {
        self.inner.read_static(path).await
    }
}

/// One resolved panel, ready to render.
#[derive(Debug, Clone)]
pub struct PanelUpdate {
    /// Sequence number of the load that produced this update.
    pub generation: u64,
    pub result: ResolutionResult,
    pub view: Option<PanelData>,
    /// Map panel only: registered boundary, `None` renders as "no map".
    pub boundary: Option<Arc<GeoBoundary>>,
}

impl PanelUpdate {
    pub fn panel(&self) -> PanelId {
        self.result.panel
    }
}

/// Render callback invoked once per resolved panel, in completion order.
pub trait RenderSink: Send + Sync {
    fn render(&self, update: PanelUpdate);
}

impl RenderSink for mpsc::UnboundedSender<PanelUpdate> {
    fn render(&self, update: PanelUpdate) {
        if self.send(update).is_err() {
            debug!("render sink closed, dropping update");
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub generation: u64,
    pub tiers: Vec<(PanelId, Tier)>,
}

impl LoadSummary {
    pub fn tier_of(&self, panel: PanelId) -> Option<Tier> {
        self.tiers.iter().find(|(p, _)| *p == panel).map(|(_, t)| *t)
    }
}

pub struct PanelLoader {
    fetcher: Arc<dyn Fetcher>,
    endpoints: Endpoints,
    overview_defaults: OverviewDefaults,
    inline: HashMap<PanelId, Value>,
    geo: GeoRegistry,
    generation: AtomicU64,
}

impl PanelLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, endpoints: Endpoints, overview_defaults: OverviewDefaults) -> Self {
        Self {
            fetcher,
            endpoints,
            overview_defaults,
            inline: HashMap::new(),
            geo: GeoRegistry::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Caller-supplied data takes precedence over every other tier.
    pub fn with_inline(mut self, panel: PanelId, value: Value) -> Self {
        self.inline.insert(panel, value);
        self
    }

    pub fn default_overview(&self) -> Overview {
        self.overview_defaults
            .to_overview(&chrono::Utc::now().to_rfc3339())
    }

    pub fn request_for(&self, panel: PanelId) -> PanelRequest {
        let mut providers = Vec::with_capacity(4);
        if let Some(value) = self.inline.get(&panel) {
            providers.push(Provider::InlineData(Some(value.clone())));
        }
        if let Some(field) = panel.bundle_field() {
            providers.push(Provider::RemoteFetch {
                url: self.endpoints.dashboard_all.clone(),
                json_path: format!("data.{field}"),
            });
        }
        if let Some(fixture) = panel.fixture() {
            providers.push(Provider::StaticFile(fixture.to_string()));
        }
        let builtin = match panel {
            PanelId::Overview => serde_json::to_value(self.default_overview()).unwrap_or(Value::Null),
            _ => json!([]),
        };
        providers.push(Provider::BuiltinDefault(builtin));
        PanelRequest::new(panel, providers)
    }

    /// Resolve the overview and the chart bundle, rendering each panel as soon
    /// as it resolves.
    pub async fn load_all(&self, sink: &dyn RenderSink) -> LoadSummary {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "loading dashboard panels");

        let fetcher: Arc<dyn Fetcher> = Arc::new(CoalescingFetcher::new(self.fetcher.clone()));
        let resolver = Resolver::new(fetcher.clone());

        let mut pending = FuturesUnordered::new();
        pending.push(self.load_panel(&resolver, PanelId::Overview, generation));
        for panel in PanelId::BUNDLE {
            pending.push(self.load_panel(&resolver, panel, generation));
        }

        let mut summary = LoadSummary {
            generation,
            tiers: Vec::with_capacity(PanelId::BUNDLE.len() + 1),
        };
        while let Some(update) = pending.next().await {
            summary.tiers.push((update.panel(), update.result.tier));
            sink.render(update);
        }

        info!(generation, live = summary.tiers.iter().filter(|(_, t)| t.is_live()).count(), "dashboard load finished");
        summary
    }

    async fn load_panel(&self, resolver: &Resolver, panel: PanelId, generation: u64) -> PanelUpdate {
        let request = self.request_for(panel);

        let (result, boundary) = if panel == PanelId::Map {
            let registration = self
                .geo
                .ensure_registered(resolver.fetcher().as_ref(), MAP_NAME, BOUNDARY_FIXTURE);
            let (result, registered) = tokio::join!(
                resolver.resolve_validated(&request, |v| PanelData::decode(panel, v).map(|_| ())),
                registration
            );
            let boundary = match registered {
                Ok(boundary) => Some(boundary),
                Err(err) => {
                    warn!(error = %err, "map boundary unavailable, rendering without map");
                    None
                }
            };
            (result, boundary)
        } else {
            let result = resolver
                .resolve_validated(&request, |v| PanelData::decode(panel, v).map(|_| ()))
                .await;
            (result, None)
        };

        let view = result
            .data
            .as_ref()
            .and_then(|data| PanelData::decode(panel, data).ok());

        PanelUpdate {
            generation,
            result,
            view,
            boundary,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChartSlot {
    pub data: Option<PanelData>,
    pub tier: Tier,
    pub generation: u64,
    pub renders: u64,
    pub error: Option<FetchError>,
    pub fallbacks: Vec<(Tier, FetchError)>,
    pub boundary: Option<Arc<GeoBoundary>>,
}

/// Explicit mapping from panel to its live chart state. Owned by the
/// orchestrator and lent to whoever draws.
#[derive(Debug, Clone, Default)]
pub struct ChartRegistry {
    slots: BTreeMap<PanelId, ChartSlot>,
}

impl ChartRegistry {
    /// First paint: builtin defaults for every panel before any round-trip.
    pub fn with_defaults(overview: Overview) -> Self {
        let mut slots = BTreeMap::new();
        slots.insert(PanelId::Overview, ChartSlot::builtin(Some(PanelData::Overview(overview))));
        slots.insert(PanelId::Map, ChartSlot::builtin(Some(PanelData::Map(Vec::new()))));
        slots.insert(PanelId::RegionUsers, ChartSlot::builtin(Some(PanelData::RegionUsers(Vec::new()))));
        slots.insert(PanelId::AgeRisk, ChartSlot::builtin(Some(PanelData::AgeRisk(Vec::new()))));
        slots.insert(PanelId::RegionRisk, ChartSlot::builtin(Some(PanelData::RegionRisk(Vec::new()))));
        slots.insert(
            PanelId::RiskDistribution,
            ChartSlot::builtin(Some(PanelData::RiskDistribution(Vec::new()))),
        );
        Self { slots }
    }

    /// Last completed update wins; updates are applied in arrival order.
    pub fn render(&mut self, update: PanelUpdate) {
        let panel = update.panel();
        let renders = self.slots.get(&panel).map(|s| s.renders).unwrap_or(0) + 1;
        debug!(panel = %panel, tier = %update.result.tier, generation = update.generation, "render");
        self.slots.insert(
            panel,
            ChartSlot {
                data: update.view,
                tier: update.result.tier,
                generation: update.generation,
                renders,
                error: update.result.error,
                fallbacks: update.result.fallbacks,
                boundary: update.boundary,
            },
        );
    }

    pub fn get(&self, panel: PanelId) -> Option<&ChartSlot> {
        self.slots.get(&panel)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PanelId, &ChartSlot)> {
        self.slots.iter()
    }

    pub fn overview(&self) -> Option<&Overview> {
        match self.get(PanelId::Overview)?.data.as_ref()? {
            PanelData::Overview(overview) => Some(overview),
            _ => None,
        }
    }
}

impl ChartSlot {
    fn builtin(data: Option<PanelData>) -> Self {
        Self {
            data,
            tier: Tier::Default,
            generation: 0,
            renders: 0,
            error: None,
            fallbacks: Vec::new(),
            boundary: None,
        }
    }
}

/// Owns the chart registry and runs page loads against it.
///
/// `refresh` spawns a load without cooldown or de-duplication; concurrent
/// loads are allowed and their updates land in completion order.
pub struct Orchestrator {
    loader: Arc<PanelLoader>,
    registry: ChartRegistry,
    tx: mpsc::UnboundedSender<PanelUpdate>,
    rx: mpsc::UnboundedReceiver<PanelUpdate>,
    in_flight: Arc<AtomicUsize>,
}

impl Orchestrator {
    pub fn new(loader: PanelLoader) -> Self {
        let registry = ChartRegistry::with_defaults(loader.default_overview());
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            loader: Arc::new(loader),
            registry,
            tx,
            rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn registry(&self) -> &ChartRegistry {
        &self.registry
    }

    pub async fn load_all(&mut self) -> LoadSummary {
        let summary = self.loader.load_all(&self.tx).await;
        self.drain();
        summary
    }

    pub fn refresh(&self) -> JoinHandle<LoadSummary> {
        let loader = self.loader.clone();
        let tx = self.tx.clone();
        let in_flight = self.in_flight.clone();
        let running = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        info!(in_flight = running, "refresh requested");

        tokio::spawn(async move {
            let summary = loader.load_all(&tx).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            summary
        })
    }

    /// Number of spawned refreshes that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Apply every update that has completed since the last drain.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.rx.try_recv() {
            self.registry.render(update);
            applied += 1;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::resolver::tests::CountingFetcher;
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    const ALL: &str = "http://127.0.0.1:5000/api/dashboard/all";

    fn endpoints() -> Endpoints {
        Endpoints::from_settings(&Settings::default()).unwrap()
    }

    fn loader(fetcher: Arc<dyn Fetcher>) -> PanelLoader {
        PanelLoader::new(fetcher, endpoints(), OverviewDefaults::default())
    }

    fn payload(tag: &str, map: Value) -> Value {
        json!({
            "success": true,
            "data": {
                "overview": {
                    "total_users": 100, "total_regions": 3, "high_risk_users": 7,
                    "avg_risk_score": 0.41, "update_time": "2024-05-01T08:00:00Z"
                },
                "map_data": map,
                "region_users": [{ "name": tag, "value": 120 }],
                "age_risk": [{ "age_group": "18-30", "low": 5, "medium": 3, "high": 1 }],
                "region_risk": [{ "region": tag, "low": 9, "medium": 2, "high": 1 }],
                "risk_distribution": [{ "region": tag, "score": 62.5 }]
            }
        })
    }

    fn boundary() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "name": "成都市" },
                "geometry": { "type": "Polygon", "coordinates": [[[103.0, 30.0], [104.0, 31.0], [103.0, 30.0]]] }
            }]
        })
    }

    #[test]
    fn test_first_paint_uses_defaults() {
        let orchestrator = Orchestrator::new(loader(Arc::new(CountingFetcher::default())));
        let registry = orchestrator.registry();
        assert_eq!(registry.overview().unwrap().total_users, 25600);
        for panel in PanelId::BUNDLE {
            let slot = registry.get(panel).unwrap();
            assert_eq!(slot.tier, Tier::Default);
            assert!(slot.data.as_ref().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_malformed_map_only_falls_back_for_map() {
        let fetcher = Arc::new(
            CountingFetcher::default()
                .with_remote(ALL, Ok(payload("成都", json!({ "broken": true }))))
                .with_file("map.json", Ok(json!([{ "name": "成都市", "value": 55.0 }])))
                .with_file(BOUNDARY_FIXTURE, Ok(boundary())),
        );
        let mut orchestrator = Orchestrator::new(loader(fetcher.clone()));
        let summary = orchestrator.load_all().await;

        assert_eq!(summary.tier_of(PanelId::Map), Some(Tier::Static));
        for panel in [
            PanelId::Overview,
            PanelId::RegionUsers,
            PanelId::AgeRisk,
            PanelId::RegionRisk,
            PanelId::RiskDistribution,
        ] {
            assert_eq!(summary.tier_of(panel), Some(Tier::Remote), "{panel}");
        }

        let map = orchestrator.registry().get(PanelId::Map).unwrap();
        let remote_failure = map.fallbacks.iter().find(|(t, _)| *t == Tier::Remote);
        assert_eq!(remote_failure.map(|(_, e)| e.kind()), Some("decode"));
        assert!(map.boundary.is_some());
        // one combined round-trip for the whole page
        assert_eq!(fetcher.calls().0, 1);
    }

    #[tokio::test]
    async fn test_float_encoded_counts_stay_remote() {
        let mut body = payload("成都", json!([{ "name": "成都市", "total_users": 420.0 }]));
        body["data"]["overview"]["total_users"] = json!(25600.0);
        body["data"]["region_users"] = json!([{ "name": "成都", "value": 120.0 }]);
        body["data"]["age_risk"] = json!([{ "age_group": "60+", "low": 4.0, "medium": 2.0, "high": 1.0 }]);
        let fetcher = Arc::new(CountingFetcher::default().with_remote(ALL, Ok(body)));
        let mut orchestrator = Orchestrator::new(loader(fetcher));
        let summary = orchestrator.load_all().await;

        assert_eq!(summary.tier_of(PanelId::Overview), Some(Tier::Remote));
        for panel in PanelId::BUNDLE {
            assert_eq!(summary.tier_of(panel), Some(Tier::Remote), "{panel}");
        }
        let registry = orchestrator.registry();
        assert_eq!(registry.overview().unwrap().total_users, 25600);
        match registry.get(PanelId::RegionUsers).unwrap().data.as_ref() {
            Some(PanelData::RegionUsers(rows)) => assert_eq!(rows[0].value, 120),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_field_falls_back_alone() {
        let mut body = payload("成都", json!([]));
        body["data"]
            .as_object_mut()
            .unwrap()
            .remove("age_risk");
        let fetcher = Arc::new(CountingFetcher::default().with_remote(ALL, Ok(body)));
        let mut orchestrator = Orchestrator::new(loader(fetcher));
        let summary = orchestrator.load_all().await;

        assert_eq!(summary.tier_of(PanelId::AgeRisk), Some(Tier::Default));
        assert_eq!(summary.tier_of(PanelId::RegionRisk), Some(Tier::Remote));
        assert_eq!(summary.tier_of(PanelId::Map), Some(Tier::Remote));
    }

    #[tokio::test]
    async fn test_combined_failure_falls_back_as_group() {
        let fetcher = Arc::new(
            CountingFetcher::default()
                .with_remote(ALL, Err(FetchError::Http { status: 500 }))
                .with_file("chart_1.json", Ok(json!([{ "name": "静态", "value": 1 }])))
                .with_file("chart_2.json", Ok(json!([])))
                .with_file("chart_3.json", Ok(json!([])))
                .with_file("chart_4.json", Ok(json!([])))
                .with_file("map.json", Ok(json!([]))),
        );
        let mut orchestrator = Orchestrator::new(loader(fetcher.clone()));
        let summary = orchestrator.load_all().await;

        for panel in PanelId::BUNDLE {
            assert_eq!(summary.tier_of(panel), Some(Tier::Static), "{panel}");
        }
        assert_eq!(summary.tier_of(PanelId::Overview), Some(Tier::Default));
        assert_eq!(orchestrator.registry().overview().unwrap().total_users, 25600);
        assert_eq!(fetcher.calls().0, 1);

        match &orchestrator.registry().get(PanelId::RegionUsers).unwrap().data {
            Some(PanelData::RegionUsers(rows)) => assert_eq!(rows[0].name, "静态"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_everything_down_renders_defaults() {
        let mut orchestrator = Orchestrator::new(loader(Arc::new(CountingFetcher::default())));
        let summary = orchestrator.load_all().await;

        assert_eq!(summary.tiers.len(), 6);
        assert!(summary.tiers.iter().all(|(_, tier)| *tier == Tier::Default));
        let map = orchestrator.registry().get(PanelId::Map).unwrap();
        assert!(map.boundary.is_none());
        assert_eq!(map.renders, 1);
    }

    #[tokio::test]
    async fn test_inline_data_wins() {
        let fetcher = Arc::new(CountingFetcher::default().with_remote(ALL, Ok(payload("远程", json!([])))));
        let loader = loader(fetcher).with_inline(
            PanelId::RiskDistribution,
            json!([{ "region": "inline", "score": 1.0 }]),
        );
        let mut orchestrator = Orchestrator::new(loader);
        let summary = orchestrator.load_all().await;

        assert_eq!(summary.tier_of(PanelId::RiskDistribution), Some(Tier::Inline));
        assert_eq!(summary.tier_of(PanelId::RegionRisk), Some(Tier::Remote));
    }

    /// Hands out scripted bodies in call order; a body may be held back by a gate.
    struct GatedFetcher {
        script: Mutex<VecDeque<(Option<oneshot::Receiver<()>>, Value)>>,
        entered: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl Fetcher for GatedFetcher {
        async fn get_json(&self, _url: &str) -> Result<Value, FetchError> {
            let next = self.script.lock().unwrap().pop_front();
            let (gate, body) = next.ok_or_else(|| FetchError::Network("script exhausted".into()))?;
            let _ = self.entered.send(());
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(body)
        }

        async fn read_static(&self, path: &str) -> Result<Value, FetchError> {
            Err(FetchError::Io(format!("{path}: not found")))
        }
    }

    #[tokio::test]
    async fn test_concurrent_refresh_last_completed_wins() {
        let (gate_tx, gate_rx) = oneshot::channel();
        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let fetcher = Arc::new(GatedFetcher {
            script: Mutex::new(VecDeque::from(vec![
                (Some(gate_rx), payload("slow", json!([]))),
                (None, payload("fast", json!([]))),
            ])),
            entered: entered_tx,
        });
        let mut orchestrator = Orchestrator::new(loader(fetcher));

        let slow = orchestrator.refresh();
        entered_rx.recv().await.unwrap();
        let fast = orchestrator.refresh();
        assert_eq!(orchestrator.in_flight(), 2);

        let fast = fast.await.unwrap();
        gate_tx.send(()).unwrap();
        let slow = slow.await.unwrap();
        assert_eq!(orchestrator.in_flight(), 0);
        assert_eq!(orchestrator.drain(), 12);

        let registry = orchestrator.registry();
        for panel in PanelId::BUNDLE {
            let slot = registry.get(panel).unwrap();
            assert_eq!(slot.generation, slow.generation, "{panel}");
            assert_ne!(slot.generation, fast.generation);
            assert_eq!(slot.renders, 2);
        }
        match &registry.get(PanelId::RegionUsers).unwrap().data {
            Some(PanelData::RegionUsers(rows)) => assert_eq!(rows[0].name, "slow"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
