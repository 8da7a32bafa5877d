use axum::{
    extract::State,
    http::{header::COOKIE, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use health_dash::api::ApiClient;
use health_dash::config::Settings;
use health_dash::models::{PanelData, PanelId};
use health_dash::orchestrator::{Orchestrator, PanelLoader};
use health_dash::profile::{self, LogoutOutcome, PersonalCharts, UserInfoOutcome};
use health_dash::resolver::Tier;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SESSION: &str = "session=abc123";

#[derive(Clone, Default)]
struct Hits {
    dashboard: Arc<AtomicUsize>,
    logout: Arc<AtomicUsize>,
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn bundle() -> Value {
    json!({
        "success": true,
        "data": {
            "overview": {
                "total_users": 1200,
                "total_regions": 21,
                "high_risk_users": 130,
                "avg_risk_score": 47.5,
                "update_time": "2026-10-18T08:00:00Z"
            },
            "map_data": "not-a-list",
            "region_users": [{ "name": "成都市", "value": 420 }],
            "age_risk": [{ "age_group": "60+", "low": 10, "medium": 20, "high": 30 }],
            "region_risk": [{ "region": "绵阳市", "low": 5, "medium": 6, "high": 7 }],
            "risk_distribution": [{ "region": "成都市", "score": 62.0 }]
        }
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get(COOKIE).and_then(|v| v.to_str().ok()) == Some(SESSION)
}

fn router(hits: Hits) -> Router {
    Router::new()
        .route(
            "/api/dashboard/all",
            get(|State(hits): State<Hits>| async move {
                hits.dashboard.fetch_add(1, Ordering::SeqCst);
                Json(bundle())
            }),
        )
        .route(
            "/api/user/userinfo",
            get(|headers: HeaderMap| async move {
                if !authorized(&headers) {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "success": false })));
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "success": true,
                        "user": {
                            "name": "Wang Fang",
                            "gender": "F",
                            "age": 58,
                            "region": "成都市",
                            "risks": [{ "label": "Hypertension", "level": "高" }],
                            "suggestions": ["少盐饮食", "每天步行三十分钟"]
                        }
                    })),
                )
            }),
        )
        .route(
            "/api/user/charts",
            get(|| async { StatusCode::NOT_FOUND }),
        )
        .route(
            "/api/auth/api/logout",
            post(|State(hits): State<Hits>| async move {
                hits.logout.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "success": true }))
            }),
        )
        .with_state(hits)
}

fn write_fixtures(dir: &Path) {
    fs::write(
        dir.join("map.json"),
        json!([{ "name": "成都市", "value": 71.5, "total_users": 420 }]).to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("sichuan.json"),
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "name": "成都市" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[103.0, 30.0], [104.5, 30.0], [104.5, 31.2], [103.0, 30.0]]]
                }
            }]
        })
        .to_string(),
    )
    .unwrap();
}

fn settings(base_url: &str, fixtures: &Path, cookie: Option<&str>) -> Settings {
    Settings {
        base_url: base_url.to_string(),
        fixtures_dir: fixtures.display().to_string(),
        session_cookie: cookie.map(str::to_string),
        ..Settings::default()
    }
}

fn charts() -> PersonalCharts {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
    PersonalCharts::defaults(today, &mut rand::thread_rng())
}

#[tokio::test]
async fn test_dashboard_load_uses_one_combined_request() {
    let hits = Hits::default();
    let base = serve(router(hits.clone())).await;
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let settings = settings(&base, dir.path(), None);
    let client = Arc::new(ApiClient::new(&settings).unwrap());
    let loader = PanelLoader::new(
        client.clone(),
        client.endpoints().clone(),
        settings.overview_defaults.clone(),
    );
    let mut orchestrator = Orchestrator::new(loader);
    let summary = orchestrator.load_all().await;

    assert_eq!(hits.dashboard.load(Ordering::SeqCst), 1);
    assert_eq!(summary.tier_of(PanelId::Overview), Some(Tier::Remote));
    assert_eq!(summary.tier_of(PanelId::RegionUsers), Some(Tier::Remote));
    assert_eq!(summary.tier_of(PanelId::Map), Some(Tier::Static));

    let registry = orchestrator.registry();
    assert_eq!(registry.overview().unwrap().total_users, 1200);

    let map = registry.get(PanelId::Map).unwrap();
    match map.data.as_ref() {
        Some(PanelData::Map(rows)) => assert_eq!(rows[0].name, "成都市"),
        other => panic!("unexpected map data {other:?}"),
    }
    let boundary = map.boundary.as_ref().expect("boundary registered");
    assert_eq!(boundary.regions.len(), 1);
}

#[tokio::test]
async fn test_unreachable_api_falls_back_to_fixtures() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    fs::write(
        dir.path().join("chart_1.json"),
        json!([{ "name": "德阳市", "value": 88 }]).to_string(),
    )
    .unwrap();

    // Nothing listens on port 9.
    let settings = settings("http://127.0.0.1:9", dir.path(), None);
    let client = Arc::new(ApiClient::new(&settings).unwrap());
    let loader = PanelLoader::new(
        client.clone(),
        client.endpoints().clone(),
        settings.overview_defaults.clone(),
    );
    let mut orchestrator = Orchestrator::new(loader);
    let summary = orchestrator.load_all().await;

    assert_eq!(summary.tier_of(PanelId::RegionUsers), Some(Tier::Static));
    assert_eq!(summary.tier_of(PanelId::AgeRisk), Some(Tier::Default));
    assert_eq!(summary.tier_of(PanelId::Overview), Some(Tier::Default));
    let users = orchestrator.registry().get(PanelId::RegionUsers).unwrap();
    assert_eq!(users.fallbacks[0].0, Tier::Remote);
    assert_eq!(users.fallbacks[0].1.kind(), "network");
}

#[tokio::test]
async fn test_profile_requires_session_cookie() {
    let base = serve(router(Hits::default())).await;
    let dir = tempfile::tempdir().unwrap();

    let anonymous = Arc::new(ApiClient::new(&settings(&base, dir.path(), None)).unwrap());
    let endpoints = anonymous.endpoints().clone();
    let page = profile::load_profile(anonymous, &endpoints, charts()).await;
    assert_eq!(page.user, UserInfoOutcome::NotAuthenticated);
    assert!(page.suggestions().is_empty());

    let signed_in = Arc::new(ApiClient::new(&settings(&base, dir.path(), Some(SESSION))).unwrap());
    let page = profile::load_profile(signed_in, &endpoints, charts()).await;
    let user = page.user.profile().expect("profile loaded");
    assert_eq!(user.name, "Wang Fang");
    assert_eq!(page.suggestions().len(), 2);
    // Charts endpoint answers 404, so the generated defaults stay.
    assert_eq!(page.charts_tier, Tier::Default);
}

#[tokio::test]
async fn test_logout_posts_once() {
    let hits = Hits::default();
    let base = serve(router(hits.clone())).await;
    let dir = tempfile::tempdir().unwrap();

    let client = ApiClient::new(&settings(&base, dir.path(), Some(SESSION))).unwrap();
    let outcome = LogoutOutcome::from(client.logout().await);

    assert_eq!(outcome, LogoutOutcome::LoggedOut);
    assert_eq!(hits.logout.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_logout_server_error() {
    let base = serve(Router::new().route(
        "/api/auth/api/logout",
        post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    ))
    .await;
    let dir = tempfile::tempdir().unwrap();

    let client = ApiClient::new(&settings(&base, dir.path(), None)).unwrap();
    let outcome = LogoutOutcome::from(client.logout().await);
    match outcome {
        LogoutOutcome::Failed(err) => assert_eq!(err.status(), Some(500)),
        other => panic!("unexpected {other:?}"),
    }
}
