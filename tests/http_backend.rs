//! End-to-end tests against an in-process mock city backend.
//!
//! Exercises the reqwest transport, URL building, status handling and the
//! controller over real HTTP.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use city_prefs::sink::NoRepaint;
use city_prefs::{
    ApiConfig, CityId, FetchController, FetchError, HttpTransport, ListOutcome, PagedClient,
    RecordingSink,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LONDON: u64 = 2643743;
const LOCKED: u64 = 666;

// =============================================================================
// MOCK BACKEND
// =============================================================================

struct Backend {
    cities: Vec<Value>,
    prefs: BTreeSet<u64>,
}

type Shared = Arc<Mutex<Backend>>;

#[derive(Deserialize)]
struct PageQuery {
    offset: usize,
    limit: usize,
    #[serde(default)]
    filter: String,
}

fn page(rows: Vec<Value>, q: &PageQuery) -> Json<Value> {
    let total = rows.len();
    let data: Vec<Value> = rows.into_iter().skip(q.offset).take(q.limit).collect();
    Json(json!({"data": data, "total": total}))
}

async fn list_cities(State(backend): State<Shared>, Query(q): Query<PageQuery>) -> Json<Value> {
    let needle = q.filter.to_lowercase();
    let rows: Vec<Value> = backend
        .lock()
        .unwrap()
        .cities
        .iter()
        .filter(|c| {
            let name = c["name"].as_str().unwrap_or_default().to_lowercase();
            let country = c["country"].as_str().unwrap_or_default().to_lowercase();
            name.contains(&needle) || country.contains(&needle)
        })
        .cloned()
        .collect();
    page(rows, &q)
}

async fn list_prefs(State(backend): State<Shared>, Query(q): Query<PageQuery>) -> Json<Value> {
    let rows: Vec<Value> = backend
        .lock()
        .unwrap()
        .prefs
        .iter()
        .map(|id| json!(id))
        .collect();
    page(rows, &q)
}

async fn patch_prefs(
    State(backend): State<Shared>,
    Json(body): Json<HashMap<String, bool>>,
) -> Response {
    let mut backend = backend.lock().unwrap();
    for (key, enabled) in body {
        let Ok(id) = key.parse::<u64>() else {
            return (StatusCode::BAD_REQUEST, "bad id").into_response();
        };
        if id == LOCKED {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": true, "message": "Preference store locked"})),
            )
                .into_response();
        }
        if enabled {
            backend.prefs.insert(id);
        } else {
            backend.prefs.remove(&id);
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn get_city(State(backend): State<Shared>, Path(id): Path<u64>) -> Json<Value> {
    let backend = backend.lock().unwrap();
    match backend.cities.iter().find(|c| c["id"] == id) {
        Some(city) => Json(city.clone()),
        None => Json(json!({"error": true, "message": format!("City {} not found", id)})),
    }
}

fn seed() -> Backend {
    let mut cities = vec![
        json!({"id": LONDON, "name": "London", "region": "England", "country": "United Kingdom"}),
        json!({"id": 5128581, "name": "New York City", "region": "New York", "country": "United States"}),
        json!({"id": LOCKED, "name": "Lockton", "region": "Nowhere", "country": "Atlantis"}),
    ];
    for i in 1..=44u64 {
        cities.push(json!({
            "id": 10_000 + i, "name": format!("Longview {}", i), "region": "Texas", "country": "United States"
        }));
    }
    Backend {
        cities,
        prefs: BTreeSet::from([5128581]),
    }
}

async fn spawn_backend() -> (String, Shared) {
    let shared: Shared = Arc::new(Mutex::new(seed()));
    let app = Router::new()
        .route("/cities", get(list_cities))
        .route("/preferences/cities", get(list_prefs).patch(patch_prefs))
        .route("/city/:id", get(get_city))
        .with_state(shared.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), shared)
}

fn config_for(base_url: &str) -> ApiConfig {
    ApiConfig {
        debounce_ms: 20,
        ..ApiConfig::with_base_url(base_url)
    }
}

fn client_for(base_url: &str) -> Arc<PagedClient> {
    let config = config_for(base_url);
    let transport = Arc::new(HttpTransport::new(&config).unwrap());
    Arc::new(PagedClient::new(transport, config).unwrap())
}

async fn wait_idle(controller: &FetchController) {
    tokio::time::sleep(controller.debounce_window() + Duration::from_millis(30)).await;
    for _ in 0..200 {
        if !controller.snapshot().loading {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("controller never settled");
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn test_paging_over_http() {
    let (base, _) = spawn_backend().await;
    let client = client_for(&base);

    let mut sizes = Vec::new();
    loop {
        match client.get_list("lon").await.unwrap() {
            ListOutcome::Page { data, .. } => sizes.push(data.len()),
            ListOutcome::NotIssued => break,
        }
    }
    // London plus the 44 Longview rows.
    assert_eq!(sizes, vec![20, 20, 5]);
    assert!(client.is_last_page());
    assert!(!client.is_loading());
}

#[tokio::test]
async fn test_filter_with_spaces_is_encoded() {
    let (base, _) = spawn_backend().await;
    let client = client_for(&base);

    match client.get_list("  new york ").await.unwrap() {
        ListOutcome::Page { data, is_last_page, .. } => {
            assert_eq!(data.len(), 1);
            assert_eq!(data[0].name, "New York City");
            assert!(is_last_page);
        }
        other => panic!("Expected Page, got {:?}", other),
    }
}

#[tokio::test]
async fn test_single_city_and_error_envelope() {
    let (base, _) = spawn_backend().await;
    let client = client_for(&base);

    let london = client.get_single(CityId(LONDON)).await.unwrap();
    assert_eq!(london.region, "England");

    let err = client.get_single(CityId(1)).await.unwrap_err();
    assert_eq!(err, FetchError::Api("City 1 not found".into()));
}

#[tokio::test]
async fn test_patch_persists_and_reports_server_errors() {
    let (base, shared) = spawn_backend().await;
    let client = client_for(&base);

    client.update_pref(CityId(LONDON), false).await.unwrap();
    assert!(shared.lock().unwrap().prefs.contains(&LONDON));

    client.update_pref(CityId(LONDON), true).await.unwrap();
    assert!(!shared.lock().unwrap().prefs.contains(&LONDON));

    let err = client.update_pref(CityId(LOCKED), false).await.unwrap_err();
    assert_eq!(err, FetchError::Api("Preference store locked".into()));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = client_for(&base);
    let err = client.get_list("").await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)), "got {:?}", err);
    assert!(!client.is_loading());
}

#[tokio::test]
async fn test_controller_over_http() {
    let (base, shared) = spawn_backend().await;
    let sink = Arc::new(RecordingSink::new());
    let controller = FetchController::new(client_for(&base), sink.clone(), Arc::new(NoRepaint));

    controller.mount().await.unwrap();
    let state = controller.snapshot();
    assert!(state.is_selected(CityId(5128581)));
    assert_eq!(state.items.len(), 20);
    assert_eq!(controller.selected_cities()[0].name, "New York City");

    controller.on_filter_input("lon");
    wait_idle(&controller).await;
    assert_eq!(controller.snapshot().items[0].name, "London");

    controller.on_toggle(CityId(LONDON)).unwrap().await.unwrap();
    assert!(controller.snapshot().is_selected(CityId(LONDON)));
    assert!(shared.lock().unwrap().prefs.contains(&LONDON));

    controller.on_filter_input("lock");
    wait_idle(&controller).await;
    controller.on_toggle(CityId(LOCKED)).unwrap().await.unwrap();
    assert!(!controller.snapshot().is_selected(CityId(LOCKED)));
    assert_eq!(sink.messages(), vec!["Lockton - Preference store locked"]);
}
