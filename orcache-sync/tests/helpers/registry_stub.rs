//! In-process registry stub
//!
//! Serves the token, expanded-search, profile and organization endpoints
//! from an axum router bound to 127.0.0.1:0, with request counters and
//! scripted responses.

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use orcache_common::config::TomlConfig;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SYSTEM_CLIENT_ID: &str = "APP-SYSTEM";

#[derive(Default)]
pub struct StubState {
    pub token_hits: AtomicUsize,
    pub search_hits: AtomicUsize,
    pub profile_hits: AtomicUsize,
    pub org_hits: AtomicUsize,
    pub scripted_hits: AtomicUsize,

    /// Reject every token request with 401
    pub reject_token: Mutex<bool>,
    /// Person ids returned by the expanded search, in order
    pub population: Mutex<Vec<String>>,
    /// Repeat the previous page's last row at the top of each later page
    pub overlap_pages: Mutex<bool>,
    /// Search page that answers 500
    pub failing_page_start: Mutex<Option<usize>>,
    pub queries: Mutex<Vec<String>>,
    /// Profile documents by person; unknown persons are 404
    pub profiles: Mutex<HashMap<String, Value>>,
    /// Persons whose profile request always answers 500
    pub failing_profiles: Mutex<HashSet<String>>,
    /// Organization documents by institution code; unknown codes are 404
    pub organizations: Mutex<HashMap<String, Value>>,
    /// Status codes for `/scripted`, consumed in order; 200 once empty
    pub script: Mutex<VecDeque<u16>>,
}

impl StubState {
    pub fn set_population(&self, ids: impl IntoIterator<Item = String>) {
        *self.population.lock().unwrap() = ids.into_iter().collect();
    }

    pub fn add_profile(&self, person: &str, document: Value) {
        self.profiles
            .lock()
            .unwrap()
            .insert(person.to_string(), document);
    }

    pub fn fail_profile(&self, person: &str) {
        self.failing_profiles
            .lock()
            .unwrap()
            .insert(person.to_string());
    }

    pub fn add_organization(&self, code: &str, document: Value) {
        self.organizations
            .lock()
            .unwrap()
            .insert(code.to_string(), document);
    }

    pub fn script(&self, statuses: &[u16]) {
        *self.script.lock().unwrap() = statuses.iter().copied().collect();
    }

    pub fn hits(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct RegistryStub {
    pub base_url: String,
    pub state: Arc<StubState>,
}

impl RegistryStub {
    pub async fn start() -> Self {
        let state = Arc::new(StubState::default());
        let router = Router::new()
            .route("/oauth/token", post(token))
            .route("/search/expanded-search/", get(search))
            .route("/member/:person/record", get(profile))
            .route("/scripted", get(scripted))
            // `/organizations/https://ror.org/<code>`: matched by prefix
            .fallback(organization)
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Configuration pointing every endpoint at this stub
    pub fn config(&self) -> TomlConfig {
        let mut config = TomlConfig::default();
        config.registry.client_id = Some(SYSTEM_CLIENT_ID.to_string());
        config.registry.client_secret = Some("test-secret".to_string());
        config.registry.token_url = self.url("/oauth/token");
        config.registry.member_url = self.url("/member/");
        config.registry.search_url = self.url("/search");
        config.org_registry.base_url = self.base_url.clone();
        config.sync.rate_limit_backoff_ms = 10;
        config.sync.transient_backoff_ms = 5;
        config.sync.requests_per_second = 0;
        config
    }
}

async fn token(State(state): State<Arc<StubState>>) -> Response {
    let n = state.token_hits.fetch_add(1, Ordering::SeqCst) + 1;

    // Widen the window in which concurrent callers could race
    tokio::time::sleep(Duration::from_millis(50)).await;

    if *state.reject_token.lock().unwrap() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_client"}))).into_response();
    }

    Json(json!({
        "access_token": format!("token-{}", n),
        "token_type": "bearer",
        "expires_in": 3600,
        "scope": "/read-public"
    }))
    .into_response()
}

async fn search(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.search_hits.fetch_add(1, Ordering::SeqCst);

    let start: usize = params.get("start").and_then(|s| s.parse().ok()).unwrap_or(0);
    let rows: usize = params.get("rows").and_then(|s| s.parse().ok()).unwrap_or(1000);
    state
        .queries
        .lock()
        .unwrap()
        .push(params.get("q").cloned().unwrap_or_default());

    if *state.failing_page_start.lock().unwrap() == Some(start) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let population = state.population.lock().unwrap().clone();
    let mut page: Vec<String> = population.iter().skip(start).take(rows).cloned().collect();

    if *state.overlap_pages.lock().unwrap() && start > 0 && start <= population.len() {
        page.insert(0, population[start - 1].clone());
    }

    let results: Vec<Value> = page
        .iter()
        .map(|id| {
            json!({
                "orcid-id": id,
                "given-names": "Test",
                "family-names": format!("Person {}", id),
                "institution-name": ["Test University"]
            })
        })
        .collect();

    Json(json!({"expanded-result": results, "num-found": population.len()})).into_response()
}

async fn profile(State(state): State<Arc<StubState>>, Path(person): Path<String>) -> Response {
    state.profile_hits.fetch_add(1, Ordering::SeqCst);

    if state.failing_profiles.lock().unwrap().contains(&person) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match state.profiles.lock().unwrap().get(&person) {
        Some(doc) => Json(doc.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn organization(State(state): State<Arc<StubState>>, uri: Uri) -> Response {
    let Some(rest) = uri.path().strip_prefix("/organizations/") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    state.org_hits.fetch_add(1, Ordering::SeqCst);

    let code = rest.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    match state.organizations.lock().unwrap().get(code) {
        Some(doc) => Json(doc.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn scripted(State(state): State<Arc<StubState>>) -> Response {
    state.scripted_hits.fetch_add(1, Ordering::SeqCst);

    let next = state.script.lock().unwrap().pop_front().unwrap_or(200);
    let status = StatusCode::from_u16(next).unwrap();
    (status, Json(json!({"status": next}))).into_response()
}

/// Profile with `works` publications and one employment written by `writer`
pub fn profile_doc(person: &str, works: usize, writer: Option<&str>) -> Value {
    let summaries: Vec<Value> = (0..works)
        .map(|i| {
            json!({
                "put-code": i as i64 + 1,
                "title": {"title": {"value": format!("Work {} of {}", i + 1, person)}},
                "type": "journal-article",
                "publication-date": {"year": {"value": "2022"}},
                "external-ids": {"external-id": [
                    {"external-id-type": "doi", "external-id-value": format!("10.1/{}.{}", person, i)}
                ]},
                "visibility": "public"
            })
        })
        .collect();

    let employments = match writer {
        Some(client) => json!({
            "affiliation-group": [{"summaries": [{
                "employment-summary": {
                    "source": {"source-client-id": {"path": client}},
                    "organization": {"name": "Test University"}
                }
            }]}]
        }),
        None => json!({"affiliation-group": []}),
    };

    json!({
        "orcid-identifier": {"path": person},
        "person": {"name": {
            "given-names": {"value": "Test"},
            "family-name": {"value": format!("Person {}", person)}
        }},
        "activities-summary": {
            "employments": employments,
            "works": {"group": summaries.into_iter().map(|s| json!({"work-summary": [s]})).collect::<Vec<_>>()},
            "fundings": {"group": [{"funding-summary": [{
                "title": {"title": {"value": format!("Grant of {}", person)}},
                "type": "grant",
                "external-ids": {"external-id": [
                    {"external-id-type": "grant_number", "external-id-value": format!("G-{}", person)}
                ]},
                "amount": {"currency-code": "USD", "value": "1000"}
            }]}]}
        }
    })
}

/// Person ids `0000-0000-0000-0001` ...
pub fn person_ids(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("0000-0000-0000-{:04}", i)).collect()
}
