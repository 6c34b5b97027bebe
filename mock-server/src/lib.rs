use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::put,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

pub use axum::http::StatusCode;

/// Records accepted by a single append or replace request.
pub const MAX_RECORDS_PER_REQUEST: usize = 500;

const FIELD_TYPES: &[&str] = &[
    "number",
    "date",
    "datetime",
    "string",
    "percentage",
    "duration",
    "money",
];

/// A request as the server received it.
#[derive(Clone, Debug, Serialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// A stored dataset: its schema document and current rows.
#[derive(Clone, Debug, Default)]
pub struct StoredDataset {
    pub schema: Map<String, Value>,
    pub rows: Vec<Map<String, Value>>,
}

impl StoredDataset {
    fn unique_by(&self) -> Vec<String> {
        self.schema
            .get("unique_by")
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Inner {
    datasets: HashMap<String, StoredDataset>,
    requests: Vec<RecordedRequest>,
    forced: Option<Forced>,
    delay: Option<Delay>,
}

struct Delay {
    after: usize,
    duration: Duration,
}

struct Forced {
    after: usize,
    status: StatusCode,
    body: String,
}

/// Shared state behind the router. Clones observe the same store.
#[derive(Clone)]
pub struct ApiState {
    api_key: Arc<str>,
    inner: Arc<RwLock<Inner>>,
}

impl ApiState {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: Arc::from(api_key),
            inner: Arc::default(),
        }
    }

    /// Every request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.read().await.requests.clone()
    }

    pub async fn dataset(&self, id: &str) -> Option<StoredDataset> {
        self.inner.read().await.datasets.get(id).cloned()
    }

    /// Answer every following request with `status` and the raw `body`.
    pub async fn respond_with(&self, status: StatusCode, body: impl Into<String>) {
        self.respond_after(0, status, body).await;
    }

    /// Like [`ApiState::respond_with`], but only once `after` requests in
    /// total have been received.
    pub async fn respond_after(&self, after: usize, status: StatusCode, body: impl Into<String>) {
        let mut inner = self.inner.write().await;
        let after = inner.requests.len().max(after);
        inner.forced = Some(Forced {
            after,
            status,
            body: body.into(),
        });
    }

    /// Hold every request from the `after`-th one onwards for `duration`
    /// before answering it.
    pub async fn delay_after(&self, after: usize, duration: Duration) {
        self.inner.write().await.delay = Some(Delay { after, duration });
    }

    pub async fn clear_forced_response(&self) {
        self.inner.write().await.forced = None;
    }

    async fn record(&self, method: Method, path: String, headers: &HeaderMap, body: &Bytes) {
        let header_value = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let request = RecordedRequest {
            method: method.to_string(),
            path,
            authorization: header_value(header::AUTHORIZATION),
            content_type: header_value(header::CONTENT_TYPE),
            body: String::from_utf8_lossy(body).into_owned(),
        };
        debug!(method = %request.method, path = %request.path, "request received");
        self.inner.write().await.requests.push(request);
    }

    /// The delay for the request recorded last, if one applies.
    async fn delay(&self) -> Option<Duration> {
        let inner = self.inner.read().await;
        let index = inner.requests.len().checked_sub(1)?;
        inner
            .delay
            .as_ref()
            .filter(|delay| index >= delay.after)
            .map(|delay| delay.duration)
    }

    /// The forced response for the request recorded last, if one applies.
    async fn forced_response(&self) -> Option<Response> {
        let inner = self.inner.read().await;
        let index = inner.requests.len().checked_sub(1)?;
        inner
            .forced
            .as_ref()
            .filter(|forced| index >= forced.after)
            .map(|forced| (forced.status, forced.body.clone()).into_response())
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(encoded) = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded) else {
            return false;
        };
        decoded == format!("{}:", self.api_key).as_bytes()
    }
}

pub fn app(state: ApiState) -> Router {
    Router::new()
        .route("/datasets/{id}", put(find_or_create))
        .route("/datasets/{id}/data", put(replace_data).post(append_data))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: ApiState) -> Result<(), std::io::Error> {
    info!(addr = ?listener.local_addr().ok(), "mock dataset API listening");
    axum::serve(listener, app(state)).await
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": {"message": message}}))).into_response()
}

/// Record the request, then apply delays, forced responses and
/// authentication.
async fn admit(
    state: &ApiState,
    method: Method,
    path: String,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(), Response> {
    state.record(method, path, headers, body).await;
    if let Some(duration) = state.delay().await {
        tokio::time::sleep(duration).await;
    }
    if let Some(response) = state.forced_response().await {
        return Err(response);
    }
    if !state.authorized(headers) {
        return Err(api_error(StatusCode::UNAUTHORIZED, "Your API key is invalid"));
    }
    Ok(())
}

fn parse_object(body: &Bytes) -> Result<Map<String, Value>, Response> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(object)) => Ok(object),
        _ => Err(api_error(StatusCode::BAD_REQUEST, "Request body is not valid JSON")),
    }
}

fn validate_schema(schema: &Map<String, Value>) -> Result<(), Response> {
    let bad_request = |message: &str| api_error(StatusCode::BAD_REQUEST, message);

    let fields = schema
        .get("fields")
        .and_then(Value::as_object)
        .ok_or_else(|| bad_request("fields is required"))?;

    for field in fields.values() {
        let kind = field.get("type").and_then(Value::as_str);
        match kind {
            Some(kind) if FIELD_TYPES.contains(&kind) => {}
            _ => return Err(bad_request("invalid field type")),
        }
        if kind == Some("duration") && field.get("time_unit").is_none() {
            return Err(bad_request("time_unit is required for duration fields"));
        }
        if kind == Some("money") && field.get("currency_code").is_none() {
            return Err(bad_request("currency_code is required for money fields"));
        }
    }

    if let Some(unique_by) = schema.get("unique_by") {
        let keys = unique_by
            .as_array()
            .ok_or_else(|| bad_request("unique_by must be an array"))?;
        if keys
            .iter()
            .any(|key| key.as_str().is_none_or(|key| !fields.contains_key(key)))
        {
            return Err(bad_request("unique_by references an unknown field"));
        }
    }
    Ok(())
}

fn parse_rows(body: &Bytes) -> Result<Vec<Map<String, Value>>, Response> {
    let bad_request = |message: &str| api_error(StatusCode::BAD_REQUEST, message);
    let mut payload = parse_object(body)?;
    let Some(Value::Array(data)) = payload.remove("data") else {
        return Err(bad_request("data is required"));
    };
    if data.len() > MAX_RECORDS_PER_REQUEST {
        return Err(bad_request("Exceeded maximum of 500 records per request"));
    }
    data.into_iter()
        .map(|row| match row {
            Value::Object(row) => Ok(row),
            _ => Err(bad_request("data rows must be objects")),
        })
        .collect()
}

async fn find_or_create(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/datasets/{id}");
    if let Err(response) = admit(&state, Method::PUT, path, &headers, &body).await {
        return response;
    }
    let schema = match parse_object(&body).and_then(|schema| {
        validate_schema(&schema)?;
        Ok(schema)
    }) {
        Ok(schema) => schema,
        Err(response) => return response,
    };

    let mut inner = state.inner.write().await;
    let dataset = inner.datasets.entry(id).or_default();
    dataset.schema = schema.clone();
    (StatusCode::OK, Json(Value::Object(schema))).into_response()
}

async fn append_data(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/datasets/{id}/data");
    if let Err(response) = admit(&state, Method::POST, path, &headers, &body).await {
        return response;
    }
    let rows = match parse_rows(&body) {
        Ok(rows) => rows,
        Err(response) => return response,
    };

    let mut inner = state.inner.write().await;
    let Some(dataset) = inner.datasets.get_mut(&id) else {
        return api_error(StatusCode::NOT_FOUND, "Dataset not found");
    };
    let unique_by = dataset.unique_by();
    for row in rows {
        let existing = if unique_by.is_empty() {
            None
        } else {
            dataset
                .rows
                .iter()
                .position(|stored| unique_by.iter().all(|key| stored.get(key) == row.get(key)))
        };
        match existing {
            Some(index) => dataset.rows[index] = row,
            None => dataset.rows.push(row),
        }
    }
    (StatusCode::OK, Json(json!({}))).into_response()
}

async fn replace_data(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/datasets/{id}/data");
    if let Err(response) = admit(&state, Method::PUT, path, &headers, &body).await {
        return response;
    }
    let rows = match parse_rows(&body) {
        Ok(rows) => rows,
        Err(response) => return response,
    };

    let mut inner = state.inner.write().await;
    let Some(dataset) = inner.datasets.get_mut(&id) else {
        return api_error(StatusCode::NOT_FOUND, "Dataset not found");
    };
    dataset.rows = rows;
    (StatusCode::OK, Json(json!({}))).into_response()
}
