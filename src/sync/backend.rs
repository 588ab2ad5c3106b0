//! REST backend contract for marker persistence.
//!
//! The HTTP implementation talks to the companion app's `/v1/markers`
//! endpoints. Response bodies are decoded defensively: an unexpected shape
//! is a `MalformedResponse` error, never a panic, and authorization refusals
//! are mapped to their own error variants so the UI can show specific
//! messages.

use crate::{
    core::geo::LatLng,
    marker::record::{Category, MarkerId, MarkerRecord, UserId},
    Error, Result,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Sentinel the backend returns on successful marker registration
const CREATE_SUCCESS_SENTINEL: &str = "marker_registered_success";

/// Shared async HTTP client for marker requests
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent("pawmap/0.1.0")
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("failed to build reqwest async client")
});

/// A marker as the server knows it, before it becomes a store record
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMarker {
    pub id: MarkerId,
    pub owner: Option<UserId>,
    pub position: LatLng,
    pub category: Category,
}

impl RemoteMarker {
    pub fn into_record(self) -> MarkerRecord {
        MarkerRecord::new(self.id, self.owner, self.position, self.category)
    }
}

/// Body of a marker creation request
#[derive(Debug, Clone, Serialize)]
pub struct CreateMarkerRequest {
    #[serde(rename = "type")]
    pub type_code: u8,
    pub latitude: f64,
    pub longitude: f64,
}

impl CreateMarkerRequest {
    pub fn new(position: LatLng, category: Category) -> Self {
        Self {
            type_code: category.to_code(),
            latitude: position.lat,
            longitude: position.lng,
        }
    }
}

/// Persistence operations the sync controller issues
#[async_trait]
pub trait MarkerBackend: Send + Sync {
    /// All markers within `radius` meters of `center`
    async fn fetch_markers(&self, center: LatLng, radius: f64) -> Result<Vec<RemoteMarker>>;

    /// Registers a marker; the returned record carries the server id
    async fn create_marker(&self, request: CreateMarkerRequest) -> Result<RemoteMarker>;

    /// Deletes a marker by id
    async fn delete_marker(&self, id: &MarkerId) -> Result<()>;
}

// --- wire types --------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireMarker {
    id: Option<u64>,
    user_id: Option<u64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(rename = "type")]
    type_code: Option<u8>,
}

impl WireMarker {
    fn into_remote(self) -> Result<RemoteMarker> {
        let id = self
            .id
            .ok_or_else(|| Error::MalformedResponse("marker without id".to_string()))?;
        let (latitude, longitude) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => {
                return Err(Error::MalformedResponse(format!(
                    "marker {} without coordinates",
                    id
                )))
            }
        };
        let type_code = self.type_code.ok_or_else(|| {
            Error::MalformedResponse(format!("marker {} without type code", id))
        })?;

        Ok(RemoteMarker {
            id: MarkerId::from_server(id),
            owner: self.user_id.map(|uid| UserId::new(uid.to_string())),
            position: LatLng::new(latitude, longitude),
            category: Category::from_code(type_code)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FetchEnvelope {
    data: Option<FetchData>,
}

#[derive(Debug, Deserialize)]
struct FetchData {
    markers: Option<Vec<WireMarker>>,
}

#[derive(Debug, Deserialize)]
struct CreateEnvelope {
    message: Option<String>,
    data: Option<CreateData>,
}

#[derive(Debug, Deserialize)]
struct CreateData {
    marker: Option<WireMarker>,
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    code: Option<String>,
    message: Option<String>,
}

pub(crate) fn decode_fetch_body(body: serde_json::Value) -> Result<Vec<RemoteMarker>> {
    let envelope: FetchEnvelope = serde_json::from_value(body)?;
    let markers = envelope
        .data
        .and_then(|data| data.markers)
        .ok_or_else(|| Error::MalformedResponse("fetch body without data.markers".to_string()))?;

    markers
        .into_iter()
        .map(WireMarker::into_remote)
        .collect()
}

pub(crate) fn decode_create_body(body: serde_json::Value) -> Result<RemoteMarker> {
    let envelope: CreateEnvelope = serde_json::from_value(body)?;
    match envelope.message.as_deref() {
        Some(CREATE_SUCCESS_SENTINEL) => {}
        other => {
            return Err(Error::MalformedResponse(format!(
                "unexpected create response message: {:?}",
                other
            )))
        }
    }
    envelope
        .data
        .and_then(|data| data.marker)
        .ok_or_else(|| Error::MalformedResponse("create body without data.marker".to_string()))?
        .into_remote()
}

/// Maps a non-success response to the error taxonomy: authorization codes
/// get their own variants, everything else is a generic retryable failure.
pub(crate) fn decode_failure(status: reqwest::StatusCode, body: serde_json::Value) -> Error {
    let failure: FailureBody = serde_json::from_value(body).unwrap_or(FailureBody {
        code: None,
        message: None,
    });
    let code = failure.code.or(failure.message).unwrap_or_default();

    match code.as_str() {
        "required_authorization" => Error::Unauthenticated,
        "required_permission" => Error::NotOwner,
        _ if status == reqwest::StatusCode::UNAUTHORIZED => Error::Unauthenticated,
        _ if status == reqwest::StatusCode::FORBIDDEN => Error::NotOwner,
        _ => Error::RequestFailed(format!("HTTP {}", status)),
    }
}

// --- HTTP implementation -----------------------------------------------------------------------

/// `reqwest`-backed implementation of [`MarkerBackend`]
pub struct HttpMarkerBackend {
    base_url: String,
    auth_token: Option<String>,
}

impl HttpMarkerBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = HTTP_CLIENT.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl MarkerBackend for HttpMarkerBackend {
    async fn fetch_markers(&self, center: LatLng, radius: f64) -> Result<Vec<RemoteMarker>> {
        let response = self
            .request(reqwest::Method::GET, "/v1/markers")
            .query(&[
                ("latitude", center.lat.to_string()),
                ("longitude", center.lng.to_string()),
                ("radius", radius.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(decode_failure(status, body));
        }
        decode_fetch_body(body)
    }

    async fn create_marker(&self, request: CreateMarkerRequest) -> Result<RemoteMarker> {
        let response = self
            .request(reqwest::Method::POST, "/v1/markers")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(decode_failure(status, body));
        }
        decode_create_body(body)
    }

    async fn delete_marker(&self, id: &MarkerId) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/v1/markers/{}", id))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        Err(decode_failure(status, body))
    }
}
