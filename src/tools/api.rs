//! Client for the backing REST API that fronts search, Docker Cloud and maps.

use crate::config::ApiConfig;
use crate::observability::Metrics;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Treats an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Field names follow the backend's Go structs. Untagged structs marshal as
// PascalCase, library types as snake_case, so both spellings are accepted.

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "Abstract", alias = "abstract", default)]
    pub abstract_text: String,
    #[serde(rename = "Title", alias = "title", default)]
    pub title: String,
    #[serde(rename = "URL", alias = "url", alias = "Url", default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceList {
    #[serde(rename = "Meta", alias = "meta", default, deserialize_with = "null_as_default")]
    pub meta: ListMeta,
    #[serde(rename = "Objects", alias = "objects", default, deserialize_with = "null_as_default")]
    pub objects: Vec<ServiceSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMeta {
    #[serde(rename = "TotalCount", alias = "total_count", default)]
    pub total_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceSummary {
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
    #[serde(rename = "State", alias = "state", default)]
    pub state: String,
    #[serde(rename = "Uuid", alias = "uuid", default)]
    pub uuid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceSearch {
    #[serde(rename = "Results", alias = "results", default, deserialize_with = "null_as_default")]
    pub results: Vec<Place>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Place {
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
    #[serde(rename = "FormattedAddress", alias = "formatted_address", default)]
    pub formatted_address: String,
    #[serde(rename = "PlaceID", alias = "place_id", default)]
    pub place_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Directions {
    #[serde(rename = "Routes", alias = "routes", default, deserialize_with = "null_as_default")]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Route {
    #[serde(rename = "Legs", alias = "legs", default, deserialize_with = "null_as_default")]
    pub legs: Vec<Leg>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Leg {
    #[serde(rename = "Steps", alias = "steps", default, deserialize_with = "null_as_default")]
    pub steps: Vec<Step>,
    #[serde(rename = "Distance", alias = "distance", default)]
    pub distance: Measure,
    #[serde(rename = "Duration", alias = "duration", default)]
    pub duration: Measure,
    #[serde(rename = "StartAddress", alias = "start_address", default)]
    pub start_address: String,
    #[serde(rename = "EndAddress", alias = "end_address", default)]
    pub end_address: String,
}

/// A distance or duration: human-readable text plus the raw value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Measure {
    #[serde(rename = "Text", alias = "text", alias = "HumanReadable", default)]
    pub text: String,
    #[serde(rename = "Value", alias = "value", alias = "Meters", default)]
    pub value: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Step {
    #[serde(rename = "HTMLInstructions", alias = "html_instructions", default)]
    pub instructions: String,
    #[serde(rename = "Distance", alias = "distance", default)]
    pub distance: Measure,
    #[serde(rename = "Duration", alias = "duration", default)]
    pub duration: Measure,
    #[serde(rename = "TravelMode", alias = "travel_mode", default)]
    pub travel_mode: String,
    #[serde(rename = "TransitDetails", alias = "transit_details", default)]
    pub transit_details: Option<TransitDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitDetails {
    #[serde(rename = "ArrivalStop", alias = "arrival_stop", default)]
    pub arrival_stop: TransitStop,
    #[serde(rename = "DepartureStop", alias = "departure_stop", default)]
    pub departure_stop: TransitStop,
    #[serde(rename = "NumStops", alias = "num_stops", default)]
    pub num_stops: u32,
    #[serde(rename = "Line", alias = "line", default)]
    pub line: TransitLine,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitStop {
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitLine {
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
    #[serde(rename = "ShortName", alias = "short_name", default)]
    pub short_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Redeploy,
}

impl ServiceAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "redeploy" => Some(Self::Redeploy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Redeploy => "redeploy",
        }
    }
}

/// Thin typed wrapper over the backend endpoints. Every call is a single
/// request; there is no retry.
pub struct OpsApiClient {
    base_url: String,
    user: String,
    password: String,
    client: reqwest::Client,
    metrics: Arc<Metrics>,
}

impl OpsApiClient {
    pub fn new(config: &ApiConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let timeout_secs = if config.timeout_secs == 0 {
            tracing::warn!("api.timeout_secs is 0, using safe default of 4s");
            4
        } else {
            config.timeout_secs
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.min(3)))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("opsangel/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            client,
            metrics,
        })
    }

    /// `GET /search/{provider}?key=&n=`
    pub async fn search(
        &self,
        provider: &str,
        key: &str,
        n: usize,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let path = format!("/search/{}", urlencoding::encode(provider));
        let n = n.to_string();
        let results: Option<Vec<SearchResult>> = self
            .get_json("search", &path, &[("key", key), ("n", n.as_str())])
            .await?;
        Ok(results.unwrap_or_default())
    }

    /// `GET /dockercloud/service`
    pub async fn list_services(&self) -> Result<ServiceList, ApiError> {
        self.get_json("dockercloud.list", "/dockercloud/service", &[])
            .await
    }

    /// `GET /dockercloud/service/{name}`
    pub async fn services_by_name(&self, name: &str) -> Result<ServiceList, ApiError> {
        let path = format!("/dockercloud/service/{}", urlencoding::encode(name));
        self.get_json("dockercloud.lookup", &path, &[]).await
    }

    /// `POST /dockercloud/service/{uuid}/{action}`. The response body is ignored.
    pub async fn service_action(&self, uuid: &str, action: ServiceAction) -> Result<(), ApiError> {
        const ENDPOINT: &str = "dockercloud.action";
        let url = self.url(&format!(
            "/dockercloud/service/{}/{}",
            urlencoding::encode(uuid),
            action.as_str()
        ));
        let request = self.authorize(self.client.post(url));
        let result = self.send(ENDPOINT, request).await.map(|_| ());
        self.observe(ENDPOINT, &result);
        result
    }

    /// `GET /map/place/search?keyword=`
    pub async fn place_search(&self, keyword: &str) -> Result<PlaceSearch, ApiError> {
        self.get_json("map.place.search", "/map/place/search", &[("keyword", keyword)])
            .await
    }

    /// `GET /map/place/nearby?keyword=&latlng=`
    pub async fn place_nearby(&self, keyword: &str, latlng: &str) -> Result<PlaceSearch, ApiError> {
        self.get_json(
            "map.place.nearby",
            "/map/place/nearby",
            &[("keyword", keyword), ("latlng", latlng)],
        )
        .await
    }

    /// `GET /map/direct/transit?origin=&destination=`
    pub async fn transit_directions(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<Directions, ApiError> {
        self.get_json(
            "map.direct.transit",
            "/map/direct/transit",
            &[("origin", origin), ("destination", destination)],
        )
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.user.is_empty() {
            request
        } else {
            request.basic_auth(&self.user, Some(&self.password))
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let request = self.authorize(self.client.get(self.url(path)).query(query));
        let result = match self.send(endpoint, request).await {
            Ok(body) => {
                serde_json::from_str(&body).map_err(|source| ApiError::Decode { endpoint, source })
            }
            Err(err) => Err(err),
        };
        self.observe(endpoint, &result);
        result
    }

    /// Sends `request` and returns the body of a 2xx response.
    async fn send(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })
    }

    fn observe<T>(&self, endpoint: &'static str, result: &Result<T, ApiError>) {
        match result {
            Ok(_) => {
                self.metrics.record_backend_call(endpoint, true);
                tracing::debug!("backend call {endpoint} succeeded");
            }
            Err(err) => {
                self.metrics.record_backend_call(endpoint, false);
                tracing::warn!("backend call failed: {err}");
            }
        }
    }
}
