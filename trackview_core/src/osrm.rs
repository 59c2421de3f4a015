//! Directions over an OSRM-compatible HTTP routing service.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use trackview_env::{
    CandidateRoute, DirectionsResponse, DirectionsService, EnvError, LatLng, RouteRequest,
    TravelMode,
};

#[derive(Debug, Deserialize)]
struct OsrmReply {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    distance: Option<f64>,
    geometry: OsrmGeometry,
}

/// GeoJSON LineString, coordinates as `[lng, lat]`.
#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// OSRM profile name for a travel mode.
pub fn profile(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Driving => "driving",
        TravelMode::Walking => "foot",
    }
}

/// Converts an OSRM reply body into candidate routes.
pub fn parse_reply(body: &str) -> Result<DirectionsResponse, EnvError> {
    let reply: OsrmReply =
        serde_json::from_str(body).map_err(|e| EnvError::Decode(e.to_string()))?;

    if reply.code != "Ok" {
        let detail = reply.message.unwrap_or_default();
        return Err(EnvError::routing(format!("{} {}", reply.code, detail).trim_end()));
    }

    let routes = reply
        .routes
        .into_iter()
        .map(|r| CandidateRoute {
            path: r
                .geometry
                .coordinates
                .iter()
                .map(|[lng, lat]| LatLng::new(*lat, *lng))
                .collect(),
            distance_m: r.distance,
        })
        .collect();

    Ok(DirectionsResponse { routes })
}

/// `GET {base}/route/v1/{profile}/{lng},{lat};{lng},{lat}`
pub struct OsrmDirections {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OsrmDirections {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EnvError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnvError::connection(format!("http client init failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn url(&self, request: &RouteRequest) -> String {
        let (o, d) = (request.origin, request.destination);
        format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.base_url,
            profile(request.travel_mode),
            o.lng,
            o.lat,
            d.lng,
            d.lat
        )
    }
}

#[async_trait]
impl DirectionsService for OsrmDirections {
    async fn route(&self, request: RouteRequest) -> Result<DirectionsResponse, EnvError> {
        let url = self.url(&request);
        debug!(%url, mode = %request.travel_mode, "GET route");

        let response = self
            .client
            .get(&url)
            .query(&[("overview", "full"), ("geometries", "geojson")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EnvError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    EnvError::connection(e.to_string())
                }
            })?;

        // OSRM reports NoRoute and friends with a 400 and a JSON body.
        let body = response
            .text()
            .await
            .map_err(|e| EnvError::Decode(e.to_string()))?;
        parse_reply(&body)
    }
}
