use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::TransitConfig;

/// Search radius for nearby stops, in meters.
pub const NEARBY_RADIUS_METERS: u32 = 300;

/// Errors from a single transit API call. None of them are retried.
#[derive(Debug, Error)]
pub enum TransitError {
    #[error("Servidor Transantiago no responde (HTTP {0})")]
    Status(StatusCode),

    #[error("Failed to reach the transit API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response from the transit API: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Transit base URL cannot take a path: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArrivalResult {
    pub route_id: String,
    #[serde(default)]
    pub bus_distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StopCandidate {
    pub stop_id: String,
}

#[derive(Debug, Deserialize)]
struct ResultsEnvelope<T> {
    results: Vec<T>,
}

pub struct TransitClient {
    client: reqwest::Client,
    base_url: Url,
}

impl TransitClient {
    pub fn new(config: &TransitConfig) -> Result<Self, TransitError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransitError::InvalidBaseUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransitError::InvalidBaseUrl(config.base_url.clone()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    /// Upcoming buses for the stop with the given code.
    pub async fn next_arrivals(&self, stop_code: &str) -> Result<Vec<ArrivalResult>, TransitError> {
        let url = self.endpoint(&["v2", "stops", stop_code, "next_arrivals"])?;
        debug!("Requesting next arrivals: {}", url);

        let envelope: ResultsEnvelope<ArrivalResult> = self.get_json(url, &[]).await?;
        Ok(envelope.results)
    }

    /// Stops within `NEARBY_RADIUS_METERS` of the given point.
    pub async fn stops_near(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<StopCandidate>, TransitError> {
        let url = self.endpoint(&["v1", "stops"])?;
        let query = [
            ("center_lat", latitude.to_string()),
            ("center_lon", longitude.to_string()),
            ("radius", NEARBY_RADIUS_METERS.to_string()),
        ];
        debug!("Requesting stops near ({}, {}): {}", latitude, longitude, url);

        let envelope: ResultsEnvelope<StopCandidate> = self.get_json(url, &query).await?;
        Ok(envelope.results)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransitError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransitError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T>(&self, url: Url, query: &[(&str, String)]) -> Result<T, TransitError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Transit API returned {}", status);
            return Err(TransitError::Status(status));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TransitClient {
        TransitClient::new(&TransitConfig {
            base_url: server.uri(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_next_arrivals_parses_null_distance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/stops/PA433/next_arrivals"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results":[{"route_id":"210","bus_distance":120},{"route_id":"C01","bus_distance":null}]}"#,
            ))
            .mount(&server)
            .await;

        let arrivals = client_for(&server).next_arrivals("PA433").await.unwrap();
        assert_eq!(
            arrivals,
            vec![
                ArrivalResult {
                    route_id: "210".to_string(),
                    bus_distance: Some(120.0),
                },
                ArrivalResult {
                    route_id: "C01".to_string(),
                    bus_distance: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_distance_field_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/stops/PA1/next_arrivals"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"results":[{"route_id":"506"}]}"#),
            )
            .mount(&server)
            .await;

        let arrivals = client_for(&server).next_arrivals("PA1").await.unwrap();
        assert_eq!(arrivals[0].bus_distance, None);
    }

    #[tokio::test]
    async fn test_stops_near_sends_fixed_radius() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/stops"))
            .and(query_param("center_lat", "-33.4372"))
            .and(query_param("center_lon", "-70.6506"))
            .and(query_param("radius", "300"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"results":[{"stop_id":"PA433"},{"stop_id":"PB10"}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stops = client_for(&server)
            .stops_near(-33.4372, -70.6506)
            .await
            .unwrap();
        let ids: Vec<_> = stops.iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(ids, ["PA433", "PB10"]);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).next_arrivals("PA433").await.unwrap_err();
        assert!(matches!(err, TransitError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_unexpected_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":[]}"#))
            .mount(&server)
            .await;

        let err = client_for(&server).stops_near(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, TransitError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = TransitClient::new(&TransitConfig {
            base_url: "http://127.0.0.1:1".to_string(),
        })
        .unwrap();

        let err = client.next_arrivals("PA433").await.unwrap_err();
        assert!(matches!(err, TransitError::Transport(_)));
    }

    #[test]
    fn test_stop_code_is_a_single_path_segment() {
        let client = TransitClient::new(&TransitConfig {
            base_url: "https://api.scltrans.it/".to_string(),
        })
        .unwrap();

        let url = client
            .endpoint(&["v2", "stops", "PA/433", "next_arrivals"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.scltrans.it/v2/stops/PA%2F433/next_arrivals"
        );
    }
}
