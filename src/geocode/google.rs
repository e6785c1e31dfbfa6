//! Google Geocoding API client.

use super::{Geocoder, LookupError, into_outcome};
use crate::error::{Error, Result};
use crate::model::Outcome;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;

/// Geocoder backed by the Google Geocoding JSON endpoint.
pub struct GoogleGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl GoogleGeocoder {
    /// Build a client with a per-request timeout.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    async fn resolve(&self, key: &str) -> std::result::Result<Value, LookupError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("address", key), ("key", self.api_key.expose_secret())])
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(LookupError::Status(resp.status()));
        }

        let body: Value = resp.json().await?;
        extract_viewport(&body)
    }
}

impl Geocoder for GoogleGeocoder {
    async fn lookup(&self, key: &str) -> Outcome {
        into_outcome(key, self.resolve(key).await)
    }
}

/// Pull `results[0].geometry.viewport` out of a geocode response.
pub fn extract_viewport(body: &Value) -> std::result::Result<Value, LookupError> {
    body.pointer("/results/0/geometry/viewport")
        .cloned()
        .ok_or_else(|| {
            let status = body.get("status").and_then(Value::as_str).unwrap_or("none");
            LookupError::Malformed(format!("no results[0].geometry.viewport (status {status})"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port; returns the URL.
    async fn serve_once(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/maps/api/geocode/json")
    }

    fn geocoder(url: String) -> GoogleGeocoder {
        GoogleGeocoder::new(SecretString::from("test-key"), url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn extracts_first_viewport() {
        let body = json!({
            "status": "OK",
            "results": [
                {"geometry": {"viewport": {"northeast": {"lat": 40.76, "lng": -73.97}}}},
                {"geometry": {"viewport": {"northeast": {"lat": 0.0, "lng": 0.0}}}}
            ]
        });
        let viewport = extract_viewport(&body).unwrap();
        assert_eq!(viewport, json!({"northeast": {"lat": 40.76, "lng": -73.97}}));
    }

    #[test]
    fn zero_results_is_malformed() {
        let body = json!({"status": "ZERO_RESULTS", "results": []});
        let err = extract_viewport(&body).unwrap_err();
        assert!(err.to_string().contains("ZERO_RESULTS"));
    }

    #[test]
    fn missing_geometry_is_malformed() {
        let body = json!({"status": "OK", "results": [{"formatted_address": "x"}]});
        assert!(matches!(
            extract_viewport(&body),
            Err(LookupError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn server_error_fails_closed() {
        let url = serve_once("500 Internal Server Error", r#"{"status":"UNKNOWN_ERROR"}"#.into()).await;
        assert_eq!(geocoder(url).lookup("10001").await, Outcome::Failed);
    }

    #[tokio::test]
    async fn non_json_body_fails_closed() {
        let url = serve_once("200 OK", "<html>quota exceeded</html>".into()).await;
        assert_eq!(geocoder(url).lookup("10001").await, Outcome::Failed);
    }

    #[tokio::test]
    async fn ok_response_yields_viewport() {
        let viewport = json!({
            "northeast": {"lat": 40.76, "lng": -73.97},
            "southwest": {"lat": 40.74, "lng": -74.01}
        });
        let body = json!({
            "status": "OK",
            "results": [{"geometry": {"viewport": viewport.clone()}}]
        });
        let url = serve_once("200 OK", body.to_string()).await;
        assert_eq!(
            geocoder(url).lookup("10001").await,
            Outcome::Found(viewport)
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_closed() {
        let geocoder = GoogleGeocoder::new(
            SecretString::from("test-key"),
            "http://127.0.0.1:1/geocode/json",
            Duration::from_secs(2),
        )
        .unwrap();
        assert_eq!(geocoder.lookup("10001").await, Outcome::Failed);
    }
}
