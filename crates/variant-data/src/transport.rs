//! HTTP transport seam between the fetch client and the network.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::errors::VariantDataError;
use crate::models::HttpMethod;

/// A fully addressed outbound request.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// Response as seen by the fetch client: status, body text and any
/// `Retry-After` hint.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

/// Executes HTTP requests.
///
/// Returns `Ok` for every response that arrived, whatever its status;
/// `Err` only when no response was received (timeout, connection failure).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(
        &self,
        provider: &str,
        request: HttpRequest,
    ) -> Result<HttpResponse, VariantDataError>;
}

/// Production transport backed by reqwest.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(user_agent.to_string())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        provider: &str,
        request: HttpRequest,
    ) -> Result<HttpResponse, VariantDataError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        builder = builder
            .header(ACCEPT, "application/json")
            .timeout(request.timeout)
            .query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(
            "{} request: {} {} with {} params",
            provider,
            request.method,
            request.url,
            request.query.len()
        );

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                VariantDataError::Timeout {
                    provider: provider.to_string(),
                }
            } else {
                VariantDataError::Transport {
                    provider: provider.to_string(),
                    message: format!("Request failed: {}", e),
                }
            }
        })?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers(), Utc::now());
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                VariantDataError::Timeout {
                    provider: provider.to_string(),
                }
            } else {
                VariantDataError::Transport {
                    provider: provider.to_string(),
                    message: format!("Failed to read response body: {}", e),
                }
            }
        })?;

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// `Retry-After` is either delay-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        return (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((date - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest {
            method,
            url,
            query: vec![],
            body: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(
            parse_retry_after(&headers, Utc::now()),
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 50).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(
            parse_retry_after(&headers, now),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_parse_retry_after_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers, Utc::now()), None);
        assert_eq!(parse_retry_after(&HeaderMap::new(), Utc::now()), None);
    }

    #[tokio::test]
    async fn test_get_passes_query_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup/symbol/homo_sapiens/APOE"))
            .and(query_param("expand", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":"ENSG00000130203"}"#))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("varlens-test");
        let mut req = request(
            HttpMethod::Get,
            format!("{}/lookup/symbol/homo_sapiens/APOE", server.uri()),
        );
        req.query.push(("expand".to_string(), "1".to_string()));

        let response = transport.execute("ENSEMBL", req).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body.contains("ENSG00000130203"));
    }

    #[tokio::test]
    async fn test_post_sends_json_and_surfaces_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/variant"))
            .and(body_json(serde_json::json!({"ids": "rs7412"})))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("varlens-test");
        let mut req = request(HttpMethod::Post, format!("{}/variant", server.uri()));
        req.body = Some(serde_json::json!({"ids": "rs7412"}));

        let response = transport.execute("MYVARIANT", req).await.unwrap();
        assert_eq!(response.status, 429);
        assert_eq!(response.retry_after, Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let transport = ReqwestTransport::new("varlens-test");
        let req = request(HttpMethod::Get, "http://127.0.0.1:9/unreachable".to_string());

        let err = transport.execute("GTEX", req).await.unwrap_err();
        assert!(matches!(
            err,
            VariantDataError::Transport { .. } | VariantDataError::Timeout { .. }
        ));
    }
}
