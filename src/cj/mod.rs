//! CJ Dropshipping REST client.
//!
//! Every call returns the `data` member of CJ's `{code, result, message, data}`
//! envelope; a `result:false` body or a non-2xx status becomes a [`CjError`].
//! Workflow code never sees the raw envelope.

pub mod auth;
pub mod logistics;
pub mod normalize;
pub mod orders;
pub mod products;
pub mod sourcing;
pub mod webhooks;

use crate::config::CjConfig;
use crate::http::build_client;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Instant};
use thiserror::Error;

pub use auth::TokenGrant;
pub use logistics::TrackInfo;
pub use orders::{CreateOrderRequest, OrderProduct};
pub use sourcing::{SourcingRecord, SourcingRequest};

const ACCESS_TOKEN_HEADER: &str = "CJ-Access-Token";

#[derive(Debug, Error)]
pub enum CjError {
    #[error("CJ_API_KEY is not configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Rejected(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
}

#[derive(Clone)]
pub struct CjClient {
    http: Client,
    config: Arc<CjConfig>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    result: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn into_data(self) -> Result<Value, CjError> {
        let accepted = self
            .result
            .unwrap_or_else(|| self.code.is_some_and(|code| code == 200));
        if accepted {
            return Ok(self.data);
        }
        let message = self
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| match self.code {
                Some(code) => format!("CJ rejected the request (code {code})"),
                None => "CJ rejected the request".to_string(),
            });
        Err(CjError::Rejected(message))
    }
}

impl CjClient {
    pub fn new(config: CjConfig) -> Self {
        Self {
            http: build_client(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CjConfig {
        &self.config
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &'static str,
        access_token: Option<&str>,
        body: &B,
    ) -> Result<Value, CjError> {
        let mut request = self.http.post(self.config.endpoint(path)).json(body);
        if let Some(token) = access_token {
            request = request.header(ACCESS_TOKEN_HEADER, token);
        }
        self.send(path, request).await
    }

    pub(crate) async fn get_json(
        &self,
        path: &'static str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, CjError> {
        let request = self
            .http
            .get(self.config.endpoint(path))
            .header(ACCESS_TOKEN_HEADER, access_token)
            .query(query);
        self.send(path, request).await
    }

    async fn send(&self, path: &'static str, request: RequestBuilder) -> Result<Value, CjError> {
        let started = Instant::now();
        let outcome = dispatch(request).await;
        crate::metrics::external_call(path, started.elapsed().as_millis(), outcome.is_ok());
        outcome
    }
}

async fn dispatch(request: RequestBuilder) -> Result<Value, CjError> {
    let response = request
        .send()
        .await
        .map_err(|err| CjError::Request(err.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| CjError::Request(err.to_string()))?;
    let envelope = serde_json::from_str::<Envelope>(&body).ok();

    if !status.is_success() {
        let message = envelope
            .and_then(|env| env.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(CjError::Status {
            status: status.as_u16(),
            message,
        });
    }

    envelope
        .ok_or_else(|| CjError::Deserialize("response is not a CJ envelope".into()))?
        .into_data()
}

#[cfg(test)]
pub(crate) fn test_client(base_url: &str) -> CjClient {
    CjClient::new(CjConfig {
        api_key: "test-api-key".into(),
        base_url: base_url.trim_end_matches('/').to_string(),
        webhook_url: "https://shop.example/webhooks/cj".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn envelope_without_result_falls_back_to_code() {
        let env: Envelope =
            serde_json::from_value(json!({"code": 200, "data": {"x": 1}})).unwrap();
        assert_eq!(env.into_data().unwrap(), json!({"x": 1}));

        let env: Envelope =
            serde_json::from_value(json!({"code": 1600100, "message": ""})).unwrap();
        let err = env.into_data().unwrap_err();
        assert_eq!(err.to_string(), "CJ rejected the request (code 1600100)");
    }

    #[tokio::test]
    async fn rejected_envelope_keeps_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product/sourcing/cancel"))
            .and(header("CJ-Access-Token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 1600200,
                "result": false,
                "message": "Sourcing has been processed"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .post_json("product/sourcing/cancel", Some("tok"), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CjError::Rejected(ref m) if m == "Sourcing has been processed"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logistic/getTrackInfo"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .get_json("logistic/getTrackInfo", "tok", &[("orderId", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, CjError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_a_deserialize_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/set"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .post_json("webhook/set", Some("tok"), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CjError::Deserialize(_)));
    }
}
