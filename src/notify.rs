use crate::http::build_client;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

/// Everything the shipment email needs. Built from the order once a tracking
/// number is first seen.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentNotice {
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub order_id: String,
    pub order_number: String,
    pub tracking_number: String,
    pub tracking_url: String,
    pub carrier: String,
    pub estimated_delivery: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("email request failed: {0}")]
    Request(String),
    #[error("email provider returned HTTP {0}")]
    Status(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn shipment_sent(&self, notice: &ShipmentNotice) -> Result<(), NotifyError>;
}

/// Sends through a transactional email HTTP API (`POST {from, to, subject, html, text}`
/// with a bearer key).
#[derive(Clone)]
pub struct EmailNotifier {
    http: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl EmailNotifier {
    pub fn new(api_url: &str, api_key: &str, from: &str) -> Self {
        Self {
            http: build_client(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("EMAIL_API_URL").ok()?;
        let api_key = std::env::var("EMAIL_API_KEY").ok()?;
        let from = std::env::var("EMAIL_FROM")
            .unwrap_or_else(|_| "Louie Mae <orders@louiemae.com>".to_string());
        Some(Self::new(&api_url, &api_key, &from))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn shipment_sent(&self, notice: &ShipmentNotice) -> Result<(), NotifyError> {
        let greeting = notice
            .customer_name
            .as_deref()
            .map(|name| format!("Hi {name},"))
            .unwrap_or_else(|| "Hi there,".to_string());
        let text = format!(
            "{greeting}\n\nYour Louie Mae order #{number} is on its way.\n\
             Carrier: {carrier}\nTracking number: {tracking}\nTrack it here: {url}\n",
            number = notice.order_number,
            carrier = notice.carrier,
            tracking = notice.tracking_number,
            url = notice.tracking_url,
        );
        let html = format!(
            "<p>{greeting}</p><p>Your Louie Mae order <strong>#{number}</strong> is on its way.</p>\
             <p>Carrier: {carrier}<br/>Tracking number: {tracking}</p>\
             <p><a href=\"{url}\">Track your package</a></p>",
            number = notice.order_number,
            carrier = notice.carrier,
            tracking = notice.tracking_number,
            url = notice.tracking_url,
        );
        let body = json!({
            "from": self.from,
            "to": [notice.customer_email],
            "subject": format!("Your order #{} has shipped", notice.order_number),
            "html": html,
            "text": text,
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| NotifyError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        info!(
            target = "louie.notify",
            order_id = %notice.order_id,
            "shipment email sent"
        );
        Ok(())
    }
}

/// Used when no email provider is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn shipment_sent(&self, notice: &ShipmentNotice) -> Result<(), NotifyError> {
        info!(
            target = "louie.notify",
            order_id = %notice.order_id,
            tracking_number = %notice.tracking_number,
            carrier = %notice.carrier,
            "shipment notice (email delivery not configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct RecordingNotifier {
    pub sent: std::sync::Arc<tokio::sync::Mutex<Vec<ShipmentNotice>>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn shipment_sent(&self, notice: &ShipmentNotice) -> Result<(), NotifyError> {
        self.sent.lock().await.push(notice.clone());
        if self.fail {
            return Err(NotifyError::Status(500));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notice() -> ShipmentNotice {
        ShipmentNotice {
            customer_email: "june@example.com".into(),
            customer_name: Some("June".into()),
            order_id: "o-1".into(),
            order_number: "A1B2C3D4E5F6".into(),
            tracking_number: "1Z999".into(),
            tracking_url: "https://www.ups.com/track?tracknum=1Z999".into(),
            carrier: "UPS".into(),
            estimated_delivery: None,
        }
    }

    #[tokio::test]
    async fn email_goes_to_the_customer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("Authorization", "Bearer mail-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = EmailNotifier::new(
            &format!("{}/emails", server.uri()),
            "mail-key",
            "Louie Mae <orders@louiemae.com>",
        );
        notifier.shipment_sent(&notice()).await.expect("sent");

        let requests = server.received_requests().await.expect("recorded");
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json");
        assert_eq!(body["to"], json!(["june@example.com"]));
        assert!(body["text"].as_str().unwrap().contains("1Z999"));
    }

    #[tokio::test]
    async fn provider_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let notifier = EmailNotifier::new(&server.uri(), "k", "shop@example.com");
        let err = notifier.shipment_sent(&notice()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Status(422)));
    }
}
