use crate::cj::{CjClient, CjError};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Subscription<'a> {
    r#type: &'static str,
    callback_urls: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct WebhookSettings<'a> {
    product: Subscription<'a>,
    stock: Subscription<'a>,
    order: Subscription<'a>,
    logistics: Subscription<'a>,
}

impl CjClient {
    /// Points product, stock, order and logistics notifications at
    /// `callback_url`. Safe to repeat; CJ overwrites the previous settings.
    pub async fn set_webhooks(&self, access_token: &str, callback_url: &str) -> Result<(), CjError> {
        let enable = || Subscription {
            r#type: "ENABLE",
            callback_urls: [callback_url],
        };
        let settings = WebhookSettings {
            product: enable(),
            stock: enable(),
            order: enable(),
            logistics: enable(),
        };
        match self
            .post_json("webhook/set", Some(access_token), &settings)
            .await?
        {
            Value::Bool(false) => Err(CjError::Rejected(
                "CJ did not accept the webhook settings".into(),
            )),
            _ => Ok(()),
        }
    }
}
