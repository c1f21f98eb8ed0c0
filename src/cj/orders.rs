use crate::cj::normalize::{field, first_record, first_scalar};
use crate::cj::{CjClient, CjError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_number: String,
    pub shipping_zip: String,
    pub shipping_country_code: String,
    pub shipping_country: String,
    pub shipping_province: String,
    pub shipping_city: String,
    pub shipping_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address2: Option<String>,
    pub shipping_customer_name: String,
    pub shipping_phone: String,
    pub email: String,
    pub from_country_code: String,
    pub logistic_name: String,
    pub pay_type: u8,
    pub products: Vec<OrderProduct>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderProduct {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub quantity: u32,
}

impl CjClient {
    /// Returns CJ's order id.
    pub async fn create_order(
        &self,
        access_token: &str,
        request: &CreateOrderRequest,
    ) -> Result<String, CjError> {
        let data = self
            .post_json("shopping/order/createOrderV2", Some(access_token), request)
            .await?;
        first_record(&data)
            .and_then(|record| field(record, &["orderId", "id"]))
            .or_else(|| first_scalar(&data))
            .ok_or_else(|| CjError::Deserialize("orderId missing from response".into()))
    }
}
