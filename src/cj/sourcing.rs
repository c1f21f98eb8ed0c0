use crate::cj::normalize::{field, first_record, first_scalar};
use crate::cj::{CjClient, CjError};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourcingRequest {
    pub product_url: String,
    pub product_name: String,
    pub product_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_product_id: Option<String>,
}

/// Normalised view of one `product/sourcing/query` row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcingRecord {
    pub status_code: Option<String>,
    pub status_text: Option<String>,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub variant_sku: Option<String>,
}

impl CjClient {
    pub async fn create_sourcing(
        &self,
        access_token: &str,
        request: &SourcingRequest,
    ) -> Result<String, CjError> {
        let data = self
            .post_json("product/sourcing/create", Some(access_token), request)
            .await?;
        first_record(&data)
            .and_then(|record| field(record, &["cjSourcingId", "sourcingId", "id"]))
            .or_else(|| first_scalar(&data))
            .ok_or_else(|| CjError::Deserialize("sourcing id missing from response".into()))
    }

    pub async fn query_sourcing(
        &self,
        access_token: &str,
        sourcing_id: &str,
    ) -> Result<Option<SourcingRecord>, CjError> {
        let data = self
            .post_json(
                "product/sourcing/query",
                Some(access_token),
                &json!({ "sourceIds": [sourcing_id] }),
            )
            .await?;
        Ok(first_record(&data).map(|record| SourcingRecord {
            status_code: field(record, &["sourceStatus", "status"]),
            status_text: field(record, &["sourceStatusStr", "statusStr", "remark"]),
            product_id: field(record, &["cjProductId", "productId"]),
            variant_id: field(record, &["cjVariantId", "variantId", "vid"]),
            variant_sku: field(record, &["cjVariantSku", "variantSku", "sku"]),
        }))
    }

    pub async fn cancel_sourcing(
        &self,
        access_token: &str,
        sourcing_id: &str,
    ) -> Result<(), CjError> {
        self.post_json(
            "product/sourcing/cancel",
            Some(access_token),
            &json!({ "sourcingId": sourcing_id }),
        )
        .await
        .map(|_| ())
    }
}
