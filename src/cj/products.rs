use crate::cj::{CjClient, CjError};
use crate::models::ExternalVariant;
use serde::Deserialize;
use serde_json::Value;
use serde_with::{DisplayFromStr, PickFirst, serde_as};

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantRow {
    #[serde(default)]
    vid: Option<String>,
    #[serde(default)]
    variant_sku: Option<String>,
    #[serde(default)]
    variant_name_en: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    variant_sell_price: Option<f64>,
    #[serde(default)]
    variant_image: Option<String>,
}

impl CjClient {
    /// Variant reference data for an approved CJ product, used when an
    /// operator links storefront sizes to physical SKUs.
    pub async fn list_variants(
        &self,
        access_token: &str,
        external_product_id: &str,
    ) -> Result<Vec<ExternalVariant>, CjError> {
        let data = self
            .get_json(
                "product/variant/query",
                access_token,
                &[("pid", external_product_id)],
            )
            .await?;
        let rows = match data {
            Value::Array(_) => data,
            Value::Null => Value::Array(Vec::new()),
            other => Value::Array(vec![other]),
        };
        let rows: Vec<VariantRow> =
            serde_json::from_value(rows).map_err(|err| CjError::Deserialize(err.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let vid = row.vid.filter(|v| !v.trim().is_empty())?;
                Some(ExternalVariant {
                    external_variant_id: vid,
                    sku: row.variant_sku,
                    name: row.variant_name_en,
                    price: row.variant_sell_price,
                    image: row.variant_image,
                })
            })
            .collect())
    }
}
