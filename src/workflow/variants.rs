use super::{Dropship, WorkflowError};
use crate::models::{ExternalVariant, Product, non_empty};
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq)]
pub enum LinkError {
    #[error("variant `{0}` does not exist on this product")]
    UnknownVariant(String),
    #[error("externalVariantId or externalSku is required")]
    MissingExternalId,
    #[error("external variant `{external}` is already linked to variant `{linked_to}`")]
    AlreadyLinked { external: String, linked_to: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    #[serde(default)]
    pub external_variant_id: Option<String>,
    #[serde(default)]
    pub external_sku: Option<String>,
}

/// Points a customer variant at a CJ variant. An external variant may back at
/// most one customer variant per product.
pub fn apply_link(
    product: &mut Product,
    variant_id: &str,
    external_variant_id: Option<&str>,
    external_sku: Option<&str>,
) -> Result<(), LinkError> {
    let external_variant_id = non_empty(external_variant_id);
    let external_sku = non_empty(external_sku);
    if external_variant_id.is_none() && external_sku.is_none() {
        return Err(LinkError::MissingExternalId);
    }
    if product.variant(variant_id).is_none() {
        return Err(LinkError::UnknownVariant(variant_id.to_string()));
    }
    if let Some(external) = external_variant_id
        && let Some(other) = product.variants.iter().find(|v| {
            v.id != variant_id && non_empty(v.external_variant_id.as_deref()) == Some(external)
        })
    {
        return Err(LinkError::AlreadyLinked {
            external: external.to_string(),
            linked_to: other.id.clone(),
        });
    }

    let external_variant_id = external_variant_id.map(str::to_string);
    let external_sku = external_sku.map(str::to_string);
    if let Some(variant) = product.variants.iter_mut().find(|v| v.id == variant_id) {
        variant.external_variant_id = external_variant_id;
        variant.external_sku = external_sku;
    }
    Ok(())
}

pub fn apply_unlink(product: &mut Product, variant_id: &str) -> Result<(), LinkError> {
    let variant = product
        .variants
        .iter_mut()
        .find(|v| v.id == variant_id)
        .ok_or_else(|| LinkError::UnknownVariant(variant_id.to_string()))?;
    variant.external_variant_id = None;
    variant.external_sku = None;
    Ok(())
}

fn link_error(stage: &'static str, err: LinkError) -> WorkflowError {
    match err {
        LinkError::AlreadyLinked { .. } => WorkflowError::conflict(stage, err.to_string()),
        LinkError::UnknownVariant(_) | LinkError::MissingExternalId => {
            WorkflowError::invalid_input(stage, err.to_string())
        }
    }
}

impl Dropship {
    pub async fn link_variant(
        &self,
        product_id: &str,
        variant_id: &str,
        request: &LinkRequest,
    ) -> Result<Product, WorkflowError> {
        let mut product = self.load_product("link_variant", product_id).await?;
        apply_link(
            &mut product,
            variant_id,
            request.external_variant_id.as_deref(),
            request.external_sku.as_deref(),
        )
        .map_err(|err| link_error("link_variant", err))?;
        product.updated_at = Utc::now();
        self.save_product("link_variant", &product).await?;
        info!(target = "louie.variants", product_id = %product_id, variant_id = %variant_id, "variant linked");
        Ok(product)
    }

    pub async fn unlink_variant(
        &self,
        product_id: &str,
        variant_id: &str,
    ) -> Result<Product, WorkflowError> {
        let mut product = self.load_product("unlink_variant", product_id).await?;
        apply_unlink(&mut product, variant_id).map_err(|err| link_error("unlink_variant", err))?;
        product.updated_at = Utc::now();
        self.save_product("unlink_variant", &product).await?;
        info!(target = "louie.variants", product_id = %product_id, variant_id = %variant_id, "variant unlinked");
        Ok(product)
    }

    /// CJ's variants for an approved product, for the operator to pick from.
    pub async fn external_variants(
        &self,
        product_id: &str,
    ) -> Result<Vec<ExternalVariant>, WorkflowError> {
        let product = self.load_product("external_variants", product_id).await?;
        let Some(external_id) = non_empty(product.sourcing.external_product_id.as_deref()) else {
            return Err(WorkflowError::invalid_input(
                "external_variants",
                "product has no CJ product id; it must be approved first",
            ));
        };
        let token = self.require_token("external_variants").await?;
        self.cj
            .list_variants(&token, external_id)
            .await
            .map_err(|err| WorkflowError::unavailable("external_variants", err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductVariant;
    use crate::store::Store;
    use crate::workflow::WorkflowErrorKind;
    use crate::workflow::testing::{harness, product};

    fn sized() -> Product {
        let mut p = product("p1");
        p.variants = ["S", "M", "L"]
            .into_iter()
            .map(|size| ProductVariant {
                id: format!("v-{size}"),
                name: size.to_string(),
                price_adjustment: 0.0,
                in_stock: true,
                external_variant_id: None,
                external_sku: None,
            })
            .collect();
        p
    }

    #[test]
    fn link_sets_and_unlink_clears() {
        let mut p = sized();
        apply_link(&mut p, "v-M", Some("CJV-M"), Some("CJ-M")).unwrap();
        let m = p.variant("v-M").unwrap();
        assert_eq!(m.external_variant_id.as_deref(), Some("CJV-M"));
        assert_eq!(m.external_sku.as_deref(), Some("CJ-M"));

        apply_unlink(&mut p, "v-M").unwrap();
        let m = p.variant("v-M").unwrap();
        assert!(m.external_variant_id.is_none());
        assert!(m.external_sku.is_none());
    }

    #[test]
    fn unknown_variant_is_refused() {
        let mut p = sized();
        assert_eq!(
            apply_link(&mut p, "v-XL", Some("CJV"), None),
            Err(LinkError::UnknownVariant("v-XL".into()))
        );
        assert_eq!(
            apply_unlink(&mut p, "v-XL"),
            Err(LinkError::UnknownVariant("v-XL".into()))
        );
    }

    #[test]
    fn external_variant_links_once_per_product() {
        let mut p = sized();
        apply_link(&mut p, "v-S", Some("CJV-1"), None).unwrap();
        assert_eq!(
            apply_link(&mut p, "v-M", Some("CJV-1"), None),
            Err(LinkError::AlreadyLinked {
                external: "CJV-1".into(),
                linked_to: "v-S".into()
            })
        );
        // Relinking the same variant is fine.
        apply_link(&mut p, "v-S", Some("CJV-1"), Some("SKU-1")).unwrap();
    }

    #[test]
    fn blank_ids_are_missing() {
        let mut p = sized();
        assert_eq!(
            apply_link(&mut p, "v-S", Some(" "), None),
            Err(LinkError::MissingExternalId)
        );
    }

    #[tokio::test]
    async fn link_persists_and_conflicts_map_to_conflict() {
        let h = harness("http://127.0.0.1:9");
        h.store.save_product(&sized()).await.unwrap();
        let request = LinkRequest {
            external_variant_id: Some("CJV-1".into()),
            external_sku: None,
        };
        h.dropship.link_variant("p1", "v-S", &request).await.unwrap();
        let stored = h.store.get_product("p1").await.unwrap().unwrap();
        assert_eq!(
            stored.variant("v-S").unwrap().external_variant_id.as_deref(),
            Some("CJV-1")
        );

        let err = h
            .dropship
            .link_variant("p1", "v-L", &request)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), WorkflowErrorKind::Conflict);
    }

    #[tokio::test]
    async fn variants_of_unapproved_product_are_refused() {
        let h = harness("http://127.0.0.1:9");
        h.store.save_product(&sized()).await.unwrap();
        let err = h.dropship.external_variants("p1").await.unwrap_err();
        assert_eq!(err.kind(), WorkflowErrorKind::InvalidInput);
    }
}
