use super::{Dropship, WorkflowError, truncate_chars};
use crate::cj::{SourcingRecord, SourcingRequest};
use crate::models::{
    ImportProductRequest, Product, ProductVariant, SourcingState, SourcingStatus, non_empty,
};
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

const NAME_LIMIT: usize = 200;
const REMARK_LIMIT: usize = 500;
const APPROVED_CODE: &str = "3";
const FAILED_CODES: [&str; 2] = ["4", "5"];

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Submitted { sourcing_id: String },
    /// CJ refused the submission or could not be reached; the message is
    /// persisted on the product.
    Rejected { message: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub deleted: bool,
    pub external_cancelled: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AutoSubmitReport {
    pub submitted: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SourcingCheckReport {
    pub submit: AutoSubmitReport,
    pub reconcile: ReconcileReport,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SourcingVerdict {
    Approved {
        product_id: Option<String>,
        variant_id: Option<String>,
        sku: Option<String>,
    },
    Rejected {
        message: String,
    },
    Pending,
}

pub(crate) fn classify(record: &SourcingRecord) -> SourcingVerdict {
    let code = record.status_code.as_deref().map(str::trim);
    if code == Some(APPROVED_CODE) || record.product_id.is_some() {
        return SourcingVerdict::Approved {
            product_id: record.product_id.clone(),
            variant_id: record.variant_id.clone(),
            sku: record.variant_sku.clone(),
        };
    }
    match code {
        Some(code) if FAILED_CODES.contains(&code) => SourcingVerdict::Rejected {
            message: record
                .status_text
                .clone()
                .unwrap_or_else(|| format!("CJ sourcing failed (status {code})")),
        },
        _ => SourcingVerdict::Pending,
    }
}

/// Checks the submission preconditions and shapes the CJ payload. The error
/// names the first missing precondition.
pub(crate) fn build_sourcing_request(product: &Product) -> Result<SourcingRequest, String> {
    let product_url = product
        .source_url()
        .ok_or_else(|| format!("product `{}` has no source URL", product.id))?;
    let name = product.name.trim();
    if name.is_empty() {
        return Err(format!("product `{}` has no name", product.id));
    }
    let image = product.first_image().ok_or_else(|| {
        format!(
            "product `{}` has no images; CJ requires at least one image",
            product.id
        )
    })?;
    Ok(SourcingRequest {
        product_url: product_url.to_string(),
        product_name: truncate_chars(name, NAME_LIMIT),
        product_image: image.to_string(),
        remark: non_empty(product.description.as_deref())
            .map(|text| truncate_chars(text, REMARK_LIMIT)),
        price: (product.price > 0.0).then(|| format!("{:.2}", product.price)),
        third_product_id: Some(product.id.clone()),
    })
}

fn is_auto_submit_candidate(product: &Product) -> bool {
    product.source_url().is_some()
        && product.sourcing.sourcing_id.is_none()
        && matches!(
            product.sourcing.status,
            SourcingStatus::None | SourcingStatus::Pending
        )
}

impl Dropship {
    /// Creates a product with no sourcing history. Products with a source URL
    /// are picked up by the next auto-submit sweep.
    pub async fn import_product(
        &self,
        request: ImportProductRequest,
    ) -> Result<Product, WorkflowError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(WorkflowError::invalid_input("import_product", "name is required"));
        }
        if !request.price.is_finite() || request.price < 0.0 {
            return Err(WorkflowError::invalid_input(
                "import_product",
                "price must be a non-negative number",
            ));
        }
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: request.description,
            price: request.price,
            images: request
                .images
                .into_iter()
                .map(|img| img.trim().to_string())
                .filter(|img| !img.is_empty())
                .collect(),
            source_url: request.source_url,
            variants: request
                .variants
                .into_iter()
                .map(|variant| ProductVariant {
                    id: Uuid::new_v4().to_string(),
                    name: variant.name,
                    price_adjustment: variant.price_adjustment,
                    in_stock: variant.in_stock,
                    external_variant_id: None,
                    external_sku: None,
                })
                .collect(),
            sourcing: SourcingState::default(),
            created_at: now,
            updated_at: now,
        };
        self.save_product("import_product", &product).await?;
        info!(target = "louie.sourcing", product_id = %product.id, "product imported");
        Ok(product)
    }

    /// Storefront listing: pending and rejected products are hidden.
    pub async fn storefront_products(&self) -> Result<Vec<Product>, WorkflowError> {
        let products = self
            .store
            .list_products()
            .await
            .map_err(|err| WorkflowError::store("storefront", err))?;
        Ok(products
            .into_iter()
            .filter(Product::is_storefront_visible)
            .collect())
    }

    pub async fn submit_product(&self, product_id: &str) -> Result<SubmitOutcome, WorkflowError> {
        let product = self.load_product("submit_sourcing", product_id).await?;
        let request = build_sourcing_request(&product)
            .map_err(|msg| WorkflowError::invalid_input("submit_sourcing", msg))?;
        let token = self.require_token("submit_sourcing").await?;
        self.submit_with(product, &request, &token).await
    }

    /// Clears the previous attempt and submits again with the product's
    /// current details.
    pub async fn resubmit_product(&self, product_id: &str) -> Result<SubmitOutcome, WorkflowError> {
        let mut product = self.load_product("resubmit_sourcing", product_id).await?;
        if product.sourcing.status == SourcingStatus::Approved {
            return Err(WorkflowError::conflict(
                "resubmit_sourcing",
                "product is already approved by CJ",
            ));
        }
        let request = build_sourcing_request(&product)
            .map_err(|msg| WorkflowError::invalid_input("resubmit_sourcing", msg))?;
        let token = self.require_token("resubmit_sourcing").await?;
        product.sourcing = SourcingState::default();
        self.submit_with(product, &request, &token).await
    }

    async fn submit_with(
        &self,
        mut product: Product,
        request: &SourcingRequest,
        token: &str,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let now = Utc::now();
        let outcome = match self.cj.create_sourcing(token, request).await {
            Ok(sourcing_id) => {
                info!(target = "louie.sourcing", product_id = %product.id, sourcing_id = %sourcing_id, "sourcing submitted");
                product.sourcing = SourcingState {
                    status: SourcingStatus::Pending,
                    sourcing_id: Some(sourcing_id.clone()),
                    submitted_at: Some(now),
                    ..SourcingState::default()
                };
                SubmitOutcome::Submitted { sourcing_id }
            }
            Err(err) => {
                let message = err.to_string();
                warn!(target = "louie.sourcing", product_id = %product.id, error = %message, "sourcing submission rejected");
                product.sourcing = SourcingState {
                    status: SourcingStatus::Rejected,
                    error: Some(message.clone()),
                    submitted_at: Some(now),
                    ..SourcingState::default()
                };
                SubmitOutcome::Rejected { message }
            }
        };
        product.updated_at = now;
        self.save_product("submit_sourcing", &product).await?;
        Ok(outcome)
    }

    /// Submits every product that has a source URL but no sourcing id yet.
    /// Products without images are skipped and left as they are.
    pub async fn auto_submit_sweep(&self) -> Result<AutoSubmitReport, WorkflowError> {
        let started = Instant::now();
        let products = self
            .store
            .list_products()
            .await
            .map_err(|err| WorkflowError::store("auto_submit", err))?;
        let mut report = AutoSubmitReport::default();
        let mut ready = Vec::new();
        for product in products.into_iter().filter(is_auto_submit_candidate) {
            match build_sourcing_request(&product) {
                Ok(request) => ready.push((product, request)),
                Err(reason) => {
                    info!(target = "louie.sourcing", product_id = %product.id, reason = %reason, "auto-submit skipped");
                    report.skipped += 1;
                }
            }
        }
        if ready.is_empty() {
            return Ok(report);
        }

        let token = self.require_token("auto_submit").await?;
        for (idx, (product, request)) in ready.into_iter().enumerate() {
            if idx > 0 {
                self.pause().await;
            }
            let product_id = product.id.clone();
            match self.submit_with(product, &request, &token).await {
                Ok(SubmitOutcome::Submitted { .. }) => report.submitted += 1,
                Ok(SubmitOutcome::Rejected { .. }) => report.rejected += 1,
                Err(err) => {
                    warn!(target = "louie.sourcing", product_id = %product_id, error = %err, "auto-submit failed");
                    report.errors += 1;
                }
            }
        }

        crate::metrics::sweep_finished(
            "auto_submit",
            report.submitted + report.rejected,
            report.errors,
            started.elapsed().as_millis(),
        );
        info!(
            target = "louie.sourcing",
            submitted = report.submitted,
            rejected = report.rejected,
            skipped = report.skipped,
            errors = report.errors,
            "auto-submit sweep finished"
        );
        Ok(report)
    }

    /// Polls CJ for every pending submission and records approvals and
    /// rejections. Unknown status codes leave the product pending.
    pub async fn reconcile_sweep(&self) -> Result<ReconcileReport, WorkflowError> {
        let started = Instant::now();
        let pending: Vec<Product> = self
            .store
            .list_products()
            .await
            .map_err(|err| WorkflowError::store("reconcile_sourcing", err))?
            .into_iter()
            .filter(|p| {
                p.sourcing.status == SourcingStatus::Pending && p.sourcing.sourcing_id.is_some()
            })
            .collect();
        let mut report = ReconcileReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let token = self.require_token("reconcile_sourcing").await?;
        for (idx, mut product) in pending.into_iter().enumerate() {
            if idx > 0 {
                self.pause().await;
            }
            let Some(sourcing_id) = product.sourcing.sourcing_id.clone() else {
                continue;
            };
            report.checked += 1;
            let record = match self.cj.query_sourcing(&token, &sourcing_id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    report.pending += 1;
                    continue;
                }
                Err(err) => {
                    warn!(target = "louie.sourcing", product_id = %product.id, sourcing_id = %sourcing_id, error = %err, "sourcing query failed");
                    report.errors += 1;
                    continue;
                }
            };

            let now = Utc::now();
            match classify(&record) {
                SourcingVerdict::Pending => {
                    report.pending += 1;
                    continue;
                }
                SourcingVerdict::Approved {
                    product_id,
                    variant_id,
                    sku,
                } => {
                    product.sourcing.status = SourcingStatus::Approved;
                    product.sourcing.external_product_id = product_id;
                    product.sourcing.external_variant_id = variant_id;
                    product.sourcing.external_sku = sku;
                    product.sourcing.error = None;
                    product.sourcing.approved_at = Some(now);
                    report.approved += 1;
                    info!(target = "louie.sourcing", product_id = %product.id, sourcing_id = %sourcing_id, "sourcing approved");
                }
                SourcingVerdict::Rejected { message } => {
                    product.sourcing.status = SourcingStatus::Rejected;
                    product.sourcing.error = Some(message);
                    report.rejected += 1;
                    info!(target = "louie.sourcing", product_id = %product.id, sourcing_id = %sourcing_id, "sourcing rejected");
                }
            }
            product.updated_at = now;
            if let Err(err) = self.save_product("reconcile_sourcing", &product).await {
                warn!(target = "louie.sourcing", product_id = %product.id, error = %err, "failed to persist sourcing result");
                report.errors += 1;
            }
        }

        crate::metrics::sweep_finished(
            "reconcile_sourcing",
            report.checked,
            report.errors,
            started.elapsed().as_millis(),
        );
        info!(
            target = "louie.sourcing",
            checked = report.checked,
            approved = report.approved,
            rejected = report.rejected,
            errors = report.errors,
            "reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Best-effort CJ cancellation followed by an unconditional local delete.
    pub async fn cancel_product(&self, product_id: &str) -> Result<CancelOutcome, WorkflowError> {
        let product = self.load_product("cancel_sourcing", product_id).await?;
        let (external_cancelled, message) = match product.sourcing.sourcing_id.as_deref() {
            None => (false, None),
            Some(sourcing_id) => match self.tokens.access_token().await {
                None => (false, Some(super::TOKEN_UNAVAILABLE.to_string())),
                Some(token) => match self.cj.cancel_sourcing(&token, sourcing_id).await {
                    Ok(()) => (true, None),
                    Err(err) => {
                        let message = err.to_string();
                        let lowered = message.to_lowercase();
                        if lowered.contains("processed") || lowered.contains("approved") {
                            (true, Some(message))
                        } else {
                            warn!(target = "louie.sourcing", product_id = %product.id, sourcing_id = %sourcing_id, error = %message, "sourcing cancel failed");
                            (false, Some(message))
                        }
                    }
                },
            },
        };

        let deleted = self
            .store
            .delete_product(&product.id)
            .await
            .map_err(|err| WorkflowError::store("cancel_sourcing", err))?;
        info!(target = "louie.sourcing", product_id = %product.id, external_cancelled, "product deleted");
        Ok(CancelOutcome {
            deleted,
            external_cancelled,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::workflow::WorkflowErrorKind;
    use crate::workflow::testing::{harness, product, seed_token};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(code: Option<&str>, product_id: Option<&str>) -> SourcingRecord {
        SourcingRecord {
            status_code: code.map(str::to_string),
            product_id: product_id.map(str::to_string),
            ..SourcingRecord::default()
        }
    }

    #[test]
    fn classification_table() {
        assert!(matches!(
            classify(&record(Some("3"), None)),
            SourcingVerdict::Approved { .. }
        ));
        assert!(matches!(
            classify(&record(Some("2"), Some("CJ1"))),
            SourcingVerdict::Approved { .. }
        ));
        assert_eq!(
            classify(&record(Some("4"), None)),
            SourcingVerdict::Rejected {
                message: "CJ sourcing failed (status 4)".into()
            }
        );
        assert!(matches!(
            classify(&record(Some("5"), None)),
            SourcingVerdict::Rejected { .. }
        ));
        assert_eq!(classify(&record(Some("1"), None)), SourcingVerdict::Pending);
        assert_eq!(classify(&record(None, None)), SourcingVerdict::Pending);
    }

    #[test]
    fn request_is_truncated_to_provider_limits() {
        let mut p = product("p1");
        p.name = "n".repeat(250);
        p.description = Some("d".repeat(900));
        let request = build_sourcing_request(&p).unwrap();
        assert_eq!(request.product_name.chars().count(), 200);
        assert_eq!(request.remark.unwrap().chars().count(), 500);
        assert_eq!(request.price.as_deref(), Some("24.00"));
        assert_eq!(request.third_product_id.as_deref(), Some("p1"));
    }

    #[test]
    fn missing_preconditions_are_named() {
        let mut p = product("p1");
        p.images = vec!["  ".into()];
        assert!(build_sourcing_request(&p).unwrap_err().contains("no images"));
        let mut p = product("p1");
        p.source_url = None;
        assert!(build_sourcing_request(&p).unwrap_err().contains("source URL"));
    }

    #[tokio::test]
    async fn submit_without_images_never_touches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        let mut p = product("p1");
        p.images.clear();
        h.store.save_product(&p).await.unwrap();

        let err = h.dropship.submit_product("p1").await.unwrap_err();
        assert_eq!(err.kind(), WorkflowErrorKind::InvalidInput);
        let stored = h.store.get_product("p1").await.unwrap().unwrap();
        assert_eq!(stored.sourcing.status, SourcingStatus::None);
    }

    #[tokio::test]
    async fn provider_rejection_is_persisted_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product/sourcing/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": false,
                "message": "Product link is not supported"
            })))
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        h.store.save_product(&product("p1")).await.unwrap();

        let outcome = h.dropship.submit_product("p1").await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Rejected {
                message: "Product link is not supported".into()
            }
        );
        let stored = h.store.get_product("p1").await.unwrap().unwrap();
        assert_eq!(stored.sourcing.status, SourcingStatus::Rejected);
        assert_eq!(
            stored.sourcing.error.as_deref(),
            Some("Product link is not supported")
        );
    }

    #[tokio::test]
    async fn resubmit_clears_the_error_and_returns_to_pending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product/sourcing/create"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": true, "data": {"cjSourcingId": "S-2"}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        let mut p = product("p1");
        p.sourcing.status = SourcingStatus::Rejected;
        p.sourcing.error = Some("Image unclear".into());
        h.store.save_product(&p).await.unwrap();

        let outcome = h.dropship.resubmit_product("p1").await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Submitted {
                sourcing_id: "S-2".into()
            }
        );
        let stored = h.store.get_product("p1").await.unwrap().unwrap();
        assert_eq!(stored.sourcing.status, SourcingStatus::Pending);
        assert_eq!(stored.sourcing.sourcing_id.as_deref(), Some("S-2"));
        assert!(stored.sourcing.error.is_none());
    }

    #[tokio::test]
    async fn resubmit_without_source_url_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        let mut p = product("p1");
        p.source_url = Some("   ".into());
        p.sourcing.status = SourcingStatus::Rejected;
        h.store.save_product(&p).await.unwrap();

        let err = h.dropship.resubmit_product("p1").await.unwrap_err();
        assert_eq!(err.kind(), WorkflowErrorKind::InvalidInput);
        assert!(err.detail().contains("source URL"));
    }

    #[tokio::test]
    async fn scenario_import_submit_approve_and_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product/sourcing/create"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": true, "data": {"cjSourcingId": "S-1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/product/sourcing/query"))
            .and(body_json(json!({"sourceIds": ["S-1"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": true,
                "data": [{"sourceStatus": "3", "cjProductId": ["CJ123"], "cjVariantSku": "CJ123-A"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        let mut no_image = product("p2");
        no_image.images.clear();
        h.store.save_product(&product("p1")).await.unwrap();
        h.store.save_product(&no_image).await.unwrap();

        let submitted = h.dropship.auto_submit_sweep().await.unwrap();
        assert_eq!(submitted.submitted, 1);
        assert_eq!(submitted.skipped, 1);
        let stored = h.store.get_product("p1").await.unwrap().unwrap();
        assert_eq!(stored.sourcing.status, SourcingStatus::Pending);
        assert!(!h
            .dropship
            .storefront_products()
            .await
            .unwrap()
            .iter()
            .any(|p| p.id == "p1"));

        let reconciled = h.dropship.reconcile_sweep().await.unwrap();
        assert_eq!(reconciled.approved, 1);
        let stored = h.store.get_product("p1").await.unwrap().unwrap();
        assert_eq!(stored.sourcing.status, SourcingStatus::Approved);
        assert_eq!(stored.sourcing.external_product_id.as_deref(), Some("CJ123"));
        assert_eq!(stored.sourcing.external_sku.as_deref(), Some("CJ123-A"));
        assert!(h
            .dropship
            .storefront_products()
            .await
            .unwrap()
            .iter()
            .any(|p| p.id == "p1"));
    }

    #[tokio::test]
    async fn reconcile_keeps_going_after_a_failing_item() {
        let server = MockServer::start().await;
        for (id, data) in [
            ("S-a", json!({"sourceStatus": "3", "cjProductId": "CJ-A"})),
            ("S-c", json!({"sourceStatus": 4, "sourceStatusStr": "Not found"})),
        ] {
            Mock::given(method("POST"))
                .and(path("/product/sourcing/query"))
                .and(body_json(json!({"sourceIds": [id]})))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({"result": true, "data": data})),
                )
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/product/sourcing/query"))
            .and(body_json(json!({"sourceIds": ["S-b"]})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        for (pid, sid) in [("a", "S-a"), ("b", "S-b"), ("c", "S-c")] {
            let mut p = product(pid);
            p.sourcing.status = SourcingStatus::Pending;
            p.sourcing.sourcing_id = Some(sid.into());
            h.store.save_product(&p).await.unwrap();
        }

        let report = h.dropship.reconcile_sweep().await.unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.approved, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.errors, 1);
        let c = h.store.get_product("c").await.unwrap().unwrap();
        assert_eq!(c.sourcing.status, SourcingStatus::Rejected);
        assert_eq!(c.sourcing.error.as_deref(), Some("Not found"));
        let b = h.store.get_product("b").await.unwrap().unwrap();
        assert_eq!(b.sourcing.status, SourcingStatus::Pending);
    }

    #[tokio::test]
    async fn sweep_without_token_reports_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authentication/getAccessToken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/product/sourcing/create"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        h.store.save_product(&product("p1")).await.unwrap();

        let err = h.dropship.auto_submit_sweep().await.unwrap_err();
        assert_eq!(err.kind(), WorkflowErrorKind::Unavailable);
        let stored = h.store.get_product("p1").await.unwrap().unwrap();
        assert_eq!(stored.sourcing.status, SourcingStatus::None);
    }

    #[tokio::test]
    async fn cancel_treats_processed_as_cancelled_and_always_deletes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product/sourcing/cancel"))
            .and(body_json(json!({"sourcingId": "S-9"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": false,
                "message": "Sourcing has been processed"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        let mut p = product("p1");
        p.sourcing.status = SourcingStatus::Pending;
        p.sourcing.sourcing_id = Some("S-9".into());
        h.store.save_product(&p).await.unwrap();

        let outcome = h.dropship.cancel_product("p1").await.unwrap();
        assert!(outcome.deleted);
        assert!(outcome.external_cancelled);
        assert!(h.store.get_product("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_deletes_even_when_provider_refuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product/sourcing/cancel"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        let mut p = product("p1");
        p.sourcing.sourcing_id = Some("S-9".into());
        h.store.save_product(&p).await.unwrap();

        let outcome = h.dropship.cancel_product("p1").await.unwrap();
        assert!(outcome.deleted);
        assert!(!outcome.external_cancelled);
        assert!(outcome.message.is_some());
    }
}
