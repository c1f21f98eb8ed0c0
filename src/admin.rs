//! Operator actions behind `/admin`. Every action answers with an
//! [`AdminOutcome`]; workflow errors become `success: false` with the reason.

use crate::{
    jobs::JobQueue,
    models::ImportProductRequest,
    workflow::{
        CancelOutcome, Dropship, LinkRequest, SubmitOutcome, WorkflowError, WorkflowErrorKind,
    },
};
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post, put},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl AdminOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

impl From<WorkflowError> for AdminOutcome {
    fn from(err: WorkflowError) -> Self {
        if err.kind() == WorkflowErrorKind::Internal {
            warn!(target = "louie.api", stage = err.stage(), error = %err, "admin action failed");
        }
        Self::fail(err.detail())
    }
}

#[derive(Clone)]
pub struct Admin {
    dropship: Dropship,
    queue: JobQueue,
}

impl Admin {
    pub fn new(dropship: Dropship, queue: JobQueue) -> Self {
        Self { dropship, queue }
    }

    pub async fn test_connection(&self) -> AdminOutcome {
        match self.dropship.tokens().access_token().await {
            Some(_) => AdminOutcome::ok("Connected to CJ Dropshipping"),
            None => AdminOutcome::fail(
                "Could not obtain a CJ access token; check CJ_API_KEY and try again later",
            ),
        }
    }

    pub async fn configure_webhooks(&self) -> AdminOutcome {
        let Some(token) = self.dropship.tokens().access_token().await else {
            return AdminOutcome::fail("Could not obtain a CJ access token");
        };
        let callback = self.dropship.cj().config().webhook_url.clone();
        match self.dropship.cj().set_webhooks(&token, &callback).await {
            Ok(()) => {
                info!(target = "louie.api", callback = %callback, "CJ webhooks configured");
                AdminOutcome::ok(format!("Webhooks registered for {callback}"))
            }
            Err(err) => AdminOutcome::fail(format!("CJ refused the webhook settings: {err}")),
        }
    }

    pub async fn sync_tracking(&self) -> AdminOutcome {
        match self.dropship.run_tracking_sweep().await {
            Ok(report) => AdminOutcome::ok(format!(
                "Checked {} orders: {} synced, {} errors",
                report.checked, report.synced, report.errors
            ))
            .with_data(&report),
            Err(err) => err.into(),
        }
    }

    pub async fn check_sourcing(&self) -> AdminOutcome {
        match self.dropship.run_sourcing_sweeps().await {
            Ok(report) => AdminOutcome::ok(format!(
                "Submitted {}, approved {}, rejected {}, still pending {}",
                report.submit.submitted,
                report.reconcile.approved,
                report.reconcile.rejected + report.submit.rejected,
                report.reconcile.pending
            ))
            .with_data(&report),
            Err(err) => err.into(),
        }
    }

    pub async fn import_product(&self, request: ImportProductRequest) -> AdminOutcome {
        match self.dropship.import_product(request).await {
            Ok(product) => {
                AdminOutcome::ok(format!("Imported product {}", product.id)).with_data(&product)
            }
            Err(err) => err.into(),
        }
    }

    pub async fn resubmit_product(&self, product_id: &str) -> AdminOutcome {
        match self.dropship.resubmit_product(product_id).await {
            Ok(outcome) => match &outcome {
                SubmitOutcome::Submitted { .. } => AdminOutcome::ok("Resubmitted for sourcing"),
                SubmitOutcome::Rejected { message } => AdminOutcome::fail(message.clone()),
            }
            .with_data(&outcome),
            Err(err) => err.into(),
        }
    }

    pub async fn delete_product(&self, product_id: &str) -> AdminOutcome {
        match self.dropship.cancel_product(product_id).await {
            Ok(outcome) => AdminOutcome::ok(cancel_message(&outcome)).with_data(&outcome),
            Err(err) => err.into(),
        }
    }

    pub async fn external_variants(&self, product_id: &str) -> AdminOutcome {
        match self.dropship.external_variants(product_id).await {
            Ok(variants) => {
                AdminOutcome::ok(format!("{} CJ variants", variants.len())).with_data(&variants)
            }
            Err(err) => err.into(),
        }
    }

    pub async fn link_variant(
        &self,
        product_id: &str,
        variant_id: &str,
        request: &LinkRequest,
    ) -> AdminOutcome {
        match self
            .dropship
            .link_variant(product_id, variant_id, request)
            .await
        {
            Ok(product) => AdminOutcome::ok("Variant linked").with_data(&product),
            Err(err) => err.into(),
        }
    }

    pub async fn unlink_variant(&self, product_id: &str, variant_id: &str) -> AdminOutcome {
        match self.dropship.unlink_variant(product_id, variant_id).await {
            Ok(product) => AdminOutcome::ok("Variant unlinked").with_data(&product),
            Err(err) => err.into(),
        }
    }

    /// Resets a failed order to pending. Placing it again is a separate
    /// `fulfill` action.
    pub async fn retry_order(&self, order_id: &str) -> AdminOutcome {
        match self.dropship.retry_fulfillment(order_id).await {
            Ok(order) => AdminOutcome::ok("Order reset to pending").with_data(&order),
            Err(err) => err.into(),
        }
    }

    pub async fn fulfill_order(&self, order_id: &str) -> AdminOutcome {
        match self.queue.enqueue_fulfillment(order_id).await {
            Ok(job_id) => AdminOutcome::ok("Fulfillment queued")
                .with_data(&serde_json::json!({ "job_id": job_id.to_string() })),
            Err(err) => AdminOutcome::fail(err.detail.unwrap_or(err.error)),
        }
    }
}

fn cancel_message(outcome: &CancelOutcome) -> String {
    match (outcome.external_cancelled, outcome.message.as_deref()) {
        (true, _) => "Sourcing cancelled and product deleted".to_string(),
        (false, Some(reason)) => format!("Product deleted; CJ cancellation failed: {reason}"),
        (false, None) => "Product deleted".to_string(),
    }
}

pub fn router<S>(admin: Admin) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/cj/test-connection", post(test_connection))
        .route("/cj/webhooks", post(configure_webhooks))
        .route("/cj/sync-tracking", post(sync_tracking))
        .route("/cj/check-sourcing", post(check_sourcing))
        .route("/products/import", post(import_product))
        .route("/products/{id}", delete(delete_product))
        .route("/products/{id}/resubmit", post(resubmit_product))
        .route("/products/{id}/cj-variants", get(external_variants))
        .route(
            "/products/{id}/variants/{variant_id}/link",
            put(link_variant).delete(unlink_variant),
        )
        .route("/orders/{id}/retry", post(retry_order))
        .route("/orders/{id}/fulfill", post(fulfill_order))
        .with_state(admin)
}

async fn test_connection(State(admin): State<Admin>) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/cj/test-connection");
    Json(admin.test_connection().await)
}

async fn configure_webhooks(State(admin): State<Admin>) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/cj/webhooks");
    Json(admin.configure_webhooks().await)
}

async fn sync_tracking(State(admin): State<Admin>) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/cj/sync-tracking");
    Json(admin.sync_tracking().await)
}

async fn check_sourcing(State(admin): State<Admin>) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/cj/check-sourcing");
    Json(admin.check_sourcing().await)
}

async fn import_product(
    State(admin): State<Admin>,
    Json(request): Json<ImportProductRequest>,
) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/products/import");
    Json(admin.import_product(request).await)
}

async fn delete_product(State(admin): State<Admin>, Path(id): Path<String>) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/products/{id}");
    Json(admin.delete_product(&id).await)
}

async fn resubmit_product(
    State(admin): State<Admin>,
    Path(id): Path<String>,
) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/products/{id}/resubmit");
    Json(admin.resubmit_product(&id).await)
}

async fn external_variants(
    State(admin): State<Admin>,
    Path(id): Path<String>,
) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/products/{id}/cj-variants");
    Json(admin.external_variants(&id).await)
}

async fn link_variant(
    State(admin): State<Admin>,
    Path((id, variant_id)): Path<(String, String)>,
    Json(request): Json<LinkRequest>,
) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/products/{id}/variants/{variant_id}/link");
    Json(admin.link_variant(&id, &variant_id, &request).await)
}

async fn unlink_variant(
    State(admin): State<Admin>,
    Path((id, variant_id)): Path<(String, String)>,
) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/products/{id}/variants/{variant_id}/link");
    Json(admin.unlink_variant(&id, &variant_id).await)
}

async fn retry_order(State(admin): State<Admin>, Path(id): Path<String>) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/orders/{id}/retry");
    Json(admin.retry_order(&id).await)
}

async fn fulfill_order(State(admin): State<Admin>, Path(id): Path<String>) -> Json<AdminOutcome> {
    crate::metrics::inc_requests("/admin/orders/{id}/fulfill");
    Json(admin.fulfill_order(&id).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FulfillmentStatus, SourcingStatus};
    use crate::store::Store;
    use crate::workflow::testing::{harness, line, order, product, seed_token};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn admin_for(dropship: &Dropship) -> Admin {
        let (queue, _worker) = JobQueue::spawn(dropship.clone(), 4);
        Admin::new(dropship.clone(), queue)
    }

    #[tokio::test]
    async fn connection_failure_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authentication/getAccessToken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        let outcome = admin_for(&h.dropship).test_connection().await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn connection_succeeds_with_stored_token() {
        let h = harness("http://127.0.0.1:9");
        seed_token(&h.store, "tok").await;
        let outcome = admin_for(&h.dropship).test_connection().await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn missing_product_becomes_failed_outcome() {
        let h = harness("http://127.0.0.1:9");
        let outcome = admin_for(&h.dropship).resubmit_product("nope").await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("not found"));
    }

    #[tokio::test]
    async fn resubmit_without_images_fails_fast() {
        let h = harness("http://127.0.0.1:9");
        let mut p = product("p1");
        p.images.clear();
        p.sourcing.status = SourcingStatus::Rejected;
        h.store.save_product(&p).await.unwrap();

        let outcome = admin_for(&h.dropship).resubmit_product("p1").await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("image"));
    }

    #[tokio::test]
    async fn delete_without_sourcing_id_removes_product() {
        let h = harness("http://127.0.0.1:9");
        h.store.save_product(&product("p1")).await.unwrap();
        let outcome = admin_for(&h.dropship).delete_product("p1").await;
        assert!(outcome.success);
        assert!(h.store.get_product("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_only_resets_state() {
        let h = harness("http://127.0.0.1:9");
        let mut o = order("o1", vec![line("p1", Some("V1"), 1)]);
        o.fulfillment.status = Some(FulfillmentStatus::Failed);
        o.fulfillment.error = Some("CJ said no".into());
        h.store.save_order(&o).await.unwrap();

        let admin = admin_for(&h.dropship);
        let outcome = admin.retry_order("o1").await;
        assert!(outcome.success);
        let stored = h.store.get_order("o1").await.unwrap().unwrap();
        assert_eq!(stored.fulfillment.status, Some(FulfillmentStatus::Pending));
        assert!(stored.fulfillment.external_order_id.is_none());

        let again = admin.retry_order("o1").await;
        assert!(again.success);
    }

    #[tokio::test]
    async fn empty_sourcing_check_succeeds_without_cj() {
        let h = harness("http://127.0.0.1:9");
        let outcome = admin_for(&h.dropship).check_sourcing().await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["submit"]["submitted"], 0);
    }

    #[test]
    fn outcome_omits_absent_data() {
        let value = serde_json::to_value(AdminOutcome::ok("done")).unwrap();
        assert_eq!(value, serde_json::json!({"success": true, "message": "done"}));
    }
}
