//! Fulfillment core: sourcing, variant linking, fulfillment orders and
//! tracking reconciliation against CJ.
//!
//! Expected provider failures (token unavailable, rejection, transport errors)
//! are persisted on the product or order and reported through outcome types.
//! `Err(WorkflowError)` is reserved for bad input, missing records, conflicts,
//! an unavailable token where nothing could be recorded, and storage failures.

mod carriers;
mod country;
mod orders;
mod sourcing;
mod token;
mod tracking;
mod variants;

pub use carriers::tracking_url;
pub use country::country_code;
pub use orders::FulfillmentOutcome;
pub use sourcing::{CancelOutcome, SourcingCheckReport, SubmitOutcome};
pub use token::TokenManager;
pub use tracking::{TrackingSweepReport, WebhookOutcome};
pub use variants::LinkRequest;

use crate::cj::CjClient;
use crate::config::WorkflowSettings;
use crate::models::{Order, Product};
use crate::notify::Notifier;
use crate::store::{CredentialStore, Store, StoreError};
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct WorkflowError {
    stage: &'static str,
    message: String,
    kind: WorkflowErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

impl WorkflowError {
    fn new(stage: &'static str, message: impl Into<String>, kind: WorkflowErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, WorkflowErrorKind::InvalidInput)
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, WorkflowErrorKind::NotFound)
    }

    pub fn conflict(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, WorkflowErrorKind::Conflict)
    }

    pub fn unavailable(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, WorkflowErrorKind::Unavailable)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, WorkflowErrorKind::Internal)
    }

    fn store(stage: &'static str, err: StoreError) -> Self {
        Self::internal(stage, err.to_string())
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> WorkflowErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

const TOKEN_UNAVAILABLE: &str = "CJ access token unavailable; check CJ_API_KEY and try again later";

/// Shared handle over the store, the CJ client, the token manager and the
/// notifier. Cheap to clone.
#[derive(Clone)]
pub struct Dropship {
    store: Arc<dyn Store>,
    tokens: TokenManager,
    cj: CjClient,
    notifier: Arc<dyn Notifier>,
    settings: Arc<WorkflowSettings>,
    sourcing_sweep: Arc<Mutex<()>>,
    tracking_sweep: Arc<Mutex<()>>,
}

impl Dropship {
    pub fn new(
        store: Arc<dyn Store>,
        credentials: Arc<dyn CredentialStore>,
        cj: CjClient,
        notifier: Arc<dyn Notifier>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            store,
            tokens: TokenManager::new(cj.clone(), credentials),
            cj,
            notifier,
            settings: Arc::new(settings),
            sourcing_sweep: Arc::new(Mutex::new(())),
            tracking_sweep: Arc::new(Mutex::new(())),
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn cj(&self) -> &CjClient {
        &self.cj
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Auto-submit followed by reconciliation. Skipped with a conflict when a
    /// sourcing sweep is already running.
    pub async fn run_sourcing_sweeps(&self) -> Result<SourcingCheckReport, WorkflowError> {
        let Ok(_guard) = self.sourcing_sweep.try_lock() else {
            return Err(WorkflowError::conflict(
                "sourcing_sweep",
                "a sourcing sweep is already running",
            ));
        };
        let submit = self.auto_submit_sweep().await?;
        let reconcile = self.reconcile_sweep().await?;
        Ok(SourcingCheckReport { submit, reconcile })
    }

    pub async fn run_tracking_sweep(&self) -> Result<TrackingSweepReport, WorkflowError> {
        let Ok(_guard) = self.tracking_sweep.try_lock() else {
            return Err(WorkflowError::conflict(
                "tracking_sweep",
                "a tracking sweep is already running",
            ));
        };
        self.sync_tracking_sweep().await
    }

    async fn require_token(&self, stage: &'static str) -> Result<String, WorkflowError> {
        self.tokens
            .access_token()
            .await
            .ok_or_else(|| WorkflowError::unavailable(stage, TOKEN_UNAVAILABLE))
    }

    async fn load_product(&self, stage: &'static str, id: &str) -> Result<Product, WorkflowError> {
        self.store
            .get_product(id)
            .await
            .map_err(|err| WorkflowError::store(stage, err))?
            .ok_or_else(|| WorkflowError::not_found(stage, format!("product `{id}` not found")))
    }

    async fn load_order(&self, stage: &'static str, id: &str) -> Result<Order, WorkflowError> {
        self.store
            .get_order(id)
            .await
            .map_err(|err| WorkflowError::store(stage, err))?
            .ok_or_else(|| WorkflowError::not_found(stage, format!("order `{id}` not found")))
    }

    async fn save_product(&self, stage: &'static str, product: &Product) -> Result<(), WorkflowError> {
        self.store
            .save_product(product)
            .await
            .map_err(|err| WorkflowError::store(stage, err))
    }

    async fn save_order(&self, stage: &'static str, order: &Order) -> Result<(), WorkflowError> {
        self.store
            .save_order(order)
            .await
            .map_err(|err| WorkflowError::store(stage, err))
    }

    /// Spacing between provider calls inside a sweep.
    async fn pause(&self) {
        let min = self.settings.sweep_delay_min_ms;
        let max = self.settings.sweep_delay_max_ms.max(min);
        if max == 0 {
            return;
        }
        let millis = rand::rng().random_range(min..=max);
        sleep(Duration::from_millis(millis)).await;
    }
}

/// Cuts `value` to at most `max` characters without splitting a code point.
pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[tokio::test]
    async fn overlapping_sourcing_sweeps_are_refused() {
        let h = testing::harness("http://127.0.0.1:9");
        let _held = h.dropship.sourcing_sweep.lock().await;
        let err = h.dropship.run_sourcing_sweeps().await.unwrap_err();
        assert_eq!(err.kind(), WorkflowErrorKind::Conflict);
    }
}
