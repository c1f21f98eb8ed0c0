//! Persistence seam for products, orders and the CJ credential record.
//!
//! Every workflow mutation is read-modify-persist against these traits; two
//! writers racing on the same document resolve as last write wins.

mod memory;
mod redis_credentials;
mod supabase;

pub use memory::MemoryStore;
pub use redis_credentials::RedisCredentialStore;
pub use supabase::SupabaseStore;

use crate::models::{CredentialRecord, FulfillmentStatus, Order, Product};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),
    #[error("invalid stored document: {0}")]
    Deserialize(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError>;

    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Insert or overwrite.
    async fn save_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    async fn delete_product(&self, id: &str) -> Result<bool, StoreError>;

    async fn get_order(&self, id: &str) -> Result<Option<Order>, StoreError>;

    async fn find_order_by_number(&self, order_number: &str)
    -> Result<Option<Order>, StoreError>;

    async fn find_order_by_external_id(
        &self,
        external_order_id: &str,
    ) -> Result<Option<Order>, StoreError>;

    async fn list_orders_by_fulfillment(
        &self,
        statuses: &[FulfillmentStatus],
    ) -> Result<Vec<Order>, StoreError>;

    /// Insert or overwrite.
    async fn save_order(&self, order: &Order) -> Result<(), StoreError>;
}

/// Singleton CJ credential record. Overwritten, never deleted.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_credentials(&self) -> Result<Option<CredentialRecord>, StoreError>;

    async fn save_credentials(&self, record: &CredentialRecord) -> Result<(), StoreError>;
}
