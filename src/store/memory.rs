use crate::models::{CredentialRecord, FulfillmentStatus, Order, Product};
use crate::store::{CredentialStore, Store, StoreError};
use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;

/// Process-local store used for tests and for running without Supabase.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    products: BTreeMap<String, Product>,
    orders: BTreeMap<String, Order>,
    credentials: Option<CredentialRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.inner.lock().await.products.get(id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.inner.lock().await.products.values().cloned().collect())
    }

    async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn delete_product(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.products.remove(id).is_some())
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.lock().await.orders.get(id).cloned())
    }

    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .orders
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn find_order_by_external_id(
        &self,
        external_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .orders
            .values()
            .find(|o| o.fulfillment.external_order_id.as_deref() == Some(external_order_id))
            .cloned())
    }

    async fn list_orders_by_fulfillment(
        &self,
        statuses: &[FulfillmentStatus],
    ) -> Result<Vec<Order>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .orders
            .values()
            .filter(|o| o.fulfillment.status.is_some_and(|s| statuses.contains(&s)))
            .cloned()
            .collect())
    }

    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .orders
            .insert(order.id.clone(), order.clone());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load_credentials(&self) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.inner.lock().await.credentials.clone())
    }

    async fn save_credentials(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.inner.lock().await.credentials = Some(record.clone());
        Ok(())
    }
}
