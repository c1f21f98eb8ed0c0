use crate::http::build_client;
use crate::models::{CredentialRecord, FulfillmentStatus, Order, Product};
use crate::store::{CredentialStore, Store, StoreError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use urlencoding::encode;

const CREDENTIALS_ROW_ID: &str = "cj";

/// PostgREST-backed store. Each table keeps the indexed lookup columns next to
/// the full `document` jsonb.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    http: Client,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProductRow {
    id: String,
    sourcing_status: String,
    sourcing_id: Option<String>,
    document: Product,
}

#[derive(Debug, Serialize, Deserialize)]
struct OrderRow {
    id: String,
    order_number: String,
    external_order_id: Option<String>,
    fulfillment_status: Option<String>,
    document: Order,
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialRow {
    id: String,
    document: CredentialRecord,
}

impl SupabaseStore {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            http: build_client(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()?;
        Some(Self::new(&base_url, &service_key))
    }

    fn table(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &str,
    ) -> Result<Vec<T>, StoreError> {
        let mut url = format!("{}?select=*", self.table(table));
        if !filter.is_empty() {
            url.push('&');
            url.push_str(filter);
        }
        let response = self
            .authed(self.http.get(url))
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    async fn upsert<T: Serialize>(&self, table: &str, row: &T) -> Result<(), StoreError> {
        let response = self
            .authed(self.http.post(format!("{}?on_conflict=id", self.table(table))))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &str) -> Result<bool, StoreError> {
        let response = self
            .authed(self.http.delete(format!("{}?{filter}", self.table(table))))
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        let removed: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        Ok(!removed.is_empty())
    }

    async fn one_order(&self, filter: String) -> Result<Option<Order>, StoreError> {
        let mut rows: Vec<OrderRow> = self.select("orders", &format!("{filter}&limit=1")).await?;
        Ok(rows.pop().map(|row| row.document))
    }
}

fn eq(column: &str, value: &str) -> String {
    format!("{column}=eq.{}", encode(value))
}

#[async_trait]
impl Store for SupabaseStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let mut rows: Vec<ProductRow> = self
            .select("products", &format!("{}&limit=1", eq("id", id)))
            .await?;
        Ok(rows.pop().map(|row| row.document))
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows: Vec<ProductRow> = self.select("products", "order=id.asc").await?;
        Ok(rows.into_iter().map(|row| row.document).collect())
    }

    async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        let row = ProductRow {
            id: product.id.clone(),
            sourcing_status: product.sourcing.status.as_str().to_string(),
            sourcing_id: product.sourcing.sourcing_id.clone(),
            document: product.clone(),
        };
        self.upsert("products", &row).await
    }

    async fn delete_product(&self, id: &str) -> Result<bool, StoreError> {
        self.delete("products", &eq("id", id)).await
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, StoreError> {
        self.one_order(eq("id", id)).await
    }

    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, StoreError> {
        self.one_order(eq("order_number", order_number)).await
    }

    async fn find_order_by_external_id(
        &self,
        external_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        self.one_order(eq("external_order_id", external_order_id))
            .await
    }

    async fn list_orders_by_fulfillment(
        &self,
        statuses: &[FulfillmentStatus],
    ) -> Result<Vec<Order>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let list = statuses
            .iter()
            .map(FulfillmentStatus::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let rows: Vec<OrderRow> = self
            .select(
                "orders",
                &format!("fulfillment_status=in.({list})&order=id.asc"),
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.document).collect())
    }

    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        let row = OrderRow {
            id: order.id.clone(),
            order_number: order.order_number.clone(),
            external_order_id: order.fulfillment.external_order_id.clone(),
            fulfillment_status: order.fulfillment.status.map(|s| s.as_str().to_string()),
            document: order.clone(),
        };
        self.upsert("orders", &row).await
    }
}

#[async_trait]
impl CredentialStore for SupabaseStore {
    async fn load_credentials(&self) -> Result<Option<CredentialRecord>, StoreError> {
        let mut rows: Vec<CredentialRow> = self
            .select(
                "cj_credentials",
                &format!("{}&limit=1", eq("id", CREDENTIALS_ROW_ID)),
            )
            .await?;
        Ok(rows.pop().map(|row| row.document))
    }

    async fn save_credentials(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let row = CredentialRow {
            id: CREDENTIALS_ROW_ID.to_string(),
            document: record.clone(),
        };
        self.upsert("cj_credentials", &row).await
    }
}
