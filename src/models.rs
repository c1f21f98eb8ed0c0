use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourcingStatus {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
}

impl SourcingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourcingStatus::None => "none",
            SourcingStatus::Pending => "pending",
            SourcingStatus::Approved => "approved",
            SourcingStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourcingState {
    #[serde(default)]
    pub status: SourcingStatus,
    #[serde(default)]
    pub sourcing_id: Option<String>,
    #[serde(default)]
    pub external_product_id: Option<String>,
    #[serde(default)]
    pub external_variant_id: Option<String>,
    #[serde(default)]
    pub external_sku: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

/// A customer-facing variant (size, colour...) and its optional link to the
/// provider's physical SKU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price_adjustment: f64,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub external_variant_id: Option<String>,
    #[serde(default)]
    pub external_sku: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub sourcing: SourcingState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Pending and rejected products stay off the storefront.
    pub fn is_storefront_visible(&self) -> bool {
        matches!(
            self.sourcing.status,
            SourcingStatus::None | SourcingStatus::Approved
        )
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn first_image(&self) -> Option<&str> {
        self.images
            .iter()
            .map(|img| img.trim())
            .find(|img| !img.is_empty())
    }

    pub fn variant(&self, variant_id: &str) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}

/// Read-only reference data describing one of the provider's variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalVariant {
    pub external_variant_id: String,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    #[default]
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Sending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Failed,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Sending => "sending",
            FulfillmentStatus::Confirmed => "confirmed",
            FulfillmentStatus::Processing => "processing",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::Failed => "failed",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn has_shipped(&self) -> bool {
        matches!(self, FulfillmentStatus::Shipped | FulfillmentStatus::Delivered)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentState {
    /// `None` for orders with no externally sourced line.
    #[serde(default)]
    pub status: Option<FulfillmentStatus>,
    #[serde(default)]
    pub external_order_id: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub external_variant_id: Option<String>,
    #[serde(default)]
    pub external_sku: Option<String>,
}

impl OrderLine {
    pub fn is_externally_sourced(&self) -> bool {
        non_empty(self.external_variant_id.as_deref()).is_some()
            || non_empty(self.external_sku.as_deref()).is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub session_id: String,
    /// Correlation key shared with CJ (`orderNumber`).
    pub order_number: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub items: Vec<OrderLine>,
    pub subtotal: f64,
    #[serde(default)]
    pub shipping: f64,
    #[serde(default)]
    pub tax: f64,
    pub total: f64,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub fulfillment: FulfillmentState,
    pub created_at: DateTime<Utc>,
}

/// Singleton record holding the CJ access/refresh token pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub access_token: String,
    pub access_token_expiry: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expiry: DateTime<Utc>,
}

/// Produced upstream once a checkout session is paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidOrderEvent {
    pub session_id: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub items: Vec<PaidOrderItem>,
    pub subtotal: f64,
    #[serde(default)]
    pub shipping: Option<f64>,
    #[serde(default)]
    pub tax: Option<f64>,
    pub total: f64,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidOrderItem {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub variants: Vec<ImportVariant>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportVariant {
    pub name: String,
    #[serde(default)]
    pub price_adjustment: f64,
    #[serde(default = "default_true")]
    pub in_stock: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
