use super::{Dropship, TOKEN_UNAVAILABLE, WorkflowError, country_code};
use crate::cj::{CreateOrderRequest, OrderProduct};
use crate::config::WorkflowSettings;
use crate::models::{
    FulfillmentState, FulfillmentStatus, Order, OrderLine, OrderStatus, PaidOrderEvent,
    PaidOrderItem, non_empty,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

const CORRELATION_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FulfillmentOutcome {
    Submitted { external_order_id: String },
    /// Recorded on the order as `failed`; needs an operator retry.
    Failed { message: String },
    AlreadySubmitted { external_order_id: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeOutcome {
    pub order: Order,
    /// False when the event replays a session that was already recorded.
    pub created: bool,
}

impl IntakeOutcome {
    pub fn needs_fulfillment(&self) -> bool {
        self.created && self.order.fulfillment.status == Some(FulfillmentStatus::Pending)
    }
}

/// CJ `orderNumber` for a checkout session: its last 12 characters, upper
/// cased. Webhook lookups depend on this staying stable.
pub fn correlation_key(session_id: &str) -> String {
    let chars: Vec<char> = session_id.trim().chars().collect();
    let start = chars.len().saturating_sub(CORRELATION_LEN);
    chars[start..].iter().collect::<String>().to_uppercase()
}

/// Shapes the CJ order. Lines without a CJ variant id or SKU are dropped; the
/// error explains why nothing can be sent.
pub fn build_order_request(
    order: &Order,
    settings: &WorkflowSettings,
) -> Result<CreateOrderRequest, String> {
    let products: Vec<OrderProduct> = order
        .items
        .iter()
        .filter_map(|line| {
            let vid = non_empty(line.external_variant_id.as_deref());
            let sku = non_empty(line.external_sku.as_deref());
            match (vid, sku) {
                (Some(vid), _) => Some(OrderProduct {
                    vid: Some(vid.to_string()),
                    sku: None,
                    quantity: line.quantity,
                }),
                (None, Some(sku)) => Some(OrderProduct {
                    vid: None,
                    sku: Some(sku.to_string()),
                    quantity: line.quantity,
                }),
                (None, None) => None,
            }
        })
        .collect();
    if products.is_empty() {
        return Err("no order line carries a CJ variant id or SKU; nothing to fulfill".into());
    }
    let address = order
        .shipping_address
        .as_ref()
        .ok_or_else(|| "order has no shipping address".to_string())?;

    let customer_name = non_empty(address.name.as_deref())
        .or(non_empty(order.customer_name.as_deref()))
        .unwrap_or(order.customer_email.as_str())
        .to_string();
    Ok(CreateOrderRequest {
        order_number: order.order_number.clone(),
        shipping_zip: address.postal_code.trim().to_string(),
        shipping_country_code: country_code(&address.country),
        shipping_country: address.country.trim().to_string(),
        shipping_province: non_empty(address.state.as_deref())
            .unwrap_or_default()
            .to_string(),
        shipping_city: address.city.trim().to_string(),
        shipping_address: address.line1.trim().to_string(),
        shipping_address2: non_empty(address.line2.as_deref()).map(str::to_string),
        shipping_customer_name: customer_name,
        shipping_phone: non_empty(address.phone.as_deref())
            .unwrap_or_default()
            .to_string(),
        email: order.customer_email.clone(),
        from_country_code: settings.ship_from_country.clone(),
        logistic_name: settings.shipping_method.clone(),
        pay_type: settings.pay_type,
        products,
    })
}

impl Dropship {
    /// Records a paid checkout as an order. Lines pick up the CJ ids of the
    /// linked customer variant, falling back to the product's own CJ ids.
    pub async fn intake_paid_order(
        &self,
        event: PaidOrderEvent,
    ) -> Result<IntakeOutcome, WorkflowError> {
        if event.session_id.trim().is_empty() {
            return Err(WorkflowError::invalid_input("order_intake", "sessionId is required"));
        }
        if event.customer_email.trim().is_empty() {
            return Err(WorkflowError::invalid_input(
                "order_intake",
                "customerEmail is required",
            ));
        }
        if event.items.is_empty() {
            return Err(WorkflowError::invalid_input("order_intake", "order has no items"));
        }

        let order_number = correlation_key(&event.session_id);
        if let Some(existing) = self
            .store
            .find_order_by_number(&order_number)
            .await
            .map_err(|err| WorkflowError::store("order_intake", err))?
        {
            if existing.session_id != event.session_id {
                return Err(WorkflowError::conflict(
                    "order_intake",
                    format!("order number {order_number} belongs to another session"),
                ));
            }
            return Ok(IntakeOutcome {
                order: existing,
                created: false,
            });
        }

        let mut items = Vec::with_capacity(event.items.len());
        for item in event.items {
            items.push(self.resolve_line(item).await?);
        }
        let sourced = items.iter().any(OrderLine::is_externally_sourced);
        let order = Order {
            id: Uuid::new_v4().to_string(),
            session_id: event.session_id,
            order_number,
            customer_email: event.customer_email,
            customer_name: event.customer_name,
            items,
            subtotal: event.subtotal,
            shipping: event.shipping.unwrap_or_default(),
            tax: event.tax.unwrap_or_default(),
            total: event.total,
            shipping_address: event.shipping_address,
            status: OrderStatus::Paid,
            fulfillment: FulfillmentState {
                status: sourced.then_some(FulfillmentStatus::Pending),
                ..FulfillmentState::default()
            },
            created_at: Utc::now(),
        };
        self.save_order("order_intake", &order).await?;
        info!(
            target = "louie.fulfillment",
            order_id = %order.id,
            order_number = %order.order_number,
            sourced,
            "paid order recorded"
        );
        Ok(IntakeOutcome {
            order,
            created: true,
        })
    }

    async fn resolve_line(&self, item: PaidOrderItem) -> Result<OrderLine, WorkflowError> {
        let product = self
            .store
            .get_product(&item.product_id)
            .await
            .map_err(|err| WorkflowError::store("order_intake", err))?;
        let (external_variant_id, external_sku) = match &product {
            None => {
                warn!(target = "louie.fulfillment", product_id = %item.product_id, "order line references an unknown product");
                (None, None)
            }
            Some(product) => {
                let linked = item
                    .variant_id
                    .as_deref()
                    .and_then(|id| product.variant(id))
                    .filter(|v| {
                        non_empty(v.external_variant_id.as_deref()).is_some()
                            || non_empty(v.external_sku.as_deref()).is_some()
                    });
                match linked {
                    Some(variant) => (
                        variant.external_variant_id.clone(),
                        variant.external_sku.clone(),
                    ),
                    None => (
                        product.sourcing.external_variant_id.clone(),
                        product.sourcing.external_sku.clone(),
                    ),
                }
            }
        };
        Ok(OrderLine {
            product_id: item.product_id,
            variant_id: item.variant_id,
            name: item.name,
            price: item.price,
            quantity: item.quantity,
            image: item.image,
            external_variant_id,
            external_sku,
        })
    }

    /// Places the CJ order for a pending order. Provider and validation
    /// failures leave the order `failed` with the reason.
    pub async fn create_fulfillment_order(
        &self,
        order_id: &str,
    ) -> Result<FulfillmentOutcome, WorkflowError> {
        let mut order = self.load_order("create_fulfillment", order_id).await?;
        if let Some(external_order_id) = order.fulfillment.external_order_id.clone() {
            return Ok(FulfillmentOutcome::AlreadySubmitted { external_order_id });
        }
        match order.fulfillment.status {
            Some(FulfillmentStatus::Pending) => {}
            None => {
                return Err(WorkflowError::invalid_input(
                    "create_fulfillment",
                    "order has no externally sourced lines",
                ));
            }
            Some(status) => {
                return Err(WorkflowError::conflict(
                    "create_fulfillment",
                    format!(
                        "fulfillment is {}; only pending orders can be submitted",
                        status.as_str()
                    ),
                ));
            }
        }

        order.fulfillment.status = Some(FulfillmentStatus::Sending);
        order.fulfillment.error = None;
        self.save_order("create_fulfillment", &order).await?;

        let request = match build_order_request(&order, &self.settings) {
            Ok(request) => request,
            Err(message) => return self.fail_order(order, message).await,
        };
        let Some(token) = self.tokens.access_token().await else {
            return self.fail_order(order, TOKEN_UNAVAILABLE.to_string()).await;
        };

        match self.cj.create_order(&token, &request).await {
            Ok(external_order_id) => {
                order.fulfillment.status = Some(FulfillmentStatus::Confirmed);
                order.fulfillment.external_order_id = Some(external_order_id.clone());
                order.fulfillment.error = None;
                self.save_order("create_fulfillment", &order).await?;
                info!(
                    target = "louie.fulfillment",
                    order_id = %order.id,
                    order_number = %order.order_number,
                    external_order_id = %external_order_id,
                    "CJ order created"
                );
                Ok(FulfillmentOutcome::Submitted { external_order_id })
            }
            Err(err) => self.fail_order(order, err.to_string()).await,
        }
    }

    async fn fail_order(
        &self,
        mut order: Order,
        message: String,
    ) -> Result<FulfillmentOutcome, WorkflowError> {
        warn!(
            target = "louie.fulfillment",
            order_id = %order.id,
            order_number = %order.order_number,
            error = %message,
            "fulfillment failed"
        );
        order.fulfillment.status = Some(FulfillmentStatus::Failed);
        order.fulfillment.error = Some(message.clone());
        self.save_order("create_fulfillment", &order).await?;
        Ok(FulfillmentOutcome::Failed { message })
    }

    /// Resets a failed order to pending so it can be submitted again. Does not
    /// submit it.
    pub async fn retry_fulfillment(&self, order_id: &str) -> Result<Order, WorkflowError> {
        let mut order = self.load_order("retry_fulfillment", order_id).await?;
        match order.fulfillment.status {
            Some(FulfillmentStatus::Pending) => Ok(order),
            Some(FulfillmentStatus::Failed) => {
                order.fulfillment.status = Some(FulfillmentStatus::Pending);
                order.fulfillment.error = None;
                order.fulfillment.external_order_id = None;
                self.save_order("retry_fulfillment", &order).await?;
                info!(target = "louie.fulfillment", order_id = %order.id, "fulfillment reset for retry");
                Ok(order)
            }
            None => Err(WorkflowError::invalid_input(
                "retry_fulfillment",
                "order has no externally sourced lines",
            )),
            Some(status) => Err(WorkflowError::conflict(
                "retry_fulfillment",
                format!("fulfillment is {}; only failed orders can be retried", status.as_str()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductVariant, SourcingStatus};
    use crate::store::Store;
    use crate::workflow::WorkflowErrorKind;
    use crate::workflow::testing::{harness, line, order, product, quiet_settings, seed_token};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn correlation_key_is_last_twelve_upper() {
        assert_eq!(
            correlation_key("cs_test_a1b2c3d4e5f6g7h8i9j0"),
            "E5F6G7H8I9J0"
        );
        assert_eq!(correlation_key("short"), "SHORT");
    }

    #[test]
    fn payload_prefers_vid_and_drops_unidentified_lines() {
        let mut o = order(
            "o1",
            vec![line("p1", Some("V1"), 2), line("p2", None, 1)],
        );
        o.items[1].external_sku = Some("SKU-2".into());
        o.items.push(line("p3", None, 5));
        let request = build_order_request(&o, &quiet_settings()).unwrap();
        assert_eq!(request.products.len(), 2);
        assert_eq!(
            serde_json::to_value(&request.products).unwrap(),
            json!([{"vid": "V1", "quantity": 2}, {"sku": "SKU-2", "quantity": 1}])
        );
        assert_eq!(request.shipping_country_code, "US");
        assert_eq!(request.logistic_name, "CJPacket Ordinary");
        assert_eq!(request.from_country_code, "CN");
        assert_eq!(request.order_number, "A1B2C3D4E5F6");
    }

    #[tokio::test]
    async fn scenario_paid_order_becomes_confirmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/shopping/order/createOrderV2"))
            .and(body_partial_json(json!({
                "orderNumber": "A1B2C3D4E5F6",
                "products": [{"vid": "V1", "quantity": 2}]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": true, "data": {"orderId": "CJO1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        h.store
            .save_order(&order("o1", vec![line("p1", Some("V1"), 2)]))
            .await
            .unwrap();

        let outcome = h.dropship.create_fulfillment_order("o1").await.unwrap();
        assert_eq!(
            outcome,
            FulfillmentOutcome::Submitted {
                external_order_id: "CJO1".into()
            }
        );
        let stored = h.store.get_order("o1").await.unwrap().unwrap();
        assert_eq!(stored.fulfillment.status, Some(FulfillmentStatus::Confirmed));
        assert_eq!(stored.fulfillment.external_order_id.as_deref(), Some("CJO1"));

        let again = h.dropship.create_fulfillment_order("o1").await.unwrap();
        assert!(matches!(again, FulfillmentOutcome::AlreadySubmitted { .. }));
    }

    #[tokio::test]
    async fn empty_line_set_fails_without_calling_cj() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        h.store
            .save_order(&order("o1", vec![line("p1", None, 1), line("p2", Some("  "), 3)]))
            .await
            .unwrap();

        let outcome = h.dropship.create_fulfillment_order("o1").await.unwrap();
        assert!(matches!(outcome, FulfillmentOutcome::Failed { .. }));
        let stored = h.store.get_order("o1").await.unwrap().unwrap();
        assert_eq!(stored.fulfillment.status, Some(FulfillmentStatus::Failed));
        assert!(stored.fulfillment.error.unwrap().contains("nothing to fulfill"));
    }

    #[tokio::test]
    async fn provider_failure_is_terminal_until_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/shopping/order/createOrderV2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": false,
                "message": "Insufficient balance"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        seed_token(&h.store, "tok").await;
        h.store
            .save_order(&order("o1", vec![line("p1", Some("V1"), 1)]))
            .await
            .unwrap();

        let outcome = h.dropship.create_fulfillment_order("o1").await.unwrap();
        assert_eq!(
            outcome,
            FulfillmentOutcome::Failed {
                message: "Insufficient balance".into()
            }
        );
        let err = h.dropship.create_fulfillment_order("o1").await.unwrap_err();
        assert_eq!(err.kind(), WorkflowErrorKind::Conflict);

        let reset = h.dropship.retry_fulfillment("o1").await.unwrap();
        assert_eq!(reset.fulfillment.status, Some(FulfillmentStatus::Pending));
        assert!(reset.fulfillment.error.is_none());
    }

    #[tokio::test]
    async fn retry_refuses_confirmed_orders() {
        let h = harness("http://127.0.0.1:9");
        let mut o = order("o1", vec![line("p1", Some("V1"), 1)]);
        o.fulfillment.status = Some(FulfillmentStatus::Confirmed);
        o.fulfillment.external_order_id = Some("CJO1".into());
        h.store.save_order(&o).await.unwrap();

        let err = h.dropship.retry_fulfillment("o1").await.unwrap_err();
        assert_eq!(err.kind(), WorkflowErrorKind::Conflict);
    }

    #[tokio::test]
    async fn local_only_order_is_rejected_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        let mut o = order("o1", vec![line("local", None, 1)]);
        o.fulfillment.status = None;
        h.store.save_order(&o).await.unwrap();

        let err = h.dropship.create_fulfillment_order("o1").await.unwrap_err();
        assert_eq!(err.kind(), WorkflowErrorKind::InvalidInput);
        let stored = h.store.get_order("o1").await.unwrap().unwrap();
        assert!(stored.fulfillment.status.is_none());
        assert!(stored.fulfillment.error.is_none());
    }

    #[tokio::test]
    async fn missing_token_marks_order_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authentication/getAccessToken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let h = harness(&server.uri());
        h.store
            .save_order(&order("o1", vec![line("p1", Some("V1"), 1)]))
            .await
            .unwrap();

        let outcome = h.dropship.create_fulfillment_order("o1").await.unwrap();
        assert!(matches!(outcome, FulfillmentOutcome::Failed { .. }));
        let stored = h.store.get_order("o1").await.unwrap().unwrap();
        assert_eq!(stored.fulfillment.status, Some(FulfillmentStatus::Failed));
    }

    #[tokio::test]
    async fn intake_resolves_lines_and_is_replay_safe() {
        let h = harness("http://127.0.0.1:9");
        let mut linked = product("p1");
        linked.variants = vec![ProductVariant {
            id: "v-M".into(),
            name: "M".into(),
            price_adjustment: 0.0,
            in_stock: true,
            external_variant_id: Some("CJV-M".into()),
            external_sku: Some("CJ-M".into()),
        }];
        let mut approved = product("p2");
        approved.sourcing.status = SourcingStatus::Approved;
        approved.sourcing.external_product_id = Some("CJ2".into());
        approved.sourcing.external_sku = Some("CJ2-SKU".into());
        h.store.save_product(&linked).await.unwrap();
        h.store.save_product(&approved).await.unwrap();

        let event: PaidOrderEvent = serde_json::from_value(json!({
            "sessionId": "cs_live_zz99aa11bb22cc33",
            "customerEmail": "june@example.com",
            "items": [
                {"productId": "p1", "variantId": "v-M", "name": "Basket", "price": 24.0, "quantity": 1},
                {"productId": "p2", "name": "Tray", "price": 12.0, "quantity": 2},
                {"productId": "local", "name": "Gift card", "price": 25.0, "quantity": 1}
            ],
            "subtotal": 73.0,
            "total": 73.0
        }))
        .unwrap();

        let first = h.dropship.intake_paid_order(event.clone()).await.unwrap();
        assert!(first.created);
        assert!(first.needs_fulfillment());
        assert_eq!(first.order.order_number, "AA11BB22CC33");
        assert_eq!(first.order.items[0].external_variant_id.as_deref(), Some("CJV-M"));
        assert_eq!(first.order.items[1].external_sku.as_deref(), Some("CJ2-SKU"));
        assert!(!first.order.items[2].is_externally_sourced());

        let replay = h.dropship.intake_paid_order(event).await.unwrap();
        assert!(!replay.created);
        assert!(!replay.needs_fulfillment());
        assert_eq!(replay.order.id, first.order.id);
    }

    #[tokio::test]
    async fn local_only_orders_carry_no_fulfillment_state() {
        let h = harness("http://127.0.0.1:9");
        let event: PaidOrderEvent = serde_json::from_value(json!({
            "sessionId": "cs_live_localonly0001",
            "customerEmail": "june@example.com",
            "items": [{"productId": "local", "name": "Gift card", "price": 25.0, "quantity": 1}],
            "subtotal": 25.0,
            "total": 25.0
        }))
        .unwrap();
        let outcome = h.dropship.intake_paid_order(event).await.unwrap();
        assert!(outcome.order.fulfillment.status.is_none());
        assert!(!outcome.needs_fulfillment());
    }
}
