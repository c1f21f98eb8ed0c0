use super::{Dropship, WorkflowError, tracking_url};
use crate::cj::normalize::{field, first_record};
use crate::models::{FulfillmentStatus, Order, OrderStatus, non_empty};
use crate::notify::ShipmentNotice;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Order statuses CJ pushes through its order webhook. Anything outside this
/// set is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOrderStatus {
    Created,
    InCart,
    Unpaid,
    Unshipped,
    Processing,
    Dispatched,
    Shipped,
    InTransit,
    Delivered,
    Cancelled,
}

impl ProviderOrderStatus {
    pub fn from_raw(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Some(match normalized.as_str() {
            "CREATED" => Self::Created,
            "IN_CART" => Self::InCart,
            "UNPAID" => Self::Unpaid,
            "UNSHIPPED" => Self::Unshipped,
            "PROCESSING" => Self::Processing,
            "DISPATCHED" => Self::Dispatched,
            "SHIPPED" => Self::Shipped,
            "IN_TRANSIT" => Self::InTransit,
            "DELIVERED" => Self::Delivered,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn fulfillment_status(self) -> FulfillmentStatus {
        match self {
            Self::Created | Self::InCart | Self::Unpaid => FulfillmentStatus::Confirmed,
            Self::Unshipped | Self::Processing | Self::Dispatched => FulfillmentStatus::Processing,
            Self::Shipped | Self::InTransit => FulfillmentStatus::Shipped,
            Self::Delivered => FulfillmentStatus::Delivered,
            Self::Cancelled => FulfillmentStatus::Cancelled,
        }
    }
}

/// One tracking observation, from either the poll or the webhook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingUpdate {
    pub status: Option<FulfillmentStatus>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub carrier: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub changed: bool,
    /// True only the first time a tracking number appears on the order.
    pub notify: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TrackingSweepReport {
    pub checked: usize,
    pub synced: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied {
        order_id: String,
        status: Option<FulfillmentStatus>,
        changed: bool,
        notified: bool,
    },
    Ignored {
        reason: String,
    },
}

fn rank(status: FulfillmentStatus) -> u8 {
    match status {
        FulfillmentStatus::Pending | FulfillmentStatus::Failed => 0,
        FulfillmentStatus::Sending => 1,
        FulfillmentStatus::Confirmed => 2,
        FulfillmentStatus::Processing => 3,
        FulfillmentStatus::Shipped => 4,
        FulfillmentStatus::Delivered => 5,
        FulfillmentStatus::Cancelled => 6,
    }
}

/// Merges `update` into `order`. A tracking number holds the order at
/// `shipped` or later and cannot be cancelled away. Once shipped, the status
/// only moves forward. Does not touch `lastSyncAt`.
pub fn apply_tracking_update(
    order: &mut Order,
    update: &TrackingUpdate,
    now: DateTime<Utc>,
) -> AppliedUpdate {
    let before_fulfillment = order.fulfillment.clone();
    let before_status = order.status;
    let had_tracking = non_empty(order.fulfillment.tracking_number.as_deref()).is_some();
    let state = &mut order.fulfillment;

    if let Some(carrier) = non_empty(update.carrier.as_deref()) {
        state.carrier = Some(carrier.to_string());
    }
    if let Some(number) = non_empty(update.tracking_number.as_deref()) {
        let same_number = state.tracking_number.as_deref() == Some(number);
        let url = match non_empty(update.tracking_url.as_deref()) {
            Some(url) => url.to_string(),
            None => match state.tracking_url.as_deref() {
                Some(existing) if same_number => existing.to_string(),
                _ => tracking_url(state.carrier.as_deref(), number),
            },
        };
        state.tracking_number = Some(number.to_string());
        state.tracking_url = Some(url);
    }

    let has_tracking = non_empty(state.tracking_number.as_deref()).is_some();
    let current = state.status;
    let mut next = match (update.status, current) {
        (Some(proposed), Some(current)) if current.has_shipped() && rank(proposed) < rank(current) => {
            Some(current)
        }
        (Some(FulfillmentStatus::Cancelled), current) if has_tracking => current,
        (proposed, current) => proposed.or(current),
    };
    if has_tracking && next.is_none_or(|s| rank(s) < rank(FulfillmentStatus::Shipped)) {
        next = Some(FulfillmentStatus::Shipped);
    }
    state.status = next;

    if let Some(status) = next {
        if status.has_shipped() && state.shipped_at.is_none() {
            state.shipped_at = Some(now);
        }
        match status {
            FulfillmentStatus::Shipped => order.status = OrderStatus::Shipped,
            FulfillmentStatus::Delivered => order.status = OrderStatus::Delivered,
            _ => {}
        }
    }

    AppliedUpdate {
        changed: order.fulfillment != before_fulfillment || order.status != before_status,
        notify: !had_tracking && has_tracking,
    }
}

fn shipment_notice(order: &Order) -> Option<ShipmentNotice> {
    let state = &order.fulfillment;
    let tracking_number = non_empty(state.tracking_number.as_deref())?.to_string();
    let carrier = non_empty(state.carrier.as_deref()).unwrap_or("Carrier").to_string();
    Some(ShipmentNotice {
        customer_email: order.customer_email.clone(),
        customer_name: order.customer_name.clone(),
        order_id: order.id.clone(),
        order_number: order.order_number.clone(),
        tracking_url: state
            .tracking_url
            .clone()
            .unwrap_or_else(|| tracking_url(Some(&carrier), &tracking_number)),
        tracking_number,
        carrier,
        estimated_delivery: None,
    })
}

impl Dropship {
    /// Polls CJ for confirmed and processing orders not synced within the
    /// throttle window.
    pub async fn sync_tracking_sweep(&self) -> Result<TrackingSweepReport, WorkflowError> {
        self.sync_tracking_at(Utc::now()).await
    }

    async fn sync_tracking_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<TrackingSweepReport, WorkflowError> {
        let started = Instant::now();
        let throttle = Duration::minutes(self.settings.tracking_throttle_mins);
        let due: Vec<Order> = self
            .store
            .list_orders_by_fulfillment(&[FulfillmentStatus::Confirmed, FulfillmentStatus::Processing])
            .await
            .map_err(|err| WorkflowError::store("sync_tracking", err))?
            .into_iter()
            .filter(|o| non_empty(o.fulfillment.external_order_id.as_deref()).is_some())
            .filter(|o| o.fulfillment.last_sync_at.is_none_or(|at| now - at >= throttle))
            .collect();
        let mut report = TrackingSweepReport::default();
        if due.is_empty() {
            return Ok(report);
        }

        let token = self.require_token("sync_tracking").await?;
        for (idx, mut order) in due.into_iter().enumerate() {
            if idx > 0 {
                self.pause().await;
            }
            let Some(external_id) = order.fulfillment.external_order_id.clone() else {
                continue;
            };
            report.checked += 1;
            let info = match self.cj.track_info(&token, &external_id).await {
                Ok(info) => info,
                Err(err) => {
                    warn!(target = "louie.tracking", order_id = %order.id, external_order_id = %external_id, error = %err, "tracking fetch failed");
                    report.errors += 1;
                    continue;
                }
            };

            let mut applied = AppliedUpdate::default();
            if let Some(info) = info.filter(|i| non_empty(i.tracking_number.as_deref()).is_some()) {
                let update = TrackingUpdate {
                    status: Some(FulfillmentStatus::Shipped),
                    tracking_number: info.tracking_number,
                    tracking_url: info.tracking_url,
                    carrier: info.carrier,
                };
                applied = apply_tracking_update(&mut order, &update, now);
                report.synced += 1;
            }
            order.fulfillment.last_sync_at = Some(now);
            if let Err(err) = self.save_order("sync_tracking", &order).await {
                warn!(target = "louie.tracking", order_id = %order.id, error = %err, "failed to persist tracking");
                report.errors += 1;
                continue;
            }
            if applied.notify {
                self.notify_shipment(&order).await;
            }
        }

        crate::metrics::sweep_finished(
            "sync_tracking",
            report.checked,
            report.errors,
            started.elapsed().as_millis(),
        );
        info!(
            target = "louie.tracking",
            checked = report.checked,
            synced = report.synced,
            errors = report.errors,
            "tracking sweep finished"
        );
        Ok(report)
    }

    /// CJ order/logistics webhook. Orders are found by `orderNumber` first and
    /// by CJ order id second; unknown orders are acknowledged and ignored.
    /// An order without a CJ order id only takes the update when the payload
    /// carries one, which is then stored on the order.
    pub async fn handle_webhook(&self, payload: &Value) -> Result<WebhookOutcome, WorkflowError> {
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN");
        let params = payload
            .get("params")
            .and_then(first_record)
            .or_else(|| first_record(payload));
        let Some(params) = params else {
            return Ok(WebhookOutcome::Ignored {
                reason: "payload carries no params".into(),
            });
        };

        let order_number = field(params, &["orderNumber", "orderNum"]);
        let external_id = field(params, &["orderId", "cjOrderId"]);
        let mut order = None;
        if let Some(number) = order_number.as_deref() {
            order = self
                .store
                .find_order_by_number(&number.to_uppercase())
                .await
                .map_err(|err| WorkflowError::store("webhook", err))?;
        }
        if order.is_none()
            && let Some(id) = external_id.as_deref()
        {
            order = self
                .store
                .find_order_by_external_id(id)
                .await
                .map_err(|err| WorkflowError::store("webhook", err))?;
        }
        let Some(mut order) = order else {
            debug!(
                target = "louie.tracking",
                kind,
                order_number = ?order_number,
                external_order_id = ?external_id,
                "webhook for unknown order ignored"
            );
            return Ok(WebhookOutcome::Ignored {
                reason: "order not found".into(),
            });
        };

        if order.fulfillment.status.is_none() {
            return Ok(WebhookOutcome::Ignored {
                reason: "order has no CJ lines".into(),
            });
        }
        if non_empty(order.fulfillment.external_order_id.as_deref()).is_none() {
            let Some(id) = non_empty(external_id.as_deref()) else {
                debug!(target = "louie.tracking", order_id = %order.id, "webhook for unplaced order ignored");
                return Ok(WebhookOutcome::Ignored {
                    reason: "order has not been placed with CJ".into(),
                });
            };
            info!(target = "louie.tracking", order_id = %order.id, external_order_id = id, "adopting CJ order id from webhook");
            order.fulfillment.external_order_id = Some(id.to_string());
            order.fulfillment.error = None;
        }

        let raw_status = field(params, &["orderStatus", "status", "logisticsStatus"]);
        let status = raw_status
            .as_deref()
            .and_then(ProviderOrderStatus::from_raw)
            .map(ProviderOrderStatus::fulfillment_status);
        if status.is_none()
            && let Some(raw) = raw_status.as_deref()
        {
            debug!(target = "louie.tracking", order_id = %order.id, status = raw, "unrecognised webhook status ignored");
        }
        let update = TrackingUpdate {
            status,
            tracking_number: field(params, &["trackNumber", "trackingNumber"]),
            tracking_url: field(params, &["trackingUrl", "trackUrl"]),
            carrier: field(params, &["logisticName", "logisticsName", "carrier"]),
        };

        let now = Utc::now();
        let applied = apply_tracking_update(&mut order, &update, now);
        order.fulfillment.last_sync_at = Some(now);
        self.save_order("webhook", &order).await?;
        info!(
            target = "louie.tracking",
            kind,
            order_id = %order.id,
            changed = applied.changed,
            status = order.fulfillment.status.map(|s| s.as_str()).unwrap_or("none"),
            "webhook applied"
        );
        if applied.notify {
            self.notify_shipment(&order).await;
        }
        Ok(WebhookOutcome::Applied {
            order_id: order.id.clone(),
            status: order.fulfillment.status,
            changed: applied.changed,
            notified: applied.notify,
        })
    }

    /// Notification failures are logged; they never fail the order.
    async fn notify_shipment(&self, order: &Order) {
        let Some(notice) = shipment_notice(order) else {
            return;
        };
        if let Err(err) = self.notifier.shipment_sent(&notice).await {
            warn!(target = "louie.notify", order_id = %order.id, error = %err, "shipment notification failed");
        }
    }
}
