mod admin;
mod cj;
mod config;
mod http;
mod jobs;
mod metrics;
mod models;
mod notify;
mod scheduler;
mod security;
mod store;
mod workflow;

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use cj::CjClient;
use config::AppConfig;
use eyre::WrapErr;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, PaidOrderEvent, Product};
use notify::{EmailNotifier, LogNotifier, Notifier};
use security::{AuthContext, AuthState, require_api_auth};
use serde::Serialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use store::{CredentialStore, MemoryStore, RedisCredentialStore, Store, SupabaseStore};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use workflow::{Dropship, WebhookOutcome, WorkflowError, WorkflowErrorKind};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();
    if let Err(err) = run().await {
        error!(target = "louie.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let config = AppConfig::from_env();
    if config.cj.api_key.trim().is_empty() {
        warn!(
            target = "louie.api",
            "CJ_API_KEY is not set; CJ calls will report the token as unavailable"
        );
    }

    let (store, credentials) = build_stores();
    let notifier = build_notifier();
    let dropship = Dropship::new(
        store,
        credentials,
        CjClient::new(config.cj.clone()),
        notifier,
        config.workflow.clone(),
    );
    let (queue, _worker) = jobs::JobQueue::spawn(dropship.clone(), config.queue_capacity);

    let _scheduler = if config.scheduler_enabled {
        Some(
            scheduler::build_scheduler(
                dropship.clone(),
                &config.sourcing_cron,
                &config.tracking_cron,
            )
            .await
            .wrap_err("failed to start the sweep scheduler")?,
        )
    } else {
        info!(target = "louie.scheduler", "periodic sweeps disabled");
        None
    };

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("failed to install the prometheus recorder")?;
    let state = AppState {
        dropship,
        queue,
        openapi: Arc::new(load_openapi()),
        prometheus,
    };
    let app = build_router(state, AuthState::from_env())
        .layer(axum::extract::DefaultBodyLimit::max(config.body_limit));

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "louie.api", "listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

fn build_stores() -> (Arc<dyn Store>, Arc<dyn CredentialStore>) {
    let (store, fallback_credentials): (Arc<dyn Store>, Arc<dyn CredentialStore>) =
        match SupabaseStore::from_env() {
            Some(supabase) => {
                info!(target = "louie.store", "using Supabase store");
                let supabase = Arc::new(supabase);
                (supabase.clone(), supabase)
            }
            None => {
                warn!(
                    target = "louie.store",
                    "SUPABASE_URL not set; using the in-memory store"
                );
                let memory = Arc::new(MemoryStore::new());
                (memory.clone(), memory)
            }
        };
    let credentials: Arc<dyn CredentialStore> = match RedisCredentialStore::from_env() {
        Some(redis) => {
            info!(target = "louie.store", "CJ credentials kept in Redis");
            Arc::new(redis)
        }
        None => fallback_credentials,
    };
    (store, credentials)
}

fn build_notifier() -> Arc<dyn Notifier> {
    match EmailNotifier::from_env() {
        Some(email) => Arc::new(email),
        None => {
            info!(
                target = "louie.notify",
                "EMAIL_API_URL not set; shipment notices are logged only"
            );
            Arc::new(LogNotifier)
        }
    }
}

fn load_openapi() -> serde_json::Value {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
}

#[derive(Clone)]
struct AppState {
    dropship: Dropship,
    queue: jobs::JobQueue,
    openapi: Arc<serde_json::Value>,
    prometheus: PrometheusHandle,
}

fn build_router(state: AppState, auth_state: AuthState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);
    let admin = admin::Admin::new(state.dropship.clone(), state.queue.clone());

    let protected = Router::new()
        .route("/events/order-paid", post(order_paid))
        .route("/jobs/{id}", get(get_job_status))
        .nest("/admin", admin::router(admin))
        .route_layer(middleware::from_fn_with_state(auth_state, require_api_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/products", get(list_products))
        .route("/webhooks/cj", post(cj_webhook))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "louie-mae-fulfillment",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(AppError::Unauthorized("docs"));
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Louie Mae Fulfillment API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#,
    )
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
        .into_response()
}

/// Storefront catalogue: products not held back by CJ sourcing.
///
/// - Method: `GET`
/// - Path: `/products`
/// - Auth: none
async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, AppError> {
    crate::metrics::inc_requests("/products");
    Ok(Json(state.dropship.storefront_products().await?))
}

/// CJ order and logistics callbacks. Unknown orders are acknowledged so CJ
/// stops redelivering them.
///
/// - Method: `POST`
/// - Path: `/webhooks/cj`
/// - Auth: none
async fn cj_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<WebhookOutcome>, AppError> {
    crate::metrics::inc_requests("/webhooks/cj");
    Ok(Json(state.dropship.handle_webhook(&payload).await?))
}

#[derive(Debug, Serialize)]
struct OrderPaidResponse {
    order_id: String,
    order_number: String,
    created: bool,
    fulfillment_status: Option<models::FulfillmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
}

/// Payment completion event from the storefront checkout.
///
/// - Method: `POST`
/// - Path: `/events/order-paid`
/// - Auth: `Authorization: Bearer <key>` or `X-Admin-Key: <key>`
/// - Body: `PaidOrderEvent`
///
/// Records the order and queues CJ fulfillment when at least one line is
/// sourced through CJ. Replays of a session return the stored order without
/// queueing again.
async fn order_paid(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(event): Json<PaidOrderEvent>,
) -> Result<Json<OrderPaidResponse>, AppError> {
    crate::metrics::inc_requests("/events/order-paid");
    let intake = state.dropship.intake_paid_order(event).await?;
    info!(
        target = "louie.api",
        operator = %context.operator,
        key_id = %context.key_id,
        order_id = %intake.order.id,
        order_number = %intake.order.order_number,
        created = intake.created,
        "paid order received"
    );

    let mut job_id = None;
    if intake.needs_fulfillment() {
        let id = state
            .queue
            .enqueue_fulfillment(&intake.order.id)
            .await
            .map_err(|err| {
                WorkflowError::unavailable("enqueue", err.detail.unwrap_or(err.error))
            })?;
        job_id = Some(id.to_string());
    }
    Ok(Json(OrderPaidResponse {
        order_id: intake.order.id.clone(),
        order_number: intake.order.order_number.clone(),
        created: intake.created,
        fulfillment_status: intake.order.fulfillment.status,
        job_id,
    }))
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<jobs::JobInfo>, AppError> {
    let Ok(uuid) = uuid::Uuid::parse_str(&id) else {
        return Err(WorkflowError::invalid_input("jobs", "invalid_job_id").into());
    };
    match state.queue.get(uuid).await {
        Some(info) => Ok(Json(info)),
        None => Err(WorkflowError::not_found("jobs", "not_found").into()),
    }
}

#[derive(Debug)]
enum AppError {
    Workflow(WorkflowError),
    Unauthorized(&'static str),
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Workflow(err) => {
                let status = match err.kind() {
                    WorkflowErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    WorkflowErrorKind::NotFound => StatusCode::NOT_FOUND,
                    WorkflowErrorKind::Conflict => StatusCode::CONFLICT,
                    WorkflowErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    WorkflowErrorKind::Internal => {
                        error!(target = "louie.api", stage = err.stage(), error = %err, "request failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
            AppError::Unauthorized(stage) => {
                let payload = ApiError {
                    error: stage.to_string(),
                    detail: Some("unauthorized".into()),
                };
                (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
