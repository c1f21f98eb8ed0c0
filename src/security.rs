//! Operator authentication and rate limiting for the admin and event routes.

use crate::config::{env_or, env_parse};
use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

const ADMIN_KEY_HEADER: &str = "X-Admin-Key";
const DEV_OPERATOR: &str = "operator";
const DEV_KEY: &str = "dev-admin-key";

/// The operator behind an authenticated request.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthContext {
    pub operator: String,
    pub key_id: String,
}

/// Each operator has one budget for sweeps, which call CJ once per candidate
/// record, and a separate one for everything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum RouteClass {
    Sweep,
    Action,
}

impl RouteClass {
    fn of(path: &str) -> Self {
        let path = path.trim_end_matches('/');
        if path.ends_with("/cj/sync-tracking") || path.ends_with("/cj/check-sourcing") {
            RouteClass::Sweep
        } else {
            RouteClass::Action
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            RouteClass::Sweep => "sweep",
            RouteClass::Action => "action",
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct BucketRule {
    per_sec: f64,
    burst: f64,
}

#[derive(Clone, Copy, Debug)]
struct RateLimits {
    action: BucketRule,
    sweep: BucketRule,
}

impl RateLimits {
    fn from_env() -> Self {
        Self {
            action: BucketRule {
                per_sec: positive(env_parse("RATE_LIMIT_PER_SEC", 5.0), 5.0),
                burst: env_parse("RATE_LIMIT_CAPACITY", 10.0_f64).max(1.0),
            },
            sweep: BucketRule {
                per_sec: positive(env_parse("SWEEP_RATE_LIMIT_PER_MIN", 2.0), 2.0) / 60.0,
                burst: env_parse("SWEEP_RATE_LIMIT_CAPACITY", 2.0_f64).max(1.0),
            },
        }
    }

    fn rule(&self, class: RouteClass) -> BucketRule {
        match class {
            RouteClass::Sweep => self.sweep,
            RouteClass::Action => self.action,
        }
    }
}

fn positive(value: f64, default: f64) -> f64 {
    if value > 0.0 { value } else { default }
}

#[derive(Clone)]
pub struct AuthState {
    keys: Arc<HashMap<String, AuthContext>>,
    limits: RateLimits,
    buckets: Arc<Mutex<HashMap<(String, RouteClass), Bucket>>>,
}

impl AuthState {
    pub fn from_env() -> Self {
        let raw = env_or("ADMIN_API_KEYS", &format!("{DEV_OPERATOR}:{DEV_KEY}"));
        Self::new(&raw, RateLimits::from_env())
    }

    fn new(raw_keys: &str, limits: RateLimits) -> Self {
        Self {
            keys: Arc::new(parse_keys(raw_keys)),
            limits,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn admit(&self, operator: &str, class: RouteClass) -> RateDecision {
        let rule = self.limits.rule(class);
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry((operator.to_string(), class))
            .or_insert_with(|| Bucket {
                tokens: rule.burst,
                refreshed: now,
            })
            .take(rule, now)
    }
}

pub async fn require_api_auth(
    State(auth): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let context = match presented_key(request.headers()) {
        None => {
            return reject(
                StatusCode::UNAUTHORIZED,
                "missing_api_key",
                "Provide X-Admin-Key or a Bearer token",
            );
        }
        Some(key) => match auth.keys.get(key) {
            Some(context) => context.clone(),
            None => {
                return reject(StatusCode::UNAUTHORIZED, "invalid_api_key", "Key not recognized");
            }
        },
    };

    let class = RouteClass::of(request.uri().path());
    let decision = auth.admit(&context.operator, class).await;
    let mut response = if decision.admitted {
        request.extensions_mut().insert(context);
        next.run(request).await
    } else {
        warn!(
            target = "louie.api",
            operator = %context.operator,
            class = class.as_str(),
            "operator rate limited"
        );
        reject(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "Too many requests")
    };
    decision.write_headers(response.headers_mut());
    response
}

/// A Bearer token wins over the admin key header when both are sent.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, key)| key.trim());
    bearer
        .or_else(|| {
            headers
                .get(ADMIN_KEY_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
        })
        .filter(|key| !key.is_empty())
}

fn reject(status: StatusCode, code: &str, message: &str) -> Response {
    let body = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (status, Json(body)).into_response()
}

/// Parses `operator:key` pairs separated by commas. Falls back to the
/// development key when nothing usable is configured.
fn parse_keys(raw: &str) -> HashMap<String, AuthContext> {
    let mut keys: HashMap<String, AuthContext> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .filter_map(|(idx, entry)| {
            let pair = entry
                .split_once(':')
                .map(|(operator, secret)| (operator.trim(), secret.trim()))
                .filter(|(operator, secret)| !operator.is_empty() && !secret.is_empty());
            let Some((operator, secret)) = pair else {
                warn!(target = "louie.api", entry = idx + 1, "ignored malformed ADMIN_API_KEYS entry");
                return None;
            };
            let context = AuthContext {
                operator: operator.to_string(),
                key_id: format!("key-{:02}", idx + 1),
            };
            Some((secret.to_string(), context))
        })
        .collect();

    if keys.is_empty() {
        warn!(target = "louie.api", "no admin keys configured; using the development key");
        keys.insert(
            DEV_KEY.to_string(),
            AuthContext {
                operator: DEV_OPERATOR.to_string(),
                key_id: "key-01".to_string(),
            },
        );
    } else {
        info!(target = "louie.api", key_count = keys.len(), "loaded admin API keys");
    }
    keys
}

struct Bucket {
    tokens: f64,
    refreshed: Instant,
}

impl Bucket {
    fn take(&mut self, rule: BucketRule, now: Instant) -> RateDecision {
        let elapsed = now.saturating_duration_since(self.refreshed).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rule.per_sec).min(rule.burst);
        self.refreshed = now;

        let admitted = self.tokens >= 1.0;
        if admitted {
            self.tokens -= 1.0;
        }
        RateDecision {
            admitted,
            limit: rule.burst as u64,
            remaining: self.tokens.max(0.0).floor() as u64,
            reset_secs: ((rule.burst - self.tokens) / rule.per_sec).ceil().max(0.0) as u64,
            retry_after_secs: (!admitted)
                .then(|| ((1.0 - self.tokens) / rule.per_sec).ceil().max(1.0) as u64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RateDecision {
    admitted: bool,
    limit: u64,
    remaining: u64,
    reset_secs: u64,
    retry_after_secs: Option<u64>,
}

impl RateDecision {
    fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", HeaderValue::from(self.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(self.remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(self.reset_secs));
        if let Some(retry) = self.retry_after_secs {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry));
        }
    }
}
