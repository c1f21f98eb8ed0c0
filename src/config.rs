use std::env;

pub const DEFAULT_CJ_ROOT: &str = "https://developers.cjdropshipping.com/api2.0/v1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub body_limit: usize,
    pub queue_capacity: usize,
    pub scheduler_enabled: bool,
    pub sourcing_cron: String,
    pub tracking_cron: String,
    pub cj: CjConfig,
    pub workflow: WorkflowSettings,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", 8000),
            body_limit: env_parse::<usize>("REQUEST_MAX_BYTES", 256 * 1024).max(1),
            queue_capacity: env_parse::<usize>("QUEUE_CAPACITY", 64).max(1),
            scheduler_enabled: env::var("SCHEDULER_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            sourcing_cron: env_or("SOURCING_SWEEP_CRON", "0 */30 * * * *"),
            tracking_cron: env_or("TRACKING_SWEEP_CRON", "0 0 */4 * * *"),
            cj: CjConfig::from_env(),
            workflow: WorkflowSettings::from_env(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CjConfig {
    pub api_key: String,
    pub base_url: String,
    pub webhook_url: String,
}

impl CjConfig {
    pub fn from_env() -> Self {
        let public_base = env_or("PUBLIC_BASE_URL", "http://localhost:8000");
        let webhook_url = env::var("CJ_WEBHOOK_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| format!("{}/webhooks/cj", public_base.trim_end_matches('/')));
        Self {
            api_key: env::var("CJ_API_KEY").unwrap_or_default(),
            base_url: env_or("CJ_API_BASE_URL", DEFAULT_CJ_ROOT)
                .trim_end_matches('/')
                .to_string(),
            webhook_url,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Knobs for the sourcing, fulfillment and tracking workflows.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub shipping_method: String,
    pub ship_from_country: String,
    pub pay_type: u8,
    pub sweep_delay_min_ms: u64,
    pub sweep_delay_max_ms: u64,
    pub tracking_throttle_mins: i64,
}

impl WorkflowSettings {
    pub fn from_env() -> Self {
        let min = env_parse("SWEEP_DELAY_MIN_MS", 200);
        let max = env_parse("SWEEP_DELAY_MAX_MS", 300).max(min);
        Self {
            shipping_method: env_or("CJ_SHIPPING_METHOD", "CJPacket Ordinary"),
            ship_from_country: env_or("CJ_SHIP_FROM_COUNTRY", "CN"),
            pay_type: env_parse("CJ_PAY_TYPE", 2),
            sweep_delay_min_ms: min,
            sweep_delay_max_ms: max,
            tracking_throttle_mins: env_parse("TRACKING_SYNC_THROTTLE_MINS", 60),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            shipping_method: "CJPacket Ordinary".to_string(),
            ship_from_country: "CN".to_string(),
            pay_type: 2,
            sweep_delay_min_ms: 200,
            sweep_delay_max_ms: 300,
            tracking_throttle_mins: 60,
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
