use crate::cj::CjClient;
use crate::models::CredentialRecord;
use crate::store::CredentialStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ACCESS_SAFETY_HOURS: i64 = 24;
const REFRESH_SAFETY_DAYS: i64 = 7;
const ACCESS_WINDOW_DAYS: i64 = 15;
const REFRESH_WINDOW_DAYS: i64 = 180;

/// Caches the CJ token pair in the credential store.
///
/// Fresh grants are rate limited by CJ to about one per five minutes, so the
/// order of preference is: stored token, refresh, fresh grant. Concurrent
/// callers may both refresh; the later write wins.
#[derive(Clone)]
pub struct TokenManager {
    cj: CjClient,
    credentials: Arc<dyn CredentialStore>,
}

impl TokenManager {
    pub fn new(cj: CjClient, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { cj, credentials }
    }

    /// `None` means CJ is unreachable for this cycle. Never errors.
    ///
    /// A successful refresh keeps the same token and sets its expiry to
    /// 15 days from now, not from the previous expiry.
    pub async fn access_token(&self) -> Option<String> {
        self.access_token_at(Utc::now()).await
    }

    async fn access_token_at(&self, now: DateTime<Utc>) -> Option<String> {
        let stored = match self.credentials.load_credentials().await {
            Ok(record) => record,
            Err(err) => {
                // Without the stored record we cannot tell whether a fresh
                // grant would burn the rate limit.
                warn!(target = "louie.tokens", error = %err, "credential record unreadable");
                return None;
            }
        };

        if let Some(record) = stored {
            if record.access_token_expiry - Duration::hours(ACCESS_SAFETY_HOURS) > now {
                debug!(target = "louie.tokens", "reusing stored access token");
                return Some(record.access_token);
            }
            if record.refresh_token_expiry - Duration::days(REFRESH_SAFETY_DAYS) > now {
                match self.cj.refresh_access_token(&record.refresh_token).await {
                    Ok(true) => {
                        let extended = CredentialRecord {
                            access_token_expiry: now + Duration::days(ACCESS_WINDOW_DAYS),
                            ..record
                        };
                        self.persist(&extended).await;
                        info!(target = "louie.tokens", expires_at = %extended.access_token_expiry, "access token refreshed");
                        return Some(extended.access_token);
                    }
                    Ok(false) => {
                        warn!(target = "louie.tokens", "refresh declined; requesting a fresh token")
                    }
                    Err(err) => {
                        warn!(target = "louie.tokens", error = %err, "refresh failed; requesting a fresh token")
                    }
                }
            }
        }

        match self.cj.request_access_token().await {
            Ok(grant) => {
                let record = CredentialRecord {
                    access_token_expiry: grant
                        .access_token_expiry
                        .unwrap_or(now + Duration::days(ACCESS_WINDOW_DAYS)),
                    refresh_token_expiry: grant
                        .refresh_token_expiry
                        .unwrap_or(now + Duration::days(REFRESH_WINDOW_DAYS)),
                    access_token: grant.access_token,
                    refresh_token: grant.refresh_token,
                };
                self.persist(&record).await;
                info!(
                    target = "louie.tokens",
                    preview = %preview(&record.access_token),
                    expires_at = %record.access_token_expiry,
                    "fresh access token acquired"
                );
                Some(record.access_token)
            }
            Err(err) => {
                warn!(target = "louie.tokens", error = %err, "fresh access token request failed");
                None
            }
        }
    }

    async fn persist(&self, record: &CredentialRecord) {
        if let Err(err) = self.credentials.save_credentials(record).await {
            warn!(target = "louie.tokens", error = %err, "failed to persist credential record");
        }
    }
}

fn preview(token: &str) -> String {
    let head: String = token.chars().take(6).collect();
    format!("{head}…")
}
