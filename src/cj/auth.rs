use crate::cj::normalize::{field, first_record};
use crate::cj::{CjClient, CjError};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Value, json};

/// Fresh credentials as returned by `authentication/getAccessToken`. Expiries
/// are optional because CJ does not always send them.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub access_token_expiry: Option<DateTime<Utc>>,
    pub refresh_token: String,
    pub refresh_token_expiry: Option<DateTime<Utc>>,
}

impl CjClient {
    /// Rate limited by CJ to roughly one call per 300 seconds.
    pub async fn request_access_token(&self) -> Result<TokenGrant, CjError> {
        let api_key = self.config().api_key.trim();
        if api_key.is_empty() {
            return Err(CjError::MissingApiKey);
        }
        let data = self
            .post_json(
                "authentication/getAccessToken",
                None,
                &json!({ "apiKey": api_key }),
            )
            .await?;
        parse_grant(&data)
    }

    /// CJ answers a refresh with a bare boolean; the access token string
    /// itself does not change.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<bool, CjError> {
        let data = self
            .post_json(
                "authentication/refreshAccessToken",
                None,
                &json!({ "refreshToken": refresh_token }),
            )
            .await?;
        Ok(match data {
            Value::Bool(ok) => ok,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        })
    }
}

fn parse_grant(data: &Value) -> Result<TokenGrant, CjError> {
    let record =
        first_record(data).ok_or_else(|| CjError::Deserialize("token payload missing".into()))?;
    let access_token = field(record, &["accessToken"])
        .ok_or_else(|| CjError::Deserialize("accessToken missing".into()))?;
    let refresh_token = field(record, &["refreshToken"])
        .ok_or_else(|| CjError::Deserialize("refreshToken missing".into()))?;
    Ok(TokenGrant {
        access_token,
        access_token_expiry: field(record, &["accessTokenExpiryDate"])
            .as_deref()
            .and_then(parse_expiry),
        refresh_token,
        refresh_token_expiry: field(record, &["refreshTokenExpiryDate"])
            .as_deref()
            .and_then(parse_expiry),
    })
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
