use crate::models::CredentialRecord;
use crate::store::{CredentialStore, StoreError};
use async_trait::async_trait;
use redis::AsyncCommands;

const CREDENTIALS_KEY: &str = "louie:cj:credentials";

/// Keeps the CJ credential record in Redis so every replica shares one token
/// pair and the fresh-token rate limit is respected across restarts.
#[derive(Clone)]
pub struct RedisCredentialStore {
    client: redis::Client,
}

impl RedisCredentialStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("REDIS_URL")
            .ok()
            .and_then(|url| redis::Client::open(url).ok())
            .map(Self::new)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn load_credentials(&self) -> Result<Option<CredentialRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(CREDENTIALS_KEY)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        raw.map(|value| {
            serde_json::from_str(&value).map_err(|err| StoreError::Deserialize(err.to_string()))
        })
        .transpose()
    }

    async fn save_credentials(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(record).map_err(|err| StoreError::Deserialize(err.to_string()))?;
        let mut conn = self.connection().await?;
        let _: () = conn
            .set(CREDENTIALS_KEY, json)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }
}
