use std::sync::Arc;

use crate::auth::service::AuthService;
use crate::config::AppConfig;
use crate::store::{AuthStore, MemoryStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuthStore>,
    pub auth: Arc<AuthService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn AuthStore> = match (&config.database_url, config.memory_store) {
            (_, true) => {
                tracing::warn!("using in-memory store; sessions will not survive a restart");
                Arc::new(MemoryStore::new())
            }
            (Some(url), false) => Arc::new(PgStore::connect(url).await?),
            (None, false) => anyhow::bail!("DATABASE_URL is required unless MEMORY_STORE=true"),
        };

        Ok(Self::from_parts(store, config))
    }

    pub fn from_parts(store: Arc<dyn AuthStore>, config: Arc<AppConfig>) -> Self {
        let auth = Arc::new(AuthService::new(store.clone(), config.session.clone()));
        Self {
            store,
            auth,
            config,
        }
    }
}
