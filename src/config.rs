use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_hours: i64,
    pub long_ttl_hours: i64,
    pub invitation_ttl_hours: i64,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub memory_store: bool,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let memory_store = std::env::var("MEMORY_STORE")
            .map(|v| v == "true")
            .unwrap_or(false);
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => Some(url),
            Err(_) if memory_store => None,
            Err(e) => return Err(anyhow::Error::new(e).context("DATABASE_URL is required")),
        };
        let session = SessionConfig {
            cookie_name: std::env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "id".into()),
            ttl_hours: std::env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(24),
            long_ttl_hours: std::env::var("SESSION_LONG_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(24 * 30),
            invitation_ttl_hours: std::env::var("INVITATION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(72),
            secure_cookies: std::env::var("SECURE_COOKIES")
                .map(|v| v == "true")
                .unwrap_or(false),
        };
        Ok(Self {
            database_url,
            memory_store,
            session,
        })
    }

    /// Config suitable for tests and demos: in-memory store, plain-HTTP cookies.
    pub fn ephemeral() -> Self {
        Self {
            database_url: None,
            memory_store: true,
            session: SessionConfig {
                cookie_name: "id".into(),
                ttl_hours: 24,
                long_ttl_hours: 24 * 30,
                invitation_ttl_hours: 72,
                secure_cookies: false,
            },
        }
    }
}
