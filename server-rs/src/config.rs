use std::env;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub store_backend: StoreBackend,
    pub db: DbConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub request_timeout_secs: u64,
    pub outbound_timeout_secs: u64,
    pub storage: StorageConfig,
    pub summary: SummaryConfig,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

#[derive(Clone, Debug, Default)]
pub struct StorageConfig {
    pub base_url: String,
    pub api_key: String,
    pub public_url: String,
}

#[derive(Clone, Debug)]
pub struct SummaryConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_or_parse("PORT", 3000),
            cors_origins: env_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            store_backend: match env_or("STORE_BACKEND", "postgres").to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                _ => StoreBackend::Postgres,
            },
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_or_parse("DB_PORT", 5432),
                database: env_or("DB_NAME", "league_ledger"),
                user: env_or("DB_USER", "ledger"),
                password: env_or("DB_PASSWORD", ""),
                pool_min: env_or_parse("DB_POOL_MIN", 2),
                pool_max: env_or_parse("DB_POOL_MAX", 20),
            },
            jwt: JwtConfig {
                secret: env_or("JWT_SECRET", "change-me-to-a-secure-random-string"),
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                max_requests: env_or_parse("RATE_LIMIT_MAX", 120),
            },
            request_timeout_secs: env_or_parse("REQUEST_TIMEOUT_SECS", 30),
            outbound_timeout_secs: env_or_parse("OUTBOUND_TIMEOUT_SECS", 15),
            storage: StorageConfig {
                base_url: env_or("STORAGE_BASE_URL", ""),
                api_key: env_or("STORAGE_API_KEY", ""),
                public_url: env_or("STORAGE_PUBLIC_URL", ""),
            },
            summary: SummaryConfig {
                api_url: env_or(
                    "SUMMARY_API_URL",
                    "https://api.openai.com/v1/chat/completions",
                ),
                api_key: env_or("SUMMARY_API_KEY", ""),
                model: env_or("SUMMARY_MODEL", "gpt-4o-mini"),
            },
        }
    }

    /// Defaults with the in-memory store; used by tests and local runs.
    pub fn for_memory() -> Self {
        let mut config = Self::from_env();
        config.store_backend = StoreBackend::Memory;
        config
    }

    pub fn database_url(&self) -> String {
        if let Ok(url) = env::var("DATABASE_URL") {
            return url;
        }
        if let Ok(url) = env::var("POSTGRES_URL") {
            return url;
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db.user, self.db.password, self.db.host, self.db.port, self.db.database
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.outbound_timeout_secs)
    }
}
