use serde::Deserialize;

/// Which ledger store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Redis,
    Memory,
}

impl std::str::FromStr for LedgerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(LedgerBackend::Redis),
            "memory" => Ok(LedgerBackend::Memory),
            other => Err(anyhow::anyhow!("unknown ledger backend: {other}")),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Ledger store implementation (default: redis)
    pub ledger_backend: LedgerBackend,

    /// Redis connection string
    pub redis_url: String,

    /// Base URL of the ruleset + market data service
    pub ruleset_api_url: String,

    /// Base URL of the FX rates service
    pub fx_api_url: String,

    /// Per-request timeout for remote services in milliseconds
    pub http_timeout_ms: u64,

    /// Retries after the first attempt for transient remote failures
    pub http_max_retries: u32,

    /// Base delay of the exponential backoff in milliseconds
    pub http_retry_base_ms: u64,

    /// Upper bound on a single ledger commit in milliseconds
    pub commit_timeout_ms: u64,

    /// Hours after a margin call during which a pending allocation may be retried
    pub allocation_cutoff_hours: i64,

    /// Port the API server binds to
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            ledger_backend: std::env::var("LEDGER_BACKEND")
                .unwrap_or_else(|_| "redis".to_string())
                .parse()?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            ruleset_api_url: std::env::var("RULESET_API_URL")
                .map_err(|_| anyhow::anyhow!("RULESET_API_URL environment variable is required"))?,
            fx_api_url: std::env::var("FX_API_URL")
                .unwrap_or_else(|_| "https://api.fixer.io".to_string()),
            http_timeout_ms: std::env::var("HTTP_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_MS must be a valid u64"))?,
            http_max_retries: std::env::var("HTTP_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_MAX_RETRIES must be a valid u32"))?,
            http_retry_base_ms: std::env::var("HTTP_RETRY_BASE_MS")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_RETRY_BASE_MS must be a valid u64"))?,
            commit_timeout_ms: std::env::var("COMMIT_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("COMMIT_TIMEOUT_MS must be a valid u64"))?,
            allocation_cutoff_hours: std::env::var("ALLOCATION_CUTOFF_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("ALLOCATION_CUTOFF_HOURS must be a valid i64"))?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
        })
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.http_timeout_ms)
    }

    pub fn commit_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.commit_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ledger_backend: LedgerBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            ruleset_api_url: "http://localhost:8080".to_string(),
            fx_api_url: "https://api.fixer.io".to_string(),
            http_timeout_ms: 5000,
            http_max_retries: 3,
            http_retry_base_ms: 200,
            commit_timeout_ms: 10_000,
            allocation_cutoff_hours: 24,
            api_port: 3000,
        }
    }
}
