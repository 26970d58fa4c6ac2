use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub http: HttpConfig,
    pub catalog: CatalogConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// Base URLs of the three backend services, including the `/api` prefix
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub identity_url: String,
    pub booking_url: String,
    pub payment_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub timeout_ms: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub cache_ttl_seconds: u64,
}

impl CatalogConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// JSON file holding the persisted bearer token
    pub credential_path: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        Self::load_from(Path::new("config"), &run_mode)
    }

    /// Layer `default`, `{run_mode}` and `local` from `dir` over built-in
    /// defaults, then `STAGEPASS__*` environment variables on top.
    pub fn load_from(dir: &Path, run_mode: &str) -> Result<Self, config::ConfigError> {
        let file = |name: &str| {
            config::File::with_name(&dir.join(name).to_string_lossy()).required(false)
        };

        let s = config::Config::builder()
            .set_default("server.port", 8080)?
            .set_default("services.identity_url", "http://localhost:8081/api")?
            .set_default("services.booking_url", "http://localhost:8082/api")?
            .set_default("services.payment_url", "http://localhost:8083/api")?
            .set_default("http.timeout_ms", 10_000)?
            .set_default("catalog.cache_ttl_seconds", 30)?
            .set_default("session.credential_path", ".stagepass/credentials.json")?
            .add_source(file("default"))
            .add_source(file(run_mode))
            // Not checked in
            .add_source(file("local"))
            // e.g. `STAGEPASS__SERVICES__BOOKING_URL=http://booking:8082/api`
            .add_source(config::Environment::with_prefix("STAGEPASS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
