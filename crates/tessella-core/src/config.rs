//! Configuration module
//!
//! Environment-derived configuration, constructed once at startup and passed
//! by reference into every component. Business logic never reads environment
//! variables directly.

use std::env;
use std::path::PathBuf;

const DEFAULT_SERVER_PORT: u16 = 8000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_WORKER_COUNT: usize = 2;
const DEFAULT_QUEUE_DEPTH: usize = 64;
// 4 GiB: masters are large; the streamed ingest path never buffers them.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 4 * 1024 * 1024 * 1024;

/// Registry persistence backend selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryBackend {
    Postgres,
    Memory,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    // Registry
    pub registry_backend: RegistryBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    // Storage
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    // Public base URLs (explicit configuration beats forwarded headers)
    pub api_public_url: Option<String>,
    pub image_service_url: Option<String>,
    // Conversion
    pub convert_extensions: Vec<String>,
    pub vips_path: String,
    pub exiftool_path: String,
    pub worker_count: usize,
    pub queue_depth: usize,
    // Export
    pub source_organization: String,
}

impl Config {
    /// Load configuration from the environment (and `.env` when present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        // Best-effort: absence of a .env file is the normal production case.
        let _ = dotenvy::dotenv();

        let registry_backend = match env::var("REGISTRY_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => RegistryBackend::Postgres,
            "memory" => RegistryBackend::Memory,
            other => anyhow::bail!("Unknown REGISTRY_BACKEND: {}", other),
        };

        let config = Config {
            server_port: parse_env("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            cors_origins: parse_list("CORS_ORIGINS", &["*"]),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            registry_backend,
            database_url: env::var("DATABASE_URL").ok(),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            ),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            api_public_url: env::var("API_PUBLIC_URL").ok(),
            image_service_url: env::var("IMAGE_SERVICE_URL").ok(),
            convert_extensions: parse_list("CONVERT_EXTENSIONS", &["psb", "psd"]),
            vips_path: env::var("VIPS_PATH").unwrap_or_else(|_| "vips".to_string()),
            exiftool_path: env::var("EXIFTOOL_PATH").unwrap_or_else(|_| "exiftool".to_string()),
            worker_count: parse_env("CONVERT_WORKERS", DEFAULT_WORKER_COUNT)?,
            queue_depth: parse_env("CONVERT_QUEUE_DEPTH", DEFAULT_QUEUE_DEPTH)?,
            source_organization: env::var("SOURCE_ORGANIZATION")
                .unwrap_or_else(|_| "Tessella".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.registry_backend == RegistryBackend::Postgres && self.database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when REGISTRY_BACKEND=postgres");
        }
        if self.worker_count == 0 {
            anyhow::bail!("CONVERT_WORKERS must be at least 1");
        }
        if self.queue_depth == 0 {
            anyhow::bail!("CONVERT_QUEUE_DEPTH must be at least 1");
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, anyhow::Error>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn parse_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}
