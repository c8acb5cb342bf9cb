pub mod photos;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub use photos::{OutputFormat, PhotoConfig};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogBackend {
    Postgres,
    Memory,
}

impl FromStr for CatalogBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown catalog backend: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub catalog: CatalogBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub run_migrations: bool,
    pub migrations_dir: PathBuf,
    pub photos: PhotoConfig,
    pub paseto_access_key: [u8; 32],
    pub token_issuer: String,
    pub cors_allowed_origins: Vec<String>,
    pub reconcile_interval_seconds: u64,
    pub reconcile_grace_seconds: u64,
    pub reconcile_batch_size: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:4000");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        let catalog: CatalogBackend = env_or_parse("CATALOG", "postgres")?;
        let database_url = std::env::var("DATABASE_URL").ok();
        if catalog == CatalogBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("missing required env var: DATABASE_URL"));
        }

        Ok(Self {
            http_addr,
            app_mode,
            catalog,
            database_url,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            run_migrations: env_or_parse("RUN_MIGRATIONS", "true")?,
            migrations_dir: PathBuf::from(env_or("MIGRATIONS_DIR", "migrations")),
            photos: photos_from_env()?,
            paseto_access_key: env_key_32("PASETO_ACCESS_KEY")?,
            token_issuer: env_or("TOKEN_ISSUER", "leonaar"),
            cors_allowed_origins: env_list("CORS_ALLOWED_ORIGINS"),
            reconcile_interval_seconds: env_or_parse("RECONCILE_INTERVAL_SECONDS", "300")?,
            reconcile_grace_seconds: env_or_parse("RECONCILE_GRACE_SECONDS", "600")?,
            reconcile_batch_size: env_or_parse("RECONCILE_BATCH_SIZE", "200")?,
        })
    }
}

fn photos_from_env() -> Result<PhotoConfig> {
    let defaults = PhotoConfig::default();
    let config = PhotoConfig {
        storage_root: PathBuf::from(env_or("STORAGE_ROOT", "albums")),
        public_prefix: env_or("PUBLIC_PREFIX", &defaults.public_prefix),
        output_format: env_or_parse("OUTPUT_FORMAT", "jpeg")?,
        master_max_width: env_or_parse("MASTER_MAX_WIDTH", "1920")?,
        master_max_height: env_or_parse("MASTER_MAX_HEIGHT", "1080")?,
        master_quality: env_or_parse("MASTER_QUALITY", "80")?,
        thumbnail_size: env_or_parse("THUMBNAIL_SIZE", "300")?,
        thumbnail_quality: env_or_parse("THUMBNAIL_QUALITY", "70")?,
        min_upload_bytes: env_or_parse("UPLOAD_MIN_BYTES", "100")?,
        max_upload_bytes: env_or_parse("UPLOAD_MAX_BYTES", "52428800")?,
    };
    config.validate()?;
    Ok(config)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    decode_key_32(key, &value)
}

pub fn decode_key_32(key: &str, value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_backend_parses_case_insensitively() {
        assert_eq!("Postgres".parse::<CatalogBackend>().unwrap(), CatalogBackend::Postgres);
        assert_eq!("memory".parse::<CatalogBackend>().unwrap(), CatalogBackend::Memory);
        assert!("sqlite".parse::<CatalogBackend>().is_err());
    }

    #[test]
    fn key_must_be_32_bytes() {
        // "0123456789abcdef0123456789abcdef"
        let key = decode_key_32("K", "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=").unwrap();
        assert_eq!(&key[..4], b"0123");
        assert!(decode_key_32("K", "c2hvcnQ=").is_err());
        assert!(decode_key_32("K", "not base64!").is_err());
    }
}
