use std::env;
use std::path::PathBuf;

use crate::db::DbConfig;

const DEFAULT_EXPORT_RETENTION_SECS: i64 = 24 * 60 * 60;
const MAX_EXPORT_RETENTION_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Application settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Public base URL used in `Location`, `fullUrl` and export links
    pub base_url: String,
    pub storage: StorageBackend,
    pub database: DbConfig<'static>,
    pub export_dir: PathBuf,
    /// How long finished export jobs and their files are kept
    pub export_retention_secs: i64,
    pub token_ttl_secs: i64,
    pub seed_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let storage = match env::var("STORAGE")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => return Err(format!("Unknown STORAGE backend '{}'", other)),
        };

        let token_ttl_secs = match env::var("TOKEN_TTL_SECS") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|ttl| *ttl > 0)
                .ok_or_else(|| format!("Invalid TOKEN_TTL_SECS '{}'", raw))?,
            Err(_) => 7200,
        };

        let export_retention_secs = match env::var("EXPORT_RETENTION_SECS") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|secs| (0..=MAX_EXPORT_RETENTION_SECS).contains(secs))
                .ok_or_else(|| format!("Invalid EXPORT_RETENTION_SECS '{}'", raw))?,
            Err(_) => DEFAULT_EXPORT_RETENTION_SECS,
        };

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            base_url: normalize_base_url(
                env::var("FHIR_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ),
            storage,
            database: DbConfig::from_env()?,
            export_dir: env::var("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("exports")),
            export_retention_secs,
            token_ttl_secs,
            seed_file: env::var("SEED_FILE").ok().map(PathBuf::from),
        })
    }

    /// In-memory configuration, used by tests and local runs.
    pub fn in_memory(base_url: impl Into<String>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            base_url: normalize_base_url(base_url.into()),
            storage: StorageBackend::Memory,
            database: DbConfig::default(),
            export_dir: export_dir.into(),
            export_retention_secs: DEFAULT_EXPORT_RETENTION_SECS,
            token_ttl_secs: 7200,
            seed_file: None,
        }
    }

    /// Root of the FHIR API, e.g. `http://localhost:3000/fhir/r4`
    pub fn fhir_base(&self) -> String {
        format!("{}/fhir/r4", self.base_url)
    }

    pub fn resource_url(&self, resource_type: &str, id: i64) -> String {
        format!("{}/{}/{}", self.fhir_base(), resource_type, id)
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
