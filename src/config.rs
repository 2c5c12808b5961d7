//! Runtime configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use crate::service::Concurrency;

pub const MIN_JWT_SECRET_LEN: usize = 32;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least 32 characters long")]
    WeakSecret,
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStoreKind {
    Local,
    S3,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    /// JSON snapshot file for the in-memory store; unset keeps it ephemeral.
    pub snapshot_path: Option<PathBuf>,
    pub file_store: FileStoreKind,
    /// Directory the local file store resolves attachment URLs against.
    pub storage_root: PathBuf,
    pub s3: S3Settings,
    pub concurrency: Concurrency,
    pub max_upload_bytes: usize,
    pub frontend_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let file_store = match env::var("FILE_STORE").as_deref() {
            Err(_) | Ok("local") => FileStoreKind::Local,
            Ok("s3") => FileStoreKind::S3,
            Ok(other) => {
                return Err(ConfigError::Invalid { name: "FILE_STORE", value: other.to_string() })
            }
        };

        let concurrency = if parse_or("OPTIMISTIC_LOCKING", true)? {
            Concurrency::Optimistic
        } else {
            Concurrency::LastWriteWins
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_or("PORT", 8080)?,
            database_url: env::var("DATABASE_URL").ok(),
            snapshot_path: env::var("SNAPSHOT_PATH").ok().map(PathBuf::from),
            file_store,
            storage_root: env::var("STORAGE_ROOT").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(".")),
            s3: S3Settings {
                endpoint: env::var("S3_ENDPOINT").ok(),
                bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "adboard-files".into()),
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
                access_key: env::var("S3_ACCESS_KEY").unwrap_or_default(),
                secret_key: env::var("S3_SECRET_KEY").unwrap_or_default(),
            },
            concurrency,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            frontend_url: env::var("FRONTEND_URL").ok(),
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid { name, value: v }),
        Err(_) => Ok(default),
    }
}
