use crate::error::{AppError, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// E-book publishing and reading backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookvault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKVAULT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Write a default config with fresh secrets and create the database.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Print a new base64 file encryption key.
    Keygen,
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upload storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Maximum request body size for uploads, in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

fn default_max_upload_mb() -> usize {
    100
}

impl ServerConfig {
    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/bookvault.db")
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign access tokens.
    #[serde(default)]
    pub jwt_secret: String,

    /// Access token lifetime in days.
    #[serde(default = "default_token_days")]
    pub token_days: u32,

    /// Registration requests allowed per client per minute.
    #[serde(default = "default_register_per_minute")]
    pub register_per_minute: u32,

    /// Login requests allowed per client per minute.
    #[serde(default = "default_login_per_minute")]
    pub login_per_minute: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_days: default_token_days(),
            register_per_minute: default_register_per_minute(),
            login_per_minute: default_login_per_minute(),
        }
    }
}

fn default_token_days() -> u32 {
    7
}

fn default_register_per_minute() -> u32 {
    5
}

fn default_login_per_minute() -> u32 {
    10
}

/// Upload storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for encrypted book files.
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,

    /// Directory for cover images.
    #[serde(default = "default_covers_dir")]
    pub covers_dir: PathBuf,

    /// Base64-encoded 32-byte key for book file encryption.
    #[serde(default)]
    pub encryption_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            files_dir: default_files_dir(),
            covers_dir: default_covers_dir(),
            encryption_key: String::new(),
        }
    }
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("data/uploads/files")
}

fn default_covers_dir() -> PathBuf {
    PathBuf::from("data/uploads/cover_images")
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("bookvault.toml"),
            dirs::config_dir()
                .map(|p| p.join("bookvault").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/bookvault/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("DATABASE_URL") {
            let path = url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("sqlite:"))
                .unwrap_or(&url);
            self.database.path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("JWT_SECRET_KEY") {
            self.auth.jwt_secret = secret;
        }
        if let Some(key) = lookup("FILE_ENCRYPTION_KEY") {
            self.storage.encryption_key = key;
        }
        if let Some(dir) = lookup("FILE_UPLOAD_FOLDER") {
            self.storage.files_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("IMAGE_UPLOAD_FOLDER") {
            self.storage.covers_dir = PathBuf::from(dir);
        }
    }

    /// Check that the secrets needed to serve requests are present.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(AppError::Config(
                "auth.jwt_secret (or JWT_SECRET_KEY) must be set".to_string(),
            ));
        }
        if self.storage.encryption_key.trim().is_empty() {
            return Err(AppError::Config(
                "storage.encryption_key (or FILE_ENCRYPTION_KEY) must be set".to_string(),
            ));
        }
        if self.auth.token_days == 0 {
            return Err(AppError::Config(
                "auth.token_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate default config file content with the given secrets filled in.
    pub fn generate_default(jwt_secret: &str, encryption_key: &str) -> String {
        format!(
            r#"# bookvault configuration

[server]
bind = "0.0.0.0:8080"
# Maximum upload size in megabytes
max_upload_mb = 100

[database]
path = "data/bookvault.db"

[auth]
# Secret used to sign access tokens (or set JWT_SECRET_KEY)
jwt_secret = "{jwt_secret}"
# Access token lifetime in days
token_days = 7
register_per_minute = 5
login_per_minute = 10

[storage]
files_dir = "data/uploads/files"
covers_dir = "data/uploads/cover_images"
# Base64 32-byte key (or set FILE_ENCRYPTION_KEY); generate with `bookvault keygen`
encryption_key = "{encryption_key}"
"#
        )
    }
}

/// Accepted upload file kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// EPUB format (Electronic Publication).
    Epub,
    /// PDF format (Portable Document Format).
    Pdf,
    /// JPEG image.
    Jpeg,
    /// PNG image.
    Png,
}

impl FileKind {
    /// Get the MIME type for this kind.
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileKind::Epub => "application/epub+zip",
            FileKind::Pdf => "application/pdf",
            FileKind::Jpeg => "image/jpeg",
            FileKind::Png => "image/png",
        }
    }

    /// Try to detect kind from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "epub" => Some(FileKind::Epub),
            "pdf" => Some(FileKind::Pdf),
            "jpg" | "jpeg" => Some(FileKind::Jpeg),
            "png" => Some(FileKind::Png),
            _ => None,
        }
    }

    /// Detect kind from a file name's last extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Self::from_extension(ext)
    }

    /// Check if this kind may be used as a cover image.
    pub fn is_image(&self) -> bool {
        matches!(self, FileKind::Jpeg | FileKind::Png)
    }
}

/// Lower-cased extension of a client file name, if any.
pub fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}
