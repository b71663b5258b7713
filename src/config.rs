//! Application configuration module / 应用配置模块
//!
//! Loaded from config.json in the working directory, created with defaults
//! on first run. API keys and the database URL can be overridden from the
//! environment / 首次运行时创建默认配置文件

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration / 服务器配置
    pub server: ServerConfig,
    /// Database configuration / 数据库配置
    pub database: DatabaseConfig,
    /// Geocoding configuration / 地理编码配置
    pub geocoding: GeocodingConfig,
    /// External gym data sources / 外部数据源
    pub sources: SourcesConfig,
    /// Search configuration / 搜索配置
    pub search: SearchConfig,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address / 服务器监听地址
    pub host: String,
    /// Server port / 服务器端口
    pub port: u16,
}

/// Database configuration / 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Data directory path / 数据目录路径
    pub data_dir: String,
    /// Database file path (relative to data_dir) / 数据库文件路径
    pub db_file: String,
    /// Full database URL, takes precedence over data_dir/db_file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Geocoding configuration / 地理编码配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Nominatim base URL
    pub nominatim_url: String,
    /// User-Agent sent to Nominatim (required by its usage policy)
    pub user_agent: String,
    /// Request timeout in seconds / 请求超时（秒）
    pub timeout_secs: u64,
}

/// External data source configuration / 数据源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Google Places API key, also enables Google city validation
    pub google_places_api_key: Option<String>,
    /// Yelp Fusion API key
    pub yelp_api_key: Option<String>,
    /// Request timeout in seconds / 请求超时（秒）
    pub request_timeout_secs: u64,
}

/// Search configuration / 搜索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Overall timeout of one search / 单次搜索超时（秒）
    pub timeout_secs: u64,
    /// How long finished searches stay visible / 完成后保留时间（秒）
    pub cleanup_delay_secs: u64,
    /// Radius used when a request gives none, in miles
    pub default_radius: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            db_file: "gymintel.db".to_string(),
            url: None,
        }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "gymintel-web/1.0".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            google_places_api_key: None,
            yelp_api_key: None,
            request_timeout_secs: 15,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            cleanup_delay_secs: 300,
            default_radius: 10.0,
        }
    }
}

impl AppConfig {
    /// Get the full database URL / 获取完整的数据库URL
    pub fn get_database_url(&self) -> String {
        if let Some(url) = &self.database.url {
            return url.clone();
        }
        let db_path = Path::new(&self.database.data_dir).join(&self.database.db_file);
        format!("sqlite:{}?mode=rwc", db_path.to_string_lossy())
    }

    /// Get the full data directory path / 获取完整的数据目录路径
    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.database.data_dir)
    }

    /// Get the server bind address / 获取服务器绑定地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Apply environment overrides / 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(key) = lookup("GOOGLE_PLACES_API_KEY") {
            self.sources.google_places_api_key = Some(key);
        }
        if let Some(key) = lookup("YELP_API_KEY") {
            self.sources.yelp_api_key = Some(key);
        }
    }
}

/// Get the config file path / 获取配置文件路径
fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from config.json, or create default if not exists / 加载配置文件
pub fn load_config() -> Result<AppConfig> {
    let mut config = load_config_from(&get_config_path())?;
    config.apply_env_overrides();
    Ok(config)
}

/// Load configuration from a specific file, creating it with defaults when missing
pub fn load_config_from(config_path: &Path) -> Result<AppConfig> {
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        let config = AppConfig::default();
        save_config(&config, config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(config: &AppConfig, config_path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config file {:?}", config_path))?;

    Ok(())
}
