use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the web service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Upload storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload retention configuration
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Classifier model configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Localization configuration
    #[serde(default)]
    pub i18n: I18nConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format ("json" or "pretty")
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Start the Prometheus exporter
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Upload storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory served under `/static`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Flat directory holding stored uploads
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// URL prefix under which stored uploads are reachable
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    /// Accepted file extensions, compared case-insensitively
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

/// Upload retention configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Maximum age of a stored upload before it becomes eligible for deletion
    #[serde(default = "default_retention_window_secs")]
    pub window_secs: u64,
    /// Trigger a background sweep after every accepted upload
    #[serde(default = "default_true")]
    pub sweep_on_upload: bool,
}

/// Pixel normalization applied before inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Scale channels to [0, 1]
    Unit,
    /// Scale to [0, 1], then apply ImageNet mean/std
    Imagenet,
}

/// Classifier model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path of the ONNX model file
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    /// Directory scanned for model metadata when `path` is missing
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    /// Square input size expected by the model
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Pixel normalization
    #[serde(default = "default_normalization")]
    pub normalization: Normalization,
    /// ONNX Runtime intra-op threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    /// Per-request inference timeout in seconds (0 disables the timeout)
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,
}

/// Localization configuration
#[derive(Debug, Clone, Deserialize)]
pub struct I18nConfig {
    /// Language used when the session has none or an unknown one
    #[serde(default = "default_language")]
    pub default_language: String,
}

// Default value functions
fn default_service_name() -> String {
    "dermascan-web".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5001
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024 // 16MB
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("static/uploads")
}

fn default_public_prefix() -> String {
    "/static/uploads".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "bmp", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_retention_window_secs() -> u64 {
    60 * 60 // 1 hour
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/yolo-skin.onnx")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_input_size() -> u32 {
    224
}

fn default_normalization() -> Normalization {
    Normalization::Unit
}

fn default_intra_threads() -> usize {
    4
}

fn default_inference_timeout_secs() -> u64 {
    30
}

fn default_language() -> String {
    "en".to_string()
}

impl Config {
    /// Load configuration from config files and environment
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/web").required(false))
            .add_source(config::File::with_name("/etc/dermascan/web").required(false))
            // Override with environment variables
            // DERMASCAN__RETENTION__WINDOW_SECS -> retention.window_secs
            .add_source(
                config::Environment::with_prefix("DERMASCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("storage.allowed_extensions")
                    .with_list_parse_key("api.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "storage.upload_dir".to_string(),
            ));
        }

        if self.storage.allowed_extensions.is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "storage.allowed_extensions".to_string(),
                message: "At least one extension must be allowed".to_string(),
            });
        }

        if !self.storage.public_prefix.starts_with('/') {
            return Err(ConfigValidationError::InvalidValue {
                field: "storage.public_prefix".to_string(),
                message: "Prefix must start with '/'".to_string(),
            });
        }

        if self.api.max_upload_bytes == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "api.max_upload_bytes".to_string(),
                message: "Upload limit must be greater than 0".to_string(),
            });
        }

        if self.retention.window_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "retention.window_secs".to_string(),
                message: "Retention window must be greater than 0".to_string(),
            });
        }

        if self.model.input_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "model.input_size".to_string(),
                message: "Input size must be greater than 0".to_string(),
            });
        }

        if self.i18n.default_language.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "i18n.default_language".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the retention window as Duration
    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention.window_secs)
    }

    /// Get the inference timeout, if enabled
    pub fn inference_timeout(&self) -> Option<Duration> {
        match self.model.inference_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_enabled: true,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
            upload_dir: default_upload_dir(),
            public_prefix: default_public_prefix(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_secs: default_retention_window_secs(),
            sweep_on_upload: true,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            models_dir: default_models_dir(),
            input_size: default_input_size(),
            normalization: default_normalization(),
            intra_threads: default_intra_threads(),
            inference_timeout_secs: default_inference_timeout_secs(),
        }
    }
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            retention: RetentionConfig::default(),
            model: ModelConfig::default(),
            i18n: I18nConfig::default(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.api.port, 5001);
        assert_eq!(config.api.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.retention_window(), Duration::from_secs(3600));
        assert_eq!(config.storage.public_prefix, "/static/uploads");
        assert_eq!(config.i18n.default_language, "en");
        assert_eq!(config.storage.allowed_extensions.len(), 6);
    }

    #[test]
    fn test_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_empty_extension_list() {
        let mut config = Config::default();
        config.storage.allowed_extensions.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_relative_public_prefix() {
        let mut config = Config::default();
        config.storage.public_prefix = "static/uploads".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_retention_window() {
        let mut config = Config::default();
        config.retention.window_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_default_language() {
        let mut config = Config::default();
        config.i18n.default_language = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_inference_timeout_disabled() {
        let mut config = Config::default();
        assert_eq!(config.inference_timeout(), Some(Duration::from_secs(30)));
        config.model.inference_timeout_secs = 0;
        assert_eq!(config.inference_timeout(), None);
    }
}
