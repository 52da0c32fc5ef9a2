use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub separation: SeparationConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allow cross-origin requests from any origin (the web client is served elsewhere).
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
    /// Largest accepted upload body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allow_any: true,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// API key for ApiKey auth method (required when method = "api_key")
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// Output store layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Flat directory holding stem and part files; doubles as the cache index.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Where in-flight uploads are spooled. Defaults to `<data_dir>/tmp`.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// URL prefix under which `data_dir` is served read-only.
    #[serde(default = "default_serve_path")]
    pub serve_path: String,
}

impl StorageConfig {
    /// Effective spool directory for uploads.
    pub fn upload_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("tmp"))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            temp_dir: None,
            serve_path: default_serve_path(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_serve_path() -> String {
    "/data".to_string()
}

/// Timing knobs for job execution and upload ingestion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Interval at which a running job's handoff channel is polled.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Emit a heartbeat every this many poll ticks.
    #[serde(default = "default_heartbeat_ticks")]
    pub heartbeat_ticks: u32,
    /// Size of each upload chunk folded into the digest.
    #[serde(default = "default_chunk_bytes")]
    pub upload_chunk_bytes: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            heartbeat_ticks: default_heartbeat_ticks(),
            upload_chunk_bytes: default_chunk_bytes(),
        }
    }
}

fn default_poll_interval() -> u64 {
    100
}

fn default_heartbeat_ticks() -> u32 {
    10
}

fn default_chunk_bytes() -> usize {
    1024 * 1024
}

/// External source-separation tool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeparationConfig {
    /// Program and leading arguments.
    #[serde(default = "default_separation_command")]
    pub command: Vec<String>,
    /// Model file handed to the separator.
    #[serde(default = "default_separation_model")]
    pub model: String,
    /// Extension of produced part files.
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Number of part files one separation produces.
    #[serde(default = "default_part_count")]
    pub part_count: usize,
    /// Labels matched against produced file names to order them into parts.
    /// Files matching no label follow, sorted by name.
    #[serde(default = "default_stem_order")]
    pub stem_order: Vec<String>,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            command: default_separation_command(),
            model: default_separation_model(),
            output_format: default_output_format(),
            part_count: default_part_count(),
            stem_order: default_stem_order(),
        }
    }
}

fn default_separation_command() -> Vec<String> {
    vec!["audio-separator".to_string()]
}

fn default_separation_model() -> String {
    "model.onnx".to_string()
}

fn default_output_format() -> String {
    "wav".to_string()
}

fn default_part_count() -> usize {
    2
}

fn default_stem_order() -> Vec<String> {
    vec!["Vocals".to_string(), "Instrumental".to_string()]
}

/// External forced-alignment tool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlignmentConfig {
    #[serde(default = "default_alignment_command")]
    pub command: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_device")]
    pub device: String,
    /// Characters eligible for fine-grained timing.
    #[serde(default = "default_alignable_chars")]
    pub alignable_chars: String,
    /// Part index resolved for the `vocals` reference.
    #[serde(default)]
    pub vocals_part: usize,
    /// Part index resolved for the `instrumental` reference.
    #[serde(default = "default_instrumental_part")]
    pub instrumental_part: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            command: default_alignment_command(),
            language: default_language(),
            model_name: None,
            device: default_device(),
            alignable_chars: default_alignable_chars(),
            vocals_part: 0,
            instrumental_part: default_instrumental_part(),
        }
    }
}

fn default_alignment_command() -> Vec<String> {
    vec!["jellysing-align".to_string()]
}

fn default_language() -> String {
    "en".to_string()
}

fn default_device() -> String {
    "cuda".to_string()
}

pub fn default_alignable_chars() -> String {
    "abcdefghijklmnopqrstuvwxyz'".to_string()
}

fn default_instrumental_part() -> usize {
    1
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub jobs: JobsConfig,
    pub separation: SeparationConfig,
    pub alignment: AlignmentConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_key_configured: config
                    .auth
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
            },
            server: config.server.clone(),
            storage: config.storage.clone(),
            jobs: config.jobs.clone(),
            separation: config.separation.clone(),
            alignment: config.alignment.clone(),
        }
    }
}
